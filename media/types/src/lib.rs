/*!
    Shared types for the slowmo transcoding crates.

    This crate defines the vocabulary that crosses crate boundaries: what
    the source produces, what the decode device hands out, what travels
    through the frame queue, and what the encoder passes to the muxer.
    It has no dependency on FFmpeg, so the pipeline and its tests can be
    built without the native libraries.

    # Core Types

    - [`Sample`] - Compressed input data with a timestamp
    - [`DecodedImage`] and [`Plane`] - Borrowed view of a decoded picture
    - [`FrameBuffer`] - Owned, flat 4:2:0 frame in a declared [`ColorLayout`]
    - [`BufferInfo`] and [`BufferFlags`] - Metadata for device buffers

    # Format Types

    - [`ColorLayout`] - Byte layout of a [`FrameBuffer`]
    - [`ColorFormat`] - Color format identifiers advertised by devices
    - [`CodecId`] - Codec identifiers

    # Stream Information

    - [`TrackFormat`] - The selected source video track
    - [`OutputFormat`] - The encoder's final output format

    # Timing

    - [`Rational`] and [`rescale`] - Time bases and timestamp conversion
    - [`PtsGenerator`] - Constant-rate synthetic timestamps

    # Error Handling

    - [`Error`] and [`Result`] - Common error types
*/

mod codec;
mod error;
mod format;
mod frame;
mod image;
mod packet;
mod rational;
mod stream;
mod timestamp;

pub use codec::CodecId;
pub use error::{Error, Result};
pub use format::{ColorFormat, ColorLayout};
pub use frame::FrameBuffer;
pub use image::{CropRect, DecodedImage, Plane};
pub use packet::{BufferFlags, BufferInfo, Sample, TrackIndex};
pub use rational::{MICROSECONDS, Rational, rescale};
pub use stream::{OutputFormat, TrackFormat};
pub use timestamp::{DEFAULT_INITIAL_PTS_US, PtsGenerator};
