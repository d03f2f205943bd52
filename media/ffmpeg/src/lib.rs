/*!
    FFmpeg-backed devices for the slowmo transcoding pipeline.

    This crate implements the device contracts from
    [`slowmo_pipeline::device`] on top of libavformat and libavcodec:

    - [`FfmpegSource`] demuxes the best video stream of a file.
    - [`FfmpegDecoder`] decodes it and exposes pictures as plane views.
    - [`FfmpegEncoder`] encodes raw frames, H.264 by default.
    - [`FfmpegMuxer`] writes the encoded packets to an MP4 file.

    FFmpeg's send/receive API is adapted to the slot model the pipeline
    drives: each device has a single input and a single output slot, and
    the poll timeouts are ignored since FFmpeg calls return immediately.

    # Example

    ```ignore
    use slowmo_ffmpeg::FfmpegBackend;
    use slowmo_pipeline::{TranscodeConfig, transcode};

    let backend = FfmpegBackend::new()?;
    let config = TranscodeConfig::new("slowmo_240fps.mp4").with_target_fps(30);
    let report = transcode(&backend, &config)?;
    ```
*/

pub use slowmo_types::{Error, Result};

mod backend;
mod convert;
mod decode;
mod encode;
mod mux;
mod source;

pub use backend::FfmpegBackend;
pub use decode::FfmpegDecoder;
pub use encode::FfmpegEncoder;
pub use mux::FfmpegMuxer;
pub use source::FfmpegSource;
