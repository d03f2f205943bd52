/*!
    Decode, stage and re-encode pipeline for the slowmo transcoding crates.

    A transcode runs on two threads coupled only by a [`FrameQueue`]:

    - The [`DecodeDriver`] runs on the calling thread. It feeds compressed
      samples to a decode device, extracts every decoded picture into an
      NV21 [`FrameBuffer`](slowmo_types::FrameBuffer) and pushes it.
    - The [`EncodeDriver`] runs on its own thread. It pops frames, converts
      them to the encoder's input layout, stamps them at a constant target
      frame rate and writes the encoded packets through a [`Muxer`].

    Devices are described by the traits in [`device`], so the drivers work
    the same against FFmpeg (see the `slowmo-ffmpeg` crate) or against the
    in-memory devices in `testing`.

    # Example

    ```ignore
    use slowmo_pipeline::{TranscodeConfig, transcode};

    let config = TranscodeConfig::new("/sdcard/DCIM/slowmo_240fps.mp4").with_target_fps(30);
    let report = transcode(&backend, &config)?;
    println!("wrote {} packets to {}", report.encode.packets_written, report.output.display());
    ```

    # Shutdown

    Shutdown is part of the queue's contract: [`FrameQueue::close`] stops
    new pushes, but everything pushed before it is still delivered, and
    [`FrameQueue::pop`] only returns `None` once the queue is closed and
    empty. The decode driver's loop has always exited before the queue is
    closed, so no frame can be lost to the race.
*/

pub use slowmo_types::{Error, Result};

mod config;
mod decode;
pub mod device;
mod encode;
mod negotiation;
mod queue;
mod transcode;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{
    DEFAULT_OUTPUT_FILE_NAME, DEFAULT_POLL_TIMEOUT, DEFAULT_TARGET_FPS, EncoderConfig,
    MAX_TARGET_FPS, TranscodeConfig, default_output_path,
};
pub use decode::{DecodeDriver, DecodeStats};
pub use device::{
    DecodeDevice, EncodeDevice, EncoderFormat, EncoderOutput, InputSlot, MediaBackend, Muxer,
    OutputSlot, RateControl, SampleSource,
};
pub use encode::{ENCODE_THREAD_NAME, EncodeDriver, EncodeParams, EncodeStats};
pub use negotiation::{PREFERRED_DECODE_FORMAT, negotiate};
pub use queue::FrameQueue;
pub use transcode::{TranscodeReport, transcode};
