/*!
    Transcode configuration types.
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use slowmo_types::{CodecId, ColorFormat, ColorLayout, DEFAULT_INITIAL_PTS_US, Error, Result};

use crate::device::{EncoderFormat, RateControl};

/// Frame rate the output is stamped at unless configured otherwise.
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// Highest frame rate that still leaves whole microseconds between frames.
pub const MAX_TARGET_FPS: u32 = 1_000_000;

/// How long a single device dequeue waits before the driver polls again.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// File name of the output, placed next to the input.
pub const DEFAULT_OUTPUT_FILE_NAME: &str = "output.mp4";

/**
    Returns the default output path for `input`: `output.mp4` in the same
    directory.
*/
pub fn default_output_path(input: impl AsRef<Path>) -> PathBuf {
    let parent = input.as_ref().parent().unwrap_or_else(|| Path::new(""));
    parent.join(DEFAULT_OUTPUT_FILE_NAME)
}

/**
    Configuration for the encode device.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderConfig {
    /// Output codec.
    pub codec: CodecId,
    /// Bits per pixel per frame, used to derive the bit rate.
    pub bits_per_pixel: f32,
    /// Seconds between key frames.
    pub key_frame_interval_secs: u32,
    /// Raw input color format requested from the encoder.
    pub color_format: ColorFormat,
    /// Codec profile, `None` to use the codec's usual one.
    pub profile: Option<String>,
    pub rate_control: RateControl,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: CodecId::H264,
            bits_per_pixel: 0.2,
            key_frame_interval_secs: 1,
            color_format: ColorFormat::Yuv420SemiPlanar,
            profile: None,
            rate_control: RateControl::Bitrate,
        }
    }
}

impl EncoderConfig {
    /**
        Resolve the encoder format for a `width` x `height` output at `fps`.

        Fails with [`Error::DeviceConfig`] if the color format has no byte
        layout the pipeline can produce, or if the codec cannot be written
        to an MP4 container.
    */
    pub fn resolve(&self, width: u32, height: u32, fps: u32) -> Result<EncoderFormat> {
        let input_layout = self.color_format.input_layout().ok_or_else(|| {
            Error::device_config(format!(
                "encoder color format {:#x} has no known input layout",
                self.color_format.code()
            ))
        })?;
        if !self.codec.fits_mp4() {
            return Err(Error::device_config(format!(
                "{} cannot be written to mp4",
                self.codec.mime()
            )));
        }

        let pixels_per_second = f64::from(width) * f64::from(height) * f64::from(fps);
        let bit_rate = (pixels_per_second * f64::from(self.bits_per_pixel)).round() as u64;

        Ok(EncoderFormat {
            codec: self.codec,
            width,
            height,
            frame_rate: fps,
            bit_rate,
            key_frame_interval_secs: self.key_frame_interval_secs,
            color_format: self.color_format,
            input_layout,
            profile: self.profile.clone().or_else(|| default_profile(self.codec)),
            rate_control: self.rate_control,
        })
    }
}

/// H.264 is encoded with the High profile unless told otherwise.
fn default_profile(codec: CodecId) -> Option<String> {
    match codec {
        CodecId::H264 => Some("high".to_string()),
        _ => None,
    }
}

/**
    Configuration for one transcode run.
*/
#[derive(Clone, Debug)]
pub struct TranscodeConfig {
    /// Source video file.
    pub input: PathBuf,
    /// Destination MP4 file.
    pub output: PathBuf,
    /// Frame rate the output is stamped at.
    pub target_fps: u32,
    /// Timestamp of the first output frame, in microseconds.
    pub initial_pts_us: i64,
    /// Timeout for each device dequeue.
    pub poll_timeout: Duration,
    /// Layout of frames staged in the queue.
    pub working_layout: ColorLayout,
    /// Maximum number of staged frames, `None` for unbounded.
    pub queue_capacity: Option<usize>,
    pub encoder: EncoderConfig,
}

impl TranscodeConfig {
    /**
        Create a configuration with defaults, writing next to `input`.
    */
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        let output = default_output_path(&input);
        Self {
            input,
            output,
            target_fps: DEFAULT_TARGET_FPS,
            initial_pts_us: DEFAULT_INITIAL_PTS_US,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            working_layout: ColorLayout::Nv21,
            queue_capacity: None,
            encoder: EncoderConfig::default(),
        }
    }

    /**
        Set the output path.
    */
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /**
        Set the output frame rate.
    */
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_initial_pts_us(mut self, pts_us: i64) -> Self {
        self.initial_pts_us = pts_us;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /**
        Bound the number of staged frames. The decode side blocks while
        the queue is full.
    */
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    /**
        Check the configuration before any device is created.
    */
    pub fn validate(&self) -> Result<()> {
        if self.target_fps == 0 {
            return Err(Error::device_config("target frame rate must be positive"));
        }
        if self.target_fps > MAX_TARGET_FPS {
            return Err(Error::device_config(format!(
                "target frame rate {} is above {MAX_TARGET_FPS}",
                self.target_fps
            )));
        }
        if self.queue_capacity == Some(0) {
            return Err(Error::device_config("queue capacity must be positive"));
        }
        if self.poll_timeout.is_zero() {
            return Err(Error::device_config("poll timeout must be positive"));
        }
        if !(self.encoder.bits_per_pixel.is_finite() && self.encoder.bits_per_pixel > 0.0) {
            return Err(Error::device_config("bits per pixel must be positive"));
        }
        if self.input == self.output {
            return Err(Error::device_config(format!(
                "output {} would overwrite the input",
                self.output.display()
            )));
        }
        Ok(())
    }
}
