use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slowmo_ffmpeg::FfmpegBackend;
use slowmo_pipeline::{
    DEFAULT_TARGET_FPS, EncoderConfig, RateControl, TranscodeConfig, transcode,
};
use slowmo_types::{CodecId, DEFAULT_INITIAL_PTS_US};

#[derive(Parser, Debug)]
#[command(name = "slowmo")]
#[command(about = "Re-encode a high-speed video at a standard frame rate")]
struct Args {
    /// Input video file
    input: PathBuf,

    /// Output MP4 file [default: output.mp4 next to the input]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Frame rate the output is played back at
    #[arg(short, long, default_value_t = DEFAULT_TARGET_FPS)]
    fps: u32,

    /// Timestamp of the first output frame, in microseconds
    #[arg(long, default_value_t = DEFAULT_INITIAL_PTS_US)]
    initial_pts_us: i64,

    /// Maximum number of decoded frames waiting for the encoder
    #[arg(short = 'q', long)]
    queue_capacity: Option<usize>,

    /// How long each device poll waits, in milliseconds
    #[arg(long, default_value = "10")]
    poll_timeout_ms: u64,

    /// Seconds between key frames
    #[arg(short = 'k', long, default_value = "1")]
    keyframe_interval: u32,

    /// Output codec as a MIME type
    #[arg(long, default_value = "video/avc", value_parser = parse_codec)]
    codec: CodecId,

    /// Bits per pixel per frame, used to derive the bit rate
    #[arg(long, default_value = "0.2")]
    bits_per_pixel: f32,

    /// Codec profile [default: high for video/avc]
    #[arg(long)]
    profile: Option<String>,

    /// Encode at constant quality instead of the derived bit rate
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=51))]
    crf: Option<u8>,

    /// Log every frame
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> TranscodeConfig {
        let encoder = EncoderConfig {
            codec: self.codec,
            bits_per_pixel: self.bits_per_pixel,
            key_frame_interval_secs: self.keyframe_interval,
            profile: self.profile.clone(),
            rate_control: self
                .crf
                .map_or(RateControl::Bitrate, RateControl::ConstantQuality),
            ..EncoderConfig::default()
        };
        let mut config = TranscodeConfig::new(&self.input)
            .with_target_fps(self.fps)
            .with_initial_pts_us(self.initial_pts_us)
            .with_poll_timeout(Duration::from_millis(self.poll_timeout_ms))
            .with_encoder(encoder);
        if let Some(output) = &self.output {
            config = config.with_output(output);
        }
        if let Some(capacity) = self.queue_capacity {
            config = config.with_queue_capacity(capacity);
        }
        config
    }
}

fn parse_codec(mime: &str) -> Result<CodecId, String> {
    CodecId::from_mime(mime).ok_or_else(|| format!("unknown video codec {mime:?}"))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.config();
    config.validate().context("invalid arguments")?;

    let backend = FfmpegBackend::new().context("failed to initialize ffmpeg")?;
    let report = transcode(&backend, &config)
        .with_context(|| format!("failed to transcode {}", config.input.display()))?;

    info!(
        output = %report.output.display(),
        frames = report.encode.packets_written,
        skipped = report.decode.frames_skipped,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "done"
    );
    Ok(())
}
