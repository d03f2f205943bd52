use std::path::Path;

use ffmpeg_next::util::log;
use tracing::debug;

use slowmo_pipeline::{EncoderFormat, MediaBackend};
use slowmo_types::{ColorFormat, Error, Result};

use crate::{FfmpegDecoder, FfmpegEncoder, FfmpegMuxer, FfmpegSource};

/**
    Creates FFmpeg devices for a transcode.
*/
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    _private: (),
}

impl FfmpegBackend {
    /**
        Initialize the FFmpeg libraries.

        Only errors are logged by FFmpeg itself, everything else goes
        through `tracing`.
    */
    pub fn new() -> Result<Self> {
        ffmpeg_next::init()
            .map_err(|e| Error::device_config(format!("failed to initialize FFmpeg: {e}")))?;
        log::set_level(log::Level::Error);
        debug!("ffmpeg initialized");
        Ok(Self { _private: () })
    }
}

impl MediaBackend for FfmpegBackend {
    type Source = FfmpegSource;
    type Decoder = FfmpegDecoder;
    type Encoder = FfmpegEncoder;
    type Muxer = FfmpegMuxer;

    fn open_source(&self, path: &Path) -> Result<FfmpegSource> {
        FfmpegSource::open(path)
    }

    /**
        Every FFmpeg decoder can hand out pictures in these formats,
        converting with swscale when its native format differs.
    */
    fn decoder_color_formats(&self, _source: &FfmpegSource) -> Result<Vec<ColorFormat>> {
        Ok(vec![
            ColorFormat::Yuv420Flexible,
            ColorFormat::Yuv420Planar,
            ColorFormat::Yuv420SemiPlanar,
        ])
    }

    fn create_decoder(
        &self,
        source: &FfmpegSource,
        color_format: Option<ColorFormat>,
    ) -> Result<FfmpegDecoder> {
        FfmpegDecoder::new(source, color_format)
    }

    fn create_encoder(&self, format: &EncoderFormat) -> Result<FfmpegEncoder> {
        FfmpegEncoder::new(format)
    }

    fn create_muxer(&self, path: &Path) -> Result<FfmpegMuxer> {
        FfmpegMuxer::create(path)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use slowmo_pipeline::testing::MemoryBackend;
    use slowmo_pipeline::{
        EncodeDriver, EncodeParams, EncodeStats, EncoderConfig, FrameQueue, Muxer, SampleSource,
        TranscodeConfig, transcode,
    };
    use slowmo_types::{CodecId, ColorLayout, FrameBuffer, OutputFormat, Rational};

    use super::*;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;
    const FRAMES: usize = 12;

    fn backend() -> FfmpegBackend {
        FfmpegBackend::new().unwrap()
    }

    /// A moving horizontal ramp, so consecutive frames differ.
    fn frame(index: usize) -> FrameBuffer {
        let mut frame = FrameBuffer::zeroed(WIDTH, HEIGHT, ColorLayout::Nv21);
        let luma_len = frame.luma_len();
        let data = frame.data_mut();
        for (i, byte) in data[..luma_len].iter_mut().enumerate() {
            *byte = ((i % WIDTH as usize) * 3 + index * 8) as u8;
        }
        data[luma_len..].fill(128);
        frame
    }

    fn encode_into<M: Muxer>(muxer: M) -> EncodeStats {
        let format = EncoderConfig::default().resolve(WIDTH, HEIGHT, 30).unwrap();
        let encoder = FfmpegEncoder::new(&format).unwrap();

        let queue = Arc::new(FrameQueue::new(WIDTH, HEIGHT));
        for index in 0..FRAMES {
            queue.push(frame(index)).unwrap();
        }
        queue.close();

        let params = EncodeParams {
            target_fps: 30,
            initial_pts_us: 132,
            poll_timeout: Duration::from_millis(1),
            input_layout: format.input_layout,
        };
        EncodeDriver::new(encoder, muxer, queue, params).run().unwrap()
    }

    fn read_pts(path: &Path) -> (slowmo_types::TrackFormat, Vec<i64>) {
        let mut source = FfmpegSource::open(path).unwrap();
        let track = source.track_format().clone();
        let mut pts = Vec::new();
        while let Some(sample) = source.read_sample().unwrap() {
            pts.push(sample.pts_us);
        }
        (track, pts)
    }

    #[test]
    fn encoder_hands_codec_config_to_muxer() {
        backend();
        let memory = MemoryBackend::new(WIDTH, HEIGHT, 0, 240);

        let stats = encode_into(memory.muxer());
        assert_eq!(stats.frames_submitted, FRAMES as u64);
        assert_eq!(stats.packets_written, FRAMES as u64);

        let log = memory.muxer_log.lock();
        assert_eq!(log.tracks.len(), 1);
        let track = &log.tracks[0];
        assert_eq!(track.codec, CodecId::H264);
        assert_eq!((track.width, track.height), (WIDTH, HEIGHT));
        assert!(!track.codec_config.is_empty());

        assert!(log.samples[0].1.is_key_frame());
        assert_eq!(log.pts()[0], 132);
        assert!(log.started && log.stopped);
    }

    #[test]
    fn written_file_has_one_video_track() {
        backend();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.mp4");

        let stats = encode_into(FfmpegMuxer::create(&path).unwrap());
        assert_eq!(stats.packets_written, FRAMES as u64);

        let (track, pts) = read_pts(&path);
        assert_eq!(track.codec, CodecId::H264);
        assert_eq!((track.width, track.height), (WIDTH, HEIGHT));
        assert_eq!(pts.len(), FRAMES);
        assert!(pts.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn transcode_rewrites_file_next_to_input() {
        let backend = backend();
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("slowmo_240fps.mp4");
        encode_into(FfmpegMuxer::create(&input).unwrap());

        let config = TranscodeConfig::new(&input).with_target_fps(24);
        let report = transcode(&backend, &config).unwrap();
        assert_eq!(report.output, dir.path().join("output.mp4"));
        assert_eq!(report.decode.frames_staged, FRAMES as u64);
        assert_eq!(report.encode.packets_written, FRAMES as u64);

        let (track, pts) = read_pts(&report.output);
        assert_eq!((track.width, track.height), (WIDTH, HEIGHT));
        assert_eq!(pts.len(), FRAMES);
        // 24 fps leaves 41_666 us between frames
        let span = pts[FRAMES - 1] - pts[0];
        assert!((span - 11 * 41_666).abs() < 1_000, "span {span}");
    }

    #[test]
    fn muxer_refuses_codec_mp4_cannot_hold() {
        backend();
        let dir = TempDir::new().unwrap();
        let mut muxer = FfmpegMuxer::create(&dir.path().join("output.mp4")).unwrap();

        let format = OutputFormat {
            codec: CodecId::Vp8,
            width: WIDTH,
            height: HEIGHT,
            frame_rate: Rational::new(30, 1),
            codec_config: Vec::new(),
        };
        assert!(muxer.add_track(&format).is_err());
        assert!(muxer.start().is_err());
        assert!(muxer.stop().is_err());
    }

    #[test]
    fn encoder_rejects_odd_dimensions() {
        backend();
        let format = EncoderConfig::default().resolve(63, 48, 30).unwrap();
        let err = FfmpegEncoder::new(&format).err().unwrap();
        assert!(matches!(err, Error::DeviceConfig { .. }));
    }
}
