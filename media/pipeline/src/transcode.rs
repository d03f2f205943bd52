/*!
    One complete transcode: setup, both drivers, shutdown.
*/

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use slowmo_types::{ColorFormat, Error, Result, TrackFormat};

use crate::config::TranscodeConfig;
use crate::decode::{DecodeDriver, DecodeStats};
use crate::device::{DecodeDevice, EncodeDevice, EncoderFormat, MediaBackend, SampleSource};
use crate::encode::{EncodeDriver, EncodeParams, EncodeStats};
use crate::negotiation::{PREFERRED_DECODE_FORMAT, negotiate};
use crate::queue::FrameQueue;

/**
    Summary of a finished transcode.
*/
#[derive(Clone, Debug)]
pub struct TranscodeReport {
    /// Path the output was written to.
    pub output: PathBuf,
    /// The source video track.
    pub track: TrackFormat,
    /// Color format requested from the decoder, `None` if it kept its default.
    pub decoder_color_format: Option<ColorFormat>,
    pub decode: DecodeStats,
    pub encode: EncodeStats,
    pub elapsed: Duration,
}

/**
    Transcode `config.input` into `config.output` using devices from `backend`.

    All devices are created before any frame moves, so setup failures
    return before a thread is spawned. Devices created before the failing
    step are stopped again. The decode driver then runs on the
    calling thread while the encode driver runs on its own; the queue is
    closed once decoding ends, whatever the outcome.

    If both sides fail, the decode error is returned, unless it is only
    [`Error::QueueClosed`] caused by the encode side giving up first.
*/
pub fn transcode<B: MediaBackend>(
    backend: &B,
    config: &TranscodeConfig,
) -> Result<TranscodeReport> {
    config.validate()?;
    let started = Instant::now();

    let source = backend.open_source(&config.input)?;
    let track = source.track_format().clone();
    info!(
        input = %config.input.display(),
        codec = track.codec.mime(),
        width = track.width,
        height = track.height,
        frame_rate = ?track.frame_rate,
        "opened source"
    );

    let supported = backend.decoder_color_formats(&source)?;
    debug!(
        formats = ?supported.iter().map(|format| format.code()).collect::<Vec<_>>(),
        "decoder color formats"
    );
    let decoder_color_format = negotiate(PREFERRED_DECODE_FORMAT, &supported);
    if decoder_color_format.is_none() {
        warn!(
            requested = PREFERRED_DECODE_FORMAT.code(),
            "decoder does not offer the requested color format, keeping its default"
        );
    }
    let mut decoder = backend.create_decoder(&source, decoder_color_format)?;

    let (encoder_format, encoder, muxer) = match create_encode_side(backend, config, &track) {
        Ok(devices) => devices,
        Err(e) => {
            log_stop_failure("decoder", decoder.stop());
            return Err(e);
        }
    };

    let queue = Arc::new(match config.queue_capacity {
        Some(capacity) => FrameQueue::bounded(track.width, track.height, capacity),
        None => FrameQueue::new(track.width, track.height),
    });
    let params = EncodeParams {
        target_fps: config.target_fps,
        initial_pts_us: config.initial_pts_us,
        poll_timeout: config.poll_timeout,
        input_layout: encoder_format.input_layout,
    };
    let worker = match EncodeDriver::new(encoder, muxer, Arc::clone(&queue), params).spawn() {
        Ok(worker) => worker,
        Err(e) => {
            log_stop_failure("decoder", decoder.stop());
            return Err(e);
        }
    };

    let decoded = DecodeDriver::new(
        source,
        decoder,
        Arc::clone(&queue),
        config.working_layout,
        config.poll_timeout,
    )
    .run();
    queue.close();

    let encoded = worker
        .join()
        .unwrap_or_else(|_| Err(Error::worker("encode thread panicked")));

    let (decode, encode) = match (decoded, encoded) {
        (Ok(decode), Ok(encode)) => (decode, encode),
        (Err(Error::QueueClosed), Err(e)) => return Err(e),
        (Err(e), encoded) => {
            if let Err(encode_err) = encoded {
                warn!(error = %encode_err, "encode also failed");
            }
            return Err(e);
        }
        (Ok(_), Err(e)) => return Err(e),
    };

    let elapsed = started.elapsed();
    info!(
        output = %config.output.display(),
        frames = decode.frames_staged,
        packets = encode.packets_written,
        elapsed_ms = elapsed.as_millis() as u64,
        "transcode finished"
    );

    Ok(TranscodeReport {
        output: config.output.clone(),
        track,
        decoder_color_format,
        decode,
        encode,
        elapsed,
    })
}

/**
    Resolve the encoder format and create the encoder and muxer.

    If the muxer cannot be created the encoder is stopped again.
*/
fn create_encode_side<B: MediaBackend>(
    backend: &B,
    config: &TranscodeConfig,
    track: &TrackFormat,
) -> Result<(EncoderFormat, B::Encoder, B::Muxer)> {
    let format = config
        .encoder
        .resolve(track.width, track.height, config.target_fps)?;
    debug!(?format, "encoder format");

    let mut encoder = backend.create_encoder(&format)?;
    match backend.create_muxer(&config.output) {
        Ok(muxer) => Ok((format, encoder, muxer)),
        Err(e) => {
            log_stop_failure("encoder", encoder.stop());
            Err(e)
        }
    }
}

fn log_stop_failure(device: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(device, error = %e, "failed to stop device after setup error");
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::testing::{MemoryBackend, MemoryDecoder, init_test_tracing};

    fn config() -> TranscodeConfig {
        TranscodeConfig::new("/videos/slowmo_240fps.mp4")
            .with_poll_timeout(Duration::from_millis(1))
    }

    #[test]
    fn two_samples_at_ten_fps_become_thirty_fps() {
        init_test_tracing();
        let backend = MemoryBackend::new(4, 4, 2, 10);

        let report = transcode(&backend, &config().with_target_fps(30)).unwrap();
        assert_eq!(report.decode.samples_fed, 2);
        assert_eq!(report.decode.frames_staged, 2);
        assert_eq!(report.encode.packets_written, 2);
        assert_eq!(report.output, PathBuf::from("/videos/output.mp4"));

        let muxer = backend.muxer_log.lock();
        assert_eq!(muxer.pts(), vec![132, 132 + 33_333]);
        assert_eq!(muxer.tracks.len(), 1);
        assert_eq!(muxer.path.as_deref(), Some(Path::new("/videos/output.mp4")));
        assert!(muxer.started && muxer.stopped);

        assert!(backend.decoder_log.lock().stopped);
        assert!(backend.encoder_log.lock().stopped);
    }

    #[test]
    fn written_timestamps_strictly_increase() {
        init_test_tracing();
        let backend = MemoryBackend::new(8, 6, 24, 240)
            .with_row_padding(8)
            .with_encoder_lag(2);

        let report = transcode(&backend, &config()).unwrap();
        assert_eq!(report.encode.packets_written, 24);

        let pts = backend.muxer_log.lock().pts();
        assert_eq!(pts.len(), 24);
        assert!(pts.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(pts[23], 132 + 23 * 33_333);
    }

    #[test]
    fn malformed_frame_is_skipped() {
        init_test_tracing();
        let backend = MemoryBackend::new(4, 4, 3, 240).with_short_frames(vec![1]);

        let report = transcode(&backend, &config()).unwrap();
        assert_eq!(report.decode.frames_skipped, 1);
        assert_eq!(report.decode.frames_staged, 2);
        assert_eq!(backend.muxer_log.lock().pts(), vec![132, 33_465]);
    }

    #[test]
    fn open_failure_aborts_before_devices_are_created() {
        let backend = MemoryBackend::new(4, 4, 2, 240).failing_open();

        let err = transcode(&backend, &config()).unwrap_err();
        assert!(matches!(err, Error::SourceIo { .. }));
        let muxer = backend.muxer_log.lock();
        assert!(muxer.path.is_none());
        assert!(!muxer.started);
    }

    #[test]
    fn muxer_failure_stops_created_devices() {
        let backend = MemoryBackend::new(4, 4, 2, 240).with_failing_muxer();

        let err = transcode(&backend, &config()).unwrap_err();
        assert!(matches!(err, Error::Muxer { .. }), "{err}");
        assert!(backend.decoder_log.lock().stopped);
        assert!(backend.encoder_log.lock().stopped);
        assert!(backend.muxer_log.lock().path.is_none());
    }

    #[test]
    fn encoder_format_failure_stops_decoder() {
        let backend = MemoryBackend::new(4, 4, 2, 240);
        let mut config = config();
        config.encoder.color_format = ColorFormat::Yuv420Flexible;

        let err = transcode(&backend, &config).unwrap_err();
        assert!(matches!(err, Error::DeviceConfig { .. }), "{err}");
        assert!(backend.decoder_log.lock().stopped);
        assert!(!backend.encoder_log.lock().stopped);
    }

    #[test]
    fn encode_panic_with_bounded_queue_is_reported() {
        init_test_tracing();
        let backend = MemoryBackend::new(4, 4, 20, 240).with_panicking_muxer();

        let err = transcode(&backend, &config().with_queue_capacity(1)).unwrap_err();
        assert!(matches!(err, Error::Worker { .. }), "{err}");
        assert!(backend.decoder_log.lock().stopped);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let backend = MemoryBackend::new(4, 4, 2, 240);
        let err = transcode(&backend, &config().with_target_fps(0)).unwrap_err();
        assert!(matches!(err, Error::DeviceConfig { .. }));
    }

    #[test]
    fn negotiation_falls_back_to_device_default() {
        let backend = MemoryBackend::new(4, 4, 2, 240)
            .with_supported_formats(vec![ColorFormat::Yuv420SemiPlanar]);

        let report = transcode(&backend, &config()).unwrap();
        assert_eq!(report.decoder_color_format, None);
        assert_eq!(backend.decoder_log.lock().color_format, None);
        assert_eq!(report.encode.packets_written, 2);
    }

    #[test]
    fn flexible_format_is_requested_when_offered() {
        let backend = MemoryBackend::new(4, 4, 1, 240);

        let report = transcode(&backend, &config()).unwrap();
        assert_eq!(
            report.decoder_color_format,
            Some(ColorFormat::Yuv420Flexible)
        );
    }

    #[test]
    fn no_format_change_leaves_muxer_untouched() {
        let backend = MemoryBackend::new(4, 4, 3, 240).without_format_change();

        let report = transcode(&backend, &config()).unwrap();
        assert_eq!(report.encode.packets_written, 0);
        assert_eq!(report.encode.packets_dropped, 3);
        let muxer = backend.muxer_log.lock();
        assert!(!muxer.started);
        assert!(!muxer.stopped);
    }

    #[test]
    fn bounded_queue_delivers_every_frame() {
        let backend = MemoryBackend::new(4, 4, 40, 240);

        let report = transcode(&backend, &config().with_queue_capacity(1)).unwrap();
        assert_eq!(report.decode.frames_staged, 40);
        assert_eq!(report.encode.frames_submitted, 40);
        assert_eq!(backend.muxer_log.lock().samples.len(), 40);
    }

    #[test]
    fn encoder_failure_is_reported_over_queue_closed() {
        init_test_tracing();
        let backend = MemoryBackend::new(4, 4, 50, 240).with_encoder_failing_after(3);

        let err = transcode(&backend, &config().with_queue_capacity(1)).unwrap_err();
        assert!(matches!(err, Error::Device { .. }), "{err}");
        assert!(backend.decoder_log.lock().stopped);
        assert!(backend.encoder_log.lock().stopped);
    }

    #[test]
    fn planar_encoder_receives_i420() {
        let backend = MemoryBackend::new(4, 4, 1, 240);
        let mut config = config();
        config.encoder.color_format = ColorFormat::Yuv420Planar;

        transcode(&backend, &config).unwrap();

        let encoder = backend.encoder_log.lock();
        let nv21 = MemoryDecoder::expected_nv21(0, 4, 4);
        let (_, data) = &encoder.inputs[0];
        assert_eq!(&data[..16], &nv21[..16]);
        // U block, then V block
        assert_eq!(&data[16..20], &[nv21[17], nv21[19], nv21[21], nv21[23]]);
        assert_eq!(&data[20..], &[nv21[16], nv21[18], nv21[20], nv21[22]]);
    }
}
