/*!
    Encode driver, the consumer side of the pipeline.
*/

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use slowmo_convert::convert_frame;
use slowmo_types::{
    BufferFlags, BufferInfo, ColorLayout, Error, PtsGenerator, Result, TrackIndex,
};

use crate::device::{EncodeDevice, EncoderOutput, InputSlot, Muxer, OutputSlot};
use crate::queue::FrameQueue;

/// Name of the thread [`EncodeDriver::spawn`] runs on.
pub const ENCODE_THREAD_NAME: &str = "slowmo-encode";

/// Consecutive empty polls tolerated while draining the encoder.
const MAX_IDLE_DRAIN_POLLS: u32 = 500;

/**
    Parameters for an [`EncodeDriver`].
*/
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeParams {
    /// Frame rate used for the synthetic timestamps.
    pub target_fps: u32,
    /// Timestamp of the first submitted frame, in microseconds.
    pub initial_pts_us: i64,
    pub poll_timeout: Duration,
    /// Layout the encoder expects its input in.
    pub input_layout: ColorLayout,
}

/**
    Counters reported by [`EncodeDriver::run`].
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Frames submitted to the encoder.
    pub frames_submitted: u64,
    /// Frames popped from the queue that could not be converted.
    pub frames_skipped: u64,
    /// Packets written to the muxer.
    pub packets_written: u64,
    /// Packets dropped, either before a track existed or for a
    /// non-increasing timestamp.
    pub packets_dropped: u64,
    /// Timestamp of the last packet written.
    pub last_pts_us: Option<i64>,
}

/// Closes the queue when dropped, including while unwinding from a panic.
struct CloseOnDrop(Arc<FrameQueue>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// What one output poll produced.
enum Polled {
    Idle,
    Progress,
    EndOfStream,
}

/**
    Pops staged frames, encodes them at a constant rate and writes the
    packets through a [`Muxer`].

    Source timestamps are discarded: frames are stamped
    `initial_pts_us + n * 1_000_000 / target_fps` in submission order.
    The muxer track is created when the encoder signals its output format,
    and the muxer is only stopped if it was started.
*/
pub struct EncodeDriver<E, M> {
    encoder: E,
    muxer: M,
    queue: Arc<FrameQueue>,
    params: EncodeParams,
    pts: PtsGenerator,
    track: Option<TrackIndex>,
    muxer_started: bool,
    stats: EncodeStats,
}

impl<E, M> EncodeDriver<E, M>
where
    E: EncodeDevice,
    M: Muxer,
{
    /**
        Create a driver consuming `queue`.

        # Panics

        Panics if `params.target_fps` is zero.
    */
    pub fn new(encoder: E, muxer: M, queue: Arc<FrameQueue>, params: EncodeParams) -> Self {
        let pts = PtsGenerator::new(params.initial_pts_us, params.target_fps);
        Self {
            encoder,
            muxer,
            queue,
            params,
            pts,
            track: None,
            muxer_started: false,
            stats: EncodeStats::default(),
        }
    }

    /**
        Run the driver on its own thread, named [`ENCODE_THREAD_NAME`].
    */
    pub fn spawn(self) -> Result<JoinHandle<Result<EncodeStats>>>
    where
        E: Send + 'static,
        M: Send + 'static,
    {
        thread::Builder::new()
            .name(ENCODE_THREAD_NAME.to_string())
            .spawn(move || self.run())
            .map_err(|e| Error::worker(format!("failed to spawn encode thread: {e}")))
    }

    /**
        Run until the queue is drained and the encoder has flushed.

        The queue is closed when this returns or panics, so a producer
        blocked on a full queue is released even if encoding failed.
    */
    pub fn run(mut self) -> Result<EncodeStats> {
        let _close = CloseOnDrop(Arc::clone(&self.queue));
        info!(
            fps = self.params.target_fps,
            initial_pts_us = self.params.initial_pts_us,
            layout = self.params.input_layout.name(),
            "encode started"
        );

        let result = self
            .encode_loop()
            .and_then(|pending| self.drain(pending));
        self.queue.close();
        let finished = self.finish();

        match (result, finished) {
            (Ok(()), Ok(())) => {
                info!(
                    frames = self.stats.frames_submitted,
                    packets = self.stats.packets_written,
                    dropped = self.stats.packets_dropped,
                    "encode finished"
                );
                Ok(self.stats)
            }
            (Ok(()), Err(e)) => Err(e),
            (Err(e), finished) => {
                if let Err(finish_err) = finished {
                    warn!(error = %finish_err, "failed to release encoder after error");
                }
                Err(e)
            }
        }
    }

    /**
        Feed frames until the queue is drained.

        Returns the input slot that was granted when the queue ran dry, if
        any, so it can carry the end-of-stream signal.
    */
    fn encode_loop(&mut self) -> Result<Option<InputSlot>> {
        loop {
            if self.queue.is_drained() {
                return Ok(None);
            }
            if let Some(slot) = self.encoder.dequeue_input_slot(self.params.poll_timeout)? {
                if let Some(slot) = self.submit_next(slot)? {
                    return Ok(Some(slot));
                }
            }
            self.poll_output()?;
        }
    }

    /**
        Submit the next frame from the queue into `slot`, blocking until
        one is available. Hands the slot back if the queue is drained.
    */
    fn submit_next(&mut self, slot: InputSlot) -> Result<Option<InputSlot>> {
        loop {
            let Some(frame) = self.queue.pop() else {
                return Ok(Some(slot));
            };
            match convert_frame(&frame, self.params.input_layout) {
                Ok(converted) => {
                    let pts_us = self.pts.next();
                    self.encoder.submit_input(
                        slot,
                        converted.data(),
                        pts_us,
                        BufferFlags::empty(),
                    )?;
                    self.stats.frames_submitted += 1;
                    debug!(pts_us, queued = self.queue.len(), "frame submitted");
                    return Ok(None);
                }
                Err(e) if e.is_frame_local() => {
                    self.stats.frames_skipped += 1;
                    warn!(error = %e, "skipping frame");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /**
        Signal end of stream and collect everything the encoder still holds.
    */
    fn drain(&mut self, pending: Option<InputSlot>) -> Result<()> {
        let mut slot = pending;
        let mut idle = 0;
        while slot.is_none() {
            slot = self.encoder.dequeue_input_slot(self.params.poll_timeout)?;
            if slot.is_none() {
                match self.poll_output()? {
                    Polled::EndOfStream => return Ok(()),
                    Polled::Progress => idle = 0,
                    Polled::Idle => idle += 1,
                }
                if idle >= MAX_IDLE_DRAIN_POLLS {
                    return Err(Error::device(
                        "encoder never freed an input slot for end of stream",
                    ));
                }
            }
        }
        if let Some(slot) = slot {
            self.encoder
                .submit_input(slot, &[], self.pts.peek(), BufferFlags::END_OF_STREAM)?;
            debug!("end of stream submitted to encoder");
        }

        idle = 0;
        loop {
            match self.poll_output()? {
                Polled::EndOfStream => return Ok(()),
                Polled::Progress => idle = 0,
                Polled::Idle => idle += 1,
            }
            if idle >= MAX_IDLE_DRAIN_POLLS {
                warn!("encoder did not report end of stream, trailing packets may be lost");
                return Ok(());
            }
        }
    }

    fn poll_output(&mut self) -> Result<Polled> {
        match self.encoder.dequeue_output(self.params.poll_timeout)? {
            EncoderOutput::TryAgain => Ok(Polled::Idle),
            EncoderOutput::FormatChanged => {
                self.on_format_changed()?;
                Ok(Polled::Progress)
            }
            EncoderOutput::Buffer(slot, info) => {
                let written = self.write_packet(&slot, &info);
                self.encoder.release_output(slot)?;
                written?;
                if info.is_end_of_stream() {
                    Ok(Polled::EndOfStream)
                } else {
                    Ok(Polled::Progress)
                }
            }
        }
    }

    fn on_format_changed(&mut self) -> Result<()> {
        if self.track.is_some() {
            warn!("encoder changed its output format again, keeping the existing track");
            return Ok(());
        }

        let format = self.encoder.output_format()?;
        let track = self.muxer.add_track(&format)?;
        self.track = Some(track);
        self.muxer.start()?;
        self.muxer_started = true;
        info!(
            track = track.0,
            codec = format.codec.mime(),
            width = format.width,
            height = format.height,
            "muxer started"
        );
        Ok(())
    }

    fn write_packet(&mut self, slot: &OutputSlot, info: &BufferInfo) -> Result<()> {
        if info.size == 0 {
            return Ok(());
        }
        if info.is_codec_config() {
            // Carried by the track format instead
            debug!(size = info.size, "codec config packet not written as a sample");
            return Ok(());
        }
        let Some(track) = self.track else {
            self.stats.packets_dropped += 1;
            warn!(pts_us = info.pts_us, "packet before output format, dropping");
            return Ok(());
        };
        if self.stats.last_pts_us.is_some_and(|last| info.pts_us <= last) {
            self.stats.packets_dropped += 1;
            warn!(
                pts_us = info.pts_us,
                last_pts_us = ?self.stats.last_pts_us,
                "non-increasing timestamp, dropping packet"
            );
            return Ok(());
        }

        let data = self.encoder.output_data(slot)?;
        let payload = info.payload(data).ok_or_else(|| {
            Error::device(format!(
                "output buffer of {} bytes cannot hold {} bytes at offset {}",
                data.len(),
                info.size,
                info.offset
            ))
        })?;
        self.muxer.write_sample(track, payload, info)?;

        self.stats.packets_written += 1;
        self.stats.last_pts_us = Some(info.pts_us);
        debug!(
            pts_us = info.pts_us,
            size = info.size,
            key = info.is_key_frame(),
            "packet written"
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let encoder = self.encoder.stop();
        let muxer = if self.muxer_started {
            self.muxer.stop()
        } else {
            warn!("encoder never reported an output format, muxer was not started");
            Ok(())
        };
        encoder.and(muxer)
    }
}

#[cfg(test)]
mod tests {
    use slowmo_types::FrameBuffer;

    use super::*;
    use crate::testing::{MemoryBackend, MemoryEncoder, MemoryMuxer};

    fn params() -> EncodeParams {
        EncodeParams {
            target_fps: 30,
            initial_pts_us: 132,
            poll_timeout: Duration::from_millis(1),
            input_layout: ColorLayout::Nv12,
        }
    }

    fn filled_queue(count: u8) -> Arc<FrameQueue> {
        let queue = Arc::new(FrameQueue::new(4, 4));
        for tag in 0..count {
            let mut data = vec![tag; 16];
            data.extend_from_slice(&[0xB0, 0xA0, 0xB1, 0xA1, 0xB2, 0xA2, 0xB3, 0xA3]);
            queue
                .push(FrameBuffer::new(data, 4, 4, ColorLayout::Nv21).unwrap())
                .unwrap();
        }
        queue.close();
        queue
    }

    fn driver(
        backend: &MemoryBackend,
        queue: &Arc<FrameQueue>,
    ) -> EncodeDriver<MemoryEncoder, MemoryMuxer> {
        EncodeDriver::new(
            backend.encoder(4, 4, ColorLayout::Nv12),
            backend.muxer(),
            Arc::clone(queue),
            params(),
        )
    }

    #[test]
    fn stamps_constant_rate_timestamps() {
        let backend = MemoryBackend::new(4, 4, 0, 240);
        let queue = filled_queue(3);

        let stats = driver(&backend, &queue).run().unwrap();
        assert_eq!(stats.frames_submitted, 3);
        assert_eq!(stats.packets_written, 3);
        assert_eq!(stats.last_pts_us, Some(132 + 2 * 33_333));

        let encoder = backend.encoder_log.lock();
        let pts: Vec<i64> = encoder.inputs.iter().map(|(pts, _)| *pts).collect();
        assert_eq!(pts, vec![132, 33_465, 66_798]);
        assert!(encoder.end_of_stream);
        assert!(encoder.stopped);

        let muxer = backend.muxer_log.lock();
        assert_eq!(muxer.tracks.len(), 1);
        assert!(muxer.started && muxer.stopped);
        assert_eq!(muxer.samples.len(), 3);
    }

    #[test]
    fn frames_are_converted_to_encoder_layout() {
        let backend = MemoryBackend::new(4, 4, 0, 240);
        let queue = filled_queue(1);

        driver(&backend, &queue).run().unwrap();

        let encoder = backend.encoder_log.lock();
        let (_, data) = &encoder.inputs[0];
        assert_eq!(&data[..16], &[0u8; 16]);
        assert_eq!(&data[16..], &[0xA0, 0xB0, 0xA1, 0xB1, 0xA2, 0xB2, 0xA3, 0xB3]);
    }

    #[test]
    fn drain_collects_frames_held_by_the_encoder() {
        let backend = MemoryBackend::new(4, 4, 0, 240).with_encoder_lag(3);
        let queue = filled_queue(5);

        let stats = driver(&backend, &queue).run().unwrap();
        assert_eq!(stats.packets_written, 5);
        assert_eq!(backend.muxer_log.lock().samples.len(), 5);
    }

    #[test]
    fn codec_config_is_not_written_as_sample() {
        let backend = MemoryBackend::new(4, 4, 0, 240).with_codec_config_packet();
        let queue = filled_queue(2);

        let stats = driver(&backend, &queue).run().unwrap();
        assert_eq!(stats.packets_written, 2);
        let muxer = backend.muxer_log.lock();
        assert!(muxer.samples.iter().all(|(_, info)| !info.is_codec_config()));
    }

    #[test]
    fn muxer_not_stopped_without_format_change() {
        let backend = MemoryBackend::new(4, 4, 0, 240).without_format_change();
        let queue = filled_queue(2);

        let stats = driver(&backend, &queue).run().unwrap();
        assert_eq!(stats.packets_written, 0);
        assert_eq!(stats.packets_dropped, 2);

        let muxer = backend.muxer_log.lock();
        assert!(muxer.tracks.is_empty());
        assert!(!muxer.started);
        assert!(!muxer.stopped);
        assert!(backend.encoder_log.lock().stopped);
    }

    #[test]
    fn runs_on_named_thread() {
        let backend = MemoryBackend::new(4, 4, 0, 240);
        let queue = filled_queue(1);

        let handle = driver(&backend, &queue).spawn().unwrap();
        assert_eq!(handle.thread().name(), Some(ENCODE_THREAD_NAME));
        handle.join().unwrap().unwrap();
        assert_eq!(
            backend.encoder_log.lock().thread_name.as_deref(),
            Some(ENCODE_THREAD_NAME)
        );
    }

    #[test]
    fn muxer_panic_releases_blocked_producer() {
        let backend = MemoryBackend::new(4, 4, 0, 240).with_panicking_muxer();
        let queue = Arc::new(FrameQueue::bounded(4, 4, 1));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for _ in 0..10 {
                    queue.push(FrameBuffer::zeroed(4, 4, ColorLayout::Nv21))?;
                }
                Ok::<_, Error>(())
            })
        };

        let handle = driver(&backend, &queue).spawn().unwrap();
        assert!(handle.join().is_err());
        assert!(queue.is_closed());

        let pushed = producer.join().unwrap();
        assert!(matches!(pushed, Err(Error::QueueClosed)));
    }

    #[test]
    fn encoder_failure_closes_queue() {
        let backend = MemoryBackend::new(4, 4, 0, 240);
        let queue = Arc::new(FrameQueue::new(4, 4));
        queue
            .push(FrameBuffer::zeroed(4, 4, ColorLayout::Nv21))
            .unwrap();
        assert!(!queue.is_closed());

        // The encoder expects 8x8 input, so the first submit fails
        let driver = EncodeDriver::new(
            backend.encoder(8, 8, ColorLayout::Nv12),
            backend.muxer(),
            Arc::clone(&queue),
            params(),
        );
        let err = driver.run().unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
        assert!(queue.is_closed());
        assert!(backend.encoder_log.lock().stopped);
    }
}
