/*!
    Decode driver, the producer side of the pipeline.
*/

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use slowmo_convert::extract;
use slowmo_types::{BufferFlags, BufferInfo, ColorLayout, Result};

use crate::device::{DecodeDevice, OutputSlot, SampleSource};
use crate::queue::FrameQueue;

/**
    Counters reported by [`DecodeDriver::run`].
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Compressed samples submitted to the decoder.
    pub samples_fed: u64,
    /// Decoded frames pushed to the queue.
    pub frames_staged: u64,
    /// Decoded frames that could not be extracted and were dropped.
    pub frames_skipped: u64,
}

/**
    Feeds a decode device from a source and stages every decoded picture
    in a [`FrameQueue`].

    The driver never closes the queue, that is left to whoever owns the
    encode side, after `run` has returned.
*/
pub struct DecodeDriver<S, D> {
    source: S,
    decoder: D,
    queue: Arc<FrameQueue>,
    layout: ColorLayout,
    poll_timeout: Duration,
    stats: DecodeStats,
}

impl<S, D> DecodeDriver<S, D>
where
    S: SampleSource,
    D: DecodeDevice,
{
    /**
        Create a driver staging frames in `layout`.
    */
    pub fn new(
        source: S,
        decoder: D,
        queue: Arc<FrameQueue>,
        layout: ColorLayout,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            decoder,
            queue,
            layout,
            poll_timeout,
            stats: DecodeStats::default(),
        }
    }

    /**
        Run until the decoder reports end of stream on an output.

        The decoder is stopped on every exit path. Frames that fail
        extraction are logged and skipped, any other error ends the run.
    */
    pub fn run(mut self) -> Result<DecodeStats> {
        let track = self.source.track_format();
        info!(
            codec = track.codec.mime(),
            width = track.width,
            height = track.height,
            layout = self.layout.name(),
            "decode started"
        );

        let result = self.decode_loop();
        let stopped = self.decoder.stop();

        match (result, stopped) {
            (Ok(()), Ok(())) => {
                info!(
                    samples = self.stats.samples_fed,
                    staged = self.stats.frames_staged,
                    skipped = self.stats.frames_skipped,
                    "decode finished"
                );
                Ok(self.stats)
            }
            (Ok(()), Err(e)) => Err(e),
            (Err(e), stopped) => {
                if let Err(stop_err) = stopped {
                    warn!(error = %stop_err, "failed to stop decoder after error");
                }
                Err(e)
            }
        }
    }

    fn decode_loop(&mut self) -> Result<()> {
        let mut input_eos = false;
        let mut output_eos = false;
        let mut last_pts_us = 0;

        while !output_eos {
            if !input_eos {
                if let Some(slot) = self.decoder.dequeue_input_slot(self.poll_timeout)? {
                    match self.source.read_sample()? {
                        Some(sample) => {
                            last_pts_us = sample.pts_us;
                            self.decoder.submit_input(
                                slot,
                                &sample.data,
                                sample.pts_us,
                                sample.flags(),
                            )?;
                            self.stats.samples_fed += 1;
                        }
                        None => {
                            self.decoder.submit_input(
                                slot,
                                &[],
                                last_pts_us,
                                BufferFlags::END_OF_STREAM,
                            )?;
                            input_eos = true;
                            debug!(samples = self.stats.samples_fed, "source exhausted");
                        }
                    }
                }
            }

            if let Some((slot, info)) = self.decoder.dequeue_output_slot(self.poll_timeout)? {
                if info.is_end_of_stream() {
                    output_eos = true;
                }
                self.handle_output(slot, &info)?;
            }
        }
        Ok(())
    }

    fn handle_output(&mut self, slot: OutputSlot, info: &BufferInfo) -> Result<()> {
        let staged = if info.size > 0 {
            self.stage(&slot).map(Some)
        } else {
            Ok(None)
        };
        self.decoder.release_output(slot, false)?;

        match staged {
            Ok(Some(())) => {
                self.stats.frames_staged += 1;
                debug!(pts_us = info.pts_us, queued = self.queue.len(), "frame staged");
            }
            Ok(None) => {}
            Err(e) if e.is_frame_local() => {
                self.stats.frames_skipped += 1;
                warn!(pts_us = info.pts_us, error = %e, "skipping frame");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn stage(&mut self, slot: &OutputSlot) -> Result<()> {
        let frame = {
            let image = self.decoder.acquire_image(slot)?;
            extract(&image, self.layout)?
        };
        self.queue.push(frame)
    }
}

#[cfg(test)]
mod tests {
    use slowmo_types::{ColorLayout, Error};

    use super::*;
    use crate::testing::{MemoryBackend, MemoryDecoder, MemorySource};

    fn driver(
        backend: &MemoryBackend,
        queue: &Arc<FrameQueue>,
    ) -> DecodeDriver<MemorySource, MemoryDecoder> {
        DecodeDriver::new(
            backend.source(),
            backend.decoder(None),
            Arc::clone(queue),
            ColorLayout::Nv21,
            Duration::from_millis(1),
        )
    }

    #[test]
    fn stages_every_frame_as_nv21() {
        let backend = MemoryBackend::new(4, 4, 3, 240).with_row_padding(4);
        let queue = Arc::new(FrameQueue::new(4, 4));

        let stats = driver(&backend, &queue).run().unwrap();
        assert_eq!(
            stats,
            DecodeStats {
                samples_fed: 3,
                frames_staged: 3,
                frames_skipped: 0,
            }
        );

        for tag in 0..3u8 {
            let frame = queue.try_pop().unwrap();
            assert_eq!(frame.layout(), ColorLayout::Nv21);
            assert_eq!(frame.data(), MemoryDecoder::expected_nv21(tag, 4, 4).as_slice());
        }
        assert!(queue.is_empty());

        let log = backend.decoder_log.lock();
        assert_eq!(log.samples_submitted, 3);
        assert!(log.end_of_stream);
        // 3 pictures plus the bare end-of-stream output
        assert_eq!(log.outputs_released, 4);
        assert!(log.stopped);
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let backend = MemoryBackend::new(4, 4, 4, 240).with_short_frames(vec![2]);
        let queue = Arc::new(FrameQueue::new(4, 4));

        let stats = driver(&backend, &queue).run().unwrap();
        assert_eq!(stats.frames_staged, 3);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(queue.len(), 3);
        assert_eq!(backend.decoder_log.lock().outputs_released, 5);
    }

    #[test]
    fn closed_queue_stops_decoder() {
        let backend = MemoryBackend::new(4, 4, 2, 240);
        let queue = Arc::new(FrameQueue::new(4, 4));
        queue.close();

        let err = driver(&backend, &queue).run().unwrap_err();
        assert!(matches!(err, Error::QueueClosed));

        let log = backend.decoder_log.lock();
        assert!(log.stopped);
        assert_eq!(log.outputs_released, 1);
    }

    #[test]
    fn empty_source_only_signals_end_of_stream() {
        let backend = MemoryBackend::new(4, 4, 0, 240);
        let queue = Arc::new(FrameQueue::new(4, 4));

        let stats = driver(&backend, &queue).run().unwrap();
        assert_eq!(stats, DecodeStats::default());
        assert!(queue.is_empty());
        assert!(backend.decoder_log.lock().end_of_stream);
    }
}
