use std::path::Path;

use ffmpeg_next::{
    Packet, codec,
    format::{self, context::Input},
    media,
    util::error::Error as AvError,
};
use tracing::debug;

use slowmo_pipeline::SampleSource;
use slowmo_types::{Error, MICROSECONDS, Result, Sample, TrackFormat, rescale};

use crate::convert::{codec_from_ffmpeg, rational_from_ffmpeg};

/**
    Demuxes the best video stream of a media file.

    Packets from every other stream are read and discarded.
*/
pub struct FfmpegSource {
    input: Input,
    stream_index: usize,
    parameters: codec::Parameters,
    track: TrackFormat,
    last_pts_us: i64,
}

impl FfmpegSource {
    /**
        Open `path` and select its best video stream.

        # Errors

        - [`Error::SourceIo`] if the file cannot be opened or probed.
        - [`Error::UnsupportedFormat`] if there is no video stream, or its
          codec is not one we handle.
    */
    pub fn open(path: &Path) -> Result<Self> {
        let input = format::input(&path)
            .map_err(|e| Error::source_io(format!("{}: {e}", path.display())))?;

        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| Error::unsupported_format("no video track in input"))?;
        let stream_index = stream.index();
        let parameters = stream.parameters();

        let codec = codec_from_ffmpeg(parameters.id()).ok_or_else(|| {
            Error::unsupported_format(format!("unsupported video codec {:?}", parameters.id()))
        })?;
        let time_base = rational_from_ffmpeg(stream.time_base())
            .ok_or_else(|| Error::unsupported_format("video stream has no time base"))?;
        let frame_rate = rational_from_ffmpeg(stream.avg_frame_rate()).filter(|r| r.is_positive());

        let video = codec::context::Context::from_parameters(parameters.clone())
            .and_then(|context| context.decoder().video())
            .map_err(|e| Error::source_io(format!("failed to read video parameters: {e}")))?;

        let track = TrackFormat {
            codec,
            width: video.width(),
            height: video.height(),
            frame_rate,
            time_base,
        };
        debug!(stream = stream_index, ?track, "selected video stream");

        Ok(Self {
            input,
            stream_index,
            parameters,
            track,
            last_pts_us: 0,
        })
    }

    pub(crate) fn parameters(&self) -> &codec::Parameters {
        &self.parameters
    }

    fn timestamp_us(&self, packet: &Packet) -> i64 {
        packet
            .pts()
            .or(packet.dts())
            .map(|ts| rescale(ts, self.track.time_base, MICROSECONDS))
            .unwrap_or(self.last_pts_us)
    }
}

impl SampleSource for FfmpegSource {
    fn track_format(&self) -> &TrackFormat {
        &self.track
    }

    fn read_sample(&mut self) -> Result<Option<Sample>> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(AvError::Eof) => return Ok(None),
                Err(e) => return Err(Error::source_io(format!("failed to read packet: {e}"))),
            }
            if packet.stream() != self.stream_index {
                continue;
            }

            let pts_us = self.timestamp_us(&packet);
            self.last_pts_us = pts_us;
            let data = packet.data().map(<[u8]>::to_vec).unwrap_or_default();
            return Ok(Some(Sample::new(data, pts_us, packet.is_key())));
        }
    }
}

