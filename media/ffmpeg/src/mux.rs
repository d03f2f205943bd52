use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Packet,
    codec::{self, packet},
    ffi,
    format::{self, context::Output},
};
use tracing::{debug, info};

use slowmo_pipeline::Muxer;
use slowmo_types::{BufferInfo, Error, MICROSECONDS, OutputFormat, Result, TrackIndex};

use crate::convert::{codec_to_ffmpeg, rational_from_ffmpeg, rational_to_ffmpeg};

const CONTAINER: &str = "mp4";

/**
    Writes encoded video tracks to an MP4 file.

    The file is created when the muxer is, the header is written on
    [`Muxer::start`] and the index on [`Muxer::stop`]. Without `stop` the
    file is not playable.
*/
pub struct FfmpegMuxer {
    output: Output,
    path: PathBuf,
    time_bases: Vec<ffmpeg_next::Rational>,
    started: bool,
    stopped: bool,
    written: u64,
}

impl FfmpegMuxer {
    /**
        Create the output file at `path`.
    */
    pub fn create(path: &Path) -> Result<Self> {
        let output = format::output_as(&path, CONTAINER)
            .map_err(|e| Error::muxer(format!("failed to create {}: {e}", path.display())))?;
        debug!(path = %path.display(), "muxer created");
        Ok(Self {
            output,
            path: path.to_path_buf(),
            time_bases: Vec::new(),
            started: false,
            stopped: false,
            written: 0,
        })
    }
}

impl Muxer for FfmpegMuxer {
    fn add_track(&mut self, format: &OutputFormat) -> Result<TrackIndex> {
        if self.started {
            return Err(Error::muxer("tracks must be added before starting"));
        }
        if !format.codec.fits_mp4() {
            return Err(Error::muxer(format!(
                "{} cannot be stored in {CONTAINER}",
                format.codec.mime()
            )));
        }

        let mut stream = self
            .output
            .add_stream(codec::encoder::find(codec_to_ffmpeg(format.codec)))
            .map_err(|e| Error::muxer(format!("failed to add track: {e}")))?;
        stream.set_time_base(rational_to_ffmpeg(MICROSECONDS));

        // SAFETY: codecpar is owned by the stream, extradata is allocated
        // with av_mallocz including the padding libavformat expects.
        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*par).codec_id = codec_to_ffmpeg(format.codec).into();
            (*par).codec_tag = 0;
            (*par).width = format.width as i32;
            (*par).height = format.height as i32;
            if !format.codec_config.is_empty() {
                let len = format.codec_config.len();
                let data = ffi::av_mallocz(len + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize)
                    .cast::<u8>();
                if data.is_null() {
                    return Err(Error::muxer("failed to allocate codec configuration"));
                }
                std::ptr::copy_nonoverlapping(format.codec_config.as_ptr(), data, len);
                (*par).extradata = data;
                (*par).extradata_size = len as i32;
            }
        }

        let index = stream.index();
        debug!(
            track = index,
            codec = format.codec.mime(),
            width = format.width,
            height = format.height,
            "track added"
        );
        Ok(TrackIndex(index))
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::muxer("muxer already started"));
        }
        if self.output.nb_streams() == 0 {
            return Err(Error::muxer("no tracks added"));
        }
        self.output
            .write_header()
            .map_err(|e| Error::muxer(format!("failed to write header: {e}")))?;

        // the container picks its own time bases while writing the header
        self.time_bases = self.output.streams().map(|s| s.time_base()).collect();
        debug!(
            time_bases = ?self
                .time_bases
                .iter()
                .map(|tb| rational_from_ffmpeg(*tb))
                .collect::<Vec<_>>(),
            "muxer started"
        );
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<()> {
        if !self.started || self.stopped {
            return Err(Error::muxer("muxer is not running"));
        }
        let time_base = *self
            .time_bases
            .get(track.0)
            .ok_or_else(|| Error::muxer(format!("unknown track {}", track.0)))?;

        let mut packet = Packet::copy(data);
        packet.set_stream(track.0);
        packet.set_pts(Some(info.pts_us));
        packet.set_dts(Some(info.pts_us));
        if info.is_key_frame() {
            packet.set_flags(packet::Flags::KEY);
        }
        packet.rescale_ts(rational_to_ffmpeg(MICROSECONDS), time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| Error::muxer(format!("failed to write sample: {e}")))?;
        self.written += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Err(Error::muxer("muxer was never started"));
        }
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.output
            .write_trailer()
            .map_err(|e| Error::muxer(format!("failed to finish container: {e}")))?;
        info!(path = %self.path.display(), samples = self.written, "container written");
        Ok(())
    }
}
