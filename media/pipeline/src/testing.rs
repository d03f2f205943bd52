/*!
    In-memory devices for exercising the pipeline without a codec library.

    [`MemoryBackend`] hands out a source of synthetic samples, a decoder
    producing padded pictures with interleaved chroma, an encoder that
    echoes timestamps back as packets, and a muxer that records what it
    was given. Each device reports into a shared log on the backend, so
    tests can inspect what happened after the devices were moved into
    the drivers.
*/

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use slowmo_types::{
    BufferFlags, BufferInfo, CodecId, ColorFormat, ColorLayout, CropRect, DecodedImage, Error,
    MICROSECONDS, OutputFormat, Plane, Rational, Result, Sample, TrackFormat, TrackIndex,
};

use crate::device::{
    DecodeDevice, EncodeDevice, EncoderFormat, EncoderOutput, InputSlot, MediaBackend, Muxer,
    OutputSlot, SampleSource,
};

/// Codec configuration bytes reported by [`MemoryEncoder`].
pub const MEMORY_CODEC_CONFIG: &[u8] = &[0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1E];

/// What the decoder was asked to do.
#[derive(Debug, Default)]
pub struct DecoderLog {
    /// Color format passed at creation.
    pub color_format: Option<ColorFormat>,
    pub samples_submitted: usize,
    pub end_of_stream: bool,
    pub outputs_released: usize,
    pub stopped: bool,
}

/// What the encoder was asked to do.
#[derive(Debug, Default)]
pub struct EncoderLog {
    /// Timestamp and bytes of every submitted frame.
    pub inputs: Vec<(i64, Vec<u8>)>,
    pub end_of_stream: bool,
    pub stopped: bool,
    /// Name of the thread frames were submitted from.
    pub thread_name: Option<String>,
}

/// What the muxer was asked to do.
#[derive(Debug, Default)]
pub struct MuxerLog {
    pub path: Option<PathBuf>,
    pub tracks: Vec<OutputFormat>,
    pub samples: Vec<(TrackIndex, BufferInfo)>,
    pub started: bool,
    pub stopped: bool,
}

impl MuxerLog {
    /// Timestamps of every written sample, in write order.
    pub fn pts(&self) -> Vec<i64> {
        self.samples.iter().map(|(_, info)| info.pts_us).collect()
    }
}

/**
    A source yielding synthetic samples. The first byte of each sample is
    its index, which the [`MemoryDecoder`] uses to paint the picture.
*/
#[derive(Debug)]
pub struct MemorySource {
    track: TrackFormat,
    samples: VecDeque<Sample>,
}

impl SampleSource for MemorySource {
    fn track_format(&self) -> &TrackFormat {
        &self.track
    }

    fn read_sample(&mut self) -> Result<Option<Sample>> {
        Ok(self.samples.pop_front())
    }
}

#[derive(Debug)]
struct Picture {
    slot: usize,
    luma: Vec<u8>,
    /// Interleaved U, V rows.
    chroma: Vec<u8>,
    info: BufferInfo,
}

/**
    A decoder that paints one picture per submitted sample.

    Pictures use rows padded by `row_padding` bytes and expose chroma as
    two planes with pixel stride 2 aliasing one interleaved buffer, the
    way hardware decoders commonly do. Dequeuing an output while another
    one is still held fails.
*/
#[derive(Debug)]
pub struct MemoryDecoder {
    width: u32,
    height: u32,
    row_padding: usize,
    short_frames: Vec<usize>,
    pending: VecDeque<Picture>,
    held: Option<Picture>,
    decoded: usize,
    input_eos: bool,
    output_eos: bool,
    log: Arc<Mutex<DecoderLog>>,
}

impl MemoryDecoder {
    fn luma_value(tag: u8, index: usize) -> u8 {
        tag.wrapping_mul(31).wrapping_add(index as u8)
    }

    fn u_value(tag: u8, index: usize) -> u8 {
        0x80u8.wrapping_add(tag).wrapping_add(index as u8)
    }

    fn v_value(tag: u8, index: usize) -> u8 {
        0x20u8.wrapping_add(tag).wrapping_add(index as u8)
    }

    /**
        The NV21 frame a picture painted for `tag` extracts to.
    */
    pub fn expected_nv21(tag: u8, width: u32, height: u32) -> Vec<u8> {
        let luma = width as usize * height as usize;
        let mut out: Vec<u8> = (0..luma).map(|i| Self::luma_value(tag, i)).collect();
        for i in 0..luma / 4 {
            out.push(Self::v_value(tag, i));
            out.push(Self::u_value(tag, i));
        }
        out
    }

    fn paint(&self, tag: u8, pts_us: i64) -> Picture {
        let (width, height) = (self.width as usize, self.height as usize);
        let stride = width + self.row_padding;

        let mut luma = vec![0xEE; stride * height];
        for y in 0..height {
            for x in 0..width {
                luma[y * stride + x] = Self::luma_value(tag, y * width + x);
            }
        }

        let (chroma_width, chroma_height) = (width / 2, height / 2);
        let mut chroma = vec![0xEE; stride * chroma_height];
        for y in 0..chroma_height {
            for x in 0..chroma_width {
                let index = y * chroma_width + x;
                chroma[y * stride + 2 * x] = Self::u_value(tag, index);
                chroma[y * stride + 2 * x + 1] = Self::v_value(tag, index);
            }
        }

        if self.short_frames.contains(&self.decoded) {
            luma.truncate(luma.len() / 2);
        }

        let size = luma.len() + chroma.len();
        Picture {
            slot: self.decoded % 4,
            luma,
            chroma,
            info: BufferInfo::new(size, pts_us, BufferFlags::empty()),
        }
    }
}

impl DecodeDevice for MemoryDecoder {
    fn dequeue_input_slot(&mut self, _timeout: Duration) -> Result<Option<InputSlot>> {
        if self.input_eos {
            return Ok(None);
        }
        Ok(Some(InputSlot::new(0)))
    }

    fn submit_input(
        &mut self,
        _slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        if flags.contains(BufferFlags::END_OF_STREAM) {
            self.input_eos = true;
            self.log.lock().end_of_stream = true;
            if data.is_empty() {
                return Ok(());
            }
        }
        let tag = data.first().copied().unwrap_or_default();
        let picture = self.paint(tag, pts_us);
        self.pending.push_back(picture);
        self.decoded += 1;
        self.log.lock().samples_submitted += 1;
        Ok(())
    }

    fn dequeue_output_slot(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<(OutputSlot, BufferInfo)>> {
        if let Some(held) = &self.held {
            return Err(Error::device(format!(
                "output slot {} was not released before the next dequeue",
                held.slot
            )));
        }
        let picture = match self.pending.pop_front() {
            Some(picture) => picture,
            None if self.input_eos && !self.output_eos => {
                self.output_eos = true;
                Picture {
                    slot: 0,
                    luma: Vec::new(),
                    chroma: Vec::new(),
                    info: BufferInfo::end_of_stream(0),
                }
            }
            None => return Ok(None),
        };
        let result = (OutputSlot::new(picture.slot), picture.info);
        self.held = Some(picture);
        Ok(Some(result))
    }

    fn acquire_image(&mut self, slot: &OutputSlot) -> Result<DecodedImage<'_>> {
        let stride = self.width as usize + self.row_padding;
        let crop = CropRect::full(self.width, self.height);
        match &self.held {
            Some(picture) if picture.slot == slot.index() => Ok(DecodedImage::new(
                vec![
                    Plane::new(&picture.luma, stride, 1),
                    Plane::new(&picture.chroma, stride, 2),
                    Plane::new(picture.chroma.get(1..).unwrap_or_default(), stride, 2),
                ],
                crop,
            )),
            _ => Err(Error::device(format!(
                "output slot {} is not held",
                slot.index()
            ))),
        }
    }

    fn release_output(&mut self, slot: OutputSlot, _render: bool) -> Result<()> {
        match self.held.take() {
            Some(picture) if picture.slot == slot.index() => {
                self.log.lock().outputs_released += 1;
                Ok(())
            }
            other => {
                self.held = other;
                Err(Error::device(format!(
                    "released output slot {} that is not held",
                    slot.index()
                )))
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.log.lock().stopped = true;
        Ok(())
    }
}

/**
    An encoder that turns each frame into a packet holding its timestamp.

    It announces its output format before the first packet, optionally
    emits a codec config packet, and holds back `lag` frames until it
    receives end of stream.
*/
#[derive(Debug)]
pub struct MemoryEncoder {
    width: u32,
    height: u32,
    layout: ColorLayout,
    lag: usize,
    announce_format: bool,
    codec_config_packet: bool,
    fail_after: Option<usize>,
    announced: bool,
    config_sent: bool,
    pending: VecDeque<i64>,
    held: Option<(Vec<u8>, BufferInfo)>,
    packets: usize,
    input_eos: bool,
    output_eos: bool,
    log: Arc<Mutex<EncoderLog>>,
}

impl EncodeDevice for MemoryEncoder {
    fn dequeue_input_slot(&mut self, _timeout: Duration) -> Result<Option<InputSlot>> {
        if self.input_eos {
            return Ok(None);
        }
        Ok(Some(InputSlot::new(0)))
    }

    fn submit_input(
        &mut self,
        _slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        if flags.contains(BufferFlags::END_OF_STREAM) && data.is_empty() {
            self.input_eos = true;
            self.log.lock().end_of_stream = true;
            return Ok(());
        }
        if self
            .fail_after
            .is_some_and(|limit| self.log.lock().inputs.len() >= limit)
        {
            return Err(Error::device("encoder rejected input"));
        }
        let expected = self.layout.frame_len(self.width, self.height);
        if data.len() != expected {
            return Err(Error::invalid_data(format!(
                "encoder expects {expected} bytes per frame, got {}",
                data.len()
            )));
        }
        self.pending.push_back(pts_us);

        let mut log = self.log.lock();
        log.inputs.push((pts_us, data.to_vec()));
        log.thread_name = thread::current().name().map(String::from);
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<EncoderOutput> {
        if self.held.is_some() {
            return Err(Error::device("output dequeued before the last one was released"));
        }
        if self.announce_format && !self.announced {
            self.announced = true;
            return Ok(EncoderOutput::FormatChanged);
        }

        let buffer = if self.codec_config_packet && !self.config_sent {
            self.config_sent = true;
            let info = BufferInfo::new(MEMORY_CODEC_CONFIG.len(), 0, BufferFlags::CODEC_CONFIG);
            (MEMORY_CODEC_CONFIG.to_vec(), info)
        } else if self.pending.len() > self.lag || (self.input_eos && !self.pending.is_empty()) {
            let Some(pts_us) = self.pending.pop_front() else {
                return Ok(EncoderOutput::TryAgain);
            };
            let flags = if self.packets == 0 {
                BufferFlags::KEY_FRAME
            } else {
                BufferFlags::empty()
            };
            self.packets += 1;
            let data = pts_us.to_le_bytes().to_vec();
            let info = BufferInfo::new(data.len(), pts_us, flags);
            (data, info)
        } else if self.input_eos && !self.output_eos {
            self.output_eos = true;
            (Vec::new(), BufferInfo::end_of_stream(0))
        } else {
            return Ok(EncoderOutput::TryAgain);
        };

        let slot = OutputSlot::new(self.packets % 2);
        let info = buffer.1;
        self.held = Some(buffer);
        Ok(EncoderOutput::Buffer(slot, info))
    }

    fn output_data(&self, _slot: &OutputSlot) -> Result<&[u8]> {
        self.held
            .as_ref()
            .map(|(data, _)| data.as_slice())
            .ok_or_else(|| Error::device("no output buffer is held"))
    }

    fn output_format(&self) -> Result<OutputFormat> {
        if !self.announced {
            return Err(Error::device("output format is not known yet"));
        }
        Ok(OutputFormat {
            codec: CodecId::H264,
            width: self.width,
            height: self.height,
            frame_rate: Rational::new(30, 1),
            codec_config: MEMORY_CODEC_CONFIG.to_vec(),
        })
    }

    fn release_output(&mut self, _slot: OutputSlot) -> Result<()> {
        self.held
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::device("released an output that is not held"))
    }

    fn stop(&mut self) -> Result<()> {
        self.log.lock().stopped = true;
        Ok(())
    }
}

/**
    A muxer that records tracks and samples and enforces call order and
    strictly increasing timestamps.
*/
#[derive(Debug)]
pub struct MemoryMuxer {
    panic_on_write: bool,
    log: Arc<Mutex<MuxerLog>>,
}

impl Muxer for MemoryMuxer {
    fn add_track(&mut self, format: &OutputFormat) -> Result<TrackIndex> {
        let mut log = self.log.lock();
        if log.started {
            return Err(Error::muxer("cannot add a track after start"));
        }
        log.tracks.push(format.clone());
        Ok(TrackIndex(log.tracks.len() - 1))
    }

    fn start(&mut self) -> Result<()> {
        let mut log = self.log.lock();
        if log.tracks.is_empty() {
            return Err(Error::muxer("cannot start without tracks"));
        }
        log.started = true;
        Ok(())
    }

    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<()> {
        if self.panic_on_write {
            panic!("muxer write at {} us", info.pts_us);
        }
        let mut log = self.log.lock();
        if !log.started {
            return Err(Error::muxer("write before start"));
        }
        if data.len() != info.size {
            return Err(Error::muxer(format!(
                "sample holds {} bytes, info says {}",
                data.len(),
                info.size
            )));
        }
        let last = log
            .samples
            .iter()
            .rev()
            .find(|(index, _)| *index == track)
            .map(|(_, info)| info.pts_us);
        if last.is_some_and(|last| info.pts_us <= last) {
            return Err(Error::muxer(format!(
                "timestamp {} does not increase on track {}",
                info.pts_us, track.0
            )));
        }
        log.samples.push((track, *info));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut log = self.log.lock();
        if !log.started {
            return Err(Error::muxer("stop before start"));
        }
        log.stopped = true;
        Ok(())
    }
}

/**
    Backend handing out the in-memory devices.
*/
#[derive(Debug)]
pub struct MemoryBackend {
    pub width: u32,
    pub height: u32,
    frame_count: usize,
    source_fps: u32,
    row_padding: usize,
    short_frames: Vec<usize>,
    supported_formats: Vec<ColorFormat>,
    fail_open: bool,
    encoder_lag: usize,
    announce_format: bool,
    codec_config_packet: bool,
    encoder_fail_after: Option<usize>,
    fail_create_muxer: bool,
    muxer_panics: bool,
    pub decoder_log: Arc<Mutex<DecoderLog>>,
    pub encoder_log: Arc<Mutex<EncoderLog>>,
    pub muxer_log: Arc<Mutex<MuxerLog>>,
}

impl MemoryBackend {
    /**
        A backend whose source holds `frame_count` samples of a
        `width` x `height` video recorded at `source_fps`.
    */
    pub fn new(width: u32, height: u32, frame_count: usize, source_fps: u32) -> Self {
        Self {
            width,
            height,
            frame_count,
            source_fps,
            row_padding: 0,
            short_frames: Vec::new(),
            supported_formats: vec![ColorFormat::Yuv420SemiPlanar, ColorFormat::Yuv420Flexible],
            fail_open: false,
            encoder_lag: 0,
            announce_format: true,
            codec_config_packet: false,
            encoder_fail_after: None,
            fail_create_muxer: false,
            muxer_panics: false,
            decoder_log: Arc::default(),
            encoder_log: Arc::default(),
            muxer_log: Arc::default(),
        }
    }

    /// Pad every decoded row with `padding` bytes.
    pub fn with_row_padding(mut self, padding: usize) -> Self {
        self.row_padding = padding;
        self
    }

    /// Truncate the luma plane of the decoded pictures at these indices.
    pub fn with_short_frames(mut self, indices: Vec<usize>) -> Self {
        self.short_frames = indices;
        self
    }

    pub fn with_supported_formats(mut self, formats: Vec<ColorFormat>) -> Self {
        self.supported_formats = formats;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Hold back `lag` frames inside the encoder until end of stream.
    pub fn with_encoder_lag(mut self, lag: usize) -> Self {
        self.encoder_lag = lag;
        self
    }

    pub fn with_codec_config_packet(mut self) -> Self {
        self.codec_config_packet = true;
        self
    }

    /// Fail every submit after `frames` frames were accepted.
    pub fn with_encoder_failing_after(mut self, frames: usize) -> Self {
        self.encoder_fail_after = Some(frames);
        self
    }

    /// Never signal an output format change.
    pub fn without_format_change(mut self) -> Self {
        self.announce_format = false;
        self
    }

    /// Refuse to create the output file.
    pub fn with_failing_muxer(mut self) -> Self {
        self.fail_create_muxer = true;
        self
    }

    /// Panic on the first sample written to the muxer.
    pub fn with_panicking_muxer(mut self) -> Self {
        self.muxer_panics = true;
        self
    }

    pub fn source(&self) -> MemorySource {
        let interval_us = 1_000_000 / i64::from(self.source_fps.max(1));
        let samples = (0..self.frame_count)
            .map(|i| Sample::new(vec![i as u8, 0, 0, 1, 0x65], i as i64 * interval_us, i == 0))
            .collect();
        MemorySource {
            track: TrackFormat {
                codec: CodecId::H264,
                width: self.width,
                height: self.height,
                frame_rate: Some(Rational::new(self.source_fps as i32, 1)),
                time_base: MICROSECONDS,
            },
            samples,
        }
    }

    pub fn decoder(&self, color_format: Option<ColorFormat>) -> MemoryDecoder {
        self.decoder_log.lock().color_format = color_format;
        MemoryDecoder {
            width: self.width,
            height: self.height,
            row_padding: self.row_padding,
            short_frames: self.short_frames.clone(),
            pending: VecDeque::new(),
            held: None,
            decoded: 0,
            input_eos: false,
            output_eos: false,
            log: Arc::clone(&self.decoder_log),
        }
    }

    pub fn encoder(&self, width: u32, height: u32, layout: ColorLayout) -> MemoryEncoder {
        MemoryEncoder {
            width,
            height,
            layout,
            lag: self.encoder_lag,
            announce_format: self.announce_format,
            codec_config_packet: self.codec_config_packet,
            fail_after: self.encoder_fail_after,
            announced: false,
            config_sent: false,
            pending: VecDeque::new(),
            held: None,
            packets: 0,
            input_eos: false,
            output_eos: false,
            log: Arc::clone(&self.encoder_log),
        }
    }

    pub fn muxer(&self) -> MemoryMuxer {
        MemoryMuxer {
            panic_on_write: self.muxer_panics,
            log: Arc::clone(&self.muxer_log),
        }
    }
}

impl MediaBackend for MemoryBackend {
    type Source = MemorySource;
    type Decoder = MemoryDecoder;
    type Encoder = MemoryEncoder;
    type Muxer = MemoryMuxer;

    fn open_source(&self, path: &Path) -> Result<MemorySource> {
        if self.fail_open {
            return Err(Error::source_io(format!("cannot open {}", path.display())));
        }
        Ok(self.source())
    }

    fn decoder_color_formats(&self, _source: &MemorySource) -> Result<Vec<ColorFormat>> {
        Ok(self.supported_formats.clone())
    }

    fn create_decoder(
        &self,
        _source: &MemorySource,
        color_format: Option<ColorFormat>,
    ) -> Result<MemoryDecoder> {
        Ok(self.decoder(color_format))
    }

    fn create_encoder(&self, format: &EncoderFormat) -> Result<MemoryEncoder> {
        Ok(self.encoder(format.width, format.height, format.input_layout))
    }

    fn create_muxer(&self, path: &Path) -> Result<MemoryMuxer> {
        if self.fail_create_muxer {
            return Err(Error::muxer(format!("cannot create {}", path.display())));
        }
        self.muxer_log.lock().path = Some(path.to_path_buf());
        Ok(self.muxer())
    }
}

/**
    Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
*/
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
