/*!
    Contracts for the source, codec devices and muxer.

    Devices follow a slot model: the caller dequeues an input slot, fills
    and submits it, then separately dequeues output slots and releases
    them when done. Dequeues take a poll timeout and return `None` (or
    [`EncoderOutput::TryAgain`]) when nothing is ready yet; the drivers
    simply poll again.

    Slots are tokens that cannot be cloned. Submitting or releasing a slot
    consumes it, and a [`DecodedImage`] borrows the decoder, so an image
    can never be held across the release of its slot or the next dequeue.
*/

use std::path::Path;
use std::time::Duration;

use slowmo_types::{
    BufferFlags, BufferInfo, CodecId, ColorFormat, ColorLayout, DecodedImage, OutputFormat,
    Result, Sample, TrackFormat, TrackIndex,
};

/**
    A device input slot, valid until submitted.
*/
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct InputSlot(usize);

impl InputSlot {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/**
    A device output slot, valid until released.
*/
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct OutputSlot(usize);

impl OutputSlot {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/**
    A demuxed source of compressed video samples.
*/
pub trait SampleSource {
    /// The selected video track.
    fn track_format(&self) -> &TrackFormat;

    /// Read the next sample, or `None` once the track is exhausted.
    fn read_sample(&mut self) -> Result<Option<Sample>>;
}

/**
    A decode device turning compressed samples into pictures.
*/
pub trait DecodeDevice {
    /// Wait up to `timeout` for a free input slot.
    fn dequeue_input_slot(&mut self, timeout: Duration) -> Result<Option<InputSlot>>;

    /**
        Copy `data` into the slot and queue it for decoding.

        An empty `data` with [`BufferFlags::END_OF_STREAM`] signals that no
        more input follows.
    */
    fn submit_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<()>;

    /// Wait up to `timeout` for a decoded output.
    fn dequeue_output_slot(&mut self, timeout: Duration)
    -> Result<Option<(OutputSlot, BufferInfo)>>;

    /// Borrow the picture held by an output slot.
    fn acquire_image(&mut self, slot: &OutputSlot) -> Result<DecodedImage<'_>>;

    /// Hand the output slot back to the device.
    fn release_output(&mut self, slot: OutputSlot, render: bool) -> Result<()>;

    /// Stop decoding. Resources are released when the device is dropped.
    fn stop(&mut self) -> Result<()>;
}

/**
    What an encoder output dequeue produced.
*/
#[derive(Debug)]
pub enum EncoderOutput {
    /// Nothing was ready within the timeout.
    TryAgain,
    /// The final output format is known, see [`EncodeDevice::output_format`].
    FormatChanged,
    /// An encoded buffer; read it with [`EncodeDevice::output_data`], then release it.
    Buffer(OutputSlot, BufferInfo),
}

/**
    An encode device turning raw frames into compressed packets.
*/
pub trait EncodeDevice {
    /// Wait up to `timeout` for a free input slot.
    fn dequeue_input_slot(&mut self, timeout: Duration) -> Result<Option<InputSlot>>;

    /**
        Copy a raw frame into the slot and queue it for encoding.

        An empty `data` with [`BufferFlags::END_OF_STREAM`] asks the
        encoder to flush.
    */
    fn submit_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<()>;

    /// Wait up to `timeout` for an encoded buffer or a format change.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<EncoderOutput>;

    /// Bytes of an output slot. `BufferInfo::offset`/`size` select the payload.
    fn output_data(&self, slot: &OutputSlot) -> Result<&[u8]>;

    /// The output format, valid once [`EncoderOutput::FormatChanged`] was seen.
    fn output_format(&self) -> Result<OutputFormat>;

    /// Hand the output slot back to the device.
    fn release_output(&mut self, slot: OutputSlot) -> Result<()>;

    /// Stop encoding. Resources are released when the device is dropped.
    fn stop(&mut self) -> Result<()>;
}

/**
    A container writer.
*/
pub trait Muxer {
    /// Create a track for the encoder's final output format.
    fn add_track(&mut self, format: &OutputFormat) -> Result<TrackIndex>;

    /// Begin writing. Tracks must be added first.
    fn start(&mut self) -> Result<()>;

    /// Write one encoded sample; `info.pts_us` must increase strictly per track.
    fn write_sample(&mut self, track: TrackIndex, data: &[u8], info: &BufferInfo) -> Result<()>;

    /// Finish the container. Only valid after a successful `start`.
    fn stop(&mut self) -> Result<()>;
}

/**
    What the pipeline asks an encode device to produce.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderFormat {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    /// Target frames per second.
    pub frame_rate: u32,
    /// Target bit rate in bits per second.
    pub bit_rate: u64,
    /// Seconds between key frames.
    pub key_frame_interval_secs: u32,
    /// Raw input color format the encoder is configured for.
    pub color_format: ColorFormat,
    /// Byte layout matching `color_format`.
    pub input_layout: ColorLayout,
    /// Codec profile name, `None` for the encoder's default.
    pub profile: Option<String>,
    pub rate_control: RateControl,
}

/**
    How the encoder spends bits.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RateControl {
    /// Aim for the configured bit rate on average.
    #[default]
    Bitrate,
    /// Keep quality constant at this level, letting the bit rate vary.
    /// Lower is better; the scale is the codec's own (0-51 for H.264).
    ConstantQuality(u8),
}

/**
    Factory for the devices used by one transcode.

    The source and decoder stay on the calling thread; the encoder and
    muxer are moved to the encode thread, hence the `Send` bounds.
*/
pub trait MediaBackend {
    type Source: SampleSource;
    type Decoder: DecodeDevice;
    type Encoder: EncodeDevice + Send + 'static;
    type Muxer: Muxer + Send + 'static;

    /// Open the input and select its video track.
    fn open_source(&self, path: &Path) -> Result<Self::Source>;

    /// Color formats the decoder for this source can output.
    fn decoder_color_formats(&self, source: &Self::Source) -> Result<Vec<ColorFormat>>;

    /// Create and start a decoder; `None` keeps the device's default format.
    fn create_decoder(
        &self,
        source: &Self::Source,
        color_format: Option<ColorFormat>,
    ) -> Result<Self::Decoder>;

    /// Create and start an encoder.
    fn create_encoder(&self, format: &EncoderFormat) -> Result<Self::Encoder>;

    /// Create a muxer writing to `path`.
    fn create_muxer(&self, path: &Path) -> Result<Self::Muxer>;
}
