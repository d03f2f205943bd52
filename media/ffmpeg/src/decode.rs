use std::time::Duration;

use ffmpeg_next::{
    Packet,
    codec::{self, packet},
    decoder,
    format::Pixel,
    software::scaling::{self, Flags as ScaleFlags},
    util::{error::Error as AvError, frame},
};
use tracing::{debug, warn};

use slowmo_pipeline::{DecodeDevice, InputSlot, OutputSlot, SampleSource};
use slowmo_types::{
    BufferFlags, BufferInfo, ColorFormat, ColorLayout, CropRect, DecodedImage, Error, MICROSECONDS,
    Plane, Rational, Result, rescale,
};

use crate::convert::is_again;
use crate::source::FfmpegSource;

/**
    Decodes the selected video stream of an [`FfmpegSource`].

    The device has one input and one output slot. Pictures in a YUV 4:2:0
    layout the pipeline can read through plane strides are exposed as-is
    when the flexible format was requested, everything else goes through
    swscale first.
*/
pub struct FfmpegDecoder {
    decoder: decoder::Video,
    time_base: Rational,
    color_format: Option<ColorFormat>,
    decoded: frame::Video,
    scaler: Option<Scaler>,
    pending: Option<Packet>,
    eof_pending: bool,
    input_done: bool,
    eos_reported: bool,
    held: bool,
    last_pts_us: i64,
}

struct Scaler {
    context: scaling::Context,
    key: (Pixel, Pixel, u32, u32),
    output: frame::Video,
}

impl FfmpegDecoder {
    /**
        Open a decoder for `source`, producing pictures in `color_format`.

        `None` keeps the codec's own output format.
    */
    pub fn new(source: &FfmpegSource, color_format: Option<ColorFormat>) -> Result<Self> {
        if let Some(ColorFormat::Other(code)) = color_format {
            return Err(Error::device_config(format!(
                "decoder cannot output color format {code:#x}"
            )));
        }

        let decoder = codec::context::Context::from_parameters(source.parameters().clone())
            .and_then(|context| context.decoder().video())
            .map_err(|e| Error::device_config(format!("failed to open decoder: {e}")))?;
        debug!(
            codec = ?decoder.id(),
            format = ?decoder.format(),
            ?color_format,
            "decoder opened"
        );

        Ok(Self {
            decoder,
            time_base: source.track_format().time_base,
            color_format,
            decoded: frame::Video::empty(),
            scaler: None,
            pending: None,
            eof_pending: false,
            input_done: false,
            eos_reported: false,
            held: false,
            last_pts_us: 0,
        })
    }

    fn send(&mut self, packet: Packet) -> Result<()> {
        match self.decoder.send_packet(&packet) {
            Ok(()) => Ok(()),
            Err(e) if is_again(&e) => {
                self.pending = Some(packet);
                Ok(())
            }
            Err(AvError::InvalidData) => {
                warn!(pts = ?packet.pts(), "decoder rejected corrupt packet");
                Ok(())
            }
            Err(e) => Err(Error::device(format!("failed to send packet: {e}"))),
        }
    }

    fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) | Err(AvError::Eof) => {
                self.eof_pending = false;
                Ok(())
            }
            Err(e) if is_again(&e) => {
                self.eof_pending = true;
                Ok(())
            }
            Err(e) => Err(Error::device(format!("failed to flush decoder: {e}"))),
        }
    }

    fn retry_pending(&mut self) -> Result<()> {
        if let Some(packet) = self.pending.take() {
            self.send(packet)?;
        }
        if self.pending.is_none() && self.eof_pending {
            self.send_eof()?;
        }
        Ok(())
    }

    /**
        Convert the held picture if needed and return the frame to read.
    */
    fn output_frame(&mut self) -> Result<&frame::Video> {
        let source = self.decoded.format();
        let Some(target) = conversion_target(self.color_format, source) else {
            return Ok(&self.decoded);
        };

        let (width, height) = (self.decoded.width(), self.decoded.height());
        let key = (source, target, width, height);
        if self.scaler.as_ref().is_none_or(|scaler| scaler.key != key) {
            let context = scaling::Context::get(
                source,
                width,
                height,
                target,
                width,
                height,
                ScaleFlags::BILINEAR,
            )
            .map_err(|e| {
                Error::unsupported_format(format!("cannot convert {source:?} to {target:?}: {e}"))
            })?;
            debug!(?source, ?target, width, height, "created picture converter");
            self.scaler = Some(Scaler {
                context,
                key,
                output: frame::Video::empty(),
            });
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Ok(&self.decoded);
        };
        scaler
            .context
            .run(&self.decoded, &mut scaler.output)
            .map_err(|e| Error::invalid_data(format!("picture conversion failed: {e}")))?;
        Ok(&scaler.output)
    }
}

impl DecodeDevice for FfmpegDecoder {
    fn dequeue_input_slot(&mut self, _timeout: Duration) -> Result<Option<InputSlot>> {
        self.retry_pending()?;
        if self.input_done || self.pending.is_some() {
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
            self.input_done = true;
            return self.send_eof();
        }
        // an empty packet would flush the decoder
        if data.is_empty() {
            return Ok(());
        }

        let mut packet = Packet::copy(data);
        packet.set_pts(Some(rescale(pts_us, MICROSECONDS, self.time_base)));
        if flags.contains(BufferFlags::KEY_FRAME) {
            packet.set_flags(packet::Flags::KEY);
        }
        self.send(packet)
    }

    fn dequeue_output_slot(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<(OutputSlot, BufferInfo)>> {
        if self.held {
            return Err(Error::device("decoder output slot was not released"));
        }
        self.retry_pending()?;

        match self.decoder.receive_frame(&mut self.decoded) {
            Ok(()) => {
                let pts_us = self
                    .decoded
                    .timestamp()
                    .or(self.decoded.pts())
                    .map(|ts| rescale(ts, self.time_base, MICROSECONDS))
                    .unwrap_or(self.last_pts_us);
                self.last_pts_us = pts_us;
                self.held = true;

                let size = ColorLayout::I420.frame_len(self.decoded.width(), self.decoded.height());
                Ok(Some((
                    OutputSlot::new(0),
                    BufferInfo::new(size, pts_us, BufferFlags::empty()),
                )))
            }
            Err(e) if is_again(&e) => Ok(None),
            Err(AvError::Eof) if self.eos_reported => Ok(None),
            Err(AvError::Eof) => {
                self.eos_reported = true;
                self.held = true;
                Ok(Some((
                    OutputSlot::new(0),
                    BufferInfo::end_of_stream(self.last_pts_us),
                )))
            }
            Err(AvError::InvalidData) => {
                warn!("decoder dropped a corrupt picture");
                Ok(None)
            }
            Err(e) => Err(Error::device(format!("failed to receive frame: {e}"))),
        }
    }

    fn acquire_image(&mut self, slot: &OutputSlot) -> Result<DecodedImage<'_>> {
        if !self.held || slot.index() != 0 || self.eos_reported {
            return Err(Error::device("no picture held by this output slot"));
        }
        let frame = self.output_frame()?;
        let planes = frame_planes(frame)?;
        Ok(DecodedImage::new(
            planes,
            CropRect::full(frame.width(), frame.height()),
        ))
    }

    fn release_output(&mut self, slot: OutputSlot, _render: bool) -> Result<()> {
        if !self.held || slot.index() != 0 {
            return Err(Error::device("decoder output slot released twice"));
        }
        self.held = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.pending = None;
        self.held = false;
        debug!("decoder stopped");
        Ok(())
    }
}

/**
    Pixel format a picture must be converted to before it can be exposed,
    or `None` if it can be read directly.
*/
fn conversion_target(requested: Option<ColorFormat>, source: Pixel) -> Option<Pixel> {
    let is_planar = matches!(source, Pixel::YUV420P | Pixel::YUVJ420P);
    match requested {
        Some(ColorFormat::Yuv420Planar) => (!is_planar).then_some(Pixel::YUV420P),
        Some(ColorFormat::Yuv420SemiPlanar) => (source != Pixel::NV12).then_some(Pixel::NV12),
        _ => {
            let readable = is_planar || matches!(source, Pixel::NV12 | Pixel::NV21);
            (!readable).then_some(Pixel::YUV420P)
        }
    }
}

/**
    Plane views of a 4:2:0 picture, ordered luma, U, V.

    Interleaved chroma is exposed as two planes with a pixel stride of 2
    aliasing the same bytes.
*/
fn frame_planes(frame: &frame::Video) -> Result<Vec<Plane<'_>>> {
    let luma = Plane::new(frame.data(0), frame.stride(0), 1);
    match frame.format() {
        Pixel::YUV420P | Pixel::YUVJ420P => Ok(vec![
            luma,
            Plane::new(frame.data(1), frame.stride(1), 1),
            Plane::new(frame.data(2), frame.stride(2), 1),
        ]),
        Pixel::NV12 => {
            let chroma = frame.data(1);
            Ok(vec![
                luma,
                Plane::new(chroma, frame.stride(1), 2),
                Plane::new(chroma.get(1..).unwrap_or_default(), frame.stride(1), 2),
            ])
        }
        Pixel::NV21 => {
            let chroma = frame.data(1);
            Ok(vec![
                luma,
                Plane::new(chroma.get(1..).unwrap_or_default(), frame.stride(1), 2),
                Plane::new(chroma, frame.stride(1), 2),
            ])
        }
        other => Err(Error::unsupported_format(format!(
            "cannot read {other:?} pictures"
        ))),
    }
}
