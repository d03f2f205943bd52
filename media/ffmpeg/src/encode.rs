use std::time::Duration;

use ffmpeg_next::{
    Dictionary, Packet,
    codec::{self, encoder},
    format::Pixel,
    util::{error::Error as AvError, frame},
};
use tracing::debug;

use slowmo_pipeline::{
    EncodeDevice, EncoderFormat, EncoderOutput, InputSlot, OutputSlot, RateControl,
};
use slowmo_types::{
    BufferFlags, BufferInfo, ColorLayout, Error, MICROSECONDS, OutputFormat, Rational, Result,
};

use crate::convert::{codec_to_ffmpeg, copy_rows, is_again, layout_to_pixel, rational_to_ffmpeg};

/**
    Encodes raw 4:2:0 frames with an FFmpeg encoder.

    Timestamps are kept in microseconds end to end, B-frames are disabled
    so packets come out in presentation order, and the codec configuration
    is exported as global headers so the muxer can write it into the
    track description.
*/
pub struct FfmpegEncoder {
    encoder: encoder::video::Encoder,
    format: EncoderFormat,
    pixel: Pixel,
    codec_config: Vec<u8>,
    packet: Packet,
    pending: Option<frame::Video>,
    eof_pending: bool,
    input_done: bool,
    format_announced: bool,
    eos_reported: bool,
    held: bool,
    last_pts_us: i64,
}

impl FfmpegEncoder {
    /**
        Find and open an encoder for `format`.

        # Errors

        [`Error::DeviceConfig`] if no encoder exists for the codec, the
        frame size is odd, or the encoder refuses the configuration.
    */
    pub fn new(format: &EncoderFormat) -> Result<Self> {
        if format.width % 2 != 0 || format.height % 2 != 0 || format.width == 0 {
            return Err(Error::device_config(format!(
                "encoder needs even, non-zero dimensions, got {}x{}",
                format.width, format.height
            )));
        }

        let codec_id = codec_to_ffmpeg(format.codec);
        let codec = encoder::find(codec_id).ok_or_else(|| {
            Error::device_config(format!("no encoder available for {}", format.codec.mime()))
        })?;
        let pixel = layout_to_pixel(format.input_layout);

        let mut video = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| Error::device_config(format!("failed to create encoder: {e}")))?;
        video.set_width(format.width);
        video.set_height(format.height);
        video.set_format(pixel);
        video.set_time_base(rational_to_ffmpeg(MICROSECONDS));
        video.set_frame_rate(Some(rational_to_ffmpeg(Rational::new(
            format.frame_rate as i32,
            1,
        ))));
        video.set_max_b_frames(0);
        video.set_gop(format.frame_rate * format.key_frame_interval_secs.max(1));
        video.set_flags(codec::Flags::GLOBAL_HEADER);

        let mut options = Dictionary::new();
        if let Some(profile) = &format.profile {
            options.set("profile", profile);
        }
        match format.rate_control {
            RateControl::Bitrate => video.set_bit_rate(format.bit_rate as usize),
            RateControl::ConstantQuality(crf) => {
                // A zero bit rate leaves the encoder free to follow crf
                video.set_bit_rate(0);
                options.set("crf", &crf.to_string());
            }
        }

        let encoder = video
            .open_as_with(codec, options)
            .map_err(|e| Error::device_config(format!("failed to open encoder: {e}")))?;
        let codec_config = extradata(&encoder);
        debug!(
            encoder = codec.name(),
            pixel = ?pixel,
            bit_rate = format.bit_rate,
            profile = format.profile.as_deref(),
            codec_config_len = codec_config.len(),
            "encoder opened"
        );

        Ok(Self {
            encoder,
            format: format.clone(),
            pixel,
            codec_config,
            packet: Packet::empty(),
            pending: None,
            eof_pending: false,
            input_done: false,
            format_announced: false,
            eos_reported: false,
            held: false,
            last_pts_us: 0,
        })
    }

    fn send(&mut self, frame: frame::Video) -> Result<()> {
        match self.encoder.send_frame(&frame) {
            Ok(()) => Ok(()),
            Err(e) if is_again(&e) => {
                self.pending = Some(frame);
                Ok(())
            }
            Err(e) => Err(Error::device(format!("failed to send frame: {e}"))),
        }
    }

    fn send_eof(&mut self) -> Result<()> {
        match self.encoder.send_eof() {
            Ok(()) | Err(AvError::Eof) => {
                self.eof_pending = false;
                Ok(())
            }
            Err(e) if is_again(&e) => {
                self.eof_pending = true;
                Ok(())
            }
            Err(e) => Err(Error::device(format!("failed to flush encoder: {e}"))),
        }
    }

    fn retry_pending(&mut self) -> Result<()> {
        if let Some(frame) = self.pending.take() {
            self.send(frame)?;
        }
        if self.pending.is_none() && self.eof_pending {
            self.send_eof()?;
        }
        Ok(())
    }

    /**
        Copy a flat frame into a freshly allocated FFmpeg picture.
    */
    fn fill_frame(&self, data: &[u8], pts_us: i64) -> frame::Video {
        let (width, height) = (self.format.width, self.format.height);
        let (w, h) = (width as usize, height as usize);
        let luma_len = w * h;

        let mut frame = frame::Video::new(self.pixel, width, height);
        let stride = frame.stride(0);
        copy_rows(&data[..luma_len], w, frame.data_mut(0), stride, w, h);

        let chroma = &data[luma_len..];
        match self.format.input_layout {
            ColorLayout::I420 => {
                let (cw, ch) = (w / 2, h / 2);
                let (u, v) = chroma.split_at(cw * ch);
                let stride = frame.stride(1);
                copy_rows(u, cw, frame.data_mut(1), stride, cw, ch);
                let stride = frame.stride(2);
                copy_rows(v, cw, frame.data_mut(2), stride, cw, ch);
            }
            ColorLayout::Nv12 | ColorLayout::Nv21 => {
                let stride = frame.stride(1);
                copy_rows(chroma, w, frame.data_mut(1), stride, w, h / 2);
            }
        }
        frame.set_pts(Some(pts_us));
        frame
    }
}

impl EncodeDevice for FfmpegEncoder {
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

        let expected = self
            .format
            .input_layout
            .frame_len(self.format.width, self.format.height);
        if data.len() != expected {
            return Err(Error::invalid_data(format!(
                "encoder input is {} bytes, expected {expected}",
                data.len()
            )));
        }
        let frame = self.fill_frame(data, pts_us);
        self.send(frame)
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<EncoderOutput> {
        if !self.format_announced {
            self.format_announced = true;
            return Ok(EncoderOutput::FormatChanged);
        }
        if self.held {
            return Err(Error::device("encoder output slot was not released"));
        }
        self.retry_pending()?;

        match self.encoder.receive_packet(&mut self.packet) {
            Ok(()) => {
                let pts_us = self.packet.pts().unwrap_or(self.last_pts_us);
                self.last_pts_us = pts_us;
                let mut flags = BufferFlags::empty();
                if self.packet.is_key() {
                    flags |= BufferFlags::KEY_FRAME;
                }
                let size = self.packet.size();
                self.held = true;
                Ok(EncoderOutput::Buffer(
                    OutputSlot::new(0),
                    BufferInfo::new(size, pts_us, flags),
                ))
            }
            Err(e) if is_again(&e) => Ok(EncoderOutput::TryAgain),
            Err(AvError::Eof) if self.eos_reported => Ok(EncoderOutput::TryAgain),
            Err(AvError::Eof) => {
                self.eos_reported = true;
                self.held = true;
                self.packet = Packet::empty();
                Ok(EncoderOutput::Buffer(
                    OutputSlot::new(0),
                    BufferInfo::end_of_stream(self.last_pts_us),
                ))
            }
            Err(e) => Err(Error::device(format!("failed to receive packet: {e}"))),
        }
    }

    fn output_data(&self, slot: &OutputSlot) -> Result<&[u8]> {
        if !self.held || slot.index() != 0 {
            return Err(Error::device("no packet held by this output slot"));
        }
        Ok(self.packet.data().unwrap_or_default())
    }

    fn output_format(&self) -> Result<OutputFormat> {
        if !self.format_announced {
            return Err(Error::device("encoder output format is not known yet"));
        }
        Ok(OutputFormat {
            codec: self.format.codec,
            width: self.format.width,
            height: self.format.height,
            frame_rate: Rational::new(self.format.frame_rate as i32, 1),
            codec_config: self.codec_config.clone(),
        })
    }

    fn release_output(&mut self, slot: OutputSlot) -> Result<()> {
        if !self.held || slot.index() != 0 {
            return Err(Error::device("encoder output slot released twice"));
        }
        self.held = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.pending = None;
        self.held = false;
        debug!("encoder stopped");
        Ok(())
    }
}

/**
    Copy the global headers an opened encoder exported, if any.
*/
fn extradata(encoder: &encoder::video::Encoder) -> Vec<u8> {
    // SAFETY: the context is open and owned by `encoder`, extradata is
    // either null or points to extradata_size readable bytes.
    unsafe {
        let context = encoder.as_ptr();
        let data = (*context).extradata;
        let len = (*context).extradata_size;
        if data.is_null() || len <= 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts(data, len as usize).to_vec()
    }
}
