/*!
    Stream descriptions exchanged between the source, devices and the muxer.
*/

use crate::{CodecId, Rational};

/**
    The video track selected from the source.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackFormat {
    pub codec: CodecId,
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Average frame rate, if the container declares one.
    pub frame_rate: Option<Rational>,
    /// Time base of the source stream.
    pub time_base: Rational,
}

/**
    The encoder's final output format, known once it signals a format change.

    This is what the muxer needs to create a track.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    /// Codec-specific configuration (e.g. avcC / SPS+PPS), may be empty.
    pub codec_config: Vec<u8>,
}
