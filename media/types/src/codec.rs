/*!
    Codec identification.
*/

/**
    Video codec identifiers.

    Only video codecs are represented, audio tracks are never read or
    written.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// MPEG-4 Part 2
    Mpeg4,
}

impl CodecId {
    /**
        Returns the MIME type for this codec.
    */
    pub const fn mime(self) -> &'static str {
        match self {
            Self::H264 => "video/avc",
            Self::H265 => "video/hevc",
            Self::Vp8 => "video/x-vnd.on2.vp8",
            Self::Vp9 => "video/x-vnd.on2.vp9",
            Self::Av1 => "video/av01",
            Self::Mpeg4 => "video/mp4v-es",
        }
    }

    /**
        Look up a codec from its MIME type.
    */
    pub fn from_mime(mime: &str) -> Option<Self> {
        [
            Self::H264,
            Self::H265,
            Self::Vp8,
            Self::Vp9,
            Self::Av1,
            Self::Mpeg4,
        ]
        .into_iter()
        .find(|codec| codec.mime().eq_ignore_ascii_case(mime))
    }

    /**
        Returns true if this codec can be stored in an MP4 container.
    */
    pub const fn fits_mp4(self) -> bool {
        matches!(
            self,
            Self::H264 | Self::H265 | Self::Vp9 | Self::Av1 | Self::Mpeg4
        )
    }
}
