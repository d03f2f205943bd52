/*!
    Frame layouts and device color formats.
*/

/**
    Byte layout of a [`FrameBuffer`](crate::FrameBuffer).

    All layouts are YUV 4:2:0 with 12 bits per pixel, they only differ in
    where the two chroma channels live.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorLayout {
    /// Luma plane, then interleaved chroma pairs ordered V, U.
    Nv21,
    /// Luma plane, then interleaved chroma pairs ordered U, V (semi-planar).
    Nv12,
    /// Luma plane, then a U plane, then a V plane.
    I420,
}

impl ColorLayout {
    /**
        Returns the exact buffer length for a frame of the given size.

        This is `width*height + 2*(width*height/4)`, which equals
        `width*height*3/2` whenever both dimensions are even.
    */
    pub const fn frame_len(self, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + 2 * (luma / 4)
    }

    /**
        Returns true if chroma is stored as interleaved pairs.
    */
    pub const fn is_semi_planar(self) -> bool {
        matches!(self, Self::Nv21 | Self::Nv12)
    }

    /**
        Short lowercase name, as used in logs and on the command line.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nv21 => "nv21",
            Self::Nv12 => "nv12",
            Self::I420 => "i420",
        }
    }
}

/**
    Color format identifiers advertised by decode and encode devices.

    The numeric codes follow the identifiers hardware codec stacks commonly
    report, so capability lists read from a device can be logged and
    compared without translation.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColorFormat {
    /// Any YUV 4:2:0 layout, accessed through per-plane strides.
    Yuv420Flexible,
    /// Fully planar YUV 4:2:0 (I420).
    Yuv420Planar,
    /// Semi-planar YUV 4:2:0 with U before V (NV12).
    Yuv420SemiPlanar,
    /// A device-specific format this crate does not interpret.
    Other(u32),
}

impl ColorFormat {
    /**
        Returns the numeric identifier of this format.
    */
    pub const fn code(self) -> u32 {
        match self {
            Self::Yuv420Flexible => 0x7F42_0888,
            Self::Yuv420Planar => 19,
            Self::Yuv420SemiPlanar => 21,
            Self::Other(code) => code,
        }
    }

    /**
        Look up a format from its numeric identifier.
    */
    pub const fn from_code(code: u32) -> Self {
        match code {
            0x7F42_0888 => Self::Yuv420Flexible,
            19 => Self::Yuv420Planar,
            21 => Self::Yuv420SemiPlanar,
            other => Self::Other(other),
        }
    }

    /**
        Returns the frame layout a device expects for this input format,
        if it maps to one.
    */
    pub const fn input_layout(self) -> Option<ColorLayout> {
        match self {
            Self::Yuv420Planar => Some(ColorLayout::I420),
            Self::Yuv420SemiPlanar => Some(ColorLayout::Nv12),
            Self::Yuv420Flexible | Self::Other(_) => None,
        }
    }
}
