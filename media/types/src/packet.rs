/*!
    Compressed samples and device buffer metadata.
*/

use bitflags::bitflags;

bitflags! {
    /**
        Flags attached to device input and output buffers.
    */
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u32 {
        /// The buffer contains a key frame.
        const KEY_FRAME = 1;
        /// The buffer holds codec configuration (e.g. SPS/PPS), not media data.
        const CODEC_CONFIG = 1 << 1;
        /// No more buffers follow this one.
        const END_OF_STREAM = 1 << 2;
    }
}

/**
    Metadata describing a device buffer.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferInfo {
    /// Offset of the payload inside the buffer.
    pub offset: usize,
    /// Payload size in bytes. Zero for a bare end-of-stream buffer.
    pub size: usize,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    /**
        Create buffer metadata for a payload starting at offset zero.
    */
    pub fn new(size: usize, pts_us: i64, flags: BufferFlags) -> Self {
        Self {
            offset: 0,
            size,
            pts_us,
            flags,
        }
    }

    /**
        An empty end-of-stream buffer.
    */
    pub fn end_of_stream(pts_us: i64) -> Self {
        Self::new(0, pts_us, BufferFlags::END_OF_STREAM)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    pub fn is_codec_config(&self) -> bool {
        self.flags.contains(BufferFlags::CODEC_CONFIG)
    }

    /**
        The payload region of `buffer` this metadata describes, or `None`
        if it points outside the buffer.
    */
    pub fn payload<'a>(&self, buffer: &'a [u8]) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(self.size)?;
        buffer.get(self.offset..end)
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags.contains(BufferFlags::KEY_FRAME)
    }
}

/**
    A compressed sample read from the source.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Compressed bytes.
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds, non-decreasing per source.
    pub pts_us: i64,
    /// Whether the sample is a sync point.
    pub is_key_frame: bool,
}

impl Sample {
    /**
        Create a new sample.
    */
    pub fn new(data: Vec<u8>, pts_us: i64, is_key_frame: bool) -> Self {
        Self {
            data,
            pts_us,
            is_key_frame,
        }
    }

    /**
        Flags to submit alongside this sample.
    */
    pub fn flags(&self) -> BufferFlags {
        if self.is_key_frame {
            BufferFlags::KEY_FRAME
        } else {
            BufferFlags::empty()
        }
    }
}

/**
    Index of a track inside a muxer, assigned by `add_track`.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackIndex(pub usize);

static_assertions::assert_impl_all!(Sample: Send, Sync);
