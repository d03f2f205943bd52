/*!
    Owned frame buffers passed between pipeline stages.
*/

use crate::{ColorLayout, Error, Result};

/**
    A flat 4:2:0 frame in a declared [`ColorLayout`].

    The buffer length is always exactly
    [`ColorLayout::frame_len`]`(width, height)`, checked on construction.
    Frames are moved between stages, never shared.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    layout: ColorLayout,
}

impl FrameBuffer {
    /**
        Wrap existing bytes as a frame.

        Fails with [`Error::InvalidData`] if the length does not match the
        layout and dimensions.
    */
    pub fn new(data: Vec<u8>, width: u32, height: u32, layout: ColorLayout) -> Result<Self> {
        let expected = layout.frame_len(width, height);
        if data.len() != expected {
            return Err(Error::invalid_data(format!(
                "{} frame {width}x{height} needs {expected} bytes, got {}",
                layout.name(),
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
        })
    }

    /**
        Allocate a zeroed frame.
    */
    pub fn zeroed(width: u32, height: u32, layout: ColorLayout) -> Self {
        Self {
            data: vec![0; layout.frame_len(width, height)],
            width,
            height,
            layout,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ColorLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /**
        Mutable access to the bytes. The length cannot change.
    */
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /**
        Number of luma bytes, which is also the offset of the chroma data.
    */
    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /**
        Consume the frame and return its bytes.
    */
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

// Frames cross the queue between the decode and encode threads
static_assertions::assert_impl_all!(FrameBuffer: Send, Sync);
