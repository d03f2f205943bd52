/*!
    Borrowed views of decoded pictures.
*/

/**
    One plane of a decoded picture.

    `row_stride` is the byte distance between the starts of consecutive
    rows and `pixel_stride` the distance between horizontally adjacent
    samples. Hardware decoders often pad rows (`row_stride > width`) and
    expose interleaved chroma as two planes with `pixel_stride == 2`
    aliasing the same memory.
*/
#[derive(Clone, Copy, Debug)]
pub struct Plane<'a> {
    /// Plane bytes, starting at the first sample of the first row.
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between horizontally adjacent samples (1 or 2).
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    /**
        Create a new plane view.
    */
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /**
        Create a tightly packed plane (`row_stride == width`, `pixel_stride == 1`).
    */
    pub fn packed(data: &'a [u8], width: usize) -> Self {
        Self::new(data, width, 1)
    }
}

/**
    The region of a decoded picture that holds valid pixels.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /**
        Create a crop rectangle.
    */
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /**
        A crop covering a whole `width` x `height` picture.
    */
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/**
    A decoded picture borrowed from a decode device.

    Planes are ordered luma, chroma U, chroma V. The view borrows the
    device's output slot, so it cannot outlive the slot's release.
*/
#[derive(Clone, Debug)]
pub struct DecodedImage<'a> {
    /// Between one and three planes.
    pub planes: Vec<Plane<'a>>,
    /// Valid region of the picture.
    pub crop: CropRect,
}

impl<'a> DecodedImage<'a> {
    /**
        Create a new decoded image view.
    */
    pub fn new(planes: Vec<Plane<'a>>, crop: CropRect) -> Self {
        Self { planes, crop }
    }

    /**
        Width of the valid region.
    */
    pub fn width(&self) -> u32 {
        self.crop.width
    }

    /**
        Height of the valid region.
    */
    pub fn height(&self) -> u32 {
        self.crop.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_plane() {
        let data = [0u8; 16];
        let plane = Plane::packed(&data, 4);
        assert_eq!(plane.row_stride, 4);
        assert_eq!(plane.pixel_stride, 1);
    }

    #[test]
    fn image_dimensions_follow_crop() {
        let data = [0u8; 64];
        let image = DecodedImage::new(
            vec![Plane::packed(&data, 8)],
            CropRect::new(2, 2, 4, 6),
        );
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 6);
    }
}
