/*!
    Extraction of decoded planes into flat frame buffers.
*/

use slowmo_types::{ColorLayout, DecodedImage, Error, FrameBuffer, Plane, Result};

/**
    Where one source plane lands in the output buffer.
*/
#[derive(Clone, Copy, Debug)]
struct PlaneTarget {
    /// Offset of the first output sample.
    offset: usize,
    /// Distance between consecutive output samples.
    stride: usize,
}

/**
    Output placement of the Y, U and V planes for a layout.
*/
fn plane_targets(layout: ColorLayout, width: u32, height: u32) -> [PlaneTarget; 3] {
    let luma = width as usize * height as usize;
    let y = PlaneTarget {
        offset: 0,
        stride: 1,
    };
    match layout {
        // V comes first in each NV21 chroma pair, so U starts one byte later
        ColorLayout::Nv21 => [
            y,
            PlaneTarget {
                offset: luma + 1,
                stride: 2,
            },
            PlaneTarget {
                offset: luma,
                stride: 2,
            },
        ],
        ColorLayout::Nv12 => [
            y,
            PlaneTarget {
                offset: luma,
                stride: 2,
            },
            PlaneTarget {
                offset: luma + 1,
                stride: 2,
            },
        ],
        ColorLayout::I420 => [
            y,
            PlaneTarget {
                offset: luma,
                stride: 1,
            },
            PlaneTarget {
                offset: luma + luma / 4,
                stride: 1,
            },
        ],
    }
}

/**
    Copy the cropped region of a three-plane 4:2:0 picture into a new
    frame buffer in the given layout.

    Planes must be ordered Y, U, V. Chroma planes are subsampled by two in
    both directions, so their crop offsets and sizes are the luma ones
    shifted right by one.

    # Errors

    - [`Error::UnsupportedFormat`] if the image does not have exactly three planes.
    - [`Error::InvalidData`] if the crop is empty, a plane has a zero pixel
      stride, or a plane is too short for the rows the crop requires.
*/
pub fn extract(image: &DecodedImage<'_>, layout: ColorLayout) -> Result<FrameBuffer> {
    if image.planes.len() != 3 {
        return Err(Error::unsupported_format(format!(
            "expected 3 planes, got {}",
            image.planes.len()
        )));
    }

    let crop = image.crop;
    if crop.width == 0 || crop.height == 0 {
        return Err(Error::invalid_data(format!(
            "empty crop rectangle {}x{}",
            crop.width, crop.height
        )));
    }

    let mut data = vec![0u8; layout.frame_len(crop.width, crop.height)];
    let targets = plane_targets(layout, crop.width, crop.height);

    for (index, (plane, target)) in image.planes.iter().zip(targets).enumerate() {
        let shift = if index == 0 { 0 } else { 1 };
        let region = Region {
            left: (crop.left >> shift) as usize,
            top: (crop.top >> shift) as usize,
            width: (crop.width >> shift) as usize,
            height: (crop.height >> shift) as usize,
        };
        copy_plane(plane, region, target, &mut data)
            .map_err(|e| Error::invalid_data(format!("plane {index}: {e}")))?;
    }

    FrameBuffer::new(data, crop.width, crop.height, layout)
}

#[derive(Clone, Copy, Debug)]
struct Region {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

/**
    Copy one plane's region into `out`, row by row.
*/
fn copy_plane(
    plane: &Plane<'_>,
    region: Region,
    target: PlaneTarget,
    out: &mut [u8],
) -> std::result::Result<(), String> {
    if region.width == 0 || region.height == 0 {
        return Ok(());
    }
    let pixel_stride = plane.pixel_stride;
    if pixel_stride == 0 {
        return Err("pixel stride is zero".to_string());
    }

    let fast = pixel_stride == 1 && target.stride == 1;
    // Bytes read from the source for each row
    let row_len = if fast {
        region.width
    } else {
        (region.width - 1) * pixel_stride + 1
    };

    let mut cursor = plane.row_stride * region.top + pixel_stride * region.left;
    let mut offset = target.offset;

    for row in 0..region.height {
        let src = plane.data.get(cursor..cursor + row_len).ok_or_else(|| {
            format!(
                "row {row} needs bytes {cursor}..{}, plane has {}",
                cursor + row_len,
                plane.data.len()
            )
        })?;

        if fast {
            out[offset..offset + row_len].copy_from_slice(src);
            offset += row_len;
        } else {
            for sample in src.iter().step_by(pixel_stride) {
                out[offset] = *sample;
                offset += target.stride;
            }
        }

        if row + 1 < region.height {
            // Equivalent to skipping `row_stride - row_len` after the bytes just read
            cursor += plane.row_stride;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slowmo_types::CropRect;

    /// Luma 0x00..0x0F, a 4x4 picture.
    fn luma_4x4() -> Vec<u8> {
        (0x00..0x10).collect()
    }

    #[test]
    fn rejects_wrong_plane_count() {
        let y = luma_4x4();
        let image = DecodedImage::new(
            vec![Plane::packed(&y, 4), Plane::packed(&y, 4)],
            CropRect::full(4, 4),
        );
        let err = extract(&image, ColorLayout::Nv21).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn packed_planes_concatenate_for_i420() {
        let y = luma_4x4();
        let u = [0xA0, 0xA1, 0xA2, 0xA3];
        let v = [0xB0, 0xB1, 0xB2, 0xB3];
        let image = DecodedImage::new(
            vec![
                Plane::packed(&y, 4),
                Plane::packed(&u, 2),
                Plane::packed(&v, 2),
            ],
            CropRect::full(4, 4),
        );

        let frame = extract(&image, ColorLayout::I420).unwrap();

        let mut expected = y.clone();
        expected.extend_from_slice(&u);
        expected.extend_from_slice(&v);
        assert_eq!(frame.data(), expected.as_slice());
    }

    #[test]
    fn interleaved_chroma_to_nv21_fixture() {
        // Chroma stored NV12-style: U0 V0 U1 V1 / U2 V2 U3 V3, exposed as
        // two planes with pixel stride 2 aliasing the same memory.
        let y = luma_4x4();
        let chroma = [0xA0, 0xB0, 0xA1, 0xB1, 0xA2, 0xB2, 0xA3, 0xB3];
        let image = DecodedImage::new(
            vec![
                Plane::new(&y, 4, 1),
                Plane::new(&chroma[0..], 4, 2),
                Plane::new(&chroma[1..], 4, 2),
            ],
            CropRect::full(4, 4),
        );

        let frame = extract(&image, ColorLayout::Nv21).unwrap();

        #[rustfmt::skip]
        let expected: [u8; 24] = [
            0x00, 0x01, 0x02, 0x03,
            0x04, 0x05, 0x06, 0x07,
            0x08, 0x09, 0x0A, 0x0B,
            0x0C, 0x0D, 0x0E, 0x0F,
            0xB0, 0xA0, 0xB1, 0xA1,
            0xB2, 0xA2, 0xB3, 0xA3,
        ];
        assert_eq!(frame.data(), &expected[..]);
        assert_eq!(frame.layout(), ColorLayout::Nv21);
    }

    #[test]
    fn planar_chroma_to_nv21() {
        let y = luma_4x4();
        let u = [0xA0, 0xA1, 0xA2, 0xA3];
        let v = [0xB0, 0xB1, 0xB2, 0xB3];
        let image = DecodedImage::new(
            vec![
                Plane::packed(&y, 4),
                Plane::packed(&u, 2),
                Plane::packed(&v, 2),
            ],
            CropRect::full(4, 4),
        );

        let frame = extract(&image, ColorLayout::Nv21).unwrap();
        assert_eq!(&frame.data()[..16], y.as_slice());
        assert_eq!(
            &frame.data()[16..],
            &[0xB0, 0xA0, 0xB1, 0xA1, 0xB2, 0xA2, 0xB3, 0xA3]
        );
    }

    #[test]
    fn padded_rows_and_crop() {
        // 8x4 luma with row stride 10; crop the 4x2 block at (2, 2)
        let mut y = vec![0xFFu8; 10 * 4];
        for row in 0..4 {
            for col in 0..8 {
                y[row * 10 + col] = (row * 16 + col) as u8;
            }
        }
        // Chroma 4x2 with row stride 6
        let mut u = vec![0xEEu8; 6 * 2];
        let mut v = vec![0xEEu8; 6 * 2];
        for row in 0..2 {
            for col in 0..4 {
                u[row * 6 + col] = 0x40 + (row * 4 + col) as u8;
                v[row * 6 + col] = 0x80 + (row * 4 + col) as u8;
            }
        }
        let image = DecodedImage::new(
            vec![
                Plane::new(&y, 10, 1),
                Plane::new(&u, 6, 1),
                Plane::new(&v, 6, 1),
            ],
            CropRect::new(2, 2, 4, 2),
        );

        let frame = extract(&image, ColorLayout::I420).unwrap();

        // Luma rows 2..4, columns 2..6
        assert_eq!(&frame.data()[..8], &[0x22, 0x23, 0x24, 0x25, 0x32, 0x33, 0x34, 0x35]);
        // Chroma crop starts at (1, 1), one row of two samples
        assert_eq!(&frame.data()[8..10], &[0x45, 0x46]);
        assert_eq!(&frame.data()[10..12], &[0x85, 0x86]);
    }

    #[test]
    fn short_plane_is_invalid_data() {
        let y = luma_4x4();
        let u = [0xA0, 0xA1, 0xA2];
        let v = [0xB0, 0xB1, 0xB2, 0xB3];
        let image = DecodedImage::new(
            vec![
                Plane::packed(&y, 4),
                Plane::packed(&u, 2),
                Plane::packed(&v, 2),
            ],
            CropRect::full(4, 4),
        );

        let err = extract(&image, ColorLayout::Nv21).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
        assert!(format!("{err}").contains("plane 1"));
    }

    #[test]
    fn last_row_does_not_need_trailing_padding() {
        // Last chroma row stops right after the final sample, no full stride
        let y = luma_4x4();
        let chroma = [0xA0, 0xB0, 0xA1, 0xB1, 0xA2, 0xB2, 0xA3, 0xB3];
        let image = DecodedImage::new(
            vec![
                Plane::new(&y, 4, 1),
                Plane::new(&chroma[..7], 4, 2),
                Plane::new(&chroma[1..], 4, 2),
            ],
            CropRect::full(4, 4),
        );
        assert!(extract(&image, ColorLayout::Nv12).is_ok());
    }

    #[test]
    fn output_length_matches_layout() {
        for (width, height) in [(2u32, 2u32), (6, 4), (16, 10)] {
            let luma = vec![1u8; (width * height) as usize];
            let chroma = vec![2u8; (width * height / 4) as usize];
            let image = DecodedImage::new(
                vec![
                    Plane::packed(&luma, width as usize),
                    Plane::packed(&chroma, (width / 2) as usize),
                    Plane::packed(&chroma, (width / 2) as usize),
                ],
                CropRect::full(width, height),
            );
            let frame = extract(&image, ColorLayout::Nv21).unwrap();
            assert_eq!(frame.data().len(), (width * height * 3 / 2) as usize);
        }
    }
}
