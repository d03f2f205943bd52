/*!
    Conversions between 4:2:0 frame layouts.
*/

use slowmo_types::{ColorLayout, Error, FrameBuffer, Result};

/**
    Check that `src` and `dst` both hold a full 4:2:0 frame.

    Returns the luma size.
*/
fn check_lengths(src: &[u8], dst: &[u8], width: u32, height: u32) -> Result<usize> {
    let expected = ColorLayout::Nv21.frame_len(width, height);
    if src.len() < expected || dst.len() < expected {
        return Err(Error::invalid_data(format!(
            "{width}x{height} frame needs {expected} bytes (src {}, dst {})",
            src.len(),
            dst.len()
        )));
    }
    Ok(width as usize * height as usize)
}

/**
    Swap the two bytes of every interleaved chroma pair.

    Converts NV21 to NV12 and, since the operation is its own inverse,
    NV12 back to NV21. Luma is copied unchanged.
*/
pub fn swap_uv(src: &[u8], dst: &mut [u8], width: u32, height: u32) -> Result<()> {
    let size = check_lengths(src, dst, width, height)?;
    dst[..size].copy_from_slice(&src[..size]);

    let pairs = size / 4;
    let src_chroma = &src[size..size + 2 * pairs];
    let dst_chroma = &mut dst[size..size + 2 * pairs];
    for (out, pair) in dst_chroma.chunks_exact_mut(2).zip(src_chroma.chunks_exact(2)) {
        out[0] = pair[1];
        out[1] = pair[0];
    }
    Ok(())
}

/**
    De-interleave semi-planar chroma into a U plane followed by a V plane.

    `u_first` tells whether each source pair is ordered U, V (NV12) or
    V, U (NV21).
*/
pub fn semi_planar_to_i420(
    src: &[u8],
    dst: &mut [u8],
    width: u32,
    height: u32,
    u_first: bool,
) -> Result<()> {
    let size = check_lengths(src, dst, width, height)?;
    dst[..size].copy_from_slice(&src[..size]);

    let pairs = size / 4;
    let (u_index, v_index) = if u_first { (0, 1) } else { (1, 0) };
    let src_chroma = &src[size..size + 2 * pairs];
    let (u_plane, v_plane) = dst[size..size + 2 * pairs].split_at_mut(pairs);
    for (i, pair) in src_chroma.chunks_exact(2).enumerate() {
        u_plane[i] = pair[u_index];
        v_plane[i] = pair[v_index];
    }
    Ok(())
}

/**
    Convert NV21 to I420: odd chroma bytes (U) form the U plane, even
    chroma bytes (V) form the V plane right after it.
*/
pub fn nv21_to_i420(src: &[u8], dst: &mut [u8], width: u32, height: u32) -> Result<()> {
    semi_planar_to_i420(src, dst, width, height, false)
}

/**
    Interleave I420 chroma planes into semi-planar pairs.

    `u_first` selects NV12 (U, V) or NV21 (V, U) ordering.
*/
pub fn i420_to_semi_planar(
    src: &[u8],
    dst: &mut [u8],
    width: u32,
    height: u32,
    u_first: bool,
) -> Result<()> {
    let size = check_lengths(src, dst, width, height)?;
    dst[..size].copy_from_slice(&src[..size]);

    let pairs = size / 4;
    let (u_plane, v_plane) = src[size..size + 2 * pairs].split_at(pairs);
    let dst_chroma = &mut dst[size..size + 2 * pairs];
    for (i, out) in dst_chroma.chunks_exact_mut(2).enumerate() {
        if u_first {
            out[0] = u_plane[i];
            out[1] = v_plane[i];
        } else {
            out[0] = v_plane[i];
            out[1] = u_plane[i];
        }
    }
    Ok(())
}

/**
    Convert a frame to another layout, returning a new frame.

    Converting to the frame's own layout returns a copy.
*/
pub fn convert_frame(frame: &FrameBuffer, target: ColorLayout) -> Result<FrameBuffer> {
    let (width, height) = (frame.width(), frame.height());
    if frame.layout() == target {
        return Ok(frame.clone());
    }

    let mut out = FrameBuffer::zeroed(width, height, target);
    let src = frame.data();
    let dst = out.data_mut();
    match (frame.layout(), target) {
        (ColorLayout::Nv21, ColorLayout::Nv12) | (ColorLayout::Nv12, ColorLayout::Nv21) => {
            swap_uv(src, dst, width, height)?
        }
        (ColorLayout::Nv21, ColorLayout::I420) => nv21_to_i420(src, dst, width, height)?,
        (ColorLayout::Nv12, ColorLayout::I420) => {
            semi_planar_to_i420(src, dst, width, height, true)?
        }
        (ColorLayout::I420, ColorLayout::Nv12) => {
            i420_to_semi_planar(src, dst, width, height, true)?
        }
        (ColorLayout::I420, ColorLayout::Nv21) => {
            i420_to_semi_planar(src, dst, width, height, false)?
        }
        (from, to) => {
            return Err(Error::unsupported_format(format!(
                "no conversion from {} to {}",
                from.name(),
                to.name()
            )));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A frame whose every byte differs, so misplaced bytes are visible.
    fn patterned(width: u32, height: u32) -> Vec<u8> {
        (0..ColorLayout::Nv21.frame_len(width, height))
            .map(|i| (i * 7 + 3) as u8)
            .collect()
    }

    #[test]
    fn swap_uv_4x4() {
        let mut src: Vec<u8> = (0..16).collect();
        src.extend_from_slice(&[0xB0, 0xA0, 0xB1, 0xA1, 0xB2, 0xA2, 0xB3, 0xA3]);
        let mut dst = vec![0u8; 24];

        swap_uv(&src, &mut dst, 4, 4).unwrap();

        assert_eq!(&dst[..16], &src[..16]);
        assert_eq!(
            &dst[16..],
            &[0xA0, 0xB0, 0xA1, 0xB1, 0xA2, 0xB2, 0xA3, 0xB3]
        );
    }

    #[test]
    fn swap_uv_is_an_involution() {
        for width in (2..=12).step_by(2) {
            for height in (2..=8).step_by(2) {
                let src = patterned(width, height);
                let mut once = vec![0u8; src.len()];
                let mut twice = vec![0u8; src.len()];
                swap_uv(&src, &mut once, width, height).unwrap();
                swap_uv(&once, &mut twice, width, height).unwrap();
                assert_eq!(twice, src, "{width}x{height}");
                assert_eq!(once.len(), (width * height * 3 / 2) as usize);
            }
        }
    }

    #[test]
    fn nv21_to_i420_4x4() {
        let mut src: Vec<u8> = (0..16).collect();
        src.extend_from_slice(&[0xB0, 0xA0, 0xB1, 0xA1, 0xB2, 0xA2, 0xB3, 0xA3]);
        let mut dst = vec![0u8; 24];

        nv21_to_i420(&src, &mut dst, 4, 4).unwrap();

        assert_eq!(&dst[..16], &src[..16]);
        assert_eq!(&dst[16..20], &[0xA0, 0xA1, 0xA2, 0xA3]);
        assert_eq!(&dst[20..], &[0xB0, 0xB1, 0xB2, 0xB3]);
    }

    #[test]
    fn i420_blocks_have_equal_length() {
        let (width, height) = (8u32, 6u32);
        let src = patterned(width, height);
        let mut dst = vec![0u8; src.len()];
        nv21_to_i420(&src, &mut dst, width, height).unwrap();

        let size = (width * height) as usize;
        assert_eq!(&dst[..size], &src[..size]);
        let u_block = &dst[size..size + size / 4];
        let v_block = &dst[size + size / 4..];
        assert_eq!(u_block.len(), size / 4);
        assert_eq!(v_block.len(), size / 4);
        // U comes from the odd source bytes, V from the even ones
        assert_eq!(u_block[0], src[size + 1]);
        assert_eq!(v_block[0], src[size]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let src = vec![0u8; 23];
        let mut dst = vec![0u8; 24];
        let err = swap_uv(&src, &mut dst, 4, 4).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[test]
    fn convert_frame_round_trips_through_i420() {
        let nv21 = FrameBuffer::new(patterned(6, 4), 6, 4, ColorLayout::Nv21).unwrap();
        let i420 = convert_frame(&nv21, ColorLayout::I420).unwrap();
        let back = convert_frame(&i420, ColorLayout::Nv21).unwrap();
        assert_eq!(back, nv21);
    }

    #[test]
    fn convert_frame_nv12_matches_swap() {
        let nv21 = FrameBuffer::new(patterned(4, 4), 4, 4, ColorLayout::Nv21).unwrap();
        let nv12 = convert_frame(&nv21, ColorLayout::Nv12).unwrap();

        let mut expected = vec![0u8; 24];
        swap_uv(nv21.data(), &mut expected, 4, 4).unwrap();
        assert_eq!(nv12.data(), expected.as_slice());
        assert_eq!(nv12.layout(), ColorLayout::Nv12);
    }

    #[test]
    fn convert_frame_same_layout_copies() {
        let frame = FrameBuffer::new(patterned(2, 2), 2, 2, ColorLayout::I420).unwrap();
        assert_eq!(convert_frame(&frame, ColorLayout::I420).unwrap(), frame);
    }
}
