/*!
    Conversions between slowmo and FFmpeg types.
*/

use ffmpeg_next::{
    Rational as AvRational,
    codec::Id as AvCodecId,
    format::Pixel,
    util::error::{EAGAIN, Error as AvError},
};

use slowmo_types::{CodecId, ColorLayout, Rational};

/**
    Get the FFmpeg codec id for a codec.
*/
pub(crate) fn codec_to_ffmpeg(codec: CodecId) -> AvCodecId {
    match codec {
        CodecId::H264 => AvCodecId::H264,
        CodecId::H265 => AvCodecId::HEVC,
        CodecId::Vp8 => AvCodecId::VP8,
        CodecId::Vp9 => AvCodecId::VP9,
        CodecId::Av1 => AvCodecId::AV1,
        CodecId::Mpeg4 => AvCodecId::MPEG4,
    }
}

/**
    Get the codec for an FFmpeg codec id, if it is one we handle.
*/
pub(crate) fn codec_from_ffmpeg(id: AvCodecId) -> Option<CodecId> {
    match id {
        AvCodecId::H264 => Some(CodecId::H264),
        AvCodecId::HEVC => Some(CodecId::H265),
        AvCodecId::VP8 => Some(CodecId::Vp8),
        AvCodecId::VP9 => Some(CodecId::Vp9),
        AvCodecId::AV1 => Some(CodecId::Av1),
        AvCodecId::MPEG4 => Some(CodecId::Mpeg4),
        _ => None,
    }
}

/**
    Get the FFmpeg pixel format with the same byte layout.
*/
pub(crate) fn layout_to_pixel(layout: ColorLayout) -> Pixel {
    match layout {
        ColorLayout::Nv21 => Pixel::NV21,
        ColorLayout::Nv12 => Pixel::NV12,
        ColorLayout::I420 => Pixel::YUV420P,
    }
}

pub(crate) fn rational_to_ffmpeg(value: Rational) -> AvRational {
    AvRational::new(value.num, value.den)
}

/**
    Convert an FFmpeg rational, returning `None` for an unset (0/x or x/0) value.
*/
pub(crate) fn rational_from_ffmpeg(value: AvRational) -> Option<Rational> {
    if value.numerator() == 0 || value.denominator() == 0 {
        return None;
    }
    Some(Rational::new(value.numerator(), value.denominator()))
}

/**
    Returns true if FFmpeg asks to retry after draining the other side.
*/
pub(crate) fn is_again(err: &AvError) -> bool {
    matches!(err, AvError::Other { errno } if *errno == EAGAIN)
}

/**
    Copy `rows` rows of `row_len` bytes between buffers with different
    row strides.
*/
pub(crate) fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    row_len: usize,
    rows: usize,
) {
    for row in 0..rows {
        let from = &src[row * src_stride..row * src_stride + row_len];
        dst[row * dst_stride..row * dst_stride + row_len].copy_from_slice(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_ids_round_trip() {
        for codec in [
            CodecId::H264,
            CodecId::H265,
            CodecId::Vp8,
            CodecId::Vp9,
            CodecId::Av1,
            CodecId::Mpeg4,
        ] {
            assert_eq!(codec_from_ffmpeg(codec_to_ffmpeg(codec)), Some(codec));
        }
        assert_eq!(codec_from_ffmpeg(AvCodecId::MJPEG), None);
    }

    #[test]
    fn unset_rationals_are_none() {
        assert_eq!(rational_from_ffmpeg(AvRational::new(0, 1)), None);
        assert_eq!(rational_from_ffmpeg(AvRational::new(30, 0)), None);
        assert_eq!(
            rational_from_ffmpeg(AvRational::new(30000, 1001)),
            Some(Rational::new(30000, 1001))
        );
    }

    #[test]
    fn copy_rows_into_wider_stride() {
        let src = [1, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 10];
        copy_rows(&src, 3, &mut dst, 5, 3, 2);
        assert_eq!(dst, [1, 2, 3, 0, 0, 4, 5, 6, 0, 0]);
    }

    #[test]
    fn eagain_is_detected() {
        assert!(is_again(&AvError::Other { errno: EAGAIN }));
        assert!(!is_again(&AvError::Eof));
    }

    #[test]
    fn layouts_map_to_pixel_formats() {
        assert_eq!(layout_to_pixel(ColorLayout::Nv12), Pixel::NV12);
        assert_eq!(layout_to_pixel(ColorLayout::I420), Pixel::YUV420P);
    }
}
