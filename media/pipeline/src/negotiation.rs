/*!
    Decoder color format negotiation.
*/

use slowmo_types::ColorFormat;

/**
    The decoder output format the pipeline asks for.

    With the flexible format, pictures are exposed through per-plane
    strides and can be extracted regardless of the device's internal layout.
*/
pub const PREFERRED_DECODE_FORMAT: ColorFormat = ColorFormat::Yuv420Flexible;

/**
    Pick the color format to request from a device.

    Returns `Some(requested)` if the device advertises it, otherwise `None`,
    meaning the device should keep its default format.
*/
pub fn negotiate(requested: ColorFormat, supported: &[ColorFormat]) -> Option<ColorFormat> {
    supported.contains(&requested).then_some(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_format_present() {
        let supported = [
            ColorFormat::Yuv420SemiPlanar,
            ColorFormat::Yuv420Flexible,
            ColorFormat::Other(0x7FA3_0C04),
        ];
        assert_eq!(
            negotiate(ColorFormat::Yuv420Flexible, &supported),
            Some(ColorFormat::Yuv420Flexible)
        );
    }

    #[test]
    fn requested_format_missing_falls_back_to_default() {
        let supported = [ColorFormat::Yuv420SemiPlanar, ColorFormat::Yuv420Planar];
        assert_eq!(negotiate(ColorFormat::Yuv420Flexible, &supported), None);
    }

    #[test]
    fn empty_capability_list() {
        assert_eq!(negotiate(PREFERRED_DECODE_FORMAT, &[]), None);
    }

    #[test]
    fn unknown_codes_compare_by_value() {
        let supported = [ColorFormat::from_code(0x7FA3_0C04)];
        assert_eq!(
            negotiate(ColorFormat::Other(0x7FA3_0C04), &supported),
            Some(ColorFormat::Other(0x7FA3_0C04))
        );
    }
}
