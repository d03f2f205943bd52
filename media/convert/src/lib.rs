/*!
    Pixel layout conversion for the slowmo transcoding crates.

    This crate turns decoded pictures into flat frame buffers and moves
    frame buffers between 4:2:0 layouts. Every function is pure: no state,
    no I/O, no FFmpeg.

    # Extraction

    Decoders hand out pictures as up to three planes with arbitrary row
    and pixel strides plus a crop rectangle. [`extract`] copies the valid
    region into a tightly packed [`FrameBuffer`]:

    ```ignore
    use slowmo_convert::extract;
    use slowmo_types::ColorLayout;

    let image = decoder.acquire_image(&slot)?;
    let frame = extract(&image, ColorLayout::Nv21)?;
    ```

    Rows whose samples are already contiguous and land contiguously in the
    output are bulk-copied, everything else (interleaved chroma, padded
    samples) is copied sample by sample.

    # Layout Conversion

    - [`swap_uv`] - NV21 ⇄ NV12, swaps each chroma pair (an involution)
    - [`nv21_to_i420`] - de-interleaves NV21 chroma into U and V planes
    - [`convert_frame`] - any supported layout to any other
*/

pub use slowmo_types::{ColorLayout, DecodedImage, Error, FrameBuffer, Plane, Result};

mod chroma;
mod extract;

pub use chroma::{convert_frame, i420_to_semi_planar, nv21_to_i420, semi_planar_to_i420, swap_uv};
pub use extract::extract;
