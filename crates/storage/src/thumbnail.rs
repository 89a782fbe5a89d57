//! Thumbnail generation for image-shaped generation results.

use std::io::Cursor;

use image::ImageFormat;

use crate::StorageError;

/// Longest edge of a generated thumbnail, in pixels.
pub const THUMBNAIL_MAX_DIM: u32 = 256;

/// Downscale `bytes` to a PNG thumbnail bounded by [`THUMBNAIL_MAX_DIM`].
///
/// Aspect ratio is preserved. Fails when the input is not a decodable
/// image.
pub fn make_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let img = image::load_from_memory(bytes)?;
    let thumb = img.thumbnail(THUMBNAIL_MAX_DIM, THUMBNAIL_MAX_DIM);
    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Blob key for a generation's thumbnail, next to the result itself.
pub fn thumbnail_path(user_id: i64, generation_id: i64) -> String {
    format!("generations/{user_id}/{generation_id}/thumbnail.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn thumbnail_is_bounded_and_keeps_aspect() {
        let bytes = sample_png(1024, 512);
        let thumb = make_thumbnail(&bytes).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.width(), 256);
        assert_eq!(decoded.height(), 128);
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let bytes = sample_png(64, 64);
        let thumb = make_thumbnail(&bytes).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.width(), 64);
    }

    #[test]
    fn garbage_input_fails() {
        assert!(matches!(
            make_thumbnail(b"definitely not an image"),
            Err(StorageError::Image(_))
        ));
    }

    #[test]
    fn thumbnail_path_is_deterministic() {
        assert_eq!(
            thumbnail_path(7, 42),
            "generations/7/42/thumbnail.png"
        );
    }
}
