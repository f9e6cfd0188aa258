use std::io::Cursor;

use image::{imageops::FilterType, ImageFormat};

/// Hard ceiling on the uploaded file, checked before any decoding.
pub const MAX_AVATAR_BYTES: usize = 1_000_000;

/// Stored avatars are always square PNGs of this size.
pub const AVATAR_DIMENSION: u32 = 250;

/// Filename gate, applied before the bytes are touched.
pub fn has_allowed_extension(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg") || lower.ends_with(".png")
}

/// Decode, crop-resize to 250x250, re-encode as PNG. Errors are client
/// errors: the only inputs are the uploaded bytes.
pub fn process_avatar(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(bytes)
        .map_err(|_| "File must be a valid image (jpg,jpeg,png).".to_string())?;

    let resized = img.resize_to_fill(AVATAR_DIMENSION, AVATAR_DIMENSION, FilterType::Lanczos3);

    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn extension_gate() {
        assert!(has_allowed_extension("me.jpg"));
        assert!(has_allowed_extension("me.jpeg"));
        assert!(has_allowed_extension("me.png"));
        assert!(has_allowed_extension("ME.PNG"));
        assert!(!has_allowed_extension("me.gif"));
        assert!(!has_allowed_extension("me.pdf"));
        assert!(!has_allowed_extension("jpg"));
    }

    #[test]
    fn processed_avatar_is_250_square_png() {
        let jpeg = sample_jpeg(640, 480);
        let png = process_avatar(&jpeg).expect("processing should succeed");

        let decoded = image::load_from_memory(&png).expect("output should decode");
        assert_eq!(decoded.width(), AVATAR_DIMENSION);
        assert_eq!(decoded.height(), AVATAR_DIMENSION);
        // PNG signature
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = process_avatar(b"definitely not an image").unwrap_err();
        assert!(err.contains("valid image"));
    }

    #[test]
    fn upscales_small_images_to_exact_size() {
        let jpeg = sample_jpeg(40, 60);
        let png = process_avatar(&jpeg).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (250, 250));
    }
}
