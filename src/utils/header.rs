use crate::error::AlignmentError;
use crate::pipeline::ImageSize;
use std::path::Path;

/// Largest side OpenCV's matrix headers accept comfortably.
pub const MAX_DIMENSION: u32 = 32_767;

/// Reads `{width, height}` from the image header without decoding pixels.
pub fn read_dimensions(path: &Path) -> Result<ImageSize, AlignmentError> {
    if !path.exists() {
        return Err(AlignmentError::decode(
            path,
            anyhow::anyhow!("Image file does not exist"),
        ));
    }
    let (width, height) =
        image::image_dimensions(path).map_err(|e| AlignmentError::decode(path, e))?;
    let size = ImageSize::new(width, height);
    validate_dimensions(size).map_err(|e| AlignmentError::decode(path, e))?;
    Ok(size)
}

/// Rejects empty or oversized images.
pub fn validate_dimensions(size: ImageSize) -> anyhow::Result<()> {
    if size.is_empty() {
        return Err(anyhow::anyhow!("Image has no pixels: {}", size));
    }
    if size.width > MAX_DIMENSION || size.height > MAX_DIMENSION {
        return Err(anyhow::anyhow!(
            "Image too large: {}, maximum side: {}",
            size,
            MAX_DIMENSION
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_reads_dimensions_from_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("header.png");
        RgbImage::from_pixel(37, 21, Rgb([1, 2, 3])).save(&path).unwrap();
        assert_eq!(read_dimensions(&path).unwrap(), ImageSize::new(37, 21));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let err = read_dimensions(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, AlignmentError::Decode { .. }));
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(read_dimensions(&path), Err(AlignmentError::Decode { .. })));
    }

    #[test]
    fn test_validate_dimensions() {
        assert!(validate_dimensions(ImageSize::new(0, 10)).is_err());
        assert!(validate_dimensions(ImageSize::new(40_000, 10)).is_err());
        assert!(validate_dimensions(ImageSize::new(800, 600)).is_ok());
    }
}
