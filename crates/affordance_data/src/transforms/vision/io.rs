use crate::error::PipelineError;
use crate::transforms::Transform;
use anyhow::Result;
use image::{DynamicImage, ImageReader, RgbImage};
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

// ============================================================================
// LoadImage
// ============================================================================

/// Reads an image file and decodes it to 8-bit RGB.
///
/// The format is sniffed from the file contents rather than trusted from
/// the extension. Grayscale, RGBA and 16-bit sources are converted to RGB8.
/// Every failure, including a missing file, is reported as
/// [`PipelineError::Decode`].
///
/// # Example
/// ```ignore
/// let image = LoadImage::new().apply(PathBuf::from("rgb/0001.png"))?;
/// println!("{:?}", image.dimensions());
/// ```
#[derive(Debug, Clone)]
pub struct LoadImage {
    buffer_size: usize,
}

impl LoadImage {
    /// Creates a loader with an 8KB read buffer.
    pub fn new() -> Self {
        Self { buffer_size: 8192 }
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        let file = File::open(path)
            .map_err(|e| PipelineError::decode(path, format!("cannot open image: {e}")))?;
        let capacity = file.metadata().map(|m| m.len() as usize).unwrap_or(0);
        let mut reader = BufReader::with_capacity(self.buffer_size, file);
        let mut buffer = Vec::with_capacity(capacity);
        reader
            .read_to_end(&mut buffer)
            .map_err(|e| PipelineError::decode(path, format!("cannot read image: {e}")))?;
        Ok(buffer)
    }

    /// Decodes the image at `path` to RGB8.
    pub fn load(&self, path: &Path) -> Result<RgbImage> {
        let buffer = self.read_bytes(path)?;
        let image = ImageReader::new(Cursor::new(buffer))
            .with_guessed_format()
            .map_err(|e| PipelineError::decode(path, format!("cannot detect image format: {e}")))?
            .decode()
            .map_err(|e| PipelineError::decode(path, e.to_string()))?;

        Ok(match image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        })
    }
}

impl Default for LoadImage {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform<PathBuf, RgbImage> for LoadImage {
    fn apply(&self, path: PathBuf) -> Result<RgbImage> {
        self.load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};
    use tempfile::NamedTempFile;

    fn create_test_image() -> Result<NamedTempFile> {
        let mut test_img = RgbImage::new(3, 2);
        test_img.put_pixel(0, 0, Rgb([255, 0, 0])); // Red
        test_img.put_pixel(1, 1, Rgb([0, 255, 0])); // Green
        test_img.put_pixel(2, 1, Rgb([0, 0, 255])); // Blue

        let temp_file = NamedTempFile::with_suffix(".png")?;
        test_img.save(temp_file.path())?;
        Ok(temp_file)
    }

    #[test]
    fn test_load_image() -> Result<()> {
        let temp_file = create_test_image()?;
        let loaded = LoadImage::new().apply(temp_file.path().to_path_buf())?;

        assert_eq!(loaded.dimensions(), (3, 2));
        assert_eq!(loaded.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(loaded.get_pixel(1, 1), &Rgb([0, 255, 0]));
        assert_eq!(loaded.get_pixel(2, 1), &Rgb([0, 0, 255]));
        Ok(())
    }

    #[test]
    fn test_load_grayscale_expands_to_rgb() -> Result<()> {
        let gray = GrayImage::from_pixel(2, 2, Luma([77]));
        let temp_file = NamedTempFile::with_suffix(".png")?;
        gray.save(temp_file.path())?;

        let loaded = LoadImage::new().load(temp_file.path())?;
        assert_eq!(loaded.get_pixel(1, 1), &Rgb([77, 77, 77]));
        Ok(())
    }

    #[test]
    fn test_load_errors_are_decode_errors() -> Result<()> {
        let loader = LoadImage::new();

        let err = loader.apply(PathBuf::from("nonexistent.png")).unwrap_err();
        assert!(matches!(
            PipelineError::classify(&err),
            Some(PipelineError::Decode { .. })
        ));

        let garbage = NamedTempFile::with_suffix(".png")?;
        std::fs::write(garbage.path(), b"definitely not a png")?;
        let err = loader.load(garbage.path()).unwrap_err();
        assert!(matches!(
            PipelineError::classify(&err),
            Some(PipelineError::Decode { .. })
        ));
        Ok(())
    }
}
