//! HEIC decoding and JPEG encoding.
//!
//! No metadata survives this step; EXIF is applied afterwards by
//! [`crate::exif::write_exif`].

use anyhow::{Context, Result};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Converts one source image file into a JPEG file.
pub trait ImageCodec {
    fn convert(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// Interleaved 8-bit RGB pixels as handed out by the decoder.
///
/// Rows may be padded: each starts `stride` bytes after the previous one.
#[derive(Debug)]
pub struct RawRgb<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: &'a [u8],
}

impl RawRgb<'_> {
    /// Copy the pixels into a tightly packed image, dropping row padding.
    pub fn to_image(&self) -> Result<RgbImage> {
        if self.width == 0 || self.height == 0 || self.stride == 0 {
            anyhow::bail!(
                "Empty image: {}x{} (stride {})",
                self.width,
                self.height,
                self.stride
            );
        }
        let row_len = self.width as usize * 3;
        if self.stride < row_len {
            anyhow::bail!("Stride {} is shorter than a {}-pixel row", self.stride, self.width);
        }
        let needed = self.stride * (self.height as usize - 1) + row_len;
        if self.data.len() < needed {
            anyhow::bail!(
                "Pixel buffer too short: {} bytes for {}x{} (stride {})",
                self.data.len(),
                self.width,
                self.height,
                self.stride
            );
        }

        let mut packed = Vec::with_capacity(row_len * self.height as usize);
        for row in self.data.chunks(self.stride).take(self.height as usize) {
            packed.extend_from_slice(&row[..row_len]);
        }

        RgbImage::from_raw(self.width, self.height, packed)
            .context("Pixel buffer does not match image dimensions")
    }
}

/// Encode `image` as a JPEG file at `path`.
pub fn save_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
    image
        .write_with_encoder(encoder)
        .with_context(|| format!("Failed to encode JPEG {}", path.display()))?;
    Ok(())
}

/// HEIC/HEIF decoder backed by libheif.
pub struct HeifCodec {
    lib: LibHeif,
    quality: u8,
}

impl HeifCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            lib: LibHeif::new(),
            quality,
        }
    }

    /// Decode the primary image of a HEIC container to packed RGB.
    pub fn decode(&self, path: &Path) -> Result<RgbImage> {
        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 path: {}", path.display()))?;
        let ctx = HeifContext::read_from_file(path_str)
            .with_context(|| format!("Failed to read HEIF container {}", path.display()))?;
        let handle = ctx
            .primary_image_handle()
            .context("Failed to get primary image handle")?;

        let decoded = self
            .lib
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .with_context(|| format!("Failed to decode {}", path.display()))?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .context("Decoder returned no interleaved RGB plane")?;
        log::debug!(
            "  Decoded {}x{} (stride {}, {} bpp)",
            plane.width,
            plane.height,
            plane.stride,
            plane.bits_per_pixel
        );

        RawRgb {
            width: plane.width,
            height: plane.height,
            stride: plane.stride,
            data: plane.data,
        }
        .to_image()
    }
}

impl ImageCodec for HeifCodec {
    fn convert(&self, source: &Path, destination: &Path) -> Result<()> {
        let image = self.decode(source)?;
        save_jpeg(&image, destination, self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn packed_rows_round_trip() {
        let data: Vec<u8> = (0..12).collect();
        let raw = RawRgb { width: 2, height: 2, stride: 6, data: &data };
        let img = raw.to_image().unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 1).0, [9, 10, 11]);
    }

    #[test]
    fn padded_rows_are_trimmed() {
        // 1 pixel wide, 2 rows, stride 4 (one padding byte per row)
        let data = [1, 2, 3, 0xFF, 4, 5, 6, 0xFF];
        let raw = RawRgb { width: 1, height: 2, stride: 4, data: &data };
        let img = raw.to_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(img.get_pixel(0, 1).0, [4, 5, 6]);
    }

    #[test]
    fn last_row_may_omit_padding() {
        let data = [1, 2, 3, 0, 4, 5, 6];
        let raw = RawRgb { width: 1, height: 2, stride: 4, data: &data };
        assert!(raw.to_image().is_ok());
    }

    #[test]
    fn short_buffer_is_an_error() {
        let data = [0u8; 5];
        let raw = RawRgb { width: 1, height: 2, stride: 3, data: &data };
        assert!(raw.to_image().is_err());
    }

    #[test]
    fn stride_shorter_than_row_is_an_error() {
        let data = [0u8; 12];
        let raw = RawRgb { width: 2, height: 2, stride: 4, data: &data };
        assert!(raw.to_image().is_err());
    }

    #[test]
    fn empty_dimensions_are_an_error() {
        let data = [0u8; 6];
        let zero_stride = RawRgb { width: 0, height: 2, stride: 0, data: &data };
        assert!(zero_stride.to_image().is_err());
        let no_rows = RawRgb { width: 2, height: 0, stride: 6, data: &data };
        assert!(no_rows.to_image().is_err());
    }

    #[test]
    fn save_jpeg_writes_a_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jpg");
        let img = RgbImage::from_pixel(8, 8, image::Rgb([200, 30, 30]));

        save_jpeg(&img, &path, 85).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn corrupt_heic_fails() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("broken.HEIC");
        std::fs::write(&src, b"definitely not a heif container").unwrap();

        let codec = HeifCodec::new(90);
        assert!(codec.convert(&src, &dir.path().join("broken.jpg")).is_err());
    }
}
