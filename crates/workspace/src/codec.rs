//! Image and hashing collaborators used while capturing dimensions and
//! exporting layers.
//! 擷取尺寸與匯出圖層時使用的影像編解碼器與雜湊器。

use std::io;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder};
use snapws_registry::write_atomic;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("image IO error: {0}")]
    Io(#[from] io::Error),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
    #[error("unsupported pixel layout: {0}")]
    UnsupportedLayout(String),
}

/// Decoded voxel data: extent per axis, interleaved channels, 8-bit samples.
/// 解碼後的影像資料：各軸尺寸與交錯排列的 8 位元通道。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub dimensions: Vec<u64>,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    fn color_type(&self) -> Result<ColorType, CodecError> {
        match self.channels {
            1 => Ok(ColorType::L8),
            2 => Ok(ColorType::La8),
            3 => Ok(ColorType::Rgb8),
            4 => Ok(ColorType::Rgba8),
            other => Err(CodecError::UnsupportedLayout(format!("{other} channels"))),
        }
    }

    /// Width and height of a single-slice image.
    fn planar_extent(&self) -> Result<(u32, u32), CodecError> {
        let layout = || CodecError::UnsupportedLayout(format!("dimensions {:?}", self.dimensions));
        let (width, height) = match self.dimensions.as_slice() {
            [w, h] | [w, h, 1] => (*w, *h),
            _ => return Err(layout()),
        };
        let expected = width
            .checked_mul(height)
            .and_then(|area| area.checked_mul(u64::from(self.channels)))
            .ok_or_else(layout)?;
        if expected != self.pixels.len() as u64 {
            return Err(CodecError::UnsupportedLayout(format!(
                "{} bytes for {width}x{height}x{}",
                self.pixels.len(),
                self.channels
            )));
        }
        Ok((
            u32::try_from(width).map_err(|_| layout())?,
            u32::try_from(height).map_err(|_| layout())?,
        ))
    }
}

/// Reads image files referenced by layers and writes export copies.
/// 讀取圖層影像並輸出匯出用副本。
pub trait ImageCodec {
    /// Extent of the image along each axis.
    fn read_dimensions(&self, path: &Path) -> Result<Vec<u64>, CodecError>;
    fn read_pixels(&self, path: &Path) -> Result<DecodedImage, CodecError>;
    fn write_canonical(&self, image: &DecodedImage, path: &Path) -> Result<(), CodecError>;
    /// Extension (without dot) of files produced by [`ImageCodec::write_canonical`].
    fn canonical_extension(&self) -> &'static str;
}

/// Raster codec backed by the `image` crate. Any format the crate decodes is
/// accepted; exports are written as PNG. Dimensions are reported as
/// `[width, height, 1]`.
/// 以 `image` crate 實作的點陣影像編解碼器，匯出一律為 PNG。
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn read_dimensions(&self, path: &Path) -> Result<Vec<u64>, CodecError> {
        let (width, height) = image::image_dimensions(path)?;
        debug!(path = %path.display(), width, height, "read image dimensions");
        Ok(vec![u64::from(width), u64::from(height), 1])
    }

    fn read_pixels(&self, path: &Path) -> Result<DecodedImage, CodecError> {
        let decoded = image::open(path)?;
        let dimensions = vec![u64::from(decoded.width()), u64::from(decoded.height()), 1];
        let (channels, pixels) = match decoded {
            DynamicImage::ImageLuma8(buffer) => (1, buffer.into_raw()),
            DynamicImage::ImageLumaA8(buffer) => (2, buffer.into_raw()),
            DynamicImage::ImageRgb8(buffer) => (3, buffer.into_raw()),
            DynamicImage::ImageRgba8(buffer) => (4, buffer.into_raw()),
            other => (4, other.to_rgba8().into_raw()),
        };
        debug!(path = %path.display(), channels, "decoded image");
        Ok(DecodedImage {
            dimensions,
            channels,
            pixels,
        })
    }

    fn write_canonical(&self, image: &DecodedImage, path: &Path) -> Result<(), CodecError> {
        let color = image.color_type()?;
        let (width, height) = image.planar_extent()?;
        let mut data = Vec::new();
        PngEncoder::new(&mut data).write_image(&image.pixels, width, height, color)?;
        write_atomic(path, &data)?;
        debug!(path = %path.display(), width, height, "wrote canonical image");
        Ok(())
    }

    fn canonical_extension(&self) -> &'static str {
        "png"
    }
}

/// Content digest used to anonymize exported file names.
/// 匯出時用於匿名化檔名的內容雜湊。
pub trait ContentHasher {
    /// Fixed-length lowercase hex digest of `data`.
    fn hash(&self, data: &[u8]) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl ContentHasher for Blake3Hasher {
    fn hash(&self, data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }
}
