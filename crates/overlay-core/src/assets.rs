//! Image asset loading
//!
//! [`AssetDecoder`] turns an [`ImageRef`] into raw file bytes; [`RasterImage`]
//! turns those bytes into something a PDF image XObject can hold. PNG is
//! decoded and re-compressed with Flate (alpha split into a soft mask), JPEG
//! is passed through untouched as DCT data.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{OverlayError, OverlayResult};
use crate::geometry::ImageRef;

/// Resolves image references to encoded image bytes
#[async_trait]
pub trait AssetDecoder: Send + Sync {
    async fn decode(&self, image: &ImageRef) -> OverlayResult<Vec<u8>>;
}

/// Decodes `data:` URLs inline and reads anything else from disk
#[derive(Debug, Clone, Default)]
pub struct DataUrlDecoder {
    base_dir: Option<PathBuf>,
}

impl DataUrlDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative file paths against `dir`
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl AssetDecoder for DataUrlDecoder {
    async fn decode(&self, image: &ImageRef) -> OverlayResult<Vec<u8>> {
        let reference = image.as_str();
        if reference.starts_with("data:") {
            return decode_data_url(reference);
        }

        let mut path = PathBuf::from(reference);
        if path.is_relative() {
            if let Some(base) = &self.base_dir {
                path = base.join(path);
            }
        }
        tokio::fs::read(&path)
            .await
            .map_err(|e| OverlayError::AssetError(format!("{}: {}", path.display(), e)))
    }
}

/// Decode a base64 `data:` URL into its payload
pub fn decode_data_url(url: &str) -> OverlayResult<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| OverlayError::AssetError("Not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| OverlayError::AssetError("Data URL has no payload".to_string()))?;
    if !header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        return Err(OverlayError::AssetError(
            "Only base64 data URLs are supported".to_string(),
        ));
    }

    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| OverlayError::AssetError(format!("Invalid base64 in data URL: {}", e)))
}

/// PDF color space of decoded samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ColorSpace::Gray => "DeviceGray",
            ColorSpace::Rgb => "DeviceRGB",
            ColorSpace::Cmyk => "DeviceCMYK",
        }
    }
}

/// Stream filter the sample data is encoded with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Flate,
    Dct,
}

impl ImageFilter {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ImageFilter::Flate => "FlateDecode",
            ImageFilter::Dct => "DCTDecode",
        }
    }
}

/// Image ready to be written as an XObject
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub filter: ImageFilter,
    /// Encoded sample data (8 bits per component)
    pub data: Vec<u8>,
    /// Flate-compressed 8-bit alpha channel, if the image has one
    pub soft_mask: Option<Vec<u8>>,
}

impl RasterImage {
    /// Sniff the format and decode
    pub fn from_bytes(bytes: &[u8]) -> OverlayResult<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Self::from_png(bytes)
        } else if bytes.starts_with(&[0xFF, 0xD8]) {
            Self::from_jpeg(bytes)
        } else {
            Err(OverlayError::AssetError(
                "Unsupported image format (expected PNG or JPEG)".to_string(),
            ))
        }
    }

    fn from_png(bytes: &[u8]) -> OverlayResult<Self> {
        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|e| OverlayError::AssetError(format!("Invalid PNG: {}", e)))?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| OverlayError::AssetError(format!("Invalid PNG: {}", e)))?;
        buf.truncate(info.buffer_size());

        let (color_space, channels, has_alpha) = match info.color_type {
            png::ColorType::Grayscale => (ColorSpace::Gray, 1, false),
            png::ColorType::GrayscaleAlpha => (ColorSpace::Gray, 2, true),
            png::ColorType::Rgb => (ColorSpace::Rgb, 3, false),
            png::ColorType::Rgba => (ColorSpace::Rgb, 4, true),
            png::ColorType::Indexed => {
                return Err(OverlayError::AssetError(
                    "Indexed PNG was not expanded".to_string(),
                ))
            }
        };

        let (color, alpha) = if has_alpha {
            let color_channels = channels - 1;
            let pixels = buf.len() / channels;
            let mut color = Vec::with_capacity(pixels * color_channels);
            let mut alpha = Vec::with_capacity(pixels);
            for pixel in buf.chunks_exact(channels) {
                color.extend_from_slice(&pixel[..color_channels]);
                alpha.push(pixel[color_channels]);
            }
            (color, Some(alpha))
        } else {
            (buf, None)
        };

        let soft_mask = match alpha {
            // fully opaque masks add nothing
            Some(alpha) if alpha.iter().any(|&a| a != 0xFF) => Some(deflate(&alpha)?),
            _ => None,
        };

        Ok(Self {
            width: info.width,
            height: info.height,
            color_space,
            filter: ImageFilter::Flate,
            data: deflate(&color)?,
            soft_mask,
        })
    }

    fn from_jpeg(bytes: &[u8]) -> OverlayResult<Self> {
        let (width, height, components) = jpeg_dimensions(bytes).ok_or_else(|| {
            OverlayError::AssetError("JPEG has no readable frame header".to_string())
        })?;
        let color_space = match components {
            1 => ColorSpace::Gray,
            3 => ColorSpace::Rgb,
            4 => ColorSpace::Cmyk,
            n => {
                return Err(OverlayError::AssetError(format!(
                    "JPEG with {} components is not supported",
                    n
                )))
            }
        };
        Ok(Self {
            width,
            height,
            color_space,
            filter: ImageFilter::Dct,
            data: bytes.to_vec(),
            soft_mask: None,
        })
    }
}

/// Width, height and component count from the first SOF marker
fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let segment = bytes.get(pos + 4..pos + 2 + length)?;
            if segment.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
            let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
            return Some((width, height, segment[5]));
        }
        pos += 2 + length;
    }
    None
}

pub(crate) fn deflate(data: &[u8]) -> OverlayResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| OverlayError::WriterError(format!("Compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| OverlayError::WriterError(format!("Compression failed: {}", e)))
}

#[cfg(test)]
pub(crate) mod test_images {
    /// Encode an RGBA image as PNG
    pub fn rgba_png(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data: Vec<u8> = (0..width * height).flat_map(|_| pixel).collect();
            writer.write_image_data(&data).unwrap();
        }
        out
    }

    /// Minimal JPEG header: SOI, APP0 stub, SOF0 with the given geometry
    pub fn jpeg_header(width: u16, height: u16, components: u8) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00];
        out.extend_from_slice(&[0xFF, 0xC0, 0x00, 8 + 3 * components as u8, 8]);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.push(components);
        for id in 0..components {
            out.extend_from_slice(&[id + 1, 0x11, 0]);
        }
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }
}
