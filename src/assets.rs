//! Raster image assets referenced by label designs.

use crate::error::LabelError;
use base64::Engine;
use std::path::Path;

/// Decoded image held as straight (non-premultiplied) RGBA8 rows, top row
/// first.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    has_alpha: bool,
    rgba: Vec<u8>,
}

impl RasterImage {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, LabelError> {
        check_len(width, height, rgba.len(), 4)?;
        let has_alpha = rgba.chunks_exact(4).any(|px| px[3] != 255);
        Ok(Self {
            width,
            height,
            has_alpha,
            rgba,
        })
    }

    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Result<Self, LabelError> {
        check_len(width, height, rgb.len(), 3)?;
        let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
        for px in rgb.chunks_exact(3) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        Ok(Self {
            width,
            height,
            has_alpha: false,
            rgba,
        })
    }

    /// Decodes PNG or JPEG bytes. `mime` is a hint; without it the format is
    /// sniffed from the data.
    pub fn decode(data: &[u8], mime: Option<&str>) -> Result<Self, LabelError> {
        let format = match mime {
            Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
            Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => {
                Some(image::ImageFormat::Jpeg)
            }
            _ => image::guess_format(data).ok(),
        };
        let decoded = match format {
            Some(fmt) => image::load_from_memory_with_format(data, fmt),
            None => image::load_from_memory(data),
        }
        .map_err(|err| LabelError::Image(err.to_string()))?;
        let has_alpha = decoded.color().has_alpha();
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            has_alpha,
            rgba: rgba.into_raw(),
        })
    }

    /// Loads an image from a `data:` URI or a file path.
    pub fn load(source: &str) -> Result<Self, LabelError> {
        if let Some((mime, data)) = parse_data_uri(source) {
            return Self::decode(&data, Some(&mime));
        }
        let data = std::fs::read(Path::new(source))?;
        Self::decode(&data, None)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when the source carried an alpha channel; selects the RGBA blit.
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn rgb_bytes(&self) -> Vec<u8> {
        self.rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect()
    }

    pub fn alpha_bytes(&self) -> Vec<u8> {
        self.rgba.chunks_exact(4).map(|px| px[3]).collect()
    }
}

fn check_len(width: u32, height: u32, len: usize, channels: usize) -> Result<(), LabelError> {
    let expected = width as usize * height as usize * channels;
    if width == 0 || height == 0 || len != expected {
        return Err(LabelError::Image(format!(
            "pixel buffer of {len} bytes does not match {width}x{height}x{channels}"
        )));
    }
    Ok(())
}

/// Splits a `data:` URI into its MIME type and payload bytes.
pub fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn png_bytes(pixel: [u8; 4]) -> Vec<u8> {
        let mut src = RgbaImage::new(2, 1);
        src.put_pixel(0, 0, image::Rgba(pixel));
        src.put_pixel(1, 0, image::Rgba(pixel));
        let mut bytes = Vec::new();
        src.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        bytes
    }

    #[test]
    fn parse_data_uri_base64_decodes_payload() {
        let (mime, data) = parse_data_uri("data:text/plain;base64,SGVsbG8=").unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(data, b"Hello");
        assert!(parse_data_uri("file.png").is_none());
    }

    #[test]
    fn decode_png_keeps_alpha_flag() {
        let img = RasterImage::decode(&png_bytes([255, 0, 0, 128]), Some("image/png")).unwrap();
        assert_eq!((img.width(), img.height()), (2, 1));
        assert!(img.has_alpha());
        assert_eq!(img.alpha_bytes(), vec![128, 128]);
        assert_eq!(img.rgb_bytes(), vec![255, 0, 0, 255, 0, 0]);
    }

    #[test]
    fn load_accepts_data_uri() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes([0, 0, 255, 255]));
        let img = RasterImage::load(&format!("data:image/png;base64,{encoded}")).unwrap();
        assert_eq!(img.rgba()[..4], [0, 0, 255, 255]);
    }

    #[test]
    fn rgb_buffers_are_opaque_and_checked() {
        let img = RasterImage::from_rgb(1, 1, &[1, 2, 3]).unwrap();
        assert!(!img.has_alpha());
        assert_eq!(img.rgba(), &[1, 2, 3, 255]);
        assert!(RasterImage::from_rgba(2, 2, vec![0; 4]).is_err());
        assert!(matches!(
            RasterImage::decode(b"not an image", None),
            Err(LabelError::Image(_))
        ));
    }
}
