use std::fmt;

use base64::Engine;
use image::{GenericImageView, ImageFormat};

use crate::error::DocxError;

pub const EMU_PER_PX: u64 = 9525;
/// Letter page minus 1in margins on both sides: 6.5in.
pub const TEXT_WIDTH_EMU: u64 = 5_943_600;
/// Letter page minus 1in margins top and bottom: 9in.
pub const TEXT_HEIGHT_EMU: u64 = 8_229_600;

#[derive(Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width_px: u32,
    pub height_px: u32,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("format", &self.format)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageData {
    /// Accepts PNG, JPEG and GIF; anything else is rejected because Word only
    /// renders a handful of raster formats without conversion.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DocxError> {
        let format = image::guess_format(&bytes).map_err(|e| DocxError::Image(e.to_string()))?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif) {
            return Err(DocxError::Image(format!("unsupported image format {format:?}")));
        }
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| DocxError::Image(e.to_string()))?;
        let (width_px, height_px) = decoded.dimensions();
        if width_px == 0 || height_px == 0 {
            return Err(DocxError::Image("image has no pixels".to_string()));
        }
        Ok(Self {
            bytes,
            format,
            width_px,
            height_px,
        })
    }

    /// Decodes `data:image/...;base64,...`. Remote and relative sources are not
    /// fetched.
    pub fn from_data_uri(src: &str) -> Option<Self> {
        let rest = src.trim().strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let meta = meta.to_ascii_lowercase();
        if !meta.starts_with("image/") || !meta.ends_with(";base64") {
            return None;
        }
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .ok()?;
        match Self::from_bytes(bytes) {
            Ok(img) => Some(img),
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable data uri image");
                None
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.format {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            _ => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            _ => "image/png",
        }
    }

    /// Size in EMU at 96 DPI, scaled down proportionally to fit the box.
    pub fn extent_emu(&self, max_width: u64, max_height: u64) -> (u64, u64) {
        let w = u64::from(self.width_px) * EMU_PER_PX;
        let h = u64::from(self.height_px) * EMU_PER_PX;
        if w <= max_width && h <= max_height {
            return (w, h);
        }
        if w * max_height > h * max_width {
            (max_width, (h * max_width / w).max(1))
        } else {
            ((w * max_height / h).max(1), max_height)
        }
    }
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
