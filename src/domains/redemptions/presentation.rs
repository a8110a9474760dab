use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

use super::models::RedemptionError;

/// Edge length of rendered codes, in pixels.
const QR_SIZE: u32 = 320;

/// Turns an issued claim into what the holder shows at the counter.
#[derive(Debug, Clone)]
pub struct QrPresenter {
    landing_base_url: String,
}

impl QrPresenter {
    pub fn new(landing_base_url: impl Into<String>) -> Self {
        Self {
            landing_base_url: landing_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Content encoded in the QR: `<base>/r/<token>`.
    pub fn payload(&self, token: &str) -> String {
        format!("{}/r/{}", self.landing_base_url, token)
    }

    pub fn render_png(&self, token: &str) -> Result<Vec<u8>, RedemptionError> {
        let payload = self.payload(token);
        let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
            .map_err(|e| RedemptionError::Presentation(e.to_string()))?;

        let img = code
            .render::<Luma<u8>>()
            .min_dimensions(QR_SIZE, QR_SIZE)
            .build();

        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| RedemptionError::Presentation(e.to_string()))?;
        Ok(buffer.into_inner())
    }

    pub fn render_base64(&self, token: &str) -> Result<String, RedemptionError> {
        Ok(STANDARD.encode(self.render_png(token)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::redemptions::codes::generate_token;

    #[test]
    fn test_payload_format() {
        let presenter = QrPresenter::new("https://deals.example.com/");
        assert_eq!(presenter.payload("abc123"), "https://deals.example.com/r/abc123");
    }

    #[test]
    fn test_render_png_is_decodable() {
        let presenter = QrPresenter::new("https://deals.example.com");
        let token = generate_token();
        let png = presenter.render_png(&token).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let gray = image::load_from_memory(&png).unwrap().to_luma8();
        let mut prepared = rqrr::PreparedImage::prepare(gray);
        let grids = prepared.detect_grids();
        assert_eq!(grids.len(), 1);
        let (_meta, content) = grids[0].decode().unwrap();
        assert_eq!(content, presenter.payload(&token));
    }
}
