use std::fmt::{Display, Formatter};

use image::ImageFormat;
use tracing::debug;

pub mod cache_policy;
pub mod error;
pub mod health;
pub mod image_path;
pub mod server_timing;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// The tier an image's bytes originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Remote,
    Local,
}

impl Display for ImageSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Remote => write!(f, "r2"),
            ImageSource::Local => write!(f, "local"),
        }
    }
}

/// MIME type for a file name, decided by its extension alone.
pub fn content_type_for(path: &str) -> &'static str {
    match ImageFormat::from_path(path) {
        Ok(format) => format.to_mime_type(),
        Err(_) if path.to_ascii_lowercase().ends_with(".svg") => "image/svg+xml",
        Err(_) => {
            debug!("No known image format for {path}");
            FALLBACK_CONTENT_TYPE
        }
    }
}

/// Prefer the store's content type unless it is missing or the generic binary type.
pub fn pick_content_type(stored: Option<&str>, path: &str) -> String {
    match stored.map(str::trim) {
        Some(ct) if !ct.is_empty() && ct != FALLBACK_CONTENT_TYPE => ct.to_string(),
        _ => content_type_for(path).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("logos/company-logo.png"), "image/png");
        assert_eq!(content_type_for("hero/banner-home.jpg"), "image/jpeg");
        assert_eq!(content_type_for("team/alex.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("portfolio/shot.webp"), "image/webp");
        assert_eq!(content_type_for("icons/arrow.svg"), "image/svg+xml");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
    }

    #[test]
    fn store_content_type_wins_unless_generic() {
        assert_eq!(pick_content_type(Some("image/avif"), "a.png"), "image/avif");
        assert_eq!(
            pick_content_type(Some("application/octet-stream"), "a.png"),
            "image/png"
        );
        assert_eq!(pick_content_type(None, "a.webp"), "image/webp");
        assert_eq!(pick_content_type(Some("  "), "a.jpg"), "image/jpeg");
    }
}
