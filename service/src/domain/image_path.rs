use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::{Display, Formatter};
use thiserror::Error;

lazy_static! {
    static ref FILE_NAME: Regex = Regex::new(r"^[a-zA-Z0-9._-]+\.(jpg|jpeg|png|webp)$").unwrap();
    static ref DIRECTORY: Regex = Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap();
}

const FORBIDDEN_SEQUENCES: [&str; 5] = ["..", "~", "<", ">", "\""];
const CRITICAL_MARKERS: [&str; 2] = ["hero", "banner"];
const STATIC_MARKERS: [&str; 2] = ["logos", "icons"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("path contains forbidden sequence `{0}`")]
    ForbiddenSequence(&'static str),
    #[error("path is empty")]
    Empty,
    #[error("path contains an empty segment")]
    EmptySegment,
    #[error("directory `{0}` contains disallowed characters")]
    InvalidDirectory(String),
    #[error("file name `{0}` is not an allowed image name")]
    InvalidFileName(String),
}

/// A relative image key that passed the allow-list, e.g. `logos/company-logo.png`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImagePath(String);

impl ImagePath {
    /// Validates a raw request path. `prefix` is the route the proxy is mounted
    /// under and is stripped before the allow-list is applied.
    pub fn parse(raw: &str, prefix: &str) -> Result<ImagePath, PathRejection> {
        if let Some(sequence) = FORBIDDEN_SEQUENCES.into_iter().find(|s| raw.contains(s)) {
            return Err(PathRejection::ForbiddenSequence(sequence));
        }

        let prefix = prefix.trim_matches('/');
        let relative = raw.trim_start_matches('/');
        let relative = match relative.strip_prefix(prefix) {
            Some(rest) if !prefix.is_empty() && rest.starts_with('/') => &rest[1..],
            _ => relative,
        };
        if relative.is_empty() {
            return Err(PathRejection::Empty);
        }

        let mut segments: Vec<&str> = relative.split('/').collect();
        let file_name = segments.pop().unwrap_or_default();
        if file_name.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(PathRejection::EmptySegment);
        }
        // `.` segments are dropped by URL normalisation, so they would alias other keys
        if let Some(dir) = segments
            .iter()
            .find(|s| !DIRECTORY.is_match(s) || s.chars().all(|c| c == '.'))
        {
            return Err(PathRejection::InvalidDirectory(dir.to_string()));
        }
        if !FILE_NAME.is_match(file_name) {
            return Err(PathRejection::InvalidFileName(file_name.to_string()));
        }

        Ok(ImagePath(relative.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Hero images and banners sit above the fold.
    pub fn is_critical(&self) -> bool {
        self.contains_any(&CRITICAL_MARKERS)
    }

    /// Logos and icons never change once published.
    pub fn is_static_asset(&self) -> bool {
        self.contains_any(&STATIC_MARKERS)
    }

    fn contains_any(&self, markers: &[&str]) -> bool {
        let lower = self.0.to_ascii_lowercase();
        markers.iter().any(|m| lower.contains(m))
    }
}

impl Display for ImagePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
