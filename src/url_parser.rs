//! Parser for turning Google Drive / Docs URLs into resource references.

use std::fmt;

use reqwest::Url;

use crate::error::{DriveError, Result};

/// What a storage URL points at, taken from its first path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Drive,
    Folders,
    File,
    Document,
    Spreadsheets,
    Presentation,
    Forms,
    Other(String),
}

impl ResourceKind {
    fn from_segment(segment: &str) -> Self {
        match segment {
            "drive" => ResourceKind::Drive,
            "folders" => ResourceKind::Folders,
            "file" => ResourceKind::File,
            "document" => ResourceKind::Document,
            "spreadsheets" => ResourceKind::Spreadsheets,
            "presentation" => ResourceKind::Presentation,
            "forms" => ResourceKind::Forms,
            other => ResourceKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Drive => "drive",
            ResourceKind::Folders => "folders",
            ResourceKind::File => "file",
            ResourceKind::Document => "document",
            ResourceKind::Spreadsheets => "spreadsheets",
            ResourceKind::Presentation => "presentation",
            ResourceKind::Forms => "forms",
            ResourceKind::Other(s) => s,
        }
    }

    /// Whether the id names something with children rather than a single item.
    pub fn is_container(&self) -> bool {
        matches!(self, ResourceKind::Drive | ResourceKind::Folders)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource kind and id parsed from a storage URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

/// Parse a storage URL into a [`ResourceRef`].
///
/// The kind is the first path segment and the id the third, so
/// `/drive/folders/<ID>`, `/file/d/<ID>/view` and `/spreadsheets/d/<ID>/edit`
/// all resolve. An account selector right after the kind (`/drive/u/0/...`)
/// is dropped first. Query strings and fragments never take part.
///
/// # Examples
///
/// ```
/// use drive_fetch::url_parser::{parse, ResourceKind};
///
/// let r = parse("https://drive.google.com/drive/folders/1abc123").unwrap();
/// assert_eq!(r.kind, ResourceKind::Drive);
/// assert_eq!(r.id, "1abc123");
///
/// let r = parse("https://docs.google.com/document/d/1xyz/edit").unwrap();
/// assert_eq!(r.kind, ResourceKind::Document);
/// assert_eq!(r.id, "1xyz");
/// ```
pub fn parse(url: &str) -> Result<ResourceRef> {
    let invalid = |reason: &str| DriveError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|e| invalid(&e.to_string()))?;
    let mut segments: Vec<&str> = parsed
        .path_segments()
        .ok_or_else(|| invalid("URL has no path"))?
        .collect();

    if is_account_selector(&segments) {
        segments.drain(1..3);
    }

    if segments.len() < 3 {
        return Err(invalid("expected at least 3 path segments (/<kind>/<...>/<id>)"));
    }

    let kind = segments[0];
    let id = segments[2];
    if kind.is_empty() {
        return Err(invalid("empty resource kind"));
    }
    if id.is_empty() {
        return Err(invalid("empty resource id"));
    }

    Ok(ResourceRef {
        kind: ResourceKind::from_segment(kind),
        id: id.to_string(),
    })
}

/// `/<kind>/u/<n>/...`
fn is_account_selector(segments: &[&str]) -> bool {
    segments.len() > 3
        && segments[1] == "u"
        && !segments[2].is_empty()
        && segments[2].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_folder_url() {
        let r = parse("https://drive.google.com/drive/folders/1abc123XYZ").unwrap();
        assert_eq!(r.kind, ResourceKind::Drive);
        assert_eq!(r.id, "1abc123XYZ");
        assert!(r.kind.is_container());
    }

    #[test]
    fn test_parse_folder_url_with_user() {
        let r = parse("https://drive.google.com/drive/u/0/folders/1abc123XYZ").unwrap();
        assert_eq!(r.kind, ResourceKind::Drive);
        assert_eq!(r.id, "1abc123XYZ");

        let r = parse("https://drive.google.com/drive/u/2/folders/1abc123XYZ").unwrap();
        assert_eq!(r.id, "1abc123XYZ");
    }

    #[test]
    fn test_parse_file_url() {
        let r = parse("https://drive.google.com/file/d/1abc123XYZ/view?usp=sharing").unwrap();
        assert_eq!(r.kind, ResourceKind::File);
        assert_eq!(r.id, "1abc123XYZ");
        assert!(!r.kind.is_container());
    }

    #[test]
    fn test_parse_short_path() {
        assert!(parse("https://drive.google.com/drive/folders").is_err());
        assert!(parse("https://drive.google.com/").is_err());
        assert!(parse("not a url").is_err());
    }

    #[test]
    fn test_parse_trailing_slash_means_empty_id() {
        assert!(parse("https://drive.google.com/drive/folders/").is_err());
    }
}
