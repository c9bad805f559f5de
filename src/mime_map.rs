//! Export formats for Google-native documents.
//!
//! Docs, Sheets, Slides and friends have no raw bytes; Drive only hands them
//! out converted. [`MimeMap`] decides which format each one is exported as.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Target format for exporting a Google-native document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFormat {
    pub mime_type: String,
    /// File extension without the leading dot.
    pub extension: String,
}

impl ExportFormat {
    pub fn new(mime_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            extension: extension.into(),
        }
    }

    /// Build a format whose extension is derived from the mime type.
    pub fn from_mime(mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let extension = extension_for(&mime_type);
        Self {
            mime_type,
            extension,
        }
    }
}

/// Best-known extension for `mime_type`, falling back to its subtype.
pub fn extension_for(mime_type: &str) -> String {
    if let Some(ext) = mime_guess::get_mime_extensions_str(mime_type).and_then(|e| e.first()) {
        return (*ext).to_string();
    }
    mime_type
        .split_once('/')
        .map(|(_, subtype)| subtype)
        .unwrap_or(mime_type)
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Export override as written in the config file; `extension` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOverride {
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl From<ExportOverride> for ExportFormat {
    fn from(o: ExportOverride) -> Self {
        match o.extension {
            Some(extension) => ExportFormat::new(o.mime_type, extension),
            None => ExportFormat::from_mime(o.mime_type),
        }
    }
}

/// Maps Google-native mime types to the format they are exported as.
#[derive(Debug, Clone)]
pub struct MimeMap {
    formats: HashMap<String, ExportFormat>,
}

impl Default for MimeMap {
    fn default() -> Self {
        let formats = [
            (
                "application/vnd.google-apps.document",
                ExportFormat::new(
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    "docx",
                ),
            ),
            (
                "application/vnd.google-apps.spreadsheet",
                ExportFormat::new(
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                    "xlsx",
                ),
            ),
            (
                "application/vnd.google-apps.presentation",
                ExportFormat::new(
                    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                    "pptx",
                ),
            ),
            (
                "application/vnd.google-apps.drawing",
                ExportFormat::new("image/png", "png"),
            ),
            (
                "application/vnd.google-apps.script",
                ExportFormat::new("application/vnd.google-apps.script+json", "json"),
            ),
            (
                "application/vnd.google-apps.jam",
                ExportFormat::new("application/pdf", "pdf"),
            ),
        ]
        .into_iter()
        .map(|(native, format)| (native.to_string(), format))
        .collect();

        Self { formats }
    }
}

impl MimeMap {
    /// A map with no export formats; every file is downloaded raw.
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Defaults with `overrides` layered on top.
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, ExportFormat)>,
    {
        let mut map = Self::default();
        map.formats.extend(overrides);
        map
    }

    pub fn get(&self, native_mime_type: &str) -> Option<&ExportFormat> {
        self.formats.get(native_mime_type)
    }

    pub fn contains(&self, native_mime_type: &str) -> bool {
        self.formats.contains_key(native_mime_type)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
