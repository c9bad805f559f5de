//! Wire types: Drive API payloads, credential files and cached tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Mime type Google Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A file or folder in Google Drive, as returned by a listing or metadata call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Drive encodes `size` (an int64) as a JSON string; plain numbers are
/// accepted as well.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Text(String),
        Number(u64),
    }

    match Option::<Size>::deserialize(deserializer)? {
        Some(Size::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(Size::Number(n)) => Ok(Some(n)),
        None => Ok(None),
    }
}

impl fmt::Display for RemoteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size.map_or_else(|| "-".to_string(), format_size);
        let mime = if self.mime_type.is_empty() {
            "-"
        } else {
            self.mime_type.as_str()
        };
        write!(f, "{:<44} {:>10} {:<30} {}", self.id, size, mime, self.name)
    }
}

/// Human-readable size in binary units, e.g. `1.50 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// One page of the files.list API endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    #[serde(default)]
    pub files: Vec<RemoteEntry>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Error envelope returned by Google APIs: `{"error": {"code", "message"}}`.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// `type = "service_account"` key file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: Option<String>,
}

/// Credentials of a user who already granted consent (e.g. written by
/// `gcloud auth application-default login`).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUserCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_uri: Option<String>,
}

/// A credentials JSON file, discriminated by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    ServiceAccount(ServiceAccountCredentials),
    AuthorizedUser(AuthorizedUserCredentials),
}

impl Credentials {
    pub fn token_uri(&self) -> Option<&str> {
        match self {
            Credentials::ServiceAccount(c) => c.token_uri.as_deref(),
            Credentials::AuthorizedUser(c) => c.token_uri.as_deref(),
        }
    }

    /// Identity a cached token belongs to: the service account email, or the
    /// client id plus a fingerprint of the refresh token.
    pub fn account(&self) -> String {
        match self {
            Credentials::ServiceAccount(c) => c.client_email.clone(),
            Credentials::AuthorizedUser(c) => {
                let mut hasher = Sha256::new();
                hasher.update(c.refresh_token.as_bytes());
                let digest = format!("{:x}", hasher.finalize());
                format!("{}:{}", c.client_id, &digest[..16])
            }
        }
    }
}

/// Body of a successful token endpoint call.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
}

/// Access token persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    /// [`Credentials::account`] of the credentials that issued the token.
    #[serde(default)]
    pub account: String,
    pub access_token: String,
    /// Expiry as seconds since the Unix epoch.
    pub expires_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.50 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_size(2 * 1024 * 1024 * 1024 * 1024), "2.00 TB");
        assert_eq!(format_size(4096 * 1024 * 1024 * 1024 * 1024), "4096.00 TB");
    }

    #[test]
    fn test_listing_entry_with_string_size() {
        let entry: RemoteEntry = serde_json::from_str(
            r#"{"id": "r1", "name": "report.txt", "mimeType": "text/plain",
                "parents": ["ABC123"], "size": "17"}"#,
        )
        .unwrap();

        assert_eq!(entry.parents, vec!["ABC123".to_string()]);
        assert_eq!(entry.size, Some(17));
        assert!(!entry.is_folder());
    }

    #[test]
    fn test_numeric_and_null_size() {
        let entry: RemoteEntry =
            serde_json::from_str(r#"{"id": "a", "name": "a", "size": 42}"#).unwrap();
        assert_eq!(entry.size, Some(42));

        let entry: RemoteEntry =
            serde_json::from_str(r#"{"id": "a", "name": "a", "size": null}"#).unwrap();
        assert_eq!(entry.size, None);
        assert!(entry.mime_type.is_empty());
    }

    #[test]
    fn test_folder_detection() {
        let entry: RemoteEntry = serde_json::from_str(
            r#"{"id": "DEF", "name": "DEF", "mimeType": "application/vnd.google-apps.folder"}"#,
        )
        .unwrap();
        assert!(entry.is_folder());
        assert_eq!(entry.size, None);
    }

    #[test]
    fn test_display_columns() {
        let entry = RemoteEntry {
            id: "x1".to_string(),
            name: "Quarterly plan".to_string(),
            mime_type: String::new(),
            parents: vec![],
            size: Some(1536),
        };

        let line = entry.to_string();
        assert!(line.starts_with("x1 "));
        assert!(line.contains("1.50 KB"));
        assert!(line.contains(" - "));
        assert!(line.ends_with("Quarterly plan"));
    }

    #[test]
    fn test_credentials_tagged_by_type() {
        let creds: Credentials = serde_json::from_str(
            r#"{"type": "authorized_user", "client_id": "id",
                "client_secret": "secret", "refresh_token": "refresh"}"#,
        )
        .unwrap();
        assert!(matches!(creds, Credentials::AuthorizedUser(_)));
        assert_eq!(creds.token_uri(), None);

        let unknown = serde_json::from_str::<Credentials>(r#"{"type": "external_account"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_account_distinguishes_refresh_tokens() {
        let user = |refresh: &str| {
            Credentials::AuthorizedUser(AuthorizedUserCredentials {
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
                refresh_token: refresh.to_string(),
                token_uri: None,
            })
        };

        let a = user("refresh-a").account();
        assert!(a.starts_with("cid:"));
        assert!(!a.contains("refresh-a"));
        assert_eq!(a, user("refresh-a").account());
        assert_ne!(a, user("refresh-b").account());
    }
}
