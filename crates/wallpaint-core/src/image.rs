//! Uploaded images and the identity the service assigns to them.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::config::UploadPolicy;
use crate::error::{Result, WallPaintError};

/// Cache key returned by a successful detection.
///
/// Every paint call on the image must carry the hash of the most recent
/// successful detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHash(String);

impl ImageHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one upload for logs and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel dimensions reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Raw image bytes as uploaded by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads an image from disk, guessing the MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = mime_from_extension(path);
        Ok(Self::new(file_name, mime_type, bytes))
    }

    /// Encodes the image as a `data:` URL, the form the service accepts.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            BASE64_STANDARD.encode(&self.bytes)
        )
    }

    /// Checks size and type against the configured upload policy.
    pub fn validate(&self, policy: &UploadPolicy) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(WallPaintError::upload_rejected(format!(
                "'{}' is empty",
                self.file_name
            )));
        }
        if self.bytes.len() as u64 > policy.max_bytes {
            return Err(WallPaintError::upload_rejected(format!(
                "'{}' is {} bytes, limit is {} bytes",
                self.file_name,
                self.bytes.len(),
                policy.max_bytes
            )));
        }
        if !policy
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&self.mime_type))
        {
            return Err(WallPaintError::upload_rejected(format!(
                "'{}' has unsupported type {}",
                self.file_name, self.mime_type
            )));
        }
        Ok(())
    }
}

// Image bytes are never useful in debug output.
impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn mime_from_extension(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Decodes the payload of a `data:<mime>;base64,<payload>` URL.
///
/// Bare base64 without the `data:` prefix is accepted as well.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let payload = match data_url.split_once("base64,") {
        Some((_, payload)) => payload,
        None => data_url,
    };
    BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|err| WallPaintError::Serialization {
            format: "base64".to_string(),
            message: err.to_string(),
        })
}
