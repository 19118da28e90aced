//! Image input handed to every model call

use std::path::Path;

/// An already-resolved image: raw bytes or a URL the provider fetches itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    Bytes { data: Vec<u8>, media_type: String },
    Url(String),
}

impl ImageInput {
    /// Wrap raw bytes, sniffing the media type from magic bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let media_type = sniff_media_type(&data).to_string();
        ImageInput::Bytes { data, media_type }
    }

    /// Wrap raw bytes, using the file extension when magic bytes are inconclusive
    pub fn from_bytes_with_path(data: Vec<u8>, path: &Path) -> Self {
        let sniffed = sniff_media_type(&data);
        let media_type = if sniffed == "application/octet-stream" {
            media_type_for_extension(path).unwrap_or(sniffed)
        } else {
            sniffed
        };
        ImageInput::Bytes {
            data,
            media_type: media_type.to_string(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ImageInput::Url(url.into())
    }

    pub fn media_type(&self) -> Option<&str> {
        match self {
            ImageInput::Bytes { media_type, .. } => Some(media_type),
            ImageInput::Url(_) => None,
        }
    }

    /// Short description for logs and audit records
    pub fn describe(&self) -> String {
        match self {
            ImageInput::Bytes { data, media_type } => {
                format!("{} ({} bytes)", media_type, data.len())
            }
            ImageInput::Url(url) => url.clone(),
        }
    }
}

fn sniff_media_type(data: &[u8]) -> &'static str {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

fn media_type_for_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
