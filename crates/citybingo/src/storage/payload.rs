//! Classification and decoding of generator output.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::AssetError;

/// What a generator handed back: a URL to download or an inline data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSource {
    Remote(String),
    Inline { mime_type: String, data: String },
}

impl RawSource {
    /// Parses a generator result.
    ///
    /// Inline payloads must look like `data:image/<type>;base64,<data>`.
    pub fn parse(raw: &str) -> Result<Self, AssetError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AssetError::EmptyPayload);
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(RawSource::Remote(trimmed.to_string()));
        }

        let Some(rest) = trimmed.strip_prefix("data:") else {
            return Err(AssetError::InvalidPayloadFormat(
                "expected an http(s) URL or a data URL".to_string(),
            ));
        };

        let (header, data) = rest.split_once(',').ok_or_else(|| {
            AssetError::InvalidPayloadFormat("data URL has no ',' separator".to_string())
        })?;

        let mut parts = header.split(';');
        let mime_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") || mime_type.len() <= "image/".len() {
            return Err(AssetError::InvalidPayloadFormat(format!(
                "unsupported media type '{}'",
                mime_type
            )));
        }
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(AssetError::InvalidPayloadFormat(
                "data URL is not base64 encoded".to_string(),
            ));
        }

        Ok(RawSource::Inline {
            mime_type,
            data: data.trim().to_string(),
        })
    }

    /// Builds the inline form for raw bytes of a PNG image.
    pub fn inline_png(bytes: &[u8]) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(bytes))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, RawSource::Remote(_))
    }
}

/// Decodes the body of an inline payload.
pub fn decode_inline(data: &str) -> Result<Vec<u8>, AssetError> {
    BASE64
        .decode(data.as_bytes())
        .map_err(|e| AssetError::InvalidPayloadFormat(format!("base64 decode failed: {}", e)))
}

/// File extension to use for a media type.
pub fn extension_for(mime_type: Option<&str>) -> &'static str {
    let mime = mime_type
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase());
    match mime.as_deref() {
        Some("image/jpeg") | Some("image/jpg") => "jpg",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_url() {
        let source = RawSource::parse(" https://example.com/a.png ").unwrap();
        assert_eq!(source, RawSource::Remote("https://example.com/a.png".to_string()));
        assert!(source.is_remote());
    }

    #[test]
    fn test_parse_inline_png() {
        let raw = RawSource::inline_png(b"\x89PNG");
        let source = RawSource::parse(&raw).unwrap();
        match source {
            RawSource::Inline { mime_type, data } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(decode_inline(&data).unwrap(), b"\x89PNG");
            }
            other => panic!("Expected inline source, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_image_header() {
        let result = RawSource::parse("data:text/plain;base64,aGVsbG8=");
        assert!(matches!(result, Err(AssetError::InvalidPayloadFormat(_))));
    }

    #[test]
    fn test_rejects_missing_base64_marker() {
        let result = RawSource::parse("data:image/png,aGVsbG8=");
        assert!(matches!(result, Err(AssetError::InvalidPayloadFormat(_))));
    }

    #[test]
    fn test_rejects_missing_separator() {
        let result = RawSource::parse("data:image/png;base64");
        assert!(matches!(result, Err(AssetError::InvalidPayloadFormat(_))));
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(matches!(
            RawSource::parse("ftp://example.com/a.png"),
            Err(AssetError::InvalidPayloadFormat(_))
        ));
        assert!(matches!(RawSource::parse("   "), Err(AssetError::EmptyPayload)));
    }

    #[test]
    fn test_decode_inline_rejects_garbage() {
        assert!(matches!(
            decode_inline("!!!not-base64!!!"),
            Err(AssetError::InvalidPayloadFormat(_))
        ));
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(Some("image/webp; charset=binary")), "webp");
        assert_eq!(extension_for(Some("application/octet-stream")), "png");
        assert_eq!(extension_for(None), "png");
    }
}
