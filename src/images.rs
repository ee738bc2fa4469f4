use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug)]
pub struct DecodedImage {
    pub body: Bytes,
    pub content_type: &'static str,
    pub extension: &'static str,
}

/// Decode a recipe image transported as base64, with or without a
/// `data:<mime>;base64,` prefix. The content type comes from the prefix
/// when present, otherwise from the magic bytes of the payload.
pub fn decode_base64_image(input: &str) -> Result<DecodedImage, ApiError> {
    let (declared, payload) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (mime, data) = rest
                .split_once(";base64,")
                .ok_or_else(|| ApiError::field("image", "malformed data URI"))?;
            (Some(mime), data)
        }
        None => (None, input),
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| ApiError::field("image", "invalid base64 payload"))?;

    let (content_type, extension) = match declared {
        Some(mime) => ext_from_mime(mime)
            .map(|ext| (mime_static(mime), ext))
            .ok_or_else(|| ApiError::field("image", format!("unsupported image type {mime}")))?,
        None => sniff_image(&bytes)
            .ok_or_else(|| ApiError::field("image", "payload is not a supported image"))?,
    };

    Ok(DecodedImage {
        body: Bytes::from(bytes),
        content_type,
        extension,
    })
}

/// Upload a decoded image to object storage under a fresh key.
pub async fn store_recipe_image(state: &AppState, image: DecodedImage) -> Result<String, ApiError> {
    let key = format!("recipes/images/{}.{}", Uuid::new_v4(), image.extension);
    state
        .storage
        .put_object(&key, image.body, image.content_type)
        .await?;
    Ok(key)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

fn mime_static(ct: &str) -> &'static str {
    match ct {
        "image/jpeg" | "image/jpg" => "image/jpeg",
        "image/png" => "image/png",
        "image/gif" => "image/gif",
        "image/webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn sniff_image(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(("image/png", "png"))
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(("image/jpeg", "jpg"))
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(("image/gif", "gif"))
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(("image/webp", "webp"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00";

    #[test]
    fn decodes_data_uri_with_declared_type() {
        let encoded = STANDARD.encode(PNG_MAGIC);
        let image = decode_base64_image(&format!("data:image/png;base64,{encoded}")).unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.extension, "png");
        assert_eq!(&image.body[..], PNG_MAGIC);
    }

    #[test]
    fn sniffs_type_when_prefix_missing() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        let image = decode_base64_image(&STANDARD.encode(jpeg)).unwrap();
        assert_eq!(image.content_type, "image/jpeg");
        assert_eq!(image.extension, "jpg");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_base64_image("data:image/png;base64,@@not-base64@@").unwrap_err();
        assert!(matches!(err, ApiError::Field("image", _)));
    }

    #[test]
    fn rejects_unknown_payload() {
        let err = decode_base64_image(&STANDARD.encode(b"plain text")).unwrap_err();
        assert!(matches!(err, ApiError::Field("image", _)));
    }

    #[test]
    fn rejects_unsupported_declared_type() {
        let encoded = STANDARD.encode(PNG_MAGIC);
        let err = decode_base64_image(&format!("data:image/tiff;base64,{encoded}")).unwrap_err();
        assert!(matches!(err, ApiError::Field("image", _)));
    }

    #[tokio::test]
    async fn store_uses_extension_in_key() {
        let state = crate::state::AppState::fake();
        let image = DecodedImage {
            body: Bytes::from_static(PNG_MAGIC),
            content_type: "image/png",
            extension: "png",
        };
        let key = store_recipe_image(&state, image).await.unwrap();
        assert!(key.starts_with("recipes/images/"));
        assert!(key.ends_with(".png"));
    }
}
