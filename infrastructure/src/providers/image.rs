//! Image encoding shared by the provider adapters

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use shelfscan_domain::ImageInput;

/// Image as a URL: `data:` URL for inline bytes, the original URL otherwise
pub(super) fn image_url(image: &ImageInput) -> String {
    match image {
        ImageInput::Bytes { data, media_type } => {
            format!("data:{};base64,{}", media_type, BASE64.encode(data))
        }
        ImageInput::Url(url) => url.clone(),
    }
}

/// Base64 payload and media type of inline bytes
pub(super) fn inline_data(image: &ImageInput) -> Option<(String, String)> {
    match image {
        ImageInput::Bytes { data, media_type } => {
            Some((media_type.clone(), BASE64.encode(data)))
        }
        ImageInput::Url(_) => None,
    }
}

/// Media type guessed from a URL's extension, for providers that require one
pub(super) fn media_type_for_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_url_encodes_bytes() {
        let image = ImageInput::Bytes {
            data: b"abc".to_vec(),
            media_type: "image/png".into(),
        };
        assert_eq!(image_url(&image), "data:image/png;base64,YWJj");
        assert_eq!(
            inline_data(&image),
            Some(("image/png".to_string(), "YWJj".to_string()))
        );

        let url = ImageInput::url("https://example.com/shelf.jpg");
        assert_eq!(image_url(&url), "https://example.com/shelf.jpg");
        assert!(inline_data(&url).is_none());
    }

    #[test]
    fn test_media_type_for_url() {
        assert_eq!(media_type_for_url("https://x/y.PNG?size=2"), "image/png");
        assert_eq!(media_type_for_url("https://x/y"), "image/jpeg");
    }
}
