use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::HttpError;
use crate::http::HttpClient;

/**
 * \brief 拆分 `data:<mime>;base64,<payload>`，返回 (mime, payload)。
 */
pub fn parse_data_uri(reference: &str) -> Option<(&str, &str)> {
    let rest = reference.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, payload))
}

pub fn to_data_uri(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}

pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/**
 * \brief 依次根据 Content-Type、文件头魔数判断 MIME，都失败时用 fallback。
 */
pub fn detect_mime(bytes: &[u8], content_type: Option<&str>, fallback: &str) -> String {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or("").trim();
        if ct.starts_with("image/") {
            return ct.to_string();
        }
    }
    infer::get(bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(fallback)
        .to_string()
}

/**
 * \brief 只解码 base64 开头一小段来判断图片类型。
 */
pub fn sniff_base64_mime(data: &str, fallback: &str) -> String {
    let head: String = data
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_whitespace())
        .take(64)
        .collect();
    let usable = head.len() - head.len() % 4;
    match STANDARD.decode(&head[..usable]) {
        Ok(bytes) => detect_mime(&bytes, None, fallback),
        Err(_) => fallback.to_string(),
    }
}

/**
 * \brief 把图片引用统一为内联 data URI。已内联的原样返回；
 * 远程图片下载失败时退回原始 URL，不视为错误。
 */
pub async fn inline_reference(client: &HttpClient, reference: &str) -> String {
    if reference.starts_with("data:") || !is_remote(reference) {
        return reference.to_string();
    }
    match client.fetch_bytes(reference).await {
        Ok((bytes, content_type)) => {
            let mime = detect_mime(&bytes, content_type.as_deref(), "image/png");
            to_data_uri(&mime, &bytes)
        }
        Err(err) => {
            tracing::warn!(
                reference = %reference,
                error = %err,
                "image inline failed, keeping url"
            );
            reference.to_string()
        }
    }
}

/**
 * \brief 图片加载失败的原因。
 */
#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error(transparent)]
    Fetch(#[from] HttpError),
    #[error("invalid base64 image: {0}")]
    Decode(#[from] base64::DecodeError),
}

/**
 * \brief 取得图片原始字节与 MIME：远程 URL 下载，data URI 或裸 base64 直接解码。
 */
pub async fn load_image_bytes(
    client: &HttpClient,
    reference: &str,
) -> Result<(Vec<u8>, String), ImageLoadError> {
    if is_remote(reference) {
        let (bytes, content_type) = client.fetch_bytes(reference).await?;
        let mime = detect_mime(&bytes, content_type.as_deref(), "image/png");
        return Ok((bytes, mime));
    }
    let (declared, payload) = match parse_data_uri(reference) {
        Some((mime, payload)) => (Some(mime), payload),
        None => (None, reference),
    };
    let bytes = STANDARD.decode(payload.trim())?;
    let mime = detect_mime(&bytes, declared, "image/png");
    Ok((bytes, mime))
}

/** \brief 根据 MIME 给出上传用的文件扩展名。 */
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_splits_data_uri() {
        assert_eq!(
            parse_data_uri("data:image/webp;base64,UklGR"),
            Some(("image/webp", "UklGR"))
        );
        assert_eq!(parse_data_uri("data:text/plain,hello"), None);
        assert_eq!(parse_data_uri("https://x"), None);
    }

    #[test]
    fn test_mime_prefers_image_content_type() {
        assert_eq!(detect_mime(&PNG_HEADER, Some("image/webp; q=1"), "x"), "image/webp");
        assert_eq!(
            detect_mime(&PNG_HEADER, Some("application/octet-stream"), "x"),
            "image/png"
        );
        assert_eq!(detect_mime(b"plain", None, "image/jpeg"), "image/jpeg");
    }

    #[test]
    fn test_sniffs_base64_payloads() {
        let mut png = PNG_HEADER.to_vec();
        png.extend_from_slice(&[0u8; 40]);
        assert_eq!(sniff_base64_mime(&STANDARD.encode(&png), "image/jpeg"), "image/png");
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(sniff_base64_mime(&STANDARD.encode(jpeg), "image/png"), "image/jpeg");
        assert_eq!(sniff_base64_mime("!!!!", "image/png"), "image/png");
    }

    #[tokio::test]
    async fn test_decodes_inline_references_without_network() {
        let client = HttpClient::new(std::time::Duration::from_secs(1)).unwrap();
        let uri = to_data_uri("image/png", &PNG_HEADER);
        let (bytes, mime) = load_image_bytes(&client, &uri).await.unwrap();
        assert_eq!(bytes, PNG_HEADER);
        assert_eq!(mime, "image/png");

        let bare = STANDARD.encode(PNG_HEADER);
        let (bytes, _) = load_image_bytes(&client, &bare).await.unwrap();
        assert_eq!(bytes, PNG_HEADER);

        assert!(matches!(
            load_image_bytes(&client, "data:image/png;base64,@@@").await,
            Err(ImageLoadError::Decode(_))
        ));
        assert_eq!(inline_reference(&client, &uri).await, uri);
    }
}
