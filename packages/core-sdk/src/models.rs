use serde::{Deserialize, Serialize};

/**
 * \brief 聊天消息，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /** \brief 角色：system/user/assistant */
    pub role: String,
    /** \brief 内容：纯文本或结构化片段列表 */
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: MessageContent,
}

/** \brief 把显式的 `null` 当作缺省值处理。 */
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/**
 * \brief 消息内容：纯文本，或文本/图片片段组成的列表。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/**
 * \brief 结构化内容片段，按 `type` 字段区分。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text {
        #[serde(default, deserialize_with = "null_as_empty")]
        text: String,
    },
    #[serde(rename = "image_url", alias = "image")]
    Image {
        #[serde(default)]
        image_url: Option<ImageUrl>,
    },
    #[serde(other)]
    Other,
}

/**
 * \brief 图片引用，兼容 `{ "url": ... }` 对象与裸字符串两种写法。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageUrl {
    Object {
        #[serde(default)]
        url: Option<String>,
    },
    Plain(String),
}

impl ImageUrl {
    /** \brief 返回非空 URL。 */
    pub fn url(&self) -> Option<&str> {
        let url = match self {
            ImageUrl::Object { url } => url.as_deref(),
            ImageUrl::Plain(url) => Some(url.as_str()),
        };
        url.filter(|u| !u.trim().is_empty())
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::Image {
            image_url: Some(ImageUrl::Object {
                url: Some(url.into()),
            }),
        }
    }
}

impl ChatMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn parts(role: &str, parts: Vec<ContentPart>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

/**
 * \brief `/v1/chat/completions` 请求体；未列出的字段会被忽略。
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /** \brief 调用方请求的模型，可选 */
    #[serde(default)]
    pub model: Option<String>,
    /** \brief 对话历史 */
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /** \brief 是否以 SSE 分块返回 */
    #[serde(default)]
    pub stream: bool,
    /** \brief 调用方请求的尺寸，如 "1024x1024" */
    #[serde(default)]
    pub size: Option<String>,
}

/**
 * \brief 与具体后端无关的生成请求，由对话提取器构建，只被一个适配器消费。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub prompt: String,
    /** \brief 图片引用（URL 或 data URI），本轮在前、历史在后，且无重复 */
    pub images: Vec<String>,
    pub requested_model: Option<String>,
    pub requested_size: Option<String>,
}

/**
 * \brief 内联图片数据（base64 + MIME）。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
}

/**
 * \brief 适配器产出的单张图片，`url` 与 `inline` 通常只填其一。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: Option<String>,
    pub inline: Option<InlineImage>,
}

impl GeneratedImage {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            inline: None,
        }
    }

    pub fn from_base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            url: None,
            inline: Some(InlineImage {
                data: data.into(),
                mime_type: mime_type.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_structured_content_with_both_image_tags() {
        let raw = serde_json::json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "merge these"},
                {"type": "image_url", "image_url": {"url": "https://a/1.png"}},
                {"type": "image", "image_url": "https://a/2.png"},
                {"type": "input_audio", "input_audio": {}}
            ]
        });
        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        let MessageContent::Parts(parts) = msg.content else {
            panic!("expected structured content");
        };
        assert_eq!(parts.len(), 4);
        match &parts[2] {
            ContentPart::Image { image_url } => {
                assert_eq!(image_url.as_ref().and_then(|u| u.url()), Some("https://a/2.png"))
            }
            other => panic!("unexpected part {:?}", other),
        }
        assert!(matches!(parts[3], ContentPart::Other));
    }

    #[test]
    fn test_missing_or_null_content_defaults_to_empty_text() {
        let msg: ChatMessage = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert!(matches!(msg.content, MessageContent::Text(ref t) if t.is_empty()));
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":null}"#).unwrap();
        assert!(matches!(msg.content, MessageContent::Text(ref t) if t.is_empty()));
    }

    #[test]
    fn test_null_text_part_is_empty_text() {
        let raw = r#"{"role":"user","content":[{"type":"text","text":null},{"type":"text"}]}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        let MessageContent::Parts(parts) = msg.content else {
            panic!("expected structured content");
        };
        assert!(matches!(&parts[0], ContentPart::Text { text } if text.is_empty()));
        assert!(matches!(&parts[1], ContentPart::Text { text } if text.is_empty()));
    }

    #[test]
    fn test_blank_image_url_is_treated_as_missing() {
        let url = ImageUrl::Object {
            url: Some("  ".into()),
        };
        assert_eq!(url.url(), None);
    }
}
