use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{CanonicalRequest, ChatMessage, ContentPart, MessageContent};

static MARKDOWN_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[[^\]]*\]\(\s*((?:https?://|data:image/)[^)\s]+)\s*\)")
        .expect("static markdown image pattern")
});

/**
 * \brief 从对话历史中还原 `(prompt, images)`。
 *
 * 取最后一条 user 消息作为本轮输入；若本轮之前存在带图消息，
 * 只取向前扫描遇到的第一条，把其中未重复的图片追加在本轮图片之后。
 * 纯函数，同样的输入总是得到同样的输出。
 */
pub fn extract(messages: &[ChatMessage]) -> CanonicalRequest {
    let Some(last_user) = messages.iter().rposition(|m| m.role == "user") else {
        return CanonicalRequest::default();
    };

    let (prompt, current) = current_turn(&messages[last_user].content);
    let history = messages[..last_user]
        .iter()
        .rev()
        .map(|m| message_images(&m.content))
        .find(|images| !images.is_empty())
        .unwrap_or_default();

    let mut images: Vec<String> = Vec::with_capacity(current.len() + history.len());
    for image in current.into_iter().chain(history) {
        if !images.contains(&image) {
            images.push(image);
        }
    }

    tracing::debug!(prompt = %prompt, images = images.len(), "transcript extracted");
    CanonicalRequest {
        prompt,
        images,
        requested_model: None,
        requested_size: None,
    }
}

fn current_turn(content: &MessageContent) -> (String, Vec<String>) {
    match content {
        MessageContent::Text(text) => (text.clone(), Vec::new()),
        MessageContent::Parts(parts) => {
            let prompt = parts
                .iter()
                .find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            (prompt, part_images(parts))
        }
    }
}

fn message_images(content: &MessageContent) -> Vec<String> {
    match content {
        MessageContent::Text(text) => markdown_images(text),
        MessageContent::Parts(parts) => part_images(parts),
    }
}

fn part_images(parts: &[ContentPart]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Image { image_url } => image_url.as_ref().and_then(|u| u.url()),
            _ => None,
        })
        .map(|u| u.to_string())
        .collect()
}

/** \brief 提取文本中 `![..](http(s)://..)` 或 `![..](data:image/..)` 形式的图片引用。 */
pub fn markdown_images(text: &str) -> Vec<String> {
    MARKDOWN_IMAGE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_images(text: &str, urls: &[&str]) -> ChatMessage {
        let mut parts = vec![ContentPart::text(text)];
        parts.extend(urls.iter().map(|u| ContentPart::image(*u)));
        ChatMessage::parts("user", parts)
    }

    #[test]
    fn test_no_user_message_yields_empty_request() {
        let req = extract(&[ChatMessage::text("system", "be nice")]);
        assert_eq!(req, CanonicalRequest::default());
        assert_eq!(extract(&[]), CanonicalRequest::default());
    }

    #[test]
    fn test_single_turn_keeps_text_and_image_order() {
        let messages = vec![user_with_images(
            "put the cat on the sofa",
            &["https://img/cat.png", "https://img/sofa.png"],
        )];
        let req = extract(&messages);
        assert_eq!(req.prompt, "put the cat on the sofa");
        assert_eq!(req.images, vec!["https://img/cat.png", "https://img/sofa.png"]);
    }

    #[test]
    fn test_history_images_follow_current_ones() {
        let messages = vec![
            ChatMessage::text("assistant", "![Generated Image](https://old/x.png)"),
            ChatMessage::parts(
                "user",
                vec![
                    ContentPart::text("first"),
                    ContentPart::image("https://b.png"),
                    ContentPart::image("https://c.png"),
                ],
            ),
            ChatMessage::text("assistant", "ok, what next?"),
            user_with_images("combine", &["https://a.png"]),
        ];
        let req = extract(&messages);
        assert_eq!(req.images, vec!["https://a.png", "https://b.png", "https://c.png"]);
    }

    #[test]
    fn test_history_duplicates_are_dropped() {
        let messages = vec![
            user_with_images("first", &["https://a.png", "https://c.png"]),
            user_with_images("again", &["https://a.png"]),
        ];
        let req = extract(&messages);
        assert_eq!(req.images, vec!["https://a.png", "https://c.png"]);
    }

    #[test]
    fn test_only_the_nearest_image_bearing_message_is_used() {
        let messages = vec![
            user_with_images("oldest", &["https://z.png"]),
            ChatMessage::text(
                "assistant",
                "here you go\n\n![Generated Image](data:image/png;base64,AAAA)\n\n![Generated Image](https://y.png)",
            ),
            ChatMessage::text("user", "make it brighter"),
        ];
        let req = extract(&messages);
        assert_eq!(req.prompt, "make it brighter");
        assert_eq!(req.images, vec!["data:image/png;base64,AAAA", "https://y.png"]);
    }

    #[test]
    fn test_structured_prompt_uses_first_text_and_skips_empty_urls() {
        let messages = vec![ChatMessage::parts(
            "user",
            vec![
                ContentPart::image(""),
                ContentPart::text("first text"),
                ContentPart::text("second text"),
                ContentPart::Image { image_url: None },
                ContentPart::image("https://ok.png"),
            ],
        )];
        let req = extract(&messages);
        assert_eq!(req.prompt, "first text");
        assert_eq!(req.images, vec!["https://ok.png"]);
    }

    #[test]
    fn test_messages_after_last_user_are_ignored() {
        let messages = vec![
            ChatMessage::text("user", "draw a boat"),
            ChatMessage::text("assistant", "![Generated Image](https://boat.png)"),
        ];
        let req = extract(&messages);
        assert_eq!(req.prompt, "draw a boat");
        assert!(req.images.is_empty());
    }

    #[test]
    fn test_extraction_is_repeatable() {
        let messages = vec![
            user_with_images("one", &["https://b.png"]),
            user_with_images("two", &["https://a.png"]),
        ];
        assert_eq!(extract(&messages), extract(&messages));
    }

    #[test]
    fn test_markdown_scanner_ignores_non_image_links() {
        let text = "[link](https://x.png) ![a](ftp://nope.png) ![b]( https://yes.png )";
        assert_eq!(markdown_images(text), vec!["https://yes.png"]);
    }
}
