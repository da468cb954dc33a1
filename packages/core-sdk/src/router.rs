use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("static uuid pattern")
});

static GITEE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{30,60}$").expect("static gitee pattern"));

/**
 * \brief 可路由的图像生成后端。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    VolcEngine,
    Gitee,
    ModelScope,
    HuggingFace,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::VolcEngine => "volcengine",
            Provider::Gitee => "gitee",
            Provider::ModelScope => "modelscope",
            Provider::HuggingFace => "huggingface",
            Provider::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/**
 * \brief 按固定顺序匹配凭证形态，首个命中的规则决定 Provider。
 *
 * 顺序：空串 → `hf_` → `ms-` → UUID → 30~60 位字母数字 → Unknown。
 * 只记录凭证前 4 个字符。
 */
pub fn classify(credential: &str) -> Provider {
    let provider = match_rules(credential);
    tracing::info!(
        provider = %provider,
        key_prefix = %key_prefix(credential),
        "credential routed"
    );
    provider
}

fn match_rules(credential: &str) -> Provider {
    if credential.is_empty() {
        Provider::Unknown
    } else if credential.starts_with("hf_") {
        Provider::HuggingFace
    } else if credential.starts_with("ms-") {
        Provider::ModelScope
    } else if UUID_RE.is_match(credential) {
        Provider::VolcEngine
    } else if GITEE_RE.is_match(credential) {
        Provider::Gitee
    } else {
        Provider::Unknown
    }
}

/** \brief 凭证的前 4 个字符，用于日志。 */
pub fn key_prefix(credential: &str) -> String {
    credential.chars().take(4).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_each_credential_shape() {
        assert_eq!(classify("hf_abc"), Provider::HuggingFace);
        assert_eq!(classify("ms-12345678"), Provider::ModelScope);
        assert_eq!(
            classify("0b8c2f9e-1a2b-4c3d-8e9f-0123456789ab"),
            Provider::VolcEngine
        );
        assert_eq!(
            classify("0B8C2F9E-1A2B-4C3D-8E9F-0123456789AB"),
            Provider::VolcEngine
        );
        assert_eq!(classify(&"a1B2".repeat(10)), Provider::Gitee);
    }

    #[test]
    fn test_everything_else_is_unknown() {
        assert_eq!(classify(""), Provider::Unknown);
        assert_eq!(classify("sk-proj-abcdef"), Provider::Unknown);
        assert_eq!(classify(&"a".repeat(29)), Provider::Unknown);
        assert_eq!(classify(&"a".repeat(61)), Provider::Unknown);
        assert_eq!(classify("0b8c2f9e-1a2b-4c3d-8e9f-0123456789ag"), Provider::Unknown);
        assert_eq!(classify(&format!("{}!", "a".repeat(40))), Provider::Unknown);
    }

    #[test]
    fn test_prefix_rules_win_over_later_shapes() {
        // hf_ wins over ms- even when both appear
        assert_eq!(classify("hf_ms-token"), Provider::HuggingFace);
        // ms- prefix wins over an otherwise valid uuid body
        assert_eq!(
            classify("ms-0b8c2f9e-1a2b-4c3d-8e9f-0123456789ab"),
            Provider::ModelScope
        );
        // 32 hex chars without dashes is not a uuid, so it falls through to gitee
        assert_eq!(
            classify("0b8c2f9e1a2b4c3d8e9f0123456789ab"),
            Provider::Gitee
        );
        // uuid is checked before the alphanumeric rule
        let uuid = "0b8c2f9e-1a2b-4c3d-8e9f-0123456789ab";
        assert_eq!(match_rules(uuid), Provider::VolcEngine);
        assert!(!GITEE_RE.is_match(uuid));
    }

    #[test]
    fn test_key_prefix_is_short_and_char_safe() {
        assert_eq!(key_prefix("hf_abcdef"), "hf_a");
        assert_eq!(key_prefix("ab"), "ab");
        assert_eq!(key_prefix("密钥密钥密钥"), "密钥密钥");
    }
}
