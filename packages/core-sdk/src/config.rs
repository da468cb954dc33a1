use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_TIMEOUT_SECS: &str = "PICRELAY_TIMEOUT_SECS";
pub const ENV_HF_ENDPOINTS: &str = "PICRELAY_HF_ENDPOINTS";

/**
 * \brief 网关全局配置；启动时加载一次，之后只读。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /** \brief 所有出站请求共享的默认超时（秒） */
    pub request_timeout_secs: u64,
    pub volcengine: VolcEngineConfig,
    pub gitee: GiteeConfig,
    pub modelscope: ModelScopeConfig,
    pub huggingface: HuggingFaceConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 300,
            volcengine: VolcEngineConfig::default(),
            gitee: GiteeConfig::default(),
            modelscope: ModelScopeConfig::default(),
            huggingface: HuggingFaceConfig::default(),
        }
    }
}

impl GatewayConfig {
    /**
     * \brief 读取 JSON 配置文件（可选），再叠加环境变量覆盖。
     */
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => GatewayConfig::default(),
        };
        config.apply_overrides(
            std::env::var(ENV_TIMEOUT_SECS).ok().as_deref(),
            std::env::var(ENV_HF_ENDPOINTS).ok().as_deref(),
        )?;
        Ok(config)
    }

    fn apply_overrides(&mut self, timeout: Option<&str>, hf_endpoints: Option<&str>) -> Result<()> {
        if let Some(raw) = timeout {
            self.request_timeout_secs = raw.trim().parse().with_context(|| {
                format!("{} must be an integer, got {:?}", ENV_TIMEOUT_SECS, raw)
            })?;
        }
        if let Some(raw) = hf_endpoints {
            self.huggingface.endpoints = raw
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/**
 * \brief 火山引擎（同步 JSON）配置。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolcEngineConfig {
    pub endpoint: String,
    pub models: Vec<String>,
    pub default_model: String,
    pub sizes: Vec<String>,
    pub default_size: String,
}

impl Default for VolcEngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://ark.cn-beijing.volces.com/api/v3/images/generations".into(),
            models: strings(&[
                "doubao-seedream-4-0-250828",
                "doubao-seedream-3-0-t2i-250415",
                "doubao-seededit-3-0-i2i-250628",
            ]),
            default_model: "doubao-seedream-4-0-250828".into(),
            sizes: strings(&[
                "1K", "2K", "4K", "1024x1024", "2048x2048", "2304x1728", "1728x2304",
                "2560x1440", "1440x2560", "2496x1664", "1664x2496",
            ]),
            default_size: "2048x2048".into(),
        }
    }
}

/**
 * \brief Gitee AI（同步，生成/编辑双模式）配置。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GiteeConfig {
    pub generation_endpoint: String,
    pub edit_endpoint: String,
    pub models: Vec<String>,
    pub default_model: String,
    /** \brief 编辑模式模型白名单，默认取第一项 */
    pub edit_models: Vec<String>,
    pub sizes: Vec<String>,
    pub default_size: String,
    /** \brief 编辑模式固定尺寸，不采用调用方请求的尺寸 */
    pub edit_size: String,
}

impl Default for GiteeConfig {
    fn default() -> Self {
        Self {
            generation_endpoint: "https://ai.gitee.com/v1/images/generations".into(),
            edit_endpoint: "https://ai.gitee.com/v1/images/edits".into(),
            models: strings(&["Qwen-Image", "FLUX.1-dev", "Kolors", "HiDream-I1-Full"]),
            default_model: "Qwen-Image".into(),
            edit_models: strings(&["Qwen-Image-Edit", "FLUX.1-Kontext-dev"]),
            sizes: strings(&[
                "1024x1024", "1328x1328", "1664x928", "928x1664", "1472x1140", "1140x1472",
            ]),
            default_size: "1024x1024".into(),
            edit_size: "1024x1024".into(),
        }
    }
}

/**
 * \brief 魔搭（异步提交 + 轮询）配置。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelScopeConfig {
    pub base_url: String,
    pub models: Vec<String>,
    pub default_model: String,
    pub sizes: Vec<String>,
    pub default_size: String,
    pub max_poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for ModelScopeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.modelscope.cn".into(),
            models: strings(&[
                "Qwen/Qwen-Image",
                "MusePublic/489_ckpt_FLUX_1",
                "black-forest-labs/FLUX.1-Krea-dev",
            ]),
            default_model: "Qwen/Qwen-Image".into(),
            sizes: strings(&["1024x1024", "1328x1328", "1664x928", "928x1664"]),
            default_size: "1024x1024".into(),
            max_poll_attempts: 60,
            poll_interval_ms: 5_000,
        }
    }
}

impl ModelScopeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/**
 * \brief HuggingFace Space 故障转移池配置。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HuggingFaceConfig {
    /** \brief 按顺序尝试的 Space 基地址 */
    pub endpoints: Vec<String>,
    /** \brief Gradio 接口名 */
    pub api_name: String,
    /** \brief 对外展示的模型名 */
    pub model: String,
    pub sizes: Vec<String>,
    pub default_size: String,
    pub steps: u32,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            endpoints: strings(&[
                "https://mcp-tools-z-image-turbo.hf.space",
                "https://luca115-z-image-turbo.hf.space",
                "https://linoyts-z-image-turbo.hf.space",
            ]),
            api_name: "generate_image".into(),
            model: "z-image-turbo".into(),
            sizes: strings(&[
                "1024x1024", "1280x720", "720x1280", "1152x864", "864x1152", "1536x1024",
                "1024x1536",
            ]),
            default_size: "1024x1024".into(),
            steps: 9,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: GatewayConfig = serde_json::from_str(
            r#"{"request_timeout_secs": 60, "modelscope": {"max_poll_attempts": 3}}"#,
        )
        .unwrap();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.modelscope.max_poll_attempts, 3);
        assert_eq!(cfg.modelscope.poll_interval(), Duration::from_secs(5));
        assert_eq!(cfg.gitee.default_model, "Qwen-Image");
        assert_eq!(cfg.huggingface.endpoints.len(), 3);
    }

    #[test]
    fn test_env_overrides_replace_pool_and_timeout() {
        let mut cfg = GatewayConfig::default();
        cfg.apply_overrides(Some(" 42 "), Some("https://a.hf.space/, ,https://b.hf.space"))
            .unwrap();
        assert_eq!(cfg.request_timeout_secs, 42);
        assert_eq!(
            cfg.huggingface.endpoints,
            vec!["https://a.hf.space", "https://b.hf.space"]
        );
    }

    #[test]
    fn test_bad_timeout_override_is_rejected() {
        let mut cfg = GatewayConfig::default();
        assert!(cfg.apply_overrides(Some("soon"), None).is_err());
    }
}
