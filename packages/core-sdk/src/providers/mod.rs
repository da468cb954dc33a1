pub mod gitee;
pub mod huggingface;
pub mod modelscope;
pub mod volcengine;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::HttpClient;
use crate::models::{CanonicalRequest, GeneratedImage};
use crate::router::Provider;

pub use gitee::GiteeAdapter;
pub use huggingface::HuggingFaceAdapter;
pub use modelscope::ModelScopeAdapter;
pub use volcengine::VolcEngineAdapter;

/**
 * \brief 由路由结果选出的唯一适配器；下游不再检查 Provider。
 */
#[derive(Debug, Clone)]
pub enum ImageAdapter {
    VolcEngine(VolcEngineAdapter),
    Gitee(GiteeAdapter),
    ModelScope(ModelScopeAdapter),
    HuggingFace(HuggingFaceAdapter),
}

impl ImageAdapter {
    /**
     * \brief 为 Provider 构造适配器；Unknown 视为认证失败。
     */
    pub fn select(
        provider: Provider,
        config: &GatewayConfig,
        client: &HttpClient,
    ) -> Result<Self, GatewayError> {
        let client = client.clone();
        match provider {
            Provider::VolcEngine => Ok(ImageAdapter::VolcEngine(VolcEngineAdapter::new(
                config.volcengine.clone(),
                client,
            ))),
            Provider::Gitee => Ok(ImageAdapter::Gitee(GiteeAdapter::new(
                config.gitee.clone(),
                client,
            ))),
            Provider::ModelScope => Ok(ImageAdapter::ModelScope(ModelScopeAdapter::new(
                config.modelscope.clone(),
                client,
            ))),
            Provider::HuggingFace => Ok(ImageAdapter::HuggingFace(HuggingFaceAdapter::new(
                config.huggingface.clone(),
                client,
            ))),
            Provider::Unknown => Err(GatewayError::Authentication(
                "unrecognized credential format".into(),
            )),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ImageAdapter::VolcEngine(_) => Provider::VolcEngine,
            ImageAdapter::Gitee(_) => Provider::Gitee,
            ImageAdapter::ModelScope(_) => Provider::ModelScope,
            ImageAdapter::HuggingFace(_) => Provider::HuggingFace,
        }
    }

    /** \brief 调用方未指定模型时回显的默认模型名。 */
    pub fn default_model(&self) -> &str {
        match self {
            ImageAdapter::VolcEngine(a) => &a.config().default_model,
            ImageAdapter::Gitee(a) => &a.config().default_model,
            ImageAdapter::ModelScope(a) => &a.config().default_model,
            ImageAdapter::HuggingFace(a) => &a.config().model,
        }
    }

    pub async fn generate(
        &self,
        credential: &str,
        request: &CanonicalRequest,
    ) -> Result<Vec<GeneratedImage>, GatewayError> {
        match self {
            ImageAdapter::VolcEngine(a) => a.generate(credential, request).await,
            ImageAdapter::Gitee(a) => a.generate(credential, request).await,
            ImageAdapter::ModelScope(a) => a.generate(credential, request).await,
            ImageAdapter::HuggingFace(a) => a.generate(credential, request).await,
        }
    }
}

/**
 * \brief 在白名单内解析调用方的取值，缺失或不认识时静默回落到默认值。
 */
pub fn resolve_choice(requested: Option<&str>, allowed: &[String], default: &str) -> String {
    requested
        .map(str::trim)
        .filter(|r| allowed.iter().any(|a| a.as_str() == *r))
        .unwrap_or(default)
        .to_string()
}

/**
 * \brief 所有已配置的模型，供 `/v1/models` 列出。
 */
pub fn catalog(config: &GatewayConfig) -> Vec<(Provider, String)> {
    let mut out = Vec::new();
    out.extend(
        config
            .volcengine
            .models
            .iter()
            .map(|m| (Provider::VolcEngine, m.clone())),
    );
    out.extend(
        config
            .gitee
            .models
            .iter()
            .chain(config.gitee.edit_models.iter())
            .map(|m| (Provider::Gitee, m.clone())),
    );
    out.extend(
        config
            .modelscope
            .models
            .iter()
            .map(|m| (Provider::ModelScope, m.clone())),
    );
    out.push((Provider::HuggingFace, config.huggingface.model.clone()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["a".into(), "b".into()]
    }

    #[test]
    fn test_resolve_choice_falls_back_silently() {
        assert_eq!(resolve_choice(Some("b"), &allowed(), "a"), "b");
        assert_eq!(resolve_choice(Some(" b "), &allowed(), "a"), "b");
        assert_eq!(resolve_choice(Some("zzz"), &allowed(), "a"), "a");
        assert_eq!(resolve_choice(None, &allowed(), "a"), "a");
    }

    #[test]
    fn test_unknown_provider_has_no_adapter() {
        let cfg = GatewayConfig::default();
        let client = HttpClient::new(cfg.request_timeout()).unwrap();
        let err = ImageAdapter::select(Provider::Unknown, &cfg, &client).unwrap_err();
        assert_eq!(err.status_code(), 401);

        let adapter = ImageAdapter::select(Provider::ModelScope, &cfg, &client).unwrap();
        assert_eq!(adapter.provider(), Provider::ModelScope);
        assert_eq!(adapter.default_model(), "Qwen/Qwen-Image");
    }

    #[test]
    fn test_catalog_lists_every_provider() {
        let cfg = GatewayConfig::default();
        let models = catalog(&cfg);
        for provider in [
            Provider::VolcEngine,
            Provider::Gitee,
            Provider::ModelScope,
            Provider::HuggingFace,
        ] {
            assert!(models.iter().any(|(p, _)| *p == provider));
        }
        assert!(models.iter().any(|(_, m)| m == "Qwen-Image-Edit"));
    }
}
