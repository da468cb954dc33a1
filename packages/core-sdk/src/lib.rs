pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod http;
pub mod media;
pub mod models;
pub mod providers;
pub mod response;
pub mod router;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::error::GatewayError;
    pub use crate::gateway::{Completion, Gateway};
    pub use crate::models::{ChatCompletionRequest, ChatMessage, ContentPart, GeneratedImage};
    pub use crate::router::{classify, Provider};
    pub use crate::{extract, response, server, telemetry};
}
