use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use picrelay_core_sdk::models::{ChatCompletionRequest, ChatMessage, ContentPart};
use picrelay_core_sdk::{config::GatewayConfig, gateway::Gateway, router, server, telemetry};

/**
 * \brief CLI 程序入口：启动网关，或在终端里直接跑一次生成。
 */
#[derive(Parser, Debug)]
#[command(name = "picrelay", version, about = "OpenAI-compatible image generation gateway")]
struct Cli {
    /** \brief JSON 配置文件，缺省时使用内置默认值 */
    #[arg(long, global = true, env = "PICRELAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 启动 HTTP 网关。
     */
    Serve {
        #[arg(long, env = "PICRELAY_ADDR", default_value = "0.0.0.0:8080")]
        addr: String,
    },

    /**
     * \brief 显示凭证会被路由到哪个后端。
     */
    Classify { credential: String },

    /**
     * \brief 通过网关生成一次图片并打印 markdown 结果。
     * \param image 输入图片（URL 或 data URI），可重复
     */
    Generate {
        #[arg(long, env = "PICRELAY_KEY")]
        key: String,
        #[arg(long)]
        prompt: String,
        #[arg(long = "image")]
        images: Vec<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        size: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(telemetry::DEFAULT_FILTER);

    let config = GatewayConfig::load(cli.config.as_deref()).context("load config failed")?;

    match cli.command {
        Commands::Serve { addr } => {
            let gateway = Gateway::new(config).context("build gateway failed")?;
            server::run(&addr, gateway).await?;
        }
        Commands::Classify { credential } => {
            println!("{}", router::classify(&credential));
        }
        Commands::Generate {
            key,
            prompt,
            images,
            model,
            size,
        } => {
            let gateway = Gateway::new(config).context("build gateway failed")?;
            let mut parts = vec![ContentPart::text(prompt)];
            parts.extend(images.into_iter().map(ContentPart::image));
            let request = ChatCompletionRequest {
                model,
                messages: vec![ChatMessage::parts("user", parts)],
                stream: false,
                size,
            };
            let completion = gateway
                .complete(Some(&format!("Bearer {}", key)), &request)
                .await
                .context("generation failed")?;
            println!("{}", completion.content);
            telemetry::log_event(
                "cli.generate",
                &format!(
                    "provider={} model={} id={}",
                    completion.provider, completion.model, completion.id
                ),
            );
        }
    }

    Ok(())
}
