//! appforge CLI.
//!
//!   appforge run --prompt "todo list app" [--feature sharing] [--deploy zip-upload]
//!   appforge similar --prompt "recipe sharing app"
//!
//! Requires ANTHROPIC_API_KEY (or the variable named by `llm.api_key_env`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use appforge::config::ForgeConfig;
use appforge::deploy::{DeployConfig, ProviderKind};
use appforge::llm::{LlmClient, TextGenerator};
use appforge::model::{GenerationRequest, Platform};
use appforge::search::SearchChain;
use appforge::{Pipeline, RunOptions};

#[derive(Parser)]
#[command(name = "appforge", about = "Generate and deploy an app from a description")]
struct Args {
    /// Config file (defaults to ~/.config/appforge/config.toml)
    #[arg(long, global = true, env = "APPFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Model override
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and print the result as JSON
    Run {
        #[arg(long)]
        prompt: String,

        #[arg(long, default_value = "web")]
        platform: Platform,

        /// Requested feature (repeatable)
        #[arg(long = "feature")]
        features: Vec<String>,

        #[arg(long, default_value = "modern")]
        style: String,

        #[arg(long, default_value = "general")]
        audience: String,

        /// Deploy to this provider: object-storage, git-build, zip-upload, build-api
        #[arg(long)]
        deploy: Option<ProviderKind>,

        /// Project name for the deployment (defaults to a slug of the prompt)
        #[arg(long)]
        project: Option<String>,
    },
    /// Search for existing apps similar to an idea
    Similar {
        #[arg(long)]
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "appforge=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let path = args.config.clone().unwrap_or_else(ForgeConfig::default_path);
    let mut config = ForgeConfig::load(&path).with_context(|| format!("loading {}", path.display()))?;
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }

    match args.command {
        Command::Run {
            prompt,
            platform,
            features,
            style,
            audience,
            deploy,
            project,
        } => {
            let request = GenerationRequest {
                prompt,
                platform,
                features,
                style,
                audience,
            };
            let options = match deploy {
                Some(kind) => {
                    let name = project.unwrap_or_else(|| appforge::agents::planner::slug(&request.prompt));
                    RunOptions::deploy_to(kind, DeployConfig::new(name))
                }
                None => RunOptions::default(),
            };
            let pipeline = Pipeline::from_config(&config)?;
            let result = pipeline.run(&request, &options).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            for e in &result.errors {
                tracing::warn!("{e}");
            }
        }
        Command::Similar { prompt } => {
            let llm: std::sync::Arc<dyn TextGenerator> = std::sync::Arc::new(LlmClient::from_settings(&config.llm)?);
            let search = SearchChain::from_settings(&config.search, None, Some(llm))?;
            let found = search.similar_apps(&prompt).await;
            for line in &found.log {
                tracing::warn!("{line}");
            }
            println!("{}", serde_json::to_string_pretty(&found.value)?);
        }
    }
    Ok(())
}
