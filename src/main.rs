mod api;
mod config;
mod device;
mod error;
mod generation;
mod model;
mod sampling;
mod tokenizer;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use candle_core::Device;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::{Args, GenerationConfig, GenerationDefaults};
use crate::device::{device_info, dtype_for, get_device};
use crate::generation::TextGenerator;
use crate::model::{load_language_model, load_model_files, LanguageModel};
use crate::tokenizer::TokenizerWrapper;

struct Loaded {
    model: Box<dyn LanguageModel>,
    tokenizer: TokenizerWrapper,
    generation: GenerationConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "llama_query_server=info,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Ignoring unreadable .env: {}", e);
        }
    }

    let args = Args::parse();
    let addr = args.listen_addr()?;

    let device = get_device(args.cpu)?;
    info!("Using device: {}", device_info(&device));

    let loaded = {
        let args = args.clone();
        let device = device.clone();
        tokio::task::spawn_blocking(move || load(&args, &device)).await?
    };

    if let Some(prompt) = &args.prompt {
        let mut loaded = loaded?;
        let mut generator =
            TextGenerator::new(loaded.model.as_mut(), &loaded.tokenizer, &device);
        let output = generator.generate(prompt, &loaded.generation)?;
        println!("{}", output.text);
        info!(
            "{} prompt tokens, {} new tokens, {:.2} tokens/sec, {}ms total",
            output.prompt_tokens,
            output.tokens.len(),
            output.tokens_per_second,
            output.total_time_ms
        );
        return Ok(());
    }

    let state = match loaded {
        Ok(loaded) => {
            info!("Model {} loaded successfully", args.model);
            AppState::ready(
                loaded.model,
                loaded.tokenizer,
                device,
                args.model.clone(),
                loaded.generation,
            )
        }
        Err(e) => {
            error!("Model {} failed to load: {}", args.model, e);
            AppState::failed(e, device, args.model.clone())
        }
    };

    run_server(state, addr).await
}

fn load(args: &Args, device: &Device) -> error::Result<Loaded> {
    let files = load_model_files(&args.model, &args.revision, args.hf_token())?;

    let tokenizer = TokenizerWrapper::load(&files.tokenizer)?;
    let model = load_language_model(&files, device, dtype_for(device))?;
    info!(
        "Vocabulary size: model={}, tokenizer={}",
        model.vocab_size(),
        tokenizer.vocab_size()
    );

    let defaults = match &files.generation_config {
        Some(path) => GenerationDefaults::from_file(path)?,
        None => GenerationDefaults::default(),
    };
    let generation = GenerationConfig::resolve(args, &defaults);
    info!("Generation settings: {:?}", generation);

    Ok(Loaded {
        model,
        tokenizer,
        generation,
    })
}

async fn run_server(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::create_router(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("Listening on http://{} (GET /query?text=..., GET /health)", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
}
