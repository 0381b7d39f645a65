use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use airscribe_api::build_router;
use airscribe_api::state::AppState;
use airscribe_api::ws::{dispatcher, storage::SubscriberStorage};
use airscribe_config::Settings;
use airscribe_relay::RelayError;
use airscribe_relay::asr::{SessionConfig, deepgram::DeepgramSpeech};
use airscribe_relay::coordinator::{Pipeline, PipelineConfig};
use airscribe_relay::reformat::{OpenAiReformat, Reformat, ReformatConfig};
use airscribe_relay::transcoder::{FfmpegSource, TranscoderConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::load().context("failed to load configuration")?;
    info!(
        playlist = %settings.stream.playlist_url,
        version = env!("CARGO_PKG_VERSION"),
        "Starting airscribe"
    );

    let deepgram_key = std::env::var("DEEPGRAM_API_KEY")
        .map_err(|_| RelayError::MissingCredential("DEEPGRAM_API_KEY"))?;
    let speech = match &settings.speech.endpoint {
        Some(endpoint) => DeepgramSpeech::with_endpoint(endpoint.clone(), deepgram_key),
        None => DeepgramSpeech::new(deepgram_key),
    };

    let reformat_config = ReformatConfig {
        model: settings.reformat.model.clone(),
        system_prompt: settings.reformat.system_prompt.clone(),
        timeout_ms: settings.reformat.timeout_ms,
    };
    let reformatter: Option<Arc<dyn Reformat>> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) => {
            let backend = match &settings.reformat.endpoint {
                Some(endpoint) => {
                    OpenAiReformat::with_endpoint(endpoint.clone(), key, &reformat_config)
                }
                None => OpenAiReformat::new(key, &reformat_config),
            };
            Some(Arc::new(backend))
        }
        Err(_) => {
            info!("OPENAI_API_KEY not set, reformatting disabled");
            None
        }
    };

    let pipeline_config = PipelineConfig {
        playlist_url: settings.stream.playlist_url.clone(),
        chunk_bytes: settings.stream.chunk_bytes,
        session: SessionConfig {
            model: settings.speech.model.clone(),
            language: settings.speech.language.clone(),
            smart_format: settings.speech.smart_format,
            forward_interim: settings.speech.forward_interim,
            ..SessionConfig::default()
        },
        reformat: reformat_config,
    };

    let pcm_source = Arc::new(FfmpegSource::new(TranscoderConfig {
        ffmpeg_bin: settings.stream.ffmpeg_bin.clone(),
        stop_grace_ms: settings.stream.stop_grace_ms,
    }));

    let (pipeline, out_rx) =
        Pipeline::new(pipeline_config, pcm_source, Arc::new(speech), reformatter);
    let pipeline = Arc::new(pipeline);

    let subscribers = Arc::new(SubscriberStorage::new());
    tokio::spawn(dispatcher::run_broadcast(subscribers.clone(), out_rx));

    let app = build_router(AppState {
        subscribers,
        pipeline: pipeline.clone(),
    });
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listener endpoint ready");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(%e, "Server error");
        }
    });

    let mut runner = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.run().await }
    });

    // Run until the operator interrupts or the pipeline ends on its own
    // (stream over, startup failure).
    let finished = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            pipeline.stop();
            None
        }
        result = &mut runner => Some(result),
    };

    let run_result = match finished {
        Some(result) => result,
        None => runner.await,
    };

    server.abort();

    match run_result {
        Ok(Ok(())) => {
            info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow::anyhow!("pipeline task failed: {e}")),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airscribe=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
