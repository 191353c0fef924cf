//! Narration worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use navsight_firestore::{FirestoreClient, FirestoreJobRepository};
use navsight_media::{check_ffmpeg, check_ffprobe, FfmpegFrameSampler, SamplerConfig};
use navsight_ml_client::{OpenAiConfig, OpenAiSpeechClient, OpenAiVisionClient, SpeechOptions};
use navsight_models::NarrationLexicon;
use navsight_queue::JobQueue;
use navsight_storage::R2Client;
use navsight_worker::{
    JobExecutor, ObjectClassifier, Orchestrator, PipelineDeps, SpeechSynthesizer, WorkerConfig, WorkerError,
    WorkerResult,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting navsight-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    for check in [check_ffmpeg(), check_ffprobe()] {
        if let Err(e) = check {
            error!("Media tooling unavailable: {}", e);
            std::process::exit(1);
        }
    }

    let orchestrator = match build_orchestrator(&config).await {
        Ok(o) => o,
        Err(e) => {
            error!("Failed to build pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(JobExecutor::new(config, queue, orchestrator));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("navsight=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var("LOG_FORMAT") {
        Ok(format) if format.eq_ignore_ascii_case("json") => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer().with_target(true).with_file(false)).init(),
    }
}

async fn build_orchestrator(config: &WorkerConfig) -> WorkerResult<Orchestrator> {
    let lexicon = NarrationLexicon::load(config.lexicon_path.as_deref())
        .map_err(|e| WorkerError::config(format!("lexicon: {}", e)))?;
    info!("Narration lexicon has {} entries", lexicon.len());
    let lexicon = Arc::new(lexicon);

    let ml_config = OpenAiConfig::from_env().map_err(|e| WorkerError::config(e.to_string()))?;
    let synthesis_timeout = config.synthesis_timeout_for(ml_config.speech_budget());
    if synthesis_timeout > config.synthesis_timeout {
        info!(
            configured_secs = config.synthesis_timeout.as_secs(),
            effective_secs = synthesis_timeout.as_secs(),
            "Synthesis timeout raised to cover speech retries"
        );
    }
    let vision = OpenAiVisionClient::new(ml_config.clone()).map_err(|e| WorkerError::config(e.to_string()))?;
    let speech = OpenAiSpeechClient::new(ml_config).map_err(|e| WorkerError::config(e.to_string()))?;

    let store = R2Client::from_env().await?;
    let firestore = FirestoreClient::from_env().await?;

    let deps = PipelineDeps {
        frames: Arc::new(FfmpegFrameSampler::new(SamplerConfig::from_env())),
        classifier: ObjectClassifier::new(Arc::new(vision), Arc::clone(&lexicon), config.classify_timeout),
        synthesizer: SpeechSynthesizer::new(Arc::new(speech), SpeechOptions::from_env(), synthesis_timeout),
        store: Arc::new(store),
        jobs: Arc::new(FirestoreJobRepository::new(firestore)),
        lexicon,
    };

    Ok(Orchestrator::new(deps, config))
}
