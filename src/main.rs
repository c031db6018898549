use crowd_fog::api::{self, ApiState};
use crowd_fog::config::{self, Config};
use crowd_fog::dispatch::InferenceDispatcher;
use crowd_fog::engine::FogEngine;
use crowd_fog::message::detector::{PeopleDetector, RemoteDetector, UnavailableDetector};
use crowd_fog::predictor::remote::RemoteModel;
use crowd_fog::predictor::{self, Predictor};
use crowd_fog::publisher::spawn_forwarder;
use crowd_fog::status::StatusBoard;
use crowd_fog::store::DeviceStateStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config::config_path();
    let config = config::load_from_path(&config_path)?;
    init_tracing(config.log_level());
    tracing::info!(config_path = %config_path.display(), "crowd-fog starting");

    let layout = config.feature_layout()?;
    let predictor = build_predictor(&config)?;
    let dispatcher = InferenceDispatcher::new(Arc::from(predictor), config.predictor_timeout());
    if let Err(err) = dispatcher.check_layout(&layout) {
        tracing::error!(error = %err, "Predictor does not fit the configured feature layout");
        return Err(err.into());
    }
    tracing::info!(
        top_n = layout.top_n(),
        total_devices = layout.total_devices(),
        width = layout.width(),
        predictor_timeout_ms = dispatcher.timeout().as_millis() as u64,
        "Feature layout ready"
    );

    let detector: Arc<dyn PeopleDetector> = match config.detector_endpoint() {
        Some(endpoint) => {
            tracing::info!(endpoint = endpoint, "Using remote people detector");
            Arc::new(RemoteDetector::new(
                endpoint.to_string(),
                config.detector_timeout(),
            ))
        }
        None => {
            tracing::info!("No people detector configured, raw images will be rejected");
            Arc::new(UnavailableDetector)
        }
    };

    let status = StatusBoard::shared(layout.total_devices());
    let (intake, receiver) = mpsc::channel(config.intake_capacity());
    let local_device = config.local_device();

    let _forwarder = match config.status_forward_url() {
        Some(url) => {
            let updates = status
                .read()
                .map_err(|_| crowd_fog::error::AppError::StateLock)?
                .subscribe_crowd();
            tracing::info!(url = url, "Forwarding crowd status updates");
            Some(spawn_forwarder(
                updates,
                url.to_string(),
                config.status_forward_timeout(),
            ))
        }
        None => None,
    };

    let engine = FogEngine::new(
        DeviceStateStore::new(layout),
        dispatcher,
        detector,
        Arc::clone(&status),
    )
    .with_local_device(local_device);
    let receiver_loop = tokio::spawn(engine.run(receiver));

    let app = api::router(ApiState {
        status,
        intake,
        layout,
        local_device,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last intake sender; the loop drains what is queued.
    receiver_loop.await?;
    tracing::info!("crowd-fog stopped");
    Ok(())
}

/// Local artifact, optionally wrapped by a remote predictor that falls back
/// to it. A missing artifact is fatal unless a remote endpoint is configured.
fn build_predictor(config: &Config) -> Result<Box<dyn Predictor>, Box<dyn std::error::Error>> {
    let path = predictor::artifact_path(config.models_dir(), config.model_name());
    let local = match predictor::load_artifact_from_path(&path) {
        Ok(model) => {
            tracing::info!(path = %path.display(), "Predictor artifact loaded");
            Some(model)
        }
        Err(err) if config.predictor_endpoint().is_some() => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "Failed to load predictor artifact, remote predictor has no fallback"
            );
            None
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "Failed to load predictor artifact");
            return Err(err.into());
        }
    };

    match (config.predictor_endpoint(), local) {
        (Some(endpoint), fallback) => {
            tracing::info!(endpoint = endpoint, "Using remote predictor");
            Ok(Box::new(RemoteModel::new(
                endpoint.to_string(),
                config.predictor_timeout(),
                config.model_name().to_string(),
                config.remote_feature_width(),
                fallback,
            )))
        }
        (None, Some(model)) => Ok(model),
        (None, None) => Err("no predictor available".into()),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
