use crate::cli::ServeArgs;
use crate::infra::{in_memory_engine, load_catalog, AppState};
use crate::routes::with_training_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use kennel_engine::config::AppConfig;
use kennel_engine::error::AppError;
use kennel_engine::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = load_catalog(&config.engine)?;
    let engine = Arc::new(in_memory_engine(catalog));
    let settings = config.engine.settings;

    let app = with_training_routes(engine, settings)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        auto_billing = settings.auto_billing_enabled,
        auto_progress = settings.auto_progress_enabled,
        "kennel engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
