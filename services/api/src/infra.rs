use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use kennel_engine::config::EngineConfig;
use kennel_engine::error::AppError;
use kennel_engine::workflows::training::{
    demo_catalog, InMemoryAppointments, InMemoryBalances, InMemoryProgression,
    RequirementCatalog, TrainingEngine,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type MemoryEngine =
    TrainingEngine<InMemoryAppointments, InMemoryProgression, InMemoryBalances>;

/// Configured CSV exports when present, otherwise the built-in catalog.
pub(crate) fn load_catalog(config: &EngineConfig) -> Result<RequirementCatalog, AppError> {
    match &config.catalog {
        Some(paths) => {
            let catalog = RequirementCatalog::from_paths(&paths.levels, &paths.training_types)?;
            info!(
                levels = %paths.levels.display(),
                training_types = %paths.training_types.display(),
                "requirement catalog loaded"
            );
            Ok(catalog)
        }
        None => {
            info!("no catalog exports configured, using the demonstration catalog");
            Ok(demo_catalog())
        }
    }
}

pub(crate) fn in_memory_engine(catalog: RequirementCatalog) -> MemoryEngine {
    TrainingEngine::new(
        Arc::new(catalog),
        Arc::new(InMemoryAppointments::default()),
        Arc::new(InMemoryProgression::default()),
        Arc::new(InMemoryBalances::default()),
    )
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn session_start(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    date.and_time(time).and_utc()
}
