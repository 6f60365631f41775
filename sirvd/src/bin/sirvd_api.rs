use std::collections::BTreeMap;
use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sirvd::trajectory::CompartmentValues;
use sirvd::{compare_strategies, run_scenario, Compartment, ScenarioConfig, SirvdError, Trajectory, VaccinationStrategy};

#[derive(Debug, Deserialize)]
struct CompareRequest {
    /// Base scenario; the four-age-group preset when absent.
    scenario: Option<ScenarioConfig>,
    /// Strategies to compare; the standard presets when absent.
    strategies: Option<Vec<VaccinationStrategy>>,
}

#[derive(Debug, Serialize)]
struct GroupSeries {
    name: String,
    series: Vec<CompartmentValues>,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    return_code: i32,
    times: Vec<f64>,
    groups: Vec<GroupSeries>,
    population: Vec<CompartmentValues>,
    max_conservation_drift: f64,
    accepted_steps: usize,
    rejected_steps: usize,
}

#[derive(Debug, Serialize)]
struct StrategySummary {
    final_deceased: f64,
    peak_infectious: f64,
    peak_day: f64,
    run: RunResponse,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sirvd=info,sirvd_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/presets", get(presets))
        .route("/run_scenario", post(run_scenario_handler))
        .route("/compare_strategies", post(compare_strategies_handler));

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid HOST/PORT ({host}:{port})"))?;
    info!(%addr, "sirvd-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await.context("bind failed")?;
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

async fn presets() -> impl IntoResponse {
    match ScenarioConfig::four_age_groups() {
        Ok(cfg) => {
            let strategies = VaccinationStrategy::presets(cfg.groups.len());
            (StatusCode::OK, Json(json!({"scenario": cfg, "strategies": strategies}))).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

async fn run_scenario_handler(Json(cfg): Json<ScenarioConfig>) -> impl IntoResponse {
    // Integration is CPU-bound; keep it off the async workers.
    let join = tokio::task::spawn_blocking(move || {
        let traj = run_scenario(&cfg)?;
        summarize(&cfg, &traj)
    });

    match join.await {
        Ok(Ok(resp)) => (StatusCode::OK, Json(json!(resp))).into_response(),
        Ok(Err(e)) => error_response(e).into_response(),
        Err(e) => join_error(e).into_response(),
    }
}

async fn compare_strategies_handler(Json(req): Json<CompareRequest>) -> impl IntoResponse {
    let join = tokio::task::spawn_blocking(move || -> Result<BTreeMap<String, StrategySummary>, SirvdError> {
        let base = match req.scenario {
            Some(cfg) => cfg,
            None => ScenarioConfig::four_age_groups()?,
        };
        let strategies = req
            .strategies
            .unwrap_or_else(|| VaccinationStrategy::presets(base.groups.len()));

        let results = compare_strategies(&base, &strategies)?;
        let mut out = BTreeMap::new();
        for (name, traj) in results {
            let run = summarize(&base, &traj)?;
            let last = run.population.last().map(|p| p.d).unwrap_or(0.0);
            let (peak_day, peak_infectious) = run
                .times
                .iter()
                .zip(&run.population)
                .map(|(t, p)| (*t, p.get(Compartment::Infectious)))
                .fold((0.0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            out.insert(
                name,
                StrategySummary {
                    final_deceased: last,
                    peak_infectious,
                    peak_day,
                    run,
                },
            );
        }
        Ok(out)
    });

    match join.await {
        Ok(Ok(resp)) => (StatusCode::OK, Json(json!(resp))).into_response(),
        Ok(Err(e)) => error_response(e).into_response(),
        Err(e) => join_error(e).into_response(),
    }
}

fn summarize(cfg: &ScenarioConfig, traj: &Trajectory) -> Result<RunResponse, SirvdError> {
    let view = traj.view();
    let mut groups = Vec::with_capacity(cfg.groups.len());
    for (g, name) in cfg.groups.iter().enumerate() {
        groups.push(GroupSeries {
            name: name.clone(),
            series: view.compartment_series(g)?,
        });
    }
    Ok(RunResponse {
        return_code: 0,
        times: traj.times().to_vec(),
        groups,
        population: view.population_series(cfg.group_weights.as_deref())?,
        max_conservation_drift: traj.max_conservation_drift(),
        accepted_steps: traj.stats().accepted,
        rejected_steps: traj.stats().rejected,
    })
}

fn error_response(e: SirvdError) -> (StatusCode, Json<serde_json::Value>) {
    let code = match e {
        SirvdError::IntegrationFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    };
    error!(error = %e, "request failed");
    (code, Json(json!({"return_code": 1, "error": e.to_string()})))
}

fn join_error(e: tokio::task::JoinError) -> (StatusCode, Json<serde_json::Value>) {
    error!(error = %e, "simulation task failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"return_code": 2, "error": format!("join error: {e}")})),
    )
}
