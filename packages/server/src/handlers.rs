//! HTTP handler functions for the parking watch API.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use parking_watch_lot_models::ViolationFilter;
use parking_watch_server_models::{
    ApiHealth, ApiObservationResponse, ApiReset, ApiSimulationState, ObservationRequest,
    StartSimulationRequest, ViolationQueryParams,
};
use parking_watch_simulation::SimulationScenario;
use parking_watch_store::StoreError;

use crate::AppState;

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
}

/// Maps a store error onto the matching HTTP status.
fn store_error(e: &StoreError) -> HttpResponse {
    match e {
        StoreError::NotFound { .. } => {
            HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() }))
        }
        StoreError::InvalidInput { .. } => bad_request(&e.to_string()),
        StoreError::Seed(_) => {
            log::error!("Store error: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Store unavailable"
            }))
        }
    }
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/lots`
pub async fn lots(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.store.query_lots(Utc::now()))
}

/// `GET /api/lots/{id}`
pub async fn lot(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.store.get_lot_status(&path, Utc::now()) {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => store_error(&e),
    }
}

/// `POST /api/observations`
///
/// Applies one vehicle-count reading. A rejected reading leaves the store
/// unchanged.
pub async fn submit_observation(
    state: web::Data<AppState>,
    body: web::Json<ObservationRequest>,
) -> HttpResponse {
    let now = Utc::now();
    let observation = match body.into_inner().into_observation(now) {
        Ok(observation) => observation,
        Err(message) => return bad_request(&message),
    };

    let outcome = match state.store.submit(&observation) {
        Ok(outcome) => outcome,
        Err(e) => return store_error(&e),
    };

    match state.store.get_lot_status(&outcome.lot_id, now.max(observation.observed_at)) {
        Ok(lot) => HttpResponse::Ok().json(ApiObservationResponse { outcome, lot }),
        Err(e) => store_error(&e),
    }
}

/// `GET /api/violations?status=&lotId=`
pub async fn violations(
    state: web::Data<AppState>,
    params: web::Query<ViolationQueryParams>,
) -> HttpResponse {
    match ViolationFilter::try_from(params.into_inner()) {
        Ok(filter) => HttpResponse::Ok().json(state.store.list_violations(&filter)),
        Err(message) => bad_request(&message),
    }
}

/// `GET /api/violations/{id}`
pub async fn violation(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    match state.store.get_violation(&path) {
        Ok(violation) => HttpResponse::Ok().json(violation),
        Err(e) => store_error(&e),
    }
}

/// `GET /api/offenders`
pub async fn offenders(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.store.chronic_offenders(Utc::now()))
}

/// `GET /api/stats`
pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.store.aggregate_stats(Utc::now()))
}

/// `GET /api/heatmap`
pub async fn heatmap(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.store.violation_heatmap())
}

/// `GET /api/simulation`
pub async fn simulation_state(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiSimulationState::from(state.simulator.state().await))
}

/// `POST /api/simulation/start`
///
/// Only rush hour runs in the background; replays are driven from the CLI.
pub async fn simulation_start(
    state: web::Data<AppState>,
    body: Option<web::Json<StartSimulationRequest>>,
) -> HttpResponse {
    let scenario = body
        .and_then(|b| b.into_inner().scenario)
        .unwrap_or(SimulationScenario::RushHour);
    if scenario != SimulationScenario::RushHour {
        return bad_request(&format!("scenario '{scenario}' cannot run in the server"));
    }

    match state.simulator.start(scenario, Utc::now()).await {
        Ok(sim) => HttpResponse::Ok().json(ApiSimulationState::from(sim)),
        Err(e) => {
            log::error!("Failed to start simulation: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to start simulation"
            }))
        }
    }
}

/// `POST /api/simulation/stop`
pub async fn simulation_stop(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiSimulationState::from(state.simulator.stop().await))
}

/// `POST /api/reset`
///
/// Restores the provisioned lots and violations.
pub async fn reset(state: web::Data<AppState>) -> HttpResponse {
    state.store.reset_to_seed();
    HttpResponse::Ok().json(ApiReset {
        lots: state.store.lots().len(),
        violations: state
            .store
            .list_violations(&ViolationFilter::default())
            .len(),
    })
}
