// Park It - Web Server
// REST API over the parking workflow with Axum

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use park_it::{
    get_all_spots, get_occupancy, get_tickets_for_vehicle, init_logging, seed_default_spots,
    ExitReceipt, ParkingConfig, ParkingError, ParkingService, SqliteStore, Ticket, VehicleCategory,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application state
///
/// The workflow sits behind a mutex: find-then-reserve is not atomic, so
/// entries and exits must run one at a time.
#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<ParkingService<SqliteStore, SqliteStore>>>,
    store: SqliteStore,
}

impl AppState {
    fn new(store: SqliteStore) -> Self {
        AppState {
            service: Arc::new(Mutex::new(ParkingService::new(store.clone(), store.clone()))),
            store,
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
struct EntryRequest {
    category: VehicleCategory,
    vehicle_id: String,
}

#[derive(Deserialize)]
struct ExitRequest {
    vehicle_id: String,
}

/// Exit response (ticket flattened for clients)
#[derive(Serialize)]
struct ExitResponse {
    ticket_id: i64,
    vehicle_id: String,
    parking_number: u32,
    price: f64,
    was_free: bool,
    spot_released: bool,
}

impl From<ExitReceipt> for ExitResponse {
    fn from(receipt: ExitReceipt) -> Self {
        Self {
            ticket_id: receipt.ticket.id,
            vehicle_id: receipt.ticket.vehicle_id,
            parking_number: receipt.ticket.spot.number,
            price: receipt.price,
            was_free: receipt.was_free,
            spot_released: receipt.spot_released,
        }
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn status_for(err: &ParkingError) -> StatusCode {
    match err {
        ParkingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ParkingError::TicketNotFound(_) => StatusCode::NOT_FOUND,
        ParkingError::LotFull(_) | ParkingError::TicketUpdateFailed(_) => StatusCode::CONFLICT,
        ParkingError::FareComputationFailed(_) | ParkingError::UnknownCategory(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ParkingError::PersistenceFailure(_)
        | ParkingError::EntryFailed(_)
        | ParkingError::ExitFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parking_error_response(err: ParkingError) -> Response {
    (status_for(&err), Json(ApiResponse::err(err.to_string()))).into_response()
}

fn internal_error(context: &str, err: anyhow::Error) -> Response {
    error!(error = ?err, "{}", context);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err(context)),
    )
        .into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/spots - All spots with availability
async fn get_spots(State(state): State<AppState>) -> Response {
    match state.store.with_connection(get_all_spots) {
        Ok(spots) => (StatusCode::OK, Json(ApiResponse::ok(spots))).into_response(),
        Err(e) => internal_error("Error getting spots", e),
    }
}

/// GET /api/occupancy - Free / total per category
async fn occupancy(State(state): State<AppState>) -> Response {
    match state.store.with_connection(get_occupancy) {
        Ok(occ) => (StatusCode::OK, Json(ApiResponse::ok(occ))).into_response(),
        Err(e) => internal_error("Error getting occupancy", e),
    }
}

/// POST /api/entries - Park a vehicle
async fn create_entry(State(state): State<AppState>, Json(req): Json<EntryRequest>) -> Response {
    let Ok(service) = state.service.lock() else {
        return internal_error("Workflow lock poisoned", anyhow::anyhow!("poisoned mutex"));
    };

    match service.process_entry(req.category, &req.vehicle_id) {
        Ok(ticket) => (StatusCode::CREATED, Json(ApiResponse::ok(ticket))).into_response(),
        Err(e) => parking_error_response(e),
    }
}

/// POST /api/exits - Bill a vehicle and free its spot
async fn create_exit(State(state): State<AppState>, Json(req): Json<ExitRequest>) -> Response {
    let Ok(service) = state.service.lock() else {
        return internal_error("Workflow lock poisoned", anyhow::anyhow!("poisoned mutex"));
    };

    match service.process_exit(&req.vehicle_id) {
        Ok(receipt) => {
            (StatusCode::OK, Json(ApiResponse::ok(ExitResponse::from(receipt)))).into_response()
        }
        Err(e) => parking_error_response(e),
    }
}

/// GET /api/vehicles/:vehicle_id/tickets - Visit history of a vehicle
async fn vehicle_tickets(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Response {
    match state
        .store
        .with_connection(|conn| get_tickets_for_vehicle(conn, &vehicle_id))
    {
        Ok(tickets) => (StatusCode::OK, Json(ApiResponse::<Vec<Ticket>>::ok(tickets))).into_response(),
        Err(e) => internal_error("Error getting tickets", e),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/spots", get(get_spots))
        .route("/occupancy", get(occupancy))
        .route("/entries", post(create_entry))
        .route("/exits", post(create_exit))
        .route("/vehicles/:vehicle_id/tickets", get(vehicle_tickets))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = ParkingConfig::from_env()?;
    config.validate()?;
    init_logging(&config.logging)?;

    let store = SqliteStore::open(&config.db_path, config.recurring_threshold)?;
    let seeded = store.with_connection(|conn| {
        seed_default_spots(conn, config.seed_car_spots, config.seed_bike_spots)
    })?;
    info!(db_path = %config.db_path.display(), seeded, "database opened");

    let app = router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("Failed to start server")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let store = SqliteStore::open_in_memory(1).unwrap();
        store
            .with_connection(|conn| seed_default_spots(conn, 1, 1))
            .unwrap();
        AppState::new(store)
    }

    fn entry(category: VehicleCategory, vehicle_id: &str) -> Json<EntryRequest> {
        Json(EntryRequest {
            category,
            vehicle_id: vehicle_id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_entry_then_exit() {
        let state = state();

        let res = create_entry(State(state.clone()), entry(VehicleCategory::Car, "ABCDEF")).await;
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = create_entry(State(state.clone()), entry(VehicleCategory::Car, "OTHER")).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = create_exit(
            State(state.clone()),
            Json(ExitRequest {
                vehicle_id: "ABCDEF".to_string(),
            }),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = create_exit(
            State(state.clone()),
            Json(ExitRequest {
                vehicle_id: "ABCDEF".to_string(),
            }),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let history = state
            .store
            .with_connection(|conn| get_tickets_for_vehicle(conn, "ABCDEF"))
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_vehicle_id_is_bad_request() {
        let res = create_entry(State(state()), entry(VehicleCategory::Bike, " ")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ParkingError::LotFull(VehicleCategory::Bike)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ParkingError::TicketNotFound("X".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ParkingError::EntryFailed(anyhow::anyhow!("down"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
