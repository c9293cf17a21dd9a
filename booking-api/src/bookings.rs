use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use axum_extra::TypedHeader;
use booking_core::models::{BookingRequest, BookingResponse};
use booking_core::resilience::CircuitBreakerMetrics;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::headers::UserEmail;
use crate::state::AppState;

pub const BASE_PATH: &str = "/api/flight";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelResponse {
    message: &'static str,
    #[serde(flatten)]
    booking: BookingResponse,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/booking/{flight_id}", post(create_booking))
        .route("/ticket/{pnr}", get(get_ticket))
        .route("/booking/history/{email}", get(booking_history))
        .route("/booking/cancel/{pnr}", delete(cancel_booking))
        .route("/health/flight-service", get(flight_service_health))
}

async fn create_booking(
    State(state): State<AppState>,
    Path(flight_id): Path<i64>,
    user: Option<TypedHeader<UserEmail>>,
    body: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let request = match body {
        Ok(Json(mut req)) => {
            match req.flight_id {
                Some(body_id) if body_id != flight_id => {
                    return Err(AppError::ValidationError(
                        "flightId in path and body must match".to_string(),
                    ));
                }
                Some(_) => {}
                None => req.flight_id = Some(flight_id),
            }
            Some(req)
        }
        Err(JsonRejection::MissingJsonContentType(_)) => None,
        Err(rejection) => return Err(rejection.into()),
    };

    let caller = user.map(|TypedHeader(UserEmail(email))| email).unwrap_or_default();
    let booking = state.bookings.create_booking(request, &caller).await?;

    let location = format!("{}/ticket/{}", BASE_PATH, booking.pnr);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(booking),
    ))
}

async fn get_ticket(
    State(state): State<AppState>,
    Path(pnr): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    Ok(Json(state.bookings.get_by_pnr(&pnr).await?))
}

async fn booking_history(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    Ok(Json(state.bookings.get_history_by_email(&email).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(pnr): Path<String>,
    TypedHeader(UserEmail(caller)): TypedHeader<UserEmail>,
) -> Result<Json<CancelResponse>, AppError> {
    let booking = state.bookings.cancel_booking(&pnr, &caller).await?;
    info!("Cancel request served for {}", booking.pnr);

    Ok(Json(CancelResponse {
        message: "Booking cancelled successfully",
        booking,
    }))
}

async fn flight_service_health(State(state): State<AppState>) -> Json<CircuitBreakerMetrics> {
    Json(state.bookings.breaker().metrics())
}
