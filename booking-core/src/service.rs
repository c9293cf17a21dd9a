use booking_shared::MaskedEmail;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::flight_client::FlightClient;
use crate::models::{
    Booking, BookingRequest, BookingResponse, FlightSnapshot, Passenger, PassengerDetails,
};
use crate::pnr::generate_pnr;
use crate::repository::{BookingStore, BookingUnitOfWork, StoreError};
use crate::resilience::{CircuitBreaker, CircuitBreakerError};
use crate::{BookingError, BookingResult};

/// Attempts at drawing an unused PNR before giving up.
const MAX_PNR_ATTEMPTS: usize = 5;

const FLIGHT_SERVICE_UNAVAILABLE: &str = "Flight service unavailable. Try again later.";

/// A booking request that passed validation, with the owner email settled.
#[derive(Debug)]
struct ValidatedRequest {
    flight_id: i64,
    user_email: String,
    num_seats: i32,
    passengers: Vec<PassengerDetails>,
}

fn validate_request(
    request: Option<BookingRequest>,
    caller_email: &str,
) -> BookingResult<ValidatedRequest> {
    let request = request
        .ok_or_else(|| BookingError::InvalidRequest("Request body is required".to_string()))?;

    if caller_email.trim().is_empty() {
        return Err(BookingError::InvalidRequest(
            "X-User-Email header is required".to_string(),
        ));
    }

    // The caller's identity is canonical; a body email may only repeat it.
    let user_email = match request.user_email.as_deref().map(str::trim) {
        None | Some("") => caller_email.to_string(),
        Some(body_email) if body_email.eq_ignore_ascii_case(caller_email.trim()) => {
            body_email.to_string()
        }
        Some(_) => {
            return Err(BookingError::InvalidRequest(
                "Header user email must match request userEmail".to_string(),
            ))
        }
    };

    let flight_id = request
        .flight_id
        .ok_or_else(|| BookingError::InvalidRequest("flightId is required".to_string()))?;

    let num_seats = match request.num_seats {
        Some(n) if n > 0 => n,
        _ => {
            return Err(BookingError::InvalidRequest(
                "numSeats must be provided and > 0".to_string(),
            ))
        }
    };

    let passengers = match request.passengers {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err(BookingError::InvalidRequest(
                "passengers list is required and cannot be empty".to_string(),
            ))
        }
    };
    if passengers.len() != num_seats as usize {
        return Err(BookingError::InvalidRequest(
            "number of passengers must match numSeats".to_string(),
        ));
    }

    Ok(ValidatedRequest {
        flight_id,
        user_email,
        num_seats,
        passengers,
    })
}

fn persistence_failure(context: &str, err: StoreError) -> BookingError {
    error!("{}: {}", context, err);
    BookingError::internal(context, err)
}

/// The booking workflow: validation, flight lookup behind a circuit breaker,
/// availability and pricing, and persistence through the booking store.
pub struct BookingService {
    flight_client: Arc<dyn FlightClient>,
    store: Arc<dyn BookingStore>,
    breaker: Arc<CircuitBreaker>,
}

impl BookingService {
    pub fn new(
        flight_client: Arc<dyn FlightClient>,
        store: Arc<dyn BookingStore>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            flight_client,
            store,
            breaker,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Create a booking for `caller_email`.
    ///
    /// Transport failures of the flight service, and calls rejected by an
    /// open breaker, end in `ServiceUnavailable`.
    pub async fn create_booking(
        &self,
        request: Option<BookingRequest>,
        caller_email: &str,
    ) -> BookingResult<BookingResponse> {
        let caller = MaskedEmail::from(caller_email);
        debug!(
            "createBooking called: flightId={:?}, caller={}, numSeats={:?}",
            request.as_ref().and_then(|r| r.flight_id),
            caller,
            request.as_ref().and_then(|r| r.num_seats)
        );

        let request = validate_request(request, caller_email)?;

        let flight = self
            .fetch_flight(request.flight_id, &caller)
            .await?
            .ok_or_else(|| {
                BookingError::NotFound(format!("Flight not found: {}", request.flight_id))
            })?;

        let available = flight.available_seats();
        if available < request.num_seats as usize {
            return Err(BookingError::Conflict(format!(
                "Not enough seats available: requested={}, available={}",
                request.num_seats, available
            )));
        }

        let total_price = flight.price_per_seat() * f64::from(request.num_seats);
        let passengers: Vec<Passenger> = request.passengers.iter().map(Passenger::from).collect();
        let booking = Booking::new(
            String::new(),
            request.flight_id,
            request.user_email,
            total_price,
            passengers,
        );

        let mut uow = self
            .store
            .begin()
            .await
            .map_err(|e| persistence_failure("Failed to save booking", e))?;
        let saved = Self::insert_with_fresh_pnr(uow.as_mut(), booking).await?;
        uow.commit()
            .await
            .map_err(|e| persistence_failure("Failed to save booking", e))?;

        info!(
            "Booking saved: pnr={}, flightId={}, user={}",
            saved.pnr,
            saved.flight_id,
            MaskedEmail::from(saved.user_email.as_str())
        );

        Ok(BookingResponse::from(&saved))
    }

    pub async fn get_by_pnr(&self, pnr: &str) -> BookingResult<BookingResponse> {
        let booking = self
            .store
            .find_by_pnr(pnr)
            .await
            .map_err(|e| persistence_failure("Failed to load booking", e))?
            .ok_or_else(|| BookingError::NotFound("PNR not found".to_string()))?;

        Ok(BookingResponse::from(&booking))
    }

    /// Bookings owned by `email`, most recent first.
    pub async fn get_history_by_email(&self, email: &str) -> BookingResult<Vec<BookingResponse>> {
        let bookings = self
            .store
            .find_by_owner_ordered_by_created_desc(email)
            .await
            .map_err(|e| persistence_failure("Failed to load booking history", e))?;

        Ok(bookings.iter().map(BookingResponse::from).collect())
    }

    /// Cancel a booking on behalf of its owner. Cancelling an already
    /// cancelled booking returns it unchanged.
    pub async fn cancel_booking(
        &self,
        pnr: &str,
        caller_email: &str,
    ) -> BookingResult<BookingResponse> {
        let mut uow = self
            .store
            .begin()
            .await
            .map_err(|e| persistence_failure("Failed to cancel booking", e))?;

        let mut booking = uow
            .find_by_pnr(pnr)
            .await
            .map_err(|e| persistence_failure("Failed to load booking", e))?
            .ok_or_else(|| BookingError::NotFound("PNR not found".to_string()))?;

        if !booking.is_owned_by(caller_email) {
            return Err(BookingError::Forbidden(
                "Only the booking owner can cancel this booking".to_string(),
            ));
        }

        if !booking.cancel() {
            debug!("Booking {} already cancelled", booking.pnr);
            return Ok(BookingResponse::from(&booking));
        }

        let saved = uow
            .save(booking)
            .await
            .map_err(|e| persistence_failure("Failed to cancel booking", e))?;
        uow.commit()
            .await
            .map_err(|e| persistence_failure("Failed to cancel booking", e))?;

        info!(
            "Booking cancelled: pnr={}, flightId={}, user={}",
            saved.pnr,
            saved.flight_id,
            MaskedEmail::from(saved.user_email.as_str())
        );

        Ok(BookingResponse::from(&saved))
    }

    async fn fetch_flight(
        &self,
        flight_id: i64,
        caller: &MaskedEmail,
    ) -> BookingResult<Option<FlightSnapshot>> {
        match self
            .breaker
            .call(|| self.flight_client.get_flight_by_id(flight_id))
            .await
        {
            Ok(flight) => Ok(flight),
            Err(CircuitBreakerError::Inner(err)) => {
                warn!("Error calling flight service for id {}: {}", flight_id, err);
                Err(self.create_booking_fallback(flight_id, caller, &err))
            }
            Err(open @ CircuitBreakerError::Open(_)) => {
                Err(self.create_booking_fallback(flight_id, caller, &open))
            }
        }
    }

    fn create_booking_fallback(
        &self,
        flight_id: i64,
        caller: &MaskedEmail,
        cause: &dyn Display,
    ) -> BookingError {
        warn!(
            "createBooking fallback for flightId={} user={}: {}",
            flight_id, caller, cause
        );
        BookingError::ServiceUnavailable(FLIGHT_SERVICE_UNAVAILABLE.to_string())
    }

    async fn insert_with_fresh_pnr(
        uow: &mut dyn BookingUnitOfWork,
        mut booking: Booking,
    ) -> BookingResult<Booking> {
        for attempt in 1..=MAX_PNR_ATTEMPTS {
            booking.pnr = generate_pnr();
            match uow.save(booking.clone()).await {
                Ok(saved) => return Ok(saved),
                Err(StoreError::DuplicatePnr(pnr)) => {
                    warn!("PNR collision on {} (attempt {})", pnr, attempt);
                }
                Err(e) => return Err(persistence_failure("Failed to save booking", e)),
            }
        }
        Err(persistence_failure(
            "Failed to save booking",
            StoreError::DuplicatePnr(booking.pnr),
        ))
    }
}
