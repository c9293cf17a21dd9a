pub mod flight_client;
pub mod memory;
pub mod models;
pub mod pnr;
pub mod repository;
pub mod resilience;
pub mod service;

pub use flight_client::{FlightClient, FlightClientError};
pub use memory::InMemoryBookingStore;
pub use repository::{BookingStore, BookingUnitOfWork, StoreError};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use service::BookingService;

/// Failures surfaced to callers of the booking workflow.
///
/// `Internal` carries the logged cause for diagnostics; its `Display` output
/// never includes it.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BookingError {
    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
