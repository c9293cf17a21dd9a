use async_trait::async_trait;

use crate::models::FlightSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum FlightClientError {
    #[error("Flight service unreachable: {0}")]
    Transport(String),
    #[error("Flight service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Flight service returned an unreadable payload: {0}")]
    Decode(String),
}

#[async_trait]
pub trait FlightClient: Send + Sync {
    /// Fetch a flight with its seat map. `Ok(None)` means the flight service
    /// answered that no such flight exists.
    async fn get_flight_by_id(
        &self,
        flight_id: i64,
    ) -> Result<Option<FlightSnapshot>, FlightClientError>;
}
