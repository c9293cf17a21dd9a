use async_trait::async_trait;

use crate::models::Booking;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Booking reference already exists: {0}")]
    DuplicatePnr(String),
    #[error("Booking does not exist: {0}")]
    Missing(String),
    #[error("Corrupt booking record: {0}")]
    Corrupt(String),
}

/// Durable storage for bookings and their passengers.
///
/// Reads that need no isolation go straight to the store. Writes go through a
/// unit of work obtained from [`BookingStore::begin`]; dropping a unit of work
/// without calling `commit` discards everything it staged.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork>, StoreError>;

    async fn find_by_pnr(&self, pnr: &str) -> Result<Option<Booking>, StoreError>;

    /// All bookings whose owner is `email`, most recent first.
    async fn find_by_owner_ordered_by_created_desc(
        &self,
        email: &str,
    ) -> Result<Vec<Booking>, StoreError>;
}

/// A scoped transaction over the booking store.
#[async_trait]
pub trait BookingUnitOfWork: Send {
    /// Read a booking inside the transaction. Implementations lock the row
    /// where the backend supports it.
    async fn find_by_pnr(&mut self, pnr: &str) -> Result<Option<Booking>, StoreError>;

    /// Insert a booking with its passengers when `id` is `None`, otherwise
    /// update its status fields. Returns the booking as stored.
    async fn save(&mut self, booking: Booking) -> Result<Booking, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
