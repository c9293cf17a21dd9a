pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod flight_client;

pub use booking_repo::PostgresBookingStore;
pub use database::DbClient;
pub use flight_client::HttpFlightClient;
