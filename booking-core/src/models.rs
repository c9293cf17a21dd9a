use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Booking status in the lifecycle. A booking only ever moves Active → Cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "ACTIVE",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown booking status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ACTIVE") {
            Ok(BookingStatus::Active)
        } else if s.eq_ignore_ascii_case("CANCELLED") {
            Ok(BookingStatus::Cancelled)
        } else {
            Err(UnknownStatus(s.to_string()))
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Passenger details as they travel over the wire, both in requests and responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassengerDetails {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub seat_number: Option<String>,
    pub meal_preference: Option<String>,
}

/// Incoming booking request. Every field is optional so missing input can be
/// reported as a validation failure instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub flight_id: Option<i64>,
    pub user_email: Option<String>,
    pub num_seats: Option<i32>,
    pub passengers: Option<Vec<PassengerDetails>>,
}

/// External representation of a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub pnr: String,
    pub flight_id: i64,
    pub user_email: String,
    pub num_seats: i32,
    pub total_price: f64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub passengers: Vec<PassengerDetails>,
}

// ============================================================================
// Entities
// ============================================================================

/// A passenger owned by exactly one booking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub seat_number: Option<String>,
    pub meal_preference: Option<String>,
}

impl From<&PassengerDetails> for Passenger {
    fn from(details: &PassengerDetails) -> Self {
        Self {
            name: details.name.clone(),
            gender: details.gender.clone(),
            age: details.age,
            seat_number: details.seat_number.clone(),
            meal_preference: details.meal_preference.clone(),
        }
    }
}

impl From<&Passenger> for PassengerDetails {
    fn from(passenger: &Passenger) -> Self {
        Self {
            name: passenger.name.clone(),
            gender: passenger.gender.clone(),
            age: passenger.age,
            seat_number: passenger.seat_number.clone(),
            meal_preference: passenger.meal_preference.clone(),
        }
    }
}

/// A persisted booking. `id` stays `None` until the store has inserted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Option<i64>,
    pub pnr: String,
    pub flight_id: i64,
    pub user_email: String,
    pub num_seats: i32,
    pub total_price: f64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub passengers: Vec<Passenger>,
}

impl Booking {
    pub fn new(
        pnr: String,
        flight_id: i64,
        user_email: String,
        total_price: f64,
        passengers: Vec<Passenger>,
    ) -> Self {
        Self {
            id: None,
            pnr,
            flight_id,
            user_email,
            num_seats: passengers.len() as i32,
            total_price,
            status: BookingStatus::Active,
            created_at: Utc::now(),
            cancelled_at: None,
            passengers,
        }
    }

    pub fn is_owned_by(&self, email: &str) -> bool {
        self.user_email.to_lowercase() == email.to_lowercase()
    }

    /// Mark as cancelled. Returns false when the booking was already cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.status == BookingStatus::Cancelled {
            return false;
        }
        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(Utc::now());
        true
    }
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        Self {
            pnr: booking.pnr.clone(),
            flight_id: booking.flight_id,
            user_email: booking.user_email.clone(),
            num_seats: booking.num_seats,
            total_price: booking.total_price,
            status: booking.status,
            created_at: booking.created_at,
            cancelled_at: booking.cancelled_at,
            passengers: booking.passengers.iter().map(PassengerDetails::from).collect(),
        }
    }
}

// ============================================================================
// Flight service snapshot
// ============================================================================

pub const SEAT_AVAILABLE: &str = "AVAILABLE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatSnapshot {
    pub seat_number: Option<String>,
    pub status: Option<String>,
}

impl SeatSnapshot {
    pub fn is_available(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case(SEAT_AVAILABLE))
            .unwrap_or(false)
    }
}

/// Flight details as returned by the flight inventory service. Read at
/// booking time only; never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlightSnapshot {
    pub id: Option<i64>,
    pub flight_number: Option<String>,
    pub airline_name: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub departure_time: Option<NaiveDateTime>,
    pub arrival_time: Option<NaiveDateTime>,
    pub price: Option<f64>,
    pub trip_type: Option<String>,
    pub total_seats: Option<i32>,
    pub seats: Option<Vec<SeatSnapshot>>,
}

impl FlightSnapshot {
    pub fn available_seats(&self) -> usize {
        self.seats
            .as_ref()
            .map(|seats| seats.iter().filter(|s| s.is_available()).count())
            .unwrap_or(0)
    }

    pub fn price_per_seat(&self) -> f64 {
        self.price.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(number: &str, status: Option<&str>) -> SeatSnapshot {
        SeatSnapshot {
            seat_number: Some(number.to_string()),
            status: status.map(str::to_string),
        }
    }

    #[test]
    fn test_available_seats_ignores_case_and_missing_status() {
        let flight = FlightSnapshot {
            seats: Some(vec![
                seat("1A", Some("AVAILABLE")),
                seat("1B", Some("available")),
                seat("1C", Some("BOOKED")),
                seat("1D", None),
            ]),
            ..Default::default()
        };
        assert_eq!(flight.available_seats(), 2);
        assert_eq!(FlightSnapshot::default().available_seats(), 0);
    }

    #[test]
    fn test_cancel_is_one_way() {
        let mut booking = Booking::new(
            "ABCD1234".to_string(),
            7,
            "owner@x.com".to_string(),
            100.0,
            vec![Passenger::default()],
        );
        assert!(booking.cancel());
        let cancelled_at = booking.cancelled_at;
        assert!(cancelled_at.is_some());

        assert!(!booking.cancel());
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert_eq!(booking.cancelled_at, cancelled_at);
    }

    #[test]
    fn test_ownership_is_case_insensitive() {
        let booking = Booking::new("P".into(), 1, "Owner@X.com".into(), 0.0, vec![]);
        assert!(booking.is_owned_by("owner@x.COM"));
        assert!(!booking.is_owned_by("other@x.com"));
    }

    #[test]
    fn test_flight_snapshot_deserialization() {
        let json = r#"
            {
                "id": 1,
                "flightNumber": "AI101",
                "airlineName": "AirIndia",
                "origin": "HYD",
                "destination": "BLR",
                "departureTime": "2025-03-01T10:30:00",
                "price": 200.0,
                "tripType": "ONEWAY",
                "totalSeats": 10,
                "seats": [
                    { "seatNumber": "S0", "status": "AVAILABLE" },
                    { "seatNumber": "S1", "status": "BOOKED" }
                ]
            }
        "#;
        let flight: FlightSnapshot = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(flight.flight_number.as_deref(), Some("AI101"));
        assert_eq!(flight.available_seats(), 1);
        assert_eq!(flight.price_per_seat(), 200.0);
        assert!(flight.arrival_time.is_none());
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let booking = Booking::new(
            "PNR12345".into(),
            2,
            "alice@example.com".into(),
            400.0,
            vec![Passenger::default(), Passenger::default()],
        );
        let value = serde_json::to_value(BookingResponse::from(&booking)).unwrap();
        assert_eq!(value["pnr"], "PNR12345");
        assert_eq!(value["flightId"], 2);
        assert_eq!(value["numSeats"], 2);
        assert_eq!(value["status"], "ACTIVE");
        assert!(value.get("cancelledAt").is_none());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!("cancelled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!("PENDING".parse::<BookingStatus>().is_err());
    }
}
