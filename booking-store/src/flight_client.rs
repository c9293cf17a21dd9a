use async_trait::async_trait;
use booking_core::models::FlightSnapshot;
use booking_core::{FlightClient, FlightClientError};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// JSON client for the flight inventory service.
#[derive(Clone)]
pub struct HttpFlightClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFlightClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn flight_url(&self, flight_id: i64) -> String {
        format!("{}/api/flights/{}", self.base_url, flight_id)
    }
}

#[async_trait]
impl FlightClient for HttpFlightClient {
    async fn get_flight_by_id(
        &self,
        flight_id: i64,
    ) -> Result<Option<FlightSnapshot>, FlightClientError> {
        let url = self.flight_url(flight_id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FlightClientError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlightClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FlightClientError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice::<Option<FlightSnapshot>>(&bytes)
            .map_err(|e| FlightClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;

    async fn flight(Path(id): Path<i64>) -> Result<Json<serde_json::Value>, (AxumStatus, String)> {
        match id {
            1 => Ok(Json(json!({
                "id": 1,
                "flightNumber": "AI101",
                "price": 200.0,
                "seats": [
                    { "seatNumber": "1A", "status": "AVAILABLE" },
                    { "seatNumber": "1B", "status": "BOOKED" }
                ]
            }))),
            2 => Ok(Json(serde_json::Value::Null)),
            3 => Err((AxumStatus::INTERNAL_SERVER_ERROR, "database down".to_string())),
            _ => Err((AxumStatus::NOT_FOUND, "no such flight".to_string())),
        }
    }

    async fn spawn_flight_service() -> SocketAddr {
        let app = Router::new().route("/api/flights/{id}", get(flight));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> HttpFlightClient {
        HttpFlightClient::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_flight() {
        let client = client_for(spawn_flight_service().await);
        let flight = client.get_flight_by_id(1).await.unwrap().unwrap();
        assert_eq!(flight.flight_number.as_deref(), Some("AI101"));
        assert_eq!(flight.available_seats(), 1);
    }

    #[tokio::test]
    async fn test_not_found_and_null_are_none() {
        let client = client_for(spawn_flight_service().await);
        assert!(client.get_flight_by_id(99).await.unwrap().is_none());
        assert!(client.get_flight_by_id(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_status_failure() {
        let client = client_for(spawn_flight_service().await);
        match client.get_flight_by_id(3).await {
            Err(FlightClientError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "database down");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client_for(addr).get_flight_by_id(1).await;
        assert!(matches!(result, Err(FlightClientError::Transport(_))));
    }

    #[tokio::test]
    async fn test_base_url_trailing_slash_is_trimmed() {
        let client = HttpFlightClient::new("http://flights:8082/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.flight_url(7), "http://flights:8082/api/flights/7");
    }
}
