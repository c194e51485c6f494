//! HTTP client for the booking and payment services

use crate::{
    backend::BookingBackend,
    error::ApiError,
    types::{
        BookingId, BookingRecord, CancelReceipt, Concert, CreateBookingRequest,
        InitiatePaymentRequest, PaymentId, PaymentRecord,
    },
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

/// Default booking service base URL
pub const DEFAULT_BOOKING_URL: &str = "http://localhost:8081/api/v1";

/// Default payment service base URL
pub const DEFAULT_PAYMENT_URL: &str = "http://localhost:8082/api/v1";

/// Error body shared by both services: `{"error": "..."}`
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for the booking and payment services
#[derive(Clone)]
pub struct BookingApiClient {
    client: Client,
    booking_url: String,
    payment_url: String,
    token: Option<String>,
}

impl BookingApiClient {
    /// Create a client against explicit base URLs
    #[must_use]
    pub fn new(booking_url: impl Into<String>, payment_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            booking_url: trim_base(booking_url.into()),
            payment_url: trim_base(payment_url.into()),
            token: None,
        }
    }

    /// Attach a bearer token to every request
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Use a preconfigured `reqwest` client (timeouts, proxies)
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Booking service base URL
    #[must_use]
    pub fn booking_url(&self) -> &str {
        &self.booking_url
    }

    /// Payment service base URL
    #[must_use]
    pub fn payment_url(&self) -> &str {
        &self.payment_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self
            .authorize(request)
            .header("content-type", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        decode(response).await
    }
}

impl Default for BookingApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BOOKING_URL, DEFAULT_PAYMENT_URL)
    }
}

impl std::fmt::Debug for BookingApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingApiClient")
            .field("booking_url", &self.booking_url)
            .field("payment_url", &self.payment_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    tracing::debug!(status = status.as_u16(), %message, "Service rejected request");

    match status {
        StatusCode::NOT_FOUND => Err(ApiError::NotFound(message)),
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized(message)),
        status => Err(ApiError::BackendRejected {
            status: status.as_u16(),
            message,
        }),
    }
}

/// The service's `error` field, else the raw body, else the status reason
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .map_or_else(|| status.to_string(), str::to_string)
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl BookingBackend for BookingApiClient {
    #[tracing::instrument(skip(self), fields(booking_id = %id))]
    async fn get_booking(&self, id: &BookingId) -> Result<BookingRecord, ApiError> {
        let url = format!("{}/bookings/{}", self.booking_url, id.as_str());
        self.execute(self.client.get(url)).await
    }

    #[tracing::instrument(skip(self))]
    async fn my_bookings(&self) -> Result<Vec<BookingRecord>, ApiError> {
        let url = format!("{}/bookings/my", self.booking_url);
        self.execute(self.client.get(url)).await
    }

    #[tracing::instrument(skip(self), fields(booking_id = %id))]
    async fn cancel_booking(&self, id: &BookingId) -> Result<CancelReceipt, ApiError> {
        let url = format!("{}/bookings/{}/cancel", self.booking_url, id.as_str());
        self.execute(self.client.put(url)).await
    }

    #[tracing::instrument(skip(self, request), fields(concert_id = request.concert_id))]
    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<BookingRecord, ApiError> {
        let url = format!("{}/bookings/", self.booking_url);
        self.execute(self.client.post(url).json(request)).await
    }

    #[tracing::instrument(
        skip(self, request),
        fields(booking_id = %request.booking_id, method = %request.payment_method)
    )]
    async fn initiate_payment(
        &self,
        request: &InitiatePaymentRequest,
    ) -> Result<PaymentRecord, ApiError> {
        let url = format!("{}/payments", self.payment_url);
        self.execute(self.client.post(url).json(request)).await
    }

    #[tracing::instrument(skip(self), fields(payment_id = %id))]
    async fn get_payment(&self, id: PaymentId) -> Result<PaymentRecord, ApiError> {
        let url = format!("{}/payments/{}", self.payment_url, id);
        self.execute(self.client.get(url)).await
    }

    #[tracing::instrument(skip(self), fields(concert_id = id))]
    async fn get_concert(&self, id: u64) -> Result<Concert, ApiError> {
        let url = format!("{}/concerts/{}", self.booking_url, id);
        self.execute(self.client.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BookingApiClient::default();
        assert_eq!(client.booking_url(), DEFAULT_BOOKING_URL);
        assert_eq!(client.payment_url(), DEFAULT_PAYMENT_URL);
        assert!(client.token.is_none());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = BookingApiClient::new("http://host/api/v1/", "http://pay/api/v1//");
        assert_eq!(client.booking_url(), "http://host/api/v1");
        assert_eq!(client.payment_url(), "http://pay/api/v1");
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let client = BookingApiClient::default().with_token("secret");
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":"seat taken"}"#),
            "seat taken"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, " upstream down \n"), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }
}
