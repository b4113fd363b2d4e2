//! HTTP Client für die Backend-API
//!
//! Drei Endpunkte werden genutzt:
//! - `POST /acs/azureauth` tauscht den Station-Code gegen Calling-Credentials
//! - `GET /user` löst den Bearer-Token zum Benutzerprofil auf
//! - `PUT /stay/{id}` meldet Gesprächsdauer und Ende an den Stay

use super::messages::*;
use crate::session::UserResponse;
use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use thiserror::Error;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

// ============================================================================
// API TRAIT
// ============================================================================

/// Backend-Zugriffe, die der Call-Controller braucht
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Calling-Credentials für einen Station-Code holen
    async fn acs_auth(&self, station_code: &str) -> Result<CallingCredentials, ApiError>;

    /// Aktuellen Benutzer zum Bearer-Token laden
    async fn current_user(&self, token: &str) -> Result<UserResponse, ApiError>;

    /// Stay beim Anrufende aktualisieren
    async fn update_stay(
        &self,
        token: &str,
        update: &StayUpdate,
    ) -> Result<serde_json::Value, ApiError>;
}

// ============================================================================
// HTTP IMPLEMENTATION
// ============================================================================

/// reqwest-basierte Implementierung von [`DashboardApi`]
#[derive(Debug, Clone)]
pub struct HttpDashboardApi {
    base_url: Url,
    http: Client,
}

impl HttpDashboardApi {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: Url, http: Client) -> Self {
        Self { base_url, http }
    }

    /// Hängt Pfadsegmente an die Basis-URL an (Segmente werden escaped)
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn acs_auth_request(&self, station_code: &str) -> Result<Request, ApiError> {
        let url = self.endpoint(&["acs", "azureauth"])?;
        Ok(self
            .http
            .post(url)
            .json(&AcsAuthRequest { station_code })
            .build()?)
    }

    fn current_user_request(&self, token: &str) -> Result<Request, ApiError> {
        let url = self.endpoint(&["user"])?;
        Ok(self.http.get(url).bearer_auth(token).build()?)
    }

    fn update_stay_request(&self, token: &str, update: &StayUpdate) -> Result<Request, ApiError> {
        let url = self.endpoint(&["stay", &update.id])?;
        Ok(self.http.put(url).bearer_auth(token).json(update).build()?)
    }

    async fn send(&self, request: Request) -> Result<Response, ApiError> {
        let method = request.method().clone();
        let url = request.url().path().to_string();

        let response = self.http.execute(request).await?;
        let status = response.status();

        tracing::debug!("{} {} -> {}", method, url, status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn acs_auth(&self, station_code: &str) -> Result<CallingCredentials, ApiError> {
        let request = self.acs_auth_request(station_code)?;
        let response: AcsAuthResponse = self.send(request).await?.json().await?;

        response
            .into_credentials()
            .ok_or_else(|| ApiError::InvalidResponse("missing userId or token".to_string()))
    }

    async fn current_user(&self, token: &str) -> Result<UserResponse, ApiError> {
        let request = self.current_user_request(token)?;
        Ok(self.send(request).await?.json().await?)
    }

    async fn update_stay(
        &self,
        token: &str,
        update: &StayUpdate,
    ) -> Result<serde_json::Value, ApiError> {
        let request = self.update_stay_request(token, update)?;
        let response = self.send(request).await?;

        // Leere Antworten sind erlaubt
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
    use reqwest::Method;

    fn api(base: &str) -> HttpDashboardApi {
        HttpDashboardApi::new(Url::parse(base).unwrap())
    }

    fn body_json(request: &Request) -> serde_json::Value {
        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_acs_auth_request() {
        let request = api("https://api.example.com")
            .acs_auth_request("DashboardData")
            .unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url().as_str(), "https://api.example.com/acs/azureauth");
        assert_eq!(
            body_json(&request),
            serde_json::json!({ "stationCode": "DashboardData" })
        );
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_current_user_request_uses_bearer_token() {
        let request = api("https://api.example.com/v1/")
            .current_user_request("tok")
            .unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.url().as_str(), "https://api.example.com/v1/user");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer tok");
    }

    #[test]
    fn test_update_stay_request() {
        let update = StayUpdate::new("17".into(), 42, "00:09".into(), "Ana Diaz".into());
        let request = api("https://api.example.com/v1")
            .update_stay_request("tok", &update)
            .unwrap();

        assert_eq!(request.method(), &Method::PUT);
        assert_eq!(request.url().as_str(), "https://api.example.com/v1/stay/17");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer tok");
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_json(&request)["hangupReason"], 2);
        assert_eq!(body_json(&request)["ownerId"], 42);
    }

    #[test]
    fn test_stay_id_is_escaped() {
        let update = StayUpdate::new("a/b".into(), 1, "00:00".into(), String::new());
        let request = api("https://api.example.com")
            .update_stay_request("tok", &update)
            .unwrap();

        assert_eq!(request.url().path(), "/stay/a%2Fb");
    }
}
