//! Session-Parameter aus der Seiten-URL
//!
//! Die Seite wird von der nativen App mit vier Query-Parametern geöffnet:
//! `callLink`, `token`, `stayId` und `callKey`. Sie werden genau einmal
//! gelesen und danach nicht mehr verändert.

use thiserror::Error;
use url::{form_urlencoded, Url};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid page URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Die rohen Query-Parameter der Seite; leere Werte gelten als fehlend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParams {
    pub call_link: Option<String>,
    pub token: Option<String>,
    pub stay_id: Option<String>,
    pub call_key: Option<String>,
}

/// Vollständige Session, nachdem alle Pflichtparameter geprüft wurden
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSession {
    pub call_link: String,
    pub token: String,
    pub stay_id: String,
    pub call_key: String,
}

impl SessionParams {
    /// Liest die Parameter aus einer vollständigen Seiten-URL
    pub fn from_page_url(page_url: &str) -> Result<Self, SessionError> {
        let url = Url::parse(page_url)?;
        Ok(Self::from_query(url.query().unwrap_or_default()))
    }

    /// Liest die Parameter aus einem Query-String (mit oder ohne `?`)
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Self::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }

            // Der erste Wert gewinnt, wie bei URLSearchParams.get()
            let slot = match key.as_ref() {
                "callLink" => &mut params.call_link,
                "token" => &mut params.token,
                "stayId" => &mut params.stay_id,
                "callKey" => &mut params.call_key,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }

        params
    }

    /// Gibt die vollständige Session zurück, falls alle vier Werte vorhanden sind
    pub fn validate(&self) -> Option<ValidSession> {
        Some(ValidSession {
            call_link: self.call_link.clone()?,
            token: self.token.clone()?,
            stay_id: self.stay_id.clone()?,
            call_key: self.call_key.clone()?,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
