//! Request- und Response-Typen der Backend-API
//!
//! Feldnamen folgen dem JSON des Backends (camelCase).

use serde::{Deserialize, Serialize};

/// Grund für das Auflegen: Rezeption hat beendet
pub const HANGUP_REASON_RECEPTIONIST: u8 = 2;

// ============================================================================
// ACS AUTH
// ============================================================================

/// Body für `POST /acs/azureauth`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcsAuthRequest<'a> {
    pub station_code: &'a str,
}

/// Antwort von `POST /acs/azureauth`, beide Felder sind Pflicht
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AcsAuthResponse {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Zugangsdaten für den Calling-Service
#[derive(Clone, PartialEq, Eq)]
pub struct CallingCredentials {
    pub user_id: String,
    pub token: String,
}

impl std::fmt::Debug for CallingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallingCredentials")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl AcsAuthResponse {
    pub(crate) fn into_credentials(self) -> Option<CallingCredentials> {
        let user_id = self.user_id.filter(|v| !v.is_empty())?;
        let token = self.token.filter(|v| !v.is_empty())?;
        Some(CallingCredentials { user_id, token })
    }
}

// ============================================================================
// STAY UPDATE
// ============================================================================

/// Body für `PUT /stay/{id}` beim Anrufende
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StayUpdate {
    pub id: String,
    pub owner_id: u64,
    /// Formatierte Gesprächsdauer (`MM:SS`)
    pub call_duration: String,
    /// Vor- und Nachname der Person am Dashboard
    pub receptionist: String,
    pub hangup_reason: u8,
}

impl StayUpdate {
    pub fn new(id: String, owner_id: u64, call_duration: String, receptionist: String) -> Self {
        Self {
            id,
            owner_id,
            call_duration,
            receptionist,
            hangup_reason: HANGUP_REASON_RECEPTIONIST,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stay_update_wire_format() {
        let update = StayUpdate::new("17".into(), 42, "01:15".into(), "Ana Diaz".into());
        let json = serde_json::to_value(&update).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": "17",
                "ownerId": 42,
                "callDuration": "01:15",
                "receptionist": "Ana Diaz",
                "hangupReason": 2
            })
        );
    }

    #[test]
    fn test_credentials_require_both_fields() {
        let full: AcsAuthResponse =
            serde_json::from_str(r#"{"userId":"8:acs:1","token":"t"}"#).unwrap();
        assert!(full.into_credentials().is_some());

        let partial: AcsAuthResponse = serde_json::from_str(r#"{"userId":"8:acs:1"}"#).unwrap();
        assert!(partial.into_credentials().is_none());
    }

    #[test]
    fn test_credentials_debug_hides_token() {
        let credentials = CallingCredentials {
            user_id: "u".into(),
            token: "secret".into(),
        };
        assert!(!format!("{:?}", credentials).contains("secret"));
    }
}
