//! Benutzerprofil und Besitzer-Identität
//!
//! Das Backend liefert den angemeldeten Benutzer in zwei Formen: entweder mit
//! einer Liste von Sub-Accounts (jeweils mit Besitzer-Referenz) oder mit
//! flachen Besitzer-Feldern. Die Form wird einmal beim Laden aufgelöst und in
//! eine [`OwnerIdentity`] normalisiert, damit beim Auflegen nicht erneut
//! geraten werden muss.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("User profile is empty")]
    Empty,

    #[error("User profile has no owner id")]
    MissingOwner,
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Antwort von `GET /user`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Benutzer, wie ihn das Backend liefert
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub owner_id: Option<u64>,
    #[serde(default)]
    pub owner_uid: Option<String>,
    /// `null` und ein fehlender Schlüssel gelten als keine Sub-Accounts
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sub_accounts: Vec<SubAccount>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAccount {
    #[serde(default)]
    pub owner_id: Option<u64>,
    #[serde(default)]
    pub owner_uid: Option<String>,
}

// ============================================================================
// PROFILE SHAPE
// ============================================================================

/// Die zwei Formen, in denen ein Profil ankommen kann
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileShape {
    /// Mitarbeiter-Account mit Verweis auf den Besitzer
    SubAccounts {
        owner_id: Option<u64>,
        owner_uid: Option<String>,
    },
    /// Besitzer-Felder direkt am Benutzer
    Flat {
        owner_id: Option<u64>,
        owner_uid: Option<String>,
    },
}

impl UserProfile {
    /// Ein Profil ohne Id, Uid und Besitzer-Angaben gilt als leer
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.uid.is_none()
            && self.owner_id.is_none()
            && self.owner_uid.is_none()
            && self.sub_accounts.is_empty()
    }

    /// Bestimmt die Form des Profils
    ///
    /// Der erste Sub-Account mit Besitzer-Id gewinnt; ohne Sub-Accounts werden
    /// `ownerId`/`ownerUid` und ersatzweise `id`/`uid` des Benutzers genutzt.
    pub fn shape(&self) -> ProfileShape {
        if !self.sub_accounts.is_empty() {
            let account = self
                .sub_accounts
                .iter()
                .find(|a| a.owner_id.is_some())
                .or_else(|| self.sub_accounts.first());

            if let Some(account) = account {
                return ProfileShape::SubAccounts {
                    owner_id: account.owner_id.or(self.owner_id).or(self.id),
                    owner_uid: account
                        .owner_uid
                        .clone()
                        .or_else(|| self.owner_uid.clone()),
                };
            }
        }

        ProfileShape::Flat {
            owner_id: self.owner_id.or(self.id),
            owner_uid: self.owner_uid.clone().or_else(|| self.uid.clone()),
        }
    }

    /// Vor- und Nachname, wie er als Rezeptionist gemeldet wird
    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// OWNER IDENTITY
// ============================================================================

/// Normalisierte Besitzer-Angaben für Stay-Update und Realtime-Pfad
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    /// Numerische Id für `PUT /stay/{id}`
    pub stay_owner_id: u64,
    /// Schlüssel unter `calls/` in der Realtime-Datenbank
    pub realtime_owner_id: String,
    pub display_name: String,
}

impl OwnerIdentity {
    pub fn resolve(profile: &UserProfile) -> Result<Self, ProfileError> {
        if profile.is_empty() {
            return Err(ProfileError::Empty);
        }

        let (owner_id, owner_uid) = match profile.shape() {
            ProfileShape::SubAccounts {
                owner_id,
                owner_uid,
            }
            | ProfileShape::Flat {
                owner_id,
                owner_uid,
            } => (owner_id, owner_uid),
        };

        let stay_owner_id = owner_id.ok_or(ProfileError::MissingOwner)?;
        let realtime_owner_id = owner_uid
            .filter(|uid| !uid.is_empty())
            .unwrap_or_else(|| stay_owner_id.to_string());

        Ok(Self {
            stay_owner_id,
            realtime_owner_id,
            display_name: profile.display_name(),
        })
    }

    /// Löst eine komplette `GET /user` Antwort auf
    pub fn from_response(response: &UserResponse) -> Result<Self, ProfileError> {
        let profile = response.user.as_ref().ok_or(ProfileError::Empty)?;
        Self::resolve(profile)
    }
}

// ============================================================================
// TESTS
// ============================================================================
