//! Session Module - Seitenparameter und Benutzerprofil
//!
//! Dieses Modul verwaltet:
//! - Die Query-Parameter, mit denen die Seite geöffnet wird
//! - Das Benutzerprofil und die daraus abgeleitete Besitzer-Identität

mod params;
mod profile;

pub use params::{SessionError, SessionParams, ValidSession};
pub use profile::{
    OwnerIdentity, ProfileError, ProfileShape, SubAccount, UserProfile, UserResponse,
};
