//! API Module - HTTP Client für das Backend
//!
//! Dieses Modul verwaltet:
//! - Austausch des Station-Codes gegen Calling-Credentials
//! - Auflösung des Bearer-Tokens zum Benutzerprofil
//! - Stay-Update beim Anrufende

mod client;
mod messages;

pub use client::{ApiError, DashboardApi, HttpDashboardApi};
pub use messages::{AcsAuthRequest, CallingCredentials, StayUpdate, HANGUP_REASON_RECEPTIONIST};
