//! Host-Umgebung der Dashboard-Seite
//!
//! Nach dem Anrufende übergibt das Dashboard die Kontrolle über ein Custom
//! Scheme an die native App. Bei Geräteproblemen wird die Seite neu geladen.

use url::form_urlencoded;

/// Navigation und Reload der umgebenden Seite
pub trait HostShell: Send + Sync {
    /// Öffnet eine URL (z.B. `myapp://?callEnded=true&callKey=...`)
    fn navigate(&self, url: &str);

    /// Lädt die Seite neu
    fn reload(&self);
}

/// Baut die Übergabe-URL an die native App
///
/// `base` ist die Scheme-Basis (z.B. `myapp://`), Query-Werte werden escaped.
pub fn handoff_url(base: &str, call_key: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("callEnded", "true")
        .append_pair("callKey", call_key)
        .finish();

    let base = base.trim_end_matches('?');
    if base.contains('?') {
        format!("{}&{}", base, query)
    } else {
        format!("{}?{}", base, query)
    }
}

// ============================================================================
// TESTS
// ============================================================================
