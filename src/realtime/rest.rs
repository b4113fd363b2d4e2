//! REST-Client für die Realtime-Datenbank
//!
//! Abonnements laufen über den Streaming-Endpunkt der Datenbank
//! (`GET {db}/{path}.json` mit `Accept: text/event-stream`), Schreibzugriffe
//! über `PATCH {db}/{path}.json`.

use super::sse::{ChildChangeTracker, SseDecoder, StreamMessage};
use super::store::{FieldChange, RealtimeError, RealtimeStore, RecordPath, RecordWatch};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Request, Response};
use tokio::sync::mpsc;
use url::Url;

/// Puffergröße für Feldänderungen zwischen Stream-Task und Abonnent
const CHANGE_BUFFER: usize = 32;

/// Realtime-Datenbank über deren REST-Schnittstelle
#[derive(Clone)]
pub struct RestRealtimeStore {
    base_url: Url,
    auth: Option<String>,
    http: Client,
}

impl RestRealtimeStore {
    pub fn new(base_url: Url, auth: Option<String>) -> Self {
        Self::with_client(base_url, auth, Client::new())
    }

    pub fn with_client(base_url: Url, auth: Option<String>, http: Client) -> Self {
        Self {
            base_url,
            auth,
            http,
        }
    }

    /// `{db}/{path}.json`, optional mit `?auth=`
    fn record_url(&self, path: &RecordPath) -> Result<Url, RealtimeError> {
        let segments: Vec<&str> = path.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(RealtimeError::InvalidPath(path.to_string()));
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RealtimeError::InvalidPath(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(parents)
            .push(&format!("{}.json", last));

        if let Some(auth) = &self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }

        Ok(url)
    }

    fn watch_request(&self, path: &RecordPath) -> Result<Request, RealtimeError> {
        let url = self.record_url(path)?;
        Ok(self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .build()?)
    }

    fn update_request(
        &self,
        path: &RecordPath,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Request, RealtimeError> {
        let url = self.record_url(path)?;
        let mut body = serde_json::Map::new();
        body.insert(field.to_string(), value);
        Ok(self.http.patch(url).json(&body).build()?)
    }

    async fn send(&self, request: Request) -> Result<Response, RealtimeError> {
        let response = self.http.execute(request).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RealtimeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Liest den Event-Stream und leitet Feldänderungen weiter
    async fn pump(
        path: RecordPath,
        response: Response,
        changes: mpsc::Sender<FieldChange>,
    ) -> Result<(), RealtimeError> {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut tracker = ChildChangeTracker::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            for event in decoder.push(&chunk) {
                let message = StreamMessage::from_event(&event);
                match &message {
                    StreamMessage::KeepAlive => continue,
                    StreamMessage::Closed { reason } => {
                        tracing::warn!("Realtime subscription on {} closed: {}", path, reason);
                        return Err(RealtimeError::Cancelled);
                    }
                    StreamMessage::Unknown(kind) => {
                        tracing::debug!("Ignoring realtime event on {}: {}", path, kind);
                        continue;
                    }
                    StreamMessage::Put { .. } | StreamMessage::Patch { .. } => {}
                }

                for change in tracker.apply(&message) {
                    tracing::debug!("Realtime change on {}: {} = {}", path, change.key, change.value);
                    if changes.send(change).await.is_err() {
                        // Abonnent ist weg
                        return Ok(());
                    }
                }
            }
        }

        tracing::info!("Realtime stream on {} ended", path);
        Ok(())
    }
}

#[async_trait]
impl RealtimeStore for RestRealtimeStore {
    async fn watch(&self, path: &RecordPath) -> Result<RecordWatch, RealtimeError> {
        let request = self.watch_request(path)?;
        let response = self.send(request).await?;

        tracing::info!("Watching realtime record {}", path);

        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
        let path = path.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = Self::pump(path.clone(), response, tx).await {
                tracing::error!("Realtime stream on {} failed: {}", path, e);
            }
        });

        Ok(RecordWatch::new(rx, task))
    }

    async fn update_field(
        &self,
        path: &RecordPath,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        let request = self.update_request(path, field, value)?;
        self.send(request).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RestRealtimeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRealtimeStore")
            .field("base_url", &self.base_url.as_str())
            .field("has_auth", &self.auth.is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn store(auth: Option<&str>) -> RestRealtimeStore {
        RestRealtimeStore::new(
            Url::parse("https://db.example.com/").unwrap(),
            auth.map(str::to_string),
        )
    }

    #[test]
    fn test_record_url() {
        let path = RecordPath::call_status("owner", "key");

        let url = store(None).record_url(&path).unwrap();
        assert_eq!(url.as_str(), "https://db.example.com/calls/owner/key.json");

        let url = store(Some("s3cr3t")).record_url(&path).unwrap();
        assert_eq!(
            url.as_str(),
            "https://db.example.com/calls/owner/key.json?auth=s3cr3t"
        );
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let result = store(None).record_url(&RecordPath::new("/"));
        assert!(matches!(result, Err(RealtimeError::InvalidPath(_))));
    }

    #[test]
    fn test_watch_request_accepts_event_stream() {
        let request = store(None)
            .watch_request(&RecordPath::call_status("o", "k"))
            .unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.headers()[ACCEPT], "text/event-stream");
    }

    #[test]
    fn test_update_request_patches_single_field() {
        let request = store(None)
            .update_request(
                &RecordPath::call_status("o", "k"),
                "status",
                serde_json::json!(3),
            )
            .unwrap();

        assert_eq!(request.method(), &Method::PATCH);
        let body: serde_json::Value =
            serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "status": 3 }));
    }
}
