//! Generation capability boundary.
//!
//! - `HttpGenerationService` calls an OpenAI-compatible `/chat/completions`
//!   endpoint, either as a single completion or as an SSE token stream.
//! - `MockGeneration` is the test double; it records the turns it was
//!   handed so tests can assert on prompt assembly.
//!
//! No implicit retries anywhere: a failed call surfaces immediately.

use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use dossier_core::error::DossierError;
use dossier_core::types::ChatTurn;

/// A lazy, finite, non-restartable sequence of reply fragments.
pub type TokenStream =
    Pin<Box<dyn Stream<Item = Result<String, DossierError>> + Send + 'static>>;

/// The generation capability: turns an ordered message sequence into a
/// reply, either whole or as an incremental fragment stream.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce a single completed reply.
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, DossierError>;

    /// Produce an incremental fragment stream.
    async fn stream(&self, turns: &[ChatTurn]) -> Result<TokenStream, DossierError>;
}

// ---------------------------------------------------------------------------
// HttpGenerationService - OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Generation service backed by an OpenAI-compatible chat completions API.
pub struct HttpGenerationService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl HttpGenerationService {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        temperature: f32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            temperature,
        }
    }

    fn request_body(&self, turns: &[ChatTurn], stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = turns
            .iter()
            .map(|t| {
                serde_json::json!({
                    "role": t.role.as_str(),
                    "content": t.content,
                })
            })
            .collect();
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": stream,
        })
    }

    async fn send(
        &self,
        turns: &[ChatTurn],
        stream: bool,
    ) -> Result<reqwest::Response, DossierError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&self.request_body(turns, stream));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        request
            .send()
            .await
            .map_err(|e| DossierError::Generation(format!("request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| DossierError::Generation(format!("request failed: {}", e)))
    }
}

impl std::fmt::Debug for HttpGenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerationService")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Parse one SSE `data:` payload into an optional content fragment.
fn parse_stream_data(data: &str) -> Result<Option<String>, DossierError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| DossierError::Generation(format!("invalid stream chunk: {}", e)))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, DossierError> {
        let response = self.send(turns, false).await?;
        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| DossierError::Generation(format!("invalid response: {}", e)))?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DossierError::Generation("response had no choices".to_string()))?;
        debug!(chars = reply.len(), "Generation complete");
        Ok(reply)
    }

    async fn stream(&self, turns: &[ChatTurn]) -> Result<TokenStream, DossierError> {
        let response = self.send(turns, true).await?;
        let bytes = response.bytes_stream();

        // Re-frame the byte stream into SSE `data:` lines, yielding one
        // content fragment per chunk until `[DONE]`.
        let stream = futures_util::stream::unfold(
            (bytes, String::new(), false),
            |(mut bytes, mut buffer, failed)| async move {
                if failed {
                    return None;
                }
                loop {
                    if let Some(pos) = buffer.find('\n') {
                        let line = buffer[..pos].trim().to_string();
                        buffer.drain(..=pos);
                        let Some(data) = line.strip_prefix("data:") else {
                            continue;
                        };
                        let data = data.trim();
                        if data == "[DONE]" {
                            return None;
                        }
                        match parse_stream_data(data) {
                            Ok(Some(fragment)) => {
                                return Some((Ok(fragment), (bytes, buffer, false)))
                            }
                            Ok(None) => continue,
                            Err(e) => return Some((Err(e), (bytes, buffer, true))),
                        }
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.push_str(&String::from_utf8_lossy(&chunk));
                        }
                        Some(Err(e)) => {
                            let err =
                                DossierError::Generation(format!("stream failed: {}", e));
                            return Some((Err(err), (bytes, buffer, true)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

// ---------------------------------------------------------------------------
// MockGeneration - canned replies for testing
// ---------------------------------------------------------------------------

/// Mock generation service returning a canned reply.
///
/// Records the last turn sequence it received so tests can assert on prompt
/// assembly. `failing()` builds a variant whose calls always error.
#[derive(Debug, Default)]
pub struct MockGeneration {
    reply: String,
    fail: bool,
    last_turns: Mutex<Option<Vec<ChatTurn>>>,
}

impl MockGeneration {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: false,
            last_turns: Mutex::new(None),
        }
    }

    /// A variant whose `complete` and `stream` calls always fail.
    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            last_turns: Mutex::new(None),
        }
    }

    /// The turns handed to the most recent call, if any.
    pub fn last_turns(&self) -> Option<Vec<ChatTurn>> {
        self.last_turns.lock().ok().and_then(|g| g.clone())
    }

    fn record(&self, turns: &[ChatTurn]) {
        if let Ok(mut guard) = self.last_turns.lock() {
            *guard = Some(turns.to_vec());
        }
    }
}

#[async_trait]
impl GenerationService for MockGeneration {
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, DossierError> {
        self.record(turns);
        if self.fail {
            return Err(DossierError::Generation("mock failure".to_string()));
        }
        Ok(self.reply.clone())
    }

    async fn stream(&self, turns: &[ChatTurn]) -> Result<TokenStream, DossierError> {
        self.record(turns);
        if self.fail {
            return Err(DossierError::Generation("mock failure".to_string()));
        }
        let fragments: Vec<Result<String, DossierError>> = self
            .reply
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(fragments)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::types::ChatRole;

    #[tokio::test]
    async fn test_mock_complete_returns_reply() {
        let service = MockGeneration::new("the answer");
        let reply = service.complete(&[ChatTurn::user("q")]).await.unwrap();
        assert_eq!(reply, "the answer");
    }

    #[tokio::test]
    async fn test_mock_records_turns() {
        let service = MockGeneration::new("r");
        let turns = vec![ChatTurn::system("instruction"), ChatTurn::user("q")];
        service.complete(&turns).await.unwrap();
        let recorded = service.last_turns().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].role, ChatRole::System);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let service = MockGeneration::failing();
        assert!(service.complete(&[ChatTurn::user("q")]).await.is_err());
        assert!(service.stream(&[ChatTurn::user("q")]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_stream_concatenates_to_reply() {
        let service = MockGeneration::new("one two three");
        let mut stream = service.stream(&[ChatTurn::user("q")]).await.unwrap();
        let mut collected = String::new();
        while let Some(fragment) = stream.next().await {
            collected.push_str(&fragment.unwrap());
        }
        assert_eq!(collected, "one two three");
    }

    #[test]
    fn test_parse_stream_data_with_content() {
        let data = r#"{"choices":[{"delta":{"content":"hel"}}]}"#;
        assert_eq!(parse_stream_data(data).unwrap(), Some("hel".to_string()));
    }

    #[test]
    fn test_parse_stream_data_without_content() {
        // Role-only delta, as in the first chunk of an OpenAI-style stream.
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_data(data).unwrap(), None);
    }

    #[test]
    fn test_parse_stream_data_invalid_json() {
        assert!(parse_stream_data("{broken").is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let service = HttpGenerationService::new("http://localhost:1234/v1", "m", None, 0.0);
        let body = service.request_body(
            &[ChatTurn::system("sys"), ChatTurn::user("hi")],
            true,
        );
        assert_eq!(body["model"], "m");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}
