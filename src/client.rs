//! one request/response exchange with an openai-compatible chat-completion
//! endpoint, classified into `Ok(content)` or a `CompletionError`.
//!
//! - exactly one `user` message, fixed model, bearer auth.
//! - no retries, no timeout beyond the transport default.
//! - http goes through the `Transport` seam: `ureq` on native (on tokio's
//!   blocking pool inside a runtime, inline otherwise), `gloo-net` fetch
//!   on wasm.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bevy::log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::error::CompletionError;
use crate::query::QueryText;

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mixtral-8x7b-32768";

/// where to send requests and which model to ask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// opaque api key handed in by the host. never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_present(&self) -> bool {
        !self.0.trim().is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_present() {
            f.write_str("Credential(<redacted>)")
        } else {
            f.write_str("Credential(<empty>)")
        }
    }
}

/// raw http answer: any status, body as text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// posts a json body with bearer auth.
///
/// `Err` means no response was received at all; non-2xx statuses are
/// returned as `Ok(HttpReply)` so the caller can classify them.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, bearer: &str, body: String) -> Result<HttpReply, String>;
}

#[derive(Deserialize)]
struct CompletionBody {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    // `null` shows up for tool-call-only choices; treat as empty text.
    #[serde(default)]
    content: Option<String>,
}

/// builds the request payload: fixed model, a single user message.
pub fn request_body(model: &str, prompt: &QueryText) -> String {
    json!({
        "model": model,
        "messages": [
            { "role": "user", "content": prompt.as_str() },
        ],
    })
    .to_string()
}

/// maps a received reply onto the completion outcome.
pub fn classify_reply(reply: &HttpReply) -> Result<String, CompletionError> {
    if !reply.is_success() {
        return Err(CompletionError::status(reply.status, &reply.body));
    }
    let parsed: CompletionBody = serde_json::from_str(&reply.body)
        .map_err(|e| CompletionError::malformed(format!("invalid completion body: {e}")))?;
    let first = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::malformed("completion has no choices"))?;
    Ok(first.message.content.unwrap_or_default())
}

/// the completion client: config + a shared transport.
#[derive(Clone)]
pub struct CompletionClient {
    config: CompletionConfig,
    transport: Arc<dyn Transport>,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// client over the platform's default transport.
    pub fn with_default_transport(config: CompletionConfig) -> Self {
        Self::new(config, default_transport())
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// one exchange. a missing credential fails locally without any i/o.
    pub async fn request(
        &self,
        prompt: &QueryText,
        credential: &Credential,
    ) -> Result<String, CompletionError> {
        if !credential.is_present() {
            warn!(target: "bevy_askme", "request: credential missing; not sending");
            return Err(CompletionError::missing_credential());
        }

        let body = request_body(&self.config.model, prompt);
        info!(target: "bevy_askme",
            "request: endpoint={} model={} prompt_len={}",
            self.config.endpoint, self.config.model, prompt.as_str().len()
        );

        let reply = self
            .transport
            .post_json(&self.config.endpoint, credential.expose(), body)
            .await
            .map_err(|e| {
                error!(target: "bevy_askme", "request: no response: {}", e);
                CompletionError::network(e)
            })?;

        info!(target: "bevy_askme", "request: status={}", reply.status);
        if !reply.is_success() {
            warn!(target: "bevy_askme", "request: error body: {}", reply.body);
        }

        let content = classify_reply(&reply)?;
        info!(target: "bevy_askme", "request: completed content_len={}", content.len());
        Ok(content)
    }
}

impl fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn default_transport() -> Arc<dyn Transport> {
    Arc::new(UreqTransport::default())
}

#[cfg(target_arch = "wasm32")]
pub fn default_transport() -> Arc<dyn Transport> {
    Arc::new(GlooTransport)
}

/// blocking `ureq` agent; uses tokio's blocking pool when a runtime is current.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for UreqTransport {
    fn default() -> Self {
        // non-2xx must come back as a response so the body can be logged
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl UreqTransport {
    fn post_blocking(
        agent: &ureq::Agent,
        url: &str,
        bearer: &str,
        body: &str,
    ) -> Result<HttpReply, String> {
        let mut res = agent
            .post(url)
            .header("authorization", &format!("Bearer {}", bearer))
            .header("content-type", "application/json")
            .send(body)
            .map_err(|e| e.to_string())?;
        let status = res.status().as_u16();
        // ureq 3.1: read body via Body::read_to_string()
        let body = res.body_mut().read_to_string().map_err(|e| e.to_string())?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl Transport for UreqTransport {
    async fn post_json(&self, url: &str, bearer: &str, body: String) -> Result<HttpReply, String> {
        // outside a tokio runtime (e.g. pollster) there is no blocking pool
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Self::post_blocking(&self.agent, url, bearer, &body);
        };
        let agent = self.agent.clone();
        let url = url.to_string();
        let bearer = bearer.to_string();
        handle
            .spawn_blocking(move || Self::post_blocking(&agent, &url, &bearer, &body))
            .await
            .map_err(|e| e.to_string())?
    }
}

/// browser fetch via `gloo-net`.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Copy, Debug, Default)]
pub struct GlooTransport;

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl Transport for GlooTransport {
    async fn post_json(&self, url: &str, bearer: &str, body: String) -> Result<HttpReply, String> {
        use gloo_net::http::Request;

        let resp = Request::post(url)
            .header("authorization", &format!("Bearer {}", bearer))
            .header("content-type", "application/json")
            .body(body)
            .map_err(|e| e.to_string())?
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| e.to_string())?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// scripted transport: replays one canned outcome and records calls.
    pub(crate) struct ScriptedTransport {
        pub outcome: Result<HttpReply, String>,
        pub calls: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedTransport {
        pub fn reply(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Ok(HttpReply { status, body: body.to_string() }),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn unreachable(detail: &str) -> Arc<Self> {
            Arc::new(Self {
                outcome: Err(detail.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, url: &str, bearer: &str, body: String) -> Result<HttpReply, String> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), bearer.to_string(), body));
            self.outcome.clone()
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> CompletionClient {
        CompletionClient::new(CompletionConfig::default(), transport)
    }

    fn ask(transport: Arc<ScriptedTransport>, key: &str) -> Result<String, CompletionError> {
        let q = QueryText::parse("What is due process?").unwrap();
        pollster::block_on(client(transport).request(&q, &Credential::new(key)))
    }

    #[test]
    fn missing_credential_fails_without_io() {
        let transport = ScriptedTransport::reply(200, "{}");
        let err = ask(transport.clone(), "").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingCredential);
        assert_eq!(transport.call_count(), 0);

        let err = ask(transport.clone(), "   ").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingCredential);
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn sends_single_user_message_with_bearer() {
        let transport = ScriptedTransport::reply(
            200,
            r#"{"choices":[{"message":{"content":"Due process means..."}}]}"#,
        );
        let content = ask(transport.clone(), "gsk-test").unwrap();
        assert_eq!(content, "Due process means...");

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (url, bearer, body) = &calls[0];
        assert_eq!(url, DEFAULT_ENDPOINT);
        assert_eq!(bearer, "gsk-test");
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            sent,
            json!({
                "model": DEFAULT_MODEL,
                "messages": [{ "role": "user", "content": "What is due process?" }],
            })
        );
    }

    #[test]
    fn non_success_status_is_transport_error() {
        let err = ask(ScriptedTransport::reply(500, "upstream exploded"), "k").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError(500));
        assert!(err.detail.contains("upstream exploded"));

        let err = ask(ScriptedTransport::reply(401, ""), "k").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError(401));
    }

    #[test]
    fn connection_failure_is_network_unavailable() {
        let err = ask(ScriptedTransport::unreachable("dns lookup failed"), "k").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkUnavailable);
        assert_eq!(err.detail, "dns lookup failed");
    }

    #[test]
    fn bad_shapes_are_malformed() {
        for body in [
            "not json",
            "{}",
            r#"{"choices":[]}"#,
            r#"{"choices":[{"text":"legacy"}]}"#,
            r#"{"choices":"nope"}"#,
        ] {
            let err = classify_reply(&HttpReply { status: 200, body: body.to_string() }).unwrap_err();
            assert_eq!(err.kind, ErrorKind::MalformedResponse, "body: {body}");
        }
    }

    #[test]
    fn empty_or_null_content_is_still_success() {
        let ok = |body: &str| classify_reply(&HttpReply { status: 200, body: body.to_string() });
        assert_eq!(ok(r#"{"choices":[{"message":{"content":""}}]}"#).unwrap(), "");
        assert_eq!(ok(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap(), "");
        assert_eq!(
            ok(r#"{"choices":[{"message":{"content":"a"}},{"message":{"content":"b"}}]}"#).unwrap(),
            "a"
        );
    }

    #[test]
    fn credential_debug_is_redacted() {
        assert_eq!(format!("{:?}", Credential::new("gsk-secret")), "Credential(<redacted>)");
        assert_eq!(format!("{:?}", Credential::default()), "Credential(<empty>)");
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod ureq_tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CompletionClient {
        CompletionClient::with_default_transport(CompletionConfig {
            endpoint: format!("{}/openai/v1/chat/completions", server.uri()),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    async fn ask(server: &MockServer) -> Result<String, CompletionError> {
        let q = QueryText::parse("What is due process?").unwrap();
        client_for(server).request(&q, &Credential::new("k")).await
    }

    /// only matches the exact contract: post, bearer, json content type, payload.
    fn completion_call() -> wiremock::MockBuilder {
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer k"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "model": DEFAULT_MODEL,
                "messages": [{ "role": "user", "content": "What is due process?" }],
            })))
    }

    #[tokio::test]
    async fn success_sends_bearer_and_json_headers() {
        let server = MockServer::start().await;
        completion_call()
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"choices":[{"message":{"content":"Due process means..."}}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(ask(&server).await.unwrap(), "Due process means...");
    }

    #[tokio::test]
    async fn server_error_is_transport_error_with_body() {
        let server = MockServer::start().await;
        completion_call()
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let err = ask(&server).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError(500));
        assert!(err.detail.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn garbage_body_on_success_is_malformed() {
        let server = MockServer::start().await;
        completion_call()
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = ask(&server).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn works_without_a_tokio_runtime() {
        // port 9 (discard) is closed on test hosts: connection refused
        let client = CompletionClient::with_default_transport(CompletionConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            model: DEFAULT_MODEL.to_string(),
        });
        let q = QueryText::parse("What is due process?").unwrap();
        let err = pollster::block_on(client.request(&q, &Credential::new("k"))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkUnavailable);
    }
}
