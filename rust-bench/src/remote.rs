use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_APP: &str = "zai-org-glm-5-fp8";
pub const DEFAULT_CLASS: &str = "Model";
pub const DEFAULT_METHOD: &str = "generate";

const MODAL_KEY_HEADER: &str = "modal-key";
const MODAL_SECRET_HEADER: &str = "modal-secret";
const ERROR_SNIPPET_LIMIT: usize = 200;

/// Text produced by one remote call and the wall-clock time spent on it.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote-execution client cannot be used at all. Aborts the benchmark.
    #[error("remote execution unavailable: {0}")]
    Unavailable(String),

    #[error("no remote class found at {url}; check the Modal app and class names")]
    NotFound { url: Url },

    #[error("remote call failed ({status}): {body}")]
    Status { status: StatusCode, body: String },

    #[error("remote exception: {0}")]
    Remote(String),

    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// A remotely hosted model that can be asked to generate text.
///
/// Implementations measure the elapsed time themselves so that any handle
/// lookup they perform is part of the measurement.
#[async_trait]
pub trait RemoteModel: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Generation, RemoteError>;
}

/// Identity of a Modal class method exposed as a web endpoint.
///
/// Defaults to `DEFAULT_APP` / `DEFAULT_CLASS`; the CLI's `--app` and
/// `--class` flags override them.
#[derive(Clone, Debug)]
pub struct ModalClass {
    pub workspace: Option<String>,
    pub environment: Option<String>,
    pub app: String,
    pub class: String,
    pub method: String,
    pub endpoint: Option<Url>,
}

impl ModalClass {
    pub fn new(app: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            workspace: None,
            environment: None,
            app: app.into(),
            class: class.into(),
            method: DEFAULT_METHOD.to_string(),
            endpoint: None,
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Bypass name-based resolution and call this URL directly.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn resolve(&self) -> Result<Url, RemoteError> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let workspace = self
            .workspace
            .as_deref()
            .filter(|workspace| !workspace.is_empty())
            .ok_or_else(|| {
                RemoteError::Unavailable(
                    "no Modal workspace configured; pass --workspace or set MODAL_WORKSPACE"
                        .to_string(),
                )
            })?;

        let prefix = match self.environment.as_deref() {
            Some(environment) if !environment.is_empty() => {
                format!("{}-{}", workspace, environment)
            }
            _ => workspace.to_string(),
        };
        let host = format!(
            "{}--{}-{}-{}.modal.run",
            prefix, self.app, self.class, self.method
        )
        .to_lowercase()
        .replace('_', "-");

        Url::parse(&format!("https://{}", host)).map_err(|err| {
            RemoteError::Unavailable(format!("invalid Modal handle {}: {}", host, err))
        })
    }
}

impl Default for ModalClass {
    fn default() -> Self {
        Self::new(DEFAULT_APP, DEFAULT_CLASS)
    }
}

/// Calls a Modal class method over its web endpoint.
pub struct ModalModel {
    client: Client,
    class: ModalClass,
    headers: HeaderMap,
}

impl ModalModel {
    /// Builds the HTTP client and checks that the class handle can be resolved.
    ///
    /// A zero `request_timeout` leaves the client without a timeout.
    pub fn connect(class: ModalClass, request_timeout: Duration) -> Result<Self, RemoteError> {
        class.resolve()?;

        let mut builder = Client::builder();
        if !request_timeout.is_zero() {
            builder = builder.timeout(request_timeout);
        }
        let client = builder.build().map_err(|err| {
            RemoteError::Unavailable(format!("failed to construct HTTP client: {}", err))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client,
            class,
            headers,
        })
    }

    /// Attaches Modal proxy-auth credentials. Blank values are ignored.
    pub fn with_credentials(
        mut self,
        token_id: Option<String>,
        token_secret: Option<String>,
    ) -> Result<Self, RemoteError> {
        for (name, value) in [
            (MODAL_KEY_HEADER, token_id),
            (MODAL_SECRET_HEADER, token_secret),
        ] {
            let Some(value) = value.filter(|value| !value.is_empty()) else {
                continue;
            };
            let header_value = HeaderValue::from_str(&value).map_err(|_| {
                RemoteError::Unavailable(format!("{} is not a valid header value", name))
            })?;
            self.headers.insert(HeaderName::from_static(name), header_value);
        }
        Ok(self)
    }

    pub fn class(&self) -> &ModalClass {
        &self.class
    }
}

#[async_trait]
impl RemoteModel for ModalModel {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Generation, RemoteError> {
        let start = Instant::now();
        let url = self.class.resolve()?;
        debug!(%url, max_tokens, "invoking remote generate");

        let response = self
            .client
            .post(url.clone())
            .headers(self.headers.clone())
            .json(&json!({
                "prompt": prompt,
                "max_tokens": max_tokens,
            }))
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let elapsed = start.elapsed();
        debug!(
            %status,
            bytes = bytes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "remote generate returned"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound { url });
        }
        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&bytes)
                .chars()
                .take(ERROR_SNIPPET_LIMIT)
                .collect();
            return Err(RemoteError::Status { status, body });
        }

        let text = decode_generation(&bytes)?;
        Ok(Generation { text, elapsed })
    }
}

fn decode_generation(bytes: &[u8]) -> Result<String, RemoteError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::String(text)) => Ok(text),
        Ok(Value::Object(map)) => {
            if let Some(error) = map.get("error") {
                let message = error
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(RemoteError::Remote(message));
            }
            ["text", "generated_text"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .ok_or_else(|| {
                    RemoteError::InvalidResponse("response object missing `text` field".to_string())
                })
        }
        Ok(other) => Err(RemoteError::InvalidResponse(format!(
            "unexpected response payload: {}",
            other
        ))),
        Err(_) => String::from_utf8(bytes.to_vec()).map_err(|_| {
            RemoteError::InvalidResponse("response body is not valid UTF-8".to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn endpoint_class(server: &mockito::Server) -> ModalClass {
        let url = Url::parse(&format!("{}/generate", server.url())).unwrap();
        ModalClass::default().with_endpoint(url)
    }

    #[test]
    fn resolves_web_endpoint_from_names() {
        let class = ModalClass::default().with_workspace("acme");
        assert_eq!(
            class.resolve().unwrap().as_str(),
            "https://acme--zai-org-glm-5-fp8-model-generate.modal.run/"
        );

        let class = ModalClass::new("my_app", "Model")
            .with_workspace("Acme")
            .with_environment("dev");
        assert_eq!(
            class.resolve().unwrap().as_str(),
            "https://acme-dev--my-app-model-generate.modal.run/"
        );
    }

    #[test]
    fn missing_workspace_is_fatal() {
        let err = ModalClass::default().resolve().unwrap_err();
        assert!(err.is_fatal());

        let err = ModalModel::connect(ModalClass::default(), Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }

    #[test]
    fn decodes_supported_payload_shapes() {
        assert_eq!(decode_generation(br#""plain json""#).unwrap(), "plain json");
        assert_eq!(decode_generation(br#"{"text":"a"}"#).unwrap(), "a");
        assert_eq!(decode_generation(br#"{"generated_text":"b"}"#).unwrap(), "b");
        assert_eq!(decode_generation(b"not json at all").unwrap(), "not json at all");
        assert!(matches!(
            decode_generation(br#"{"error":"boom"}"#),
            Err(RemoteError::Remote(msg)) if msg == "boom"
        ));
        assert!(matches!(
            decode_generation(br#"{"other":1}"#),
            Err(RemoteError::InvalidResponse(_))
        ));
        assert!(matches!(
            decode_generation(b"42"),
            Err(RemoteError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn generate_posts_prompt_and_reads_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .match_header("modal-key", "wk-id")
            .match_header("modal-secret", "ws-secret")
            .match_body(Matcher::Json(json!({"prompt": "hello", "max_tokens": 16})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text":"a generated reply"}"#)
            .create_async()
            .await;

        let model = ModalModel::connect(endpoint_class(&server), Duration::from_secs(5))
            .unwrap()
            .with_credentials(Some("wk-id".to_string()), Some("ws-secret".to_string()))
            .unwrap();
        let generation = model.generate("hello", 16).await.unwrap();

        assert_eq!(generation.text, "a generated reply");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_maps_to_handle_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .with_status(404)
            .create_async()
            .await;

        let model = ModalModel::connect(endpoint_class(&server), Duration::from_secs(5)).unwrap();
        let err = model.generate("hello", 16).await.unwrap_err();

        assert!(matches!(err, RemoteError::NotFound { .. }));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("app and class names"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/generate")
            .with_status(500)
            .with_body("CUDA out of memory")
            .create_async()
            .await;

        let model = ModalModel::connect(endpoint_class(&server), Duration::from_secs(5)).unwrap();
        let err = model.generate("hello", 16).await.unwrap_err();

        match err {
            RemoteError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "CUDA out of memory");
            }
            other => panic!("unexpected error: {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn network_error_is_not_fatal() {
        let url = Url::parse("http://127.0.0.1:1/generate").unwrap();
        let class = ModalClass::default().with_endpoint(url);
        let model = ModalModel::connect(class, Duration::from_secs(5)).unwrap();

        let err = model.generate("hello", 16).await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn blank_credentials_are_skipped() {
        let class = ModalClass::default().with_workspace("acme");
        let model = ModalModel::connect(class, Duration::ZERO)
            .unwrap()
            .with_credentials(Some(String::new()), None)
            .unwrap();
        assert!(!model.headers.contains_key(MODAL_KEY_HEADER));
        assert!(!model.headers.contains_key(MODAL_SECRET_HEADER));
    }
}
