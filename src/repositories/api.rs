use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Raised by the transport layer when the backend rejects a request with 401.
/// The session service listens for it and drops the session, whatever request
/// happened to trigger it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    Unauthorized,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Não foi possível conectar ao servidor. Verifique se o backend está rodando.")]
    NetworkUnreachable,
    #[error("O servidor demorou muito para responder. Tente novamente.")]
    Timeout,
    #[error("{}", .message.as_deref().unwrap_or("Email ou senha incorretos"))]
    Unauthorized { message: Option<String> },
    #[error("{}", .message.as_deref().unwrap_or("Usuário já cadastrado com este email"))]
    Conflict { message: Option<String> },
    #[error("{}", .message.as_deref().unwrap_or("Dados inválidos. Verifique os campos preenchidos."))]
    InvalidInput { message: Option<String> },
    #[error("Serviço temporariamente indisponível. Tente novamente em alguns instantes.")]
    ServiceUnavailable,
    #[error("{0}")]
    Unknown(String),
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (auth_events, _) = broadcast::channel(16);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
            auth_events,
        })
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ApiError> {
        let mut request = self.client.get(self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        self.execute(request).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(self.client.post(self.url(path)).json(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(self.client.put(self.url(path)).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(self.client.delete(self.url(path))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, mut request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        if let Some(token) = self.token.read().await.clone() {
            request = request.bearer_auth(token);
        }
        request = request.header("X-Request-Id", Uuid::new_v4().hyphenated().to_string());

        let response = request.send().await.map_err(Self::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(Self::from_transport)?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(body);
        }

        if status == StatusCode::UNAUTHORIZED {
            let _ = self.auth_events.send(AuthEvent::Unauthorized);
        }

        Err(Self::normalize_status(status, &body))
    }

    fn from_transport(error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout
        } else if error.is_connect() {
            ApiError::NetworkUnreachable
        } else {
            ApiError::Unknown(error.to_string())
        }
    }

    fn normalize_status(status: StatusCode, body: &Value) -> ApiError {
        let message = server_message(body);

        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized { message },
            StatusCode::CONFLICT => ApiError::Conflict { message },
            StatusCode::BAD_REQUEST => {
                let details = body
                    .get("details")
                    .and_then(Value::as_array)
                    .map(|details| {
                        details
                            .iter()
                            .filter_map(|d| d.get("message").and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .filter(|joined| !joined.is_empty());

                ApiError::InvalidInput {
                    message: details.or(message),
                }
            }
            StatusCode::SERVICE_UNAVAILABLE => ApiError::ServiceUnavailable,
            _ => ApiError::Unknown(message.unwrap_or_else(|| {
                format!("Erro ao processar requisição: HTTP {}", status.as_u16())
            })),
        }
    }
}

fn server_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
