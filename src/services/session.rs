use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot, RwLock};

use super::RequestHandler;
use super::Service;
use crate::models::users::{self, AuthPayload, User, UserStats, UserUpdate};
use crate::repositories::api::{ApiClient, ApiError, AuthEvent};
use crate::repositories::storage::{SessionStorage, StoredSession};
use crate::repositories::users::UserRepository;

/// The one session this client holds. `authenticated` implies both `user`
/// and `token` are present.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
    pub authenticated: bool,
    pub loading: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Startup, until stored credentials are read and revalidated.
    Restoring,
    Authenticated,
    /// Cached user and token are held but not trusted; views may render the
    /// stale data but must force a fresh login.
    DegradedOffline,
    Unauthenticated,
}

impl Session {
    fn restoring() -> Self {
        Session {
            loading: true,
            ..Session::default()
        }
    }

    pub fn state(&self) -> SessionState {
        if self.loading {
            SessionState::Restoring
        } else if self.authenticated {
            SessionState::Authenticated
        } else if self.user.is_some() && self.token.is_some() {
            SessionState::DegradedOffline
        } else {
            SessionState::Unauthenticated
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Invalidated,
}

pub enum SessionRequest {
    Login {
        email: String,
        password: String,
        remember: bool,
        response: oneshot::Sender<Result<User, ApiError>>,
    },
    Register {
        email: String,
        password: String,
        name: String,
        age: Option<u32>,
        response: oneshot::Sender<Result<User, ApiError>>,
    },
    Logout {
        response: oneshot::Sender<()>,
    },
    UpdateProfile {
        updates: UserUpdate,
        response: oneshot::Sender<Result<Option<User>, ApiError>>,
    },
    Stats {
        response: oneshot::Sender<Result<Option<UserStats>, ApiError>>,
    },
    Snapshot {
        response: oneshot::Sender<Session>,
    },
}

#[derive(Clone)]
pub struct SessionRequestHandler {
    api: ApiClient,
    repository: UserRepository,
    storage: SessionStorage,
    session: Arc<RwLock<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRequestHandler {
    pub fn new(api: ApiClient, storage: SessionStorage) -> Self {
        let (events, _) = broadcast::channel(16);

        Self {
            repository: UserRepository::new(api.clone()),
            api,
            storage,
            session: Arc::new(RwLock::new(Session::restoring())),
            events,
        }
    }

    pub fn events(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Wires the unauthorized-response listener and restores the persisted
    /// session; called once before the service loop starts.
    pub async fn start(&self) {
        self.spawn_invalidation_listener();
        self.restore().await;
    }

    fn spawn_invalidation_listener(&self) {
        let handler = self.clone();
        let mut auth_events = self.api.subscribe_auth();

        tokio::spawn(async move {
            loop {
                match auth_events.recv().await {
                    Ok(AuthEvent::Unauthorized) => handler.invalidate().await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub async fn restore(&self) {
        let stored = match self.storage.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                *self.session.write().await = Session::default();
                return;
            }
            Err(e) => {
                log::error!("Discarding unreadable session data: {}", e);
                if let Err(e) = self.storage.clear() {
                    log::error!("Could not clear session storage: {}", e);
                }
                *self.session.write().await = Session::default();
                return;
            }
        };

        self.api.set_token(Some(stored.token.clone())).await;

        match self.repository.get_profile(&stored.user.id).await {
            Ok(body) => {
                let fresh = users::normalize_user(&body);
                log::info!("Session restored with a fresh profile for {}.", fresh.id);
                *self.session.write().await = Session {
                    user: Some(fresh),
                    token: Some(stored.token),
                    authenticated: true,
                    loading: false,
                };
            }
            Err(ApiError::Unauthorized { .. }) => {
                // the listener fires too; doing it here keeps restore deterministic
                self.invalidate().await;
            }
            Err(e) => {
                log::warn!("Backend unreachable, keeping cached session data untrusted: {}", e);
                *self.session.write().await = Session {
                    user: Some(stored.user),
                    token: Some(stored.token),
                    authenticated: false,
                    loading: false,
                };
            }
        }
    }

    async fn login(&self, email: &str, password: &str, remember: bool) -> Result<User, ApiError> {
        let payload = self.repository.login(email, password).await?;
        let user = self.establish(payload, remember).await;
        log::info!("Logged in as {}.", user.id);
        Ok(user)
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        age: Option<u32>,
    ) -> Result<User, ApiError> {
        let payload = self.repository.register(email, password, name, age).await?;
        let user = self.establish(payload, false).await;
        log::info!("Registered account {}.", user.id);
        Ok(user)
    }

    async fn establish(&self, payload: AuthPayload, remember: bool) -> User {
        let user = users::normalize_user(&serde_json::json!({ "user": payload.user }));

        let stored = StoredSession {
            token: payload.token.clone(),
            user: user.clone(),
            remember,
        };
        if let Err(e) = self.storage.save(&stored) {
            log::error!("Could not persist session: {}", e);
        }

        self.api.set_token(Some(payload.token.clone())).await;
        *self.session.write().await = Session {
            user: Some(user.clone()),
            token: Some(payload.token),
            authenticated: true,
            loading: false,
        };

        user
    }

    /// Always succeeds; no network involved.
    async fn logout(&self) {
        if let Err(e) = self.storage.clear() {
            log::error!("Could not clear session storage: {}", e);
        }
        self.api.set_token(None).await;
        *self.session.write().await = Session::default();
        log::info!("Session closed.");
    }

    async fn invalidate(&self) {
        if let Err(e) = self.storage.clear() {
            log::error!("Could not clear session storage: {}", e);
        }
        self.api.set_token(None).await;
        *self.session.write().await = Session::default();
        let _ = self.events.send(SessionEvent::Invalidated);
        log::warn!("Session invalidated by an unauthorized response.");
    }

    /// No-op unless the session is authenticated. Keeps the token, swaps the
    /// user for the re-normalized server response.
    async fn update_profile(&self, updates: UserUpdate) -> Result<Option<User>, ApiError> {
        let (user_id, token, remember) = {
            let session = self.session.read().await;
            if !session.authenticated {
                return Ok(None);
            }
            match (&session.user, &session.token) {
                (Some(user), Some(token)) => {
                    let remember = self
                        .storage
                        .load()
                        .ok()
                        .flatten()
                        .map(|s| s.remember)
                        .unwrap_or(false);
                    (user.id.clone(), token.clone(), remember)
                }
                _ => return Ok(None),
            }
        };

        let body = self.repository.update_profile(&user_id, &updates).await?;
        let updated = users::normalize_user(&body);

        let stored = StoredSession {
            token,
            user: updated.clone(),
            remember,
        };
        if let Err(e) = self.storage.save(&stored) {
            log::error!("Could not persist updated profile: {}", e);
        }

        self.session.write().await.user = Some(updated.clone());
        Ok(Some(updated))
    }

    async fn stats(&self) -> Result<Option<UserStats>, ApiError> {
        let user_id = match &self.session.read().await.user {
            Some(user) if !user.id.is_empty() => user.id.clone(),
            _ => return Ok(None),
        };

        self.repository.get_stats(&user_id).await.map(Some)
    }
}

#[async_trait]
impl RequestHandler<SessionRequest> for SessionRequestHandler {
    async fn handle_request(&self, request: SessionRequest) {
        match request {
            SessionRequest::Login {
                email,
                password,
                remember,
                response,
            } => {
                let result = self.login(&email, &password, remember).await;
                let _ = response.send(result);
            }
            SessionRequest::Register {
                email,
                password,
                name,
                age,
                response,
            } => {
                let result = self.register(&email, &password, &name, age).await;
                let _ = response.send(result);
            }
            SessionRequest::Logout { response } => {
                self.logout().await;
                let _ = response.send(());
            }
            SessionRequest::UpdateProfile { updates, response } => {
                let result = self.update_profile(updates).await;
                let _ = response.send(result);
            }
            SessionRequest::Stats { response } => {
                let result = self.stats().await;
                let _ = response.send(result);
            }
            SessionRequest::Snapshot { response } => {
                let _ = response.send(self.snapshot().await);
            }
        }
    }
}

pub struct SessionService;

impl SessionService {
    pub fn new() -> Self {
        SessionService {}
    }
}

#[async_trait]
impl Service<SessionRequest, SessionRequestHandler> for SessionService {}
