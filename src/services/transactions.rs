use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, RwLock};

use super::RequestHandler;
use super::Service;
use crate::models::summary::Summary;
use crate::models::transactions::{
    round_amount, NewTransaction, Pagination, Transaction, TransactionFilter, TransactionUpdate,
};
use crate::repositories::api::{ApiClient, ApiError};
use crate::repositories::transactions::TransactionRepository;

/// Derived, disposable view of the current page. Replaced wholesale after
/// every successful mutation or filter change, never patched in place.
#[derive(Clone, Debug, Default)]
pub struct TransactionCache {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SummaryState {
    pub summary: Option<Summary>,
    pub error: Option<String>,
}

pub enum TransactionRequest {
    /// `Some` switches the active filter, `None` refetches the current one.
    List {
        filter: Option<TransactionFilter>,
        response: oneshot::Sender<TransactionCache>,
    },
    Create {
        data: NewTransaction,
        response: oneshot::Sender<Result<Value, ApiError>>,
    },
    Update {
        id: String,
        data: TransactionUpdate,
        response: oneshot::Sender<Result<Value, ApiError>>,
    },
    Delete {
        id: String,
        response: oneshot::Sender<Result<(), ApiError>>,
    },
    /// `None` falls back to the backend's default window of 30 days.
    Summary {
        period: Option<String>,
        response: oneshot::Sender<SummaryState>,
    },
    Categories {
        response: oneshot::Sender<Result<Vec<String>, ApiError>>,
    },
    Snapshot {
        response: oneshot::Sender<TransactionCache>,
    },
}

#[derive(Clone)]
pub struct TransactionRequestHandler {
    repository: TransactionRepository,
    filter: Arc<RwLock<TransactionFilter>>,
    cache: Arc<RwLock<TransactionCache>>,
    summary: Arc<RwLock<SummaryState>>,
}

impl TransactionRequestHandler {
    pub fn new(api: ApiClient) -> Self {
        Self {
            repository: TransactionRepository::new(api),
            filter: Arc::new(RwLock::new(TransactionFilter::new(""))),
            cache: Arc::new(RwLock::new(TransactionCache::default())),
            summary: Arc::new(RwLock::new(SummaryState::default())),
        }
    }

    pub async fn snapshot(&self) -> TransactionCache {
        self.cache.read().await.clone()
    }

    async fn current_user_id(&self) -> String {
        self.filter.read().await.user_id.clone()
    }

    /// Full refetch with the last-used filter. On failure the previous list
    /// stays visible and only the error field changes.
    async fn refresh(&self) -> TransactionCache {
        let filter = self.filter.read().await.clone();
        if filter.user_id.is_empty() {
            return self.cache.read().await.clone();
        }

        match self.repository.list(&filter).await {
            Ok(page) => {
                let fresh = TransactionCache {
                    transactions: page.transactions,
                    pagination: page.pagination,
                    error: None,
                };
                *self.cache.write().await = fresh.clone();
                fresh
            }
            Err(e) => {
                log::warn!("Could not refresh transactions: {}", e);
                let mut cache = self.cache.write().await;
                cache.error = Some(e.to_string());
                cache.clone()
            }
        }
    }

    async fn list(&self, filter: Option<TransactionFilter>) -> TransactionCache {
        if let Some(filter) = filter {
            *self.filter.write().await = filter;
        }
        self.refresh().await
    }

    async fn create(&self, mut data: NewTransaction) -> Result<Value, ApiError> {
        let user_id = self.current_user_id().await;
        if user_id.is_empty() {
            return Ok(Value::Null);
        }

        data.amount = round_amount(data.amount);
        let created = self.repository.create(&user_id, &data).await?;
        self.refresh().await;
        Ok(created)
    }

    async fn update(&self, id: &str, mut data: TransactionUpdate) -> Result<Value, ApiError> {
        if self.current_user_id().await.is_empty() {
            return Ok(Value::Null);
        }

        data.amount = data.amount.map(round_amount);
        let updated = self.repository.update(id, &data).await?;
        self.refresh().await;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        if self.current_user_id().await.is_empty() {
            return Ok(());
        }

        self.repository.delete(id).await?;
        self.refresh().await;
        Ok(())
    }

    async fn summary(&self, period: Option<&str>) -> SummaryState {
        let user_id = self.current_user_id().await;
        if user_id.is_empty() {
            return self.summary.read().await.clone();
        }

        let period = period.unwrap_or("30d");
        match self.repository.summary(&user_id, period).await {
            Ok(summary) => {
                let fresh = SummaryState {
                    summary: Some(summary),
                    error: None,
                };
                *self.summary.write().await = fresh.clone();
                fresh
            }
            Err(e) => {
                log::warn!("Could not refresh summary: {}", e);
                let mut state = self.summary.write().await;
                state.error = Some(e.to_string());
                state.clone()
            }
        }
    }

    async fn categories(&self) -> Result<Vec<String>, ApiError> {
        let user_id = self.current_user_id().await;
        if user_id.is_empty() {
            return Ok(Vec::new());
        }

        self.repository.categories(&user_id).await
    }
}

#[async_trait]
impl RequestHandler<TransactionRequest> for TransactionRequestHandler {
    async fn handle_request(&self, request: TransactionRequest) {
        match request {
            TransactionRequest::List { filter, response } => {
                let _ = response.send(self.list(filter).await);
            }
            TransactionRequest::Create { data, response } => {
                let _ = response.send(self.create(data).await);
            }
            TransactionRequest::Update { id, data, response } => {
                let _ = response.send(self.update(&id, data).await);
            }
            TransactionRequest::Delete { id, response } => {
                let _ = response.send(self.delete(&id).await);
            }
            TransactionRequest::Summary { period, response } => {
                let _ = response.send(self.summary(period.as_deref()).await);
            }
            TransactionRequest::Categories { response } => {
                let _ = response.send(self.categories().await);
            }
            TransactionRequest::Snapshot { response } => {
                let _ = response.send(self.snapshot().await);
            }
        }
    }
}

pub struct TransactionService;

impl TransactionService {
    pub fn new() -> Self {
        TransactionService {}
    }
}

#[async_trait]
impl Service<TransactionRequest, TransactionRequestHandler> for TransactionService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transactions::TransactionType;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Backend {
        transactions: Mutex<Vec<Value>>,
        next_id: AtomicU64,
        failing: AtomicBool,
        hits: AtomicU32,
        list_delay_ms: AtomicU64,
        list_serial: AtomicU64,
        summary_period: Mutex<Option<String>>,
        bare_categories: AtomicBool,
    }

    impl Backend {
        fn page(&self) -> Value {
            let transactions = self.transactions.lock().unwrap().clone();
            json!({
                "transactions": transactions,
                "pagination": {"current": 1, "pages": 1, "total": transactions.len()}
            })
        }
    }

    async fn list_handler(State(state): State<Arc<Backend>>) -> (StatusCode, Json<Value>) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        if state.failing.load(Ordering::SeqCst) {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }

        let serial = state.list_serial.fetch_add(1, Ordering::SeqCst);
        let delay = if serial == 0 {
            state.list_delay_ms.load(Ordering::SeqCst)
        } else {
            0
        };
        let mut page = state.page();
        page["pagination"]["total"] = json!(serial + 1);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        (StatusCode::OK, Json(page))
    }

    async fn create_handler(
        State(state): State<Arc<Backend>>,
        Json(mut body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        if state.failing.load(Ordering::SeqCst) {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }

        let id = format!("t{}", state.next_id.fetch_add(1, Ordering::SeqCst));
        body["id"] = json!(id);
        body["date"] = body.get("date").cloned().unwrap_or(json!("2024-05-01"));
        state.transactions.lock().unwrap().push(body.clone());
        (StatusCode::CREATED, Json(body))
    }

    async fn delete_handler(
        State(state): State<Arc<Backend>>,
        Path(id): Path<String>,
    ) -> (StatusCode, Json<Value>) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        state
            .transactions
            .lock()
            .unwrap()
            .retain(|tx| tx["id"] != json!(id.clone()));
        (StatusCode::OK, Json(json!({})))
    }

    async fn update_handler(
        State(state): State<Arc<Backend>>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        if state.failing.load(Ordering::SeqCst) {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }

        let mut transactions = state.transactions.lock().unwrap();
        match transactions.iter_mut().find(|tx| tx["id"] == json!(id.clone())) {
            Some(tx) => {
                if let (Some(fields), Some(patch)) = (tx.as_object_mut(), body.as_object()) {
                    for (key, value) in patch {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                (StatusCode::OK, Json(tx.clone()))
            }
            None => (StatusCode::NOT_FOUND, Json(json!({}))),
        }
    }

    async fn summary_handler(
        State(state): State<Arc<Backend>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        *state.summary_period.lock().unwrap() = params.get("period").cloned();
        if state.failing.load(Ordering::SeqCst) {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
        }

        (
            StatusCode::OK,
            Json(json!({
                "income": 1000.0,
                "expenses": 500.0,
                "balance": 500.0,
                "categories": [{"category": "food", "amount": 300.0, "count": 2}]
            })),
        )
    }

    async fn categories_handler(State(state): State<Arc<Backend>>) -> Json<Value> {
        state.hits.fetch_add(1, Ordering::SeqCst);
        if state.bare_categories.load(Ordering::SeqCst) {
            Json(json!({}))
        } else {
            Json(json!({"categories": ["food", "transport"]}))
        }
    }

    async fn serve(state: Arc<Backend>) -> String {
        let app = Router::new()
            .route("/transactions/user/u1", get(list_handler))
            .route("/transactions", post(create_handler))
            .route("/transactions/{id}", delete(delete_handler).put(update_handler))
            .route("/transactions/user/u1/summary", get(summary_handler))
            .route("/transactions/user/u1/categories", get(categories_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn handler(base_url: &str) -> TransactionRequestHandler {
        let api = ApiClient::new(base_url, Duration::from_secs(1)).unwrap();
        TransactionRequestHandler::new(api)
    }

    fn new_tx(amount: f64) -> NewTransaction {
        NewTransaction {
            amount,
            description: "almoço".to_string(),
            category: "food".to_string(),
            kind: TransactionType::Expense,
            date: Some("2024-05-01".to_string()),
            tags: None,
        }
    }

    #[tokio::test]
    async fn create_is_followed_by_a_refetch_that_shows_the_new_transaction() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        let cache = handler.list(Some(TransactionFilter::new("u1"))).await;
        assert!(cache.transactions.is_empty());

        handler.create(new_tx(12.5)).await.unwrap();

        // no further user action: the cache already reflects the mutation
        let cache = handler.snapshot().await;
        assert_eq!(cache.transactions.len(), 1);
        assert_eq!(cache.transactions[0].description, "almoço");
        assert!(cache.error.is_none());
    }

    #[tokio::test]
    async fn delete_is_followed_by_a_refetch_that_drops_the_transaction() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        handler.list(Some(TransactionFilter::new("u1"))).await;
        let created = handler.create(new_tx(30.0)).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(handler.snapshot().await.transactions.len(), 1);

        handler.delete(&id).await.unwrap();

        let cache = handler.snapshot().await;
        assert!(cache.transactions.iter().all(|tx| tx.id != id));
    }

    #[tokio::test]
    async fn amounts_are_rounded_before_leaving_the_client() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        handler.list(Some(TransactionFilter::new("u1"))).await;
        handler.create(new_tx(10.567891)).await.unwrap();

        let stored = backend.transactions.lock().unwrap()[0].clone();
        assert_eq!(stored["amount"], json!(10.57));
    }

    #[tokio::test]
    async fn failed_mutation_triggers_no_refetch_and_keeps_the_cache() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        handler.list(Some(TransactionFilter::new("u1"))).await;
        handler.create(new_tx(5.0)).await.unwrap();
        let before = handler.snapshot().await;
        let hits_before = backend.hits.load(Ordering::SeqCst);

        backend.failing.store(true, Ordering::SeqCst);
        let err = handler.create(new_tx(7.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::Unknown(_)));

        // exactly one extra request: the failed create, no follow-up list
        assert_eq!(backend.hits.load(Ordering::SeqCst), hits_before + 1);
        let after = handler.snapshot().await;
        assert_eq!(after.transactions.len(), before.transactions.len());
        assert!(after.error.is_none());
    }

    #[tokio::test]
    async fn failed_refetch_keeps_the_stale_list_visible() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        handler.list(Some(TransactionFilter::new("u1"))).await;
        handler.create(new_tx(5.0)).await.unwrap();

        backend.failing.store(true, Ordering::SeqCst);
        let cache = handler.list(None).await;

        assert_eq!(cache.transactions.len(), 1);
        assert!(cache.error.is_some());
    }

    #[tokio::test]
    async fn operations_without_a_user_id_touch_no_network() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        let cache = handler.list(None).await;
        assert!(cache.transactions.is_empty());
        assert!(handler.create(new_tx(5.0)).await.is_ok());
        assert!(handler.delete("t0").await.is_ok());
        assert!(handler.categories().await.unwrap().is_empty());

        assert_eq!(backend.hits.load(Ordering::SeqCst), 0);
    }

    // Overlapping mutate+refetch sequences have no mutual exclusion: the
    // refetch that lands last wins, even if it was issued first.
    #[tokio::test]
    async fn concurrent_mutations_let_the_last_refetch_response_win() {
        let backend = Arc::new(Backend::default());
        backend.list_delay_ms.store(300, Ordering::SeqCst);
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        *handler.filter.write().await = TransactionFilter::new("u1");

        let first = handler.create(new_tx(1.0));
        let second = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handler.create(new_tx(2.0)).await
        };
        let (a, b) = tokio::join!(first, second);
        a.unwrap();
        b.unwrap();

        // the delayed first refetch (serial 1) overwrote the second (serial 2)
        assert_eq!(handler.snapshot().await.pagination.total, 1);
    }

    #[tokio::test]
    async fn update_is_followed_by_a_refetch_that_shows_the_change() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        handler.list(Some(TransactionFilter::new("u1"))).await;
        let created = handler.create(new_tx(30.0)).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        handler
            .update(
                &id,
                TransactionUpdate {
                    description: Some("jantar".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let cache = handler.snapshot().await;
        assert_eq!(cache.transactions.len(), 1);
        assert_eq!(cache.transactions[0].description, "jantar");
        assert!(cache.error.is_none());
    }

    #[tokio::test]
    async fn summary_defaults_the_period_to_30d() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        *handler.filter.write().await = TransactionFilter::new("u1");

        let state = handler.summary(None).await;
        assert_eq!(
            backend.summary_period.lock().unwrap().as_deref(),
            Some("30d")
        );
        assert_eq!(state.summary.unwrap().income, 1000.0);

        handler.summary(Some("7d")).await;
        assert_eq!(
            backend.summary_period.lock().unwrap().as_deref(),
            Some("7d")
        );
    }

    #[tokio::test]
    async fn summary_failure_is_stored_as_state_keeping_the_previous_read() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        *handler.filter.write().await = TransactionFilter::new("u1");

        let state = handler.summary(None).await;
        assert!(state.error.is_none());

        backend.failing.store(true, Ordering::SeqCst);
        let state = handler.summary(None).await;
        assert!(state.error.is_some());
        assert_eq!(state.summary.unwrap().income, 1000.0);
    }

    #[tokio::test]
    async fn categories_listing_tolerates_a_bare_body() {
        let backend = Arc::new(Backend::default());
        let base = serve(backend.clone()).await;
        let handler = handler(&base);

        *handler.filter.write().await = TransactionFilter::new("u1");

        let categories = handler.categories().await.unwrap();
        assert_eq!(categories, vec!["food".to_string(), "transport".to_string()]);

        backend.bare_categories.store(true, Ordering::SeqCst);
        assert!(handler.categories().await.unwrap().is_empty());
    }
}
