use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::repositories::api::ApiClient;
use crate::repositories::storage::SessionStorage;
use crate::settings::Settings;

pub mod session;
pub mod transactions;

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Channel ends the UI talks to. `events` delivers forced-logout broadcasts
/// to every subscriber, whatever request triggered them.
pub struct Handles {
    pub session: mpsc::Sender<session::SessionRequest>,
    pub transactions: mpsc::Sender<transactions::TransactionRequest>,
    pub events: broadcast::Sender<session::SessionEvent>,
}

pub async fn start_services(settings: Settings) -> Result<Handles, anyhow::Error> {
    let api = ApiClient::new(
        &settings.api.base_url,
        Duration::from_secs(settings.api.timeout_secs),
    )?;
    let storage = SessionStorage::new(settings.storage.dir.clone())?;

    let (session_tx, mut session_rx) = mpsc::channel(512);
    let (transaction_tx, mut transaction_rx) = mpsc::channel(512);

    let mut session_service = session::SessionService::new();
    let mut transaction_service = transactions::TransactionService::new();

    log::info!("Starting session service.");
    let session_handler = session::SessionRequestHandler::new(api.clone(), storage);
    let events = session_handler.events();
    session_handler.start().await;
    tokio::spawn(async move {
        session_service.run(session_handler, &mut session_rx).await;
    });

    log::info!("Starting transaction service.");
    let transaction_handler = transactions::TransactionRequestHandler::new(api);
    tokio::spawn(async move {
        transaction_service
            .run(transaction_handler, &mut transaction_rx)
            .await;
    });

    Ok(Handles {
        session: session_tx,
        transactions: transaction_tx,
        events,
    })
}
