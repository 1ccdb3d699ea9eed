use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use tokio::sync::oneshot;

use cofre_client::services::{self, session::SessionRequest};
use cofre_client::settings::Settings;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_logging();

    let config = Settings::new().expect("Could not load config file.");

    println!("[*] Starting services.");
    let handles = services::start_services(config)
        .await
        .expect("Could not start services.");

    let (session_tx, session_rx) = oneshot::channel();
    handles
        .session
        .send(SessionRequest::Snapshot {
            response: session_tx,
        })
        .await
        .expect("Session service is not running.");
    let session = session_rx.await.expect("Session service dropped the request.");
    log::info!("Session state after restore: {:?}", session.state());

    tokio::signal::ctrl_c()
        .await
        .expect("Could not listen for shutdown signal.");
}

fn init_logging() {
    let stdout = ConsoleAppender::builder().build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(log::LevelFilter::Info))
        .expect("Could not build logging config.");

    log4rs::init_config(config).expect("Could not initialize logging.");
}
