use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use reminder_engine_module::dispatch::ReminderDispatcher;
use reminder_engine_module::document_store::MongoDocumentStore;
use reminder_engine_module::mail_queue::{MailIntentQueue, PostgresMailQueue};
use reminder_engine_module::push_gateway::{FcmPushGateway, PushGateway};
use reminder_engine_module::scheduler::ReminderScheduler;
use reminder_engine_module::ServiceConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().init();

    let config = ServiceConfig::from_env()?;
    let store = Arc::new(MongoDocumentStore::connect(
        &config.document_store_uri,
        &config.document_db_name,
    )?);
    let push_gateway: Arc<dyn PushGateway> = Arc::new(FcmPushGateway::from_env()?);
    let mail_queue: Arc<dyn MailIntentQueue> = Arc::new(PostgresMailQueue::from_env()?);
    let scheduler = ReminderScheduler::new(store, ReminderDispatcher::new(push_gateway, mail_queue));

    let interval = config.evaluation_interval;
    info!(
        "reminder service starting interval_secs={}",
        interval.as_secs()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = stop.clone();
    let worker = tokio::task::spawn_blocking(move || {
        scheduler.run_loop(interval, &worker_stop);
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received; finishing current pass");
    stop.store(true, Ordering::Relaxed);
    if let Err(err) = worker.await {
        error!("scheduler worker terminated abnormally: {}", err);
    }
    Ok(())
}
