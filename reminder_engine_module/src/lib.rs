pub mod config;
pub mod dispatch;
pub mod document_store;
pub mod mail_queue;
pub mod push_gateway;
pub mod scheduler;

pub use config::ServiceConfig;
pub use dispatch::{DispatchReport, EmailStatus, PushStatus, ReminderDispatcher};
pub use document_store::{DocumentStore, DocumentStoreError, MongoDocumentStore};
pub use mail_queue::{
    EnqueueResult, MailIntent, MailIntentQueue, MailQueueError, PostgresMailQueue,
};
pub use push_gateway::{FcmPushGateway, PushGateway, PushGatewayError, PushOutcome};
pub use scheduler::{PassStats, ReminderScheduler};
