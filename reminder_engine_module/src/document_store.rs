use mongodb::bson::{doc, from_document, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, Collection, Database};
use tracing::warn;

use reminder_core_module::{Profile, Task};

#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document db error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Read-only view of the remote document store, scoped to exactly the
/// queries one evaluation pass needs.
pub trait DocumentStore: Send + Sync {
    fn list_user_ids(&self) -> Result<Vec<String>, DocumentStoreError>;
    /// The user's delivery profile, or `None` when the user has never
    /// completed onboarding (callers skip such users, not an error).
    fn profile(&self, user_id: &str) -> Result<Option<Profile>, DocumentStoreError>;
    /// Incomplete tasks for a user, ordered by deadline. Completed tasks
    /// are excluded by the query itself, not filtered afterwards.
    fn incomplete_tasks(&self, user_id: &str) -> Result<Vec<Task>, DocumentStoreError>;
}

pub struct MongoDocumentStore {
    db: Database,
}

impl MongoDocumentStore {
    pub fn connect(uri: &str, db_name: &str) -> Result<Self, DocumentStoreError> {
        let client = Client::with_uri_str(uri)?;
        Ok(Self {
            db: client.database(db_name),
        })
    }

    fn users(&self) -> Collection<Document> {
        self.db.collection("users")
    }

    fn profiles(&self) -> Collection<Profile> {
        self.db.collection("profiles")
    }

    fn tasks(&self) -> Collection<Document> {
        self.db.collection("tasks")
    }
}

impl DocumentStore for MongoDocumentStore {
    fn list_user_ids(&self) -> Result<Vec<String>, DocumentStoreError> {
        let ids = self.users().distinct("_id", None, None)?;
        Ok(ids
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(id) => Some(id),
                other => {
                    warn!("ignoring non-string user id: {:?}", other);
                    None
                }
            })
            .collect())
    }

    fn profile(&self, user_id: &str) -> Result<Option<Profile>, DocumentStoreError> {
        Ok(self.profiles().find_one(doc! { "userId": user_id }, None)?)
    }

    fn incomplete_tasks(&self, user_id: &str) -> Result<Vec<Task>, DocumentStoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "deadline": 1 })
            .build();
        let cursor = self.tasks().find(
            doc! { "userId": user_id, "isCompleted": false },
            options,
        )?;

        let mut tasks = Vec::new();
        for document in cursor {
            let document = document?;
            // A malformed task document costs that task its reminder,
            // never the rest of the pass.
            match from_document::<Task>(document) {
                Ok(task) => tasks.push(task),
                Err(err) => {
                    warn!("skipping malformed task for user {}: {}", user_id, err);
                }
            }
        }
        Ok(tasks)
    }
}
