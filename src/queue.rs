use std::collections::VecDeque;
use std::sync::Mutex;

use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::sync::{Client, Collection};

use crate::MailError;

/// The single named collection backing deferred jobs. Insertion order is
/// irrelevant; the only retrieval the core needs is "atomically remove and
/// return one pending document". That atomicity is the one consistency
/// invariant the worker depends on: two concurrent pops must never observe
/// the same document.
pub trait QueueStore: Send + Sync {
    fn insert(&self, document: Document) -> Result<(), MailError>;
    fn pop_one(&self) -> Result<Option<Document>, MailError>;
    fn len(&self) -> Result<u64, MailError>;
    fn is_empty(&self) -> Result<bool, MailError> {
        Ok(self.len()? == 0)
    }
}

/// MongoDB-backed queue. `pop_one` maps to `find_one_and_delete`, which the
/// server executes atomically.
pub struct MongoQueue {
    coll: Collection<Document>,
}

impl MongoQueue {
    pub const COLLECTION: &'static str = "email_queue";

    /// Connect to the given URI and database, using the default collection.
    pub fn new(uri: &str, db_name: &str) -> Result<Self, MailError> {
        let client_options = ClientOptions::parse(uri).map_err(|e| MailError::Queue(e.to_string()))?;
        let client = Client::with_options(client_options).map_err(|e| MailError::Queue(e.to_string()))?;
        let coll = client
            .database(db_name)
            .collection::<Document>(Self::COLLECTION);
        Ok(Self { coll })
    }

    /// Wrap an existing database handle, e.g. one shared with the rest of
    /// the application.
    pub fn with_database(db: mongodb::sync::Database) -> Self {
        Self {
            coll: db.collection::<Document>(Self::COLLECTION),
        }
    }

    /// Test connectivity by pinging the server.
    pub fn test_connection(&self) -> Result<(), MailError> {
        self.coll
            .find_one(doc! {}, None)
            .map_err(|e| MailError::Queue(format!("MongoDB connection test failed: {}", e)))?;
        Ok(())
    }
}

impl QueueStore for MongoQueue {
    fn insert(&self, document: Document) -> Result<(), MailError> {
        self.coll
            .insert_one(document, None)
            .map_err(|e| MailError::Queue(e.to_string()))?;
        Ok(())
    }

    fn pop_one(&self) -> Result<Option<Document>, MailError> {
        self.coll
            .find_one_and_delete(doc! {}, None)
            .map_err(|e| MailError::Queue(e.to_string()))
    }

    fn len(&self) -> Result<u64, MailError> {
        self.coll
            .count_documents(doc! {}, None)
            .map_err(|e| MailError::Queue(e.to_string()))
    }
}

/// In-process queue with the same contract, for tests and embedded use.
/// The mutex makes pop-and-remove atomic under a single process.
#[derive(Default)]
pub struct MemoryQueue {
    docs: Mutex<VecDeque<Document>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryQueue {
    fn insert(&self, document: Document) -> Result<(), MailError> {
        self.docs
            .lock()
            .map_err(|_| MailError::Queue("queue mutex poisoned".into()))?
            .push_back(document);
        Ok(())
    }

    fn pop_one(&self) -> Result<Option<Document>, MailError> {
        Ok(self
            .docs
            .lock()
            .map_err(|_| MailError::Queue("queue mutex poisoned".into()))?
            .pop_front())
    }

    fn len(&self) -> Result<u64, MailError> {
        Ok(self
            .docs
            .lock()
            .map_err(|_| MailError::Queue("queue mutex poisoned".into()))?
            .len() as u64)
    }
}
