//! Durable submission queue storage.

mod model;
mod repository;

pub use model::{PendingSubmissionDB, SyncEngineStateDB};
pub use repository::SubmissionQueueRepository;
