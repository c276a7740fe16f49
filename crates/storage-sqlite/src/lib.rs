//! SQLite-backed durable storage for the submission queue.

pub mod db;
pub mod errors;
pub mod queue;
pub mod schema;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use queue::SubmissionQueueRepository;
