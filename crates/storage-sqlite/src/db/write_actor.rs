//! Dedicated writer thread serializing all queue mutations.
//!
//! Every job runs inside an immediate transaction, so a mutation is either
//! fully durable before `exec` returns or not applied at all.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use crate::db::DbPool;
use crate::errors::StorageError;
use fieldsync_core::{Error, Result};

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Handle for submitting write jobs to the writer thread. Cheap to clone.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<WriteJob>,
}

/// Carries application errors through the transaction harness so both job
/// failures and transaction-control failures roll back.
enum JobError {
    App(Error),
    Tx(diesel::result::Error),
}

impl From<diesel::result::Error> for JobError {
    fn from(value: diesel::result::Error) -> Self {
        Self::Tx(value)
    }
}

impl WriteHandle {
    /// Run `job` inside an immediate transaction on the writer thread and
    /// await its result.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: WriteJob = Box::new(move |conn| {
            let outcome = conn
                .immediate_transaction::<_, JobError, _>(|tx| job(tx).map_err(JobError::App))
                .map_err(|err| match err {
                    JobError::App(app) => app,
                    JobError::Tx(tx) => StorageError::from(tx).into(),
                });
            let _ = reply_tx.send(outcome);
        });

        self.tx
            .send(wrapped)
            .map_err(|_| Error::persistence("Write actor is no longer running"))?;
        reply_rx
            .await
            .map_err(|_| Error::persistence("Write actor dropped the job"))?
    }
}

/// Spawn the writer thread for `pool`.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();

    std::thread::Builder::new()
        .name("fieldsync-db-writer".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut conn),
                    Err(err) => {
                        // Dropping the job drops its reply channel; the
                        // caller observes a persistence error.
                        error!("Writer could not check out a connection: {}", err);
                    }
                }
            }
        })
        .expect("Failed to spawn database writer thread");

    WriteHandle { tx }
}
