//! Single-lane queue for title store mutations.
//!
//! [`TitleStore`] updates are read-modify-write over one document, so every
//! mutation is funnelled through one worker task and applied strictly in
//! arrival order. A job runs to completion even if its caller stops waiting.

use thyself_shared::{Event, Result, ThyselfError};
use thyself_storage::TitleStore;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum TitleJob {
    Update {
        event: Event,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    Acknowledge {
        ids: Vec<String>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Clear {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to the title lane. Cheap to clone; the worker stops when the last
/// handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct TitleLane {
    tx: mpsc::UnboundedSender<TitleJob>,
}

impl TitleLane {
    /// Spawn the worker on the current runtime.
    pub fn spawn(store: TitleStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, rx));
        Self { tx }
    }

    /// Queue an update and wait for it to be applied.
    pub async fn update(&self, event: Event) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.submit(TitleJob::Update {
            event,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| closed())?
    }

    /// Queue an update without waiting for it.
    pub fn enqueue(&self, event: Event) -> Result<()> {
        self.submit(TitleJob::Update { event, reply: None })
    }

    /// Remove the listed ids. Returns how many were removed.
    pub async fn acknowledge(&self, ids: Vec<String>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.submit(TitleJob::Acknowledge { ids, reply })?;
        rx.await.map_err(|_| closed())?
    }

    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.submit(TitleJob::Clear { reply })?;
        rx.await.map_err(|_| closed())?
    }

    fn submit(&self, job: TitleJob) -> Result<()> {
        self.tx.send(job).map_err(|_| closed())
    }
}

fn closed() -> ThyselfError {
    ThyselfError::Storage("title lane is closed".into())
}

async fn run(store: TitleStore, mut rx: mpsc::UnboundedReceiver<TitleJob>) {
    debug!("title lane started");
    while let Some(job) = rx.recv().await {
        match job {
            TitleJob::Update { event, reply } => {
                let result = store.update(&event).await;
                if let Err(e) = &result {
                    warn!(error = %e, title = %event.title, "title update failed");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            TitleJob::Acknowledge { ids, reply } => {
                let _ = reply.send(store.acknowledge(&ids).await);
            }
            TitleJob::Clear { reply } => {
                let _ = reply.send(store.clear().await);
            }
        }
    }
    debug!("title lane stopped");
}
