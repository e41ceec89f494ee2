//! Background writer thread of a local index.
//!
//! Every local index owns one writer thread fed through a bounded channel.
//! Work plans send their whole batch as one command and receive the outcome
//! through a oneshot channel, so callers can await completion from any
//! executor while the store is only ever mutated from a single thread.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::backend::local::store::IndexStore;
use crate::backend::work::{DocumentWork, IndexWorkPlan};
use crate::error::{Result, SpathaError};

enum WriterCommand {
    Apply {
        works: Vec<DocumentWork>,
        done: oneshot::Sender<Result<()>>,
    },
}

/// Handle on the writer thread of one index.
#[derive(Debug, Clone)]
pub struct IndexWriter {
    index_name: String,
    sender: Sender<WriterCommand>,
}

impl std::fmt::Debug for WriterCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterCommand::Apply { works, .. } => {
                f.debug_struct("Apply").field("works", &works.len()).finish()
            }
        }
    }
}

impl IndexWriter {
    /// Spawn the writer thread; it stops once every handle is dropped.
    pub fn spawn(
        index_name: &str,
        store: Arc<RwLock<IndexStore>>,
        queue_capacity: usize,
    ) -> Result<Self> {
        let (sender, receiver) = bounded(queue_capacity.max(1));
        let name = index_name.to_string();
        thread::Builder::new()
            .name(format!("spatha-writer-{index_name}"))
            .spawn(move || Self::run(name, store, receiver))?;
        Ok(IndexWriter {
            index_name: index_name.to_string(),
            sender,
        })
    }

    fn run(index_name: String, store: Arc<RwLock<IndexStore>>, receiver: Receiver<WriterCommand>) {
        debug!(index = %index_name, "writer thread started");
        for command in receiver.iter() {
            match command {
                WriterCommand::Apply { works, done } => {
                    let count = works.len();
                    let mut result = Ok(());
                    {
                        let mut store = store.write();
                        for work in works {
                            if let Err(e) = store.apply(work) {
                                error!(index = %index_name, error = %e, "failed to apply work");
                                if result.is_ok() {
                                    result = Err(e);
                                }
                            }
                        }
                    }
                    debug!(index = %index_name, works = count, "applied work batch");
                    let _ = done.send(result);
                }
            }
        }
        debug!(index = %index_name, "writer thread stopped");
    }

    /// Queue a batch; the returned future completes once it is applied.
    pub fn submit(&self, works: Vec<DocumentWork>) -> BoxFuture<'static, Result<()>> {
        let (done, outcome) = oneshot::channel();
        let index_name = self.index_name.clone();
        if self.sender.send(WriterCommand::Apply { works, done }).is_err() {
            return futures::future::ready(Err(SpathaError::backend(format!(
                "Writer of index '{index_name}' is stopped"
            ))))
            .boxed();
        }
        async move {
            match outcome.await {
                Ok(result) => result,
                Err(_) => Err(SpathaError::backend(format!(
                    "Writer of index '{index_name}' stopped before completing the work"
                ))),
            }
        }
        .boxed()
    }
}

/// Work plan of a local index.
#[derive(Debug)]
pub struct LocalWorkPlan {
    writer: IndexWriter,
    works: Vec<DocumentWork>,
}

impl LocalWorkPlan {
    pub fn new(writer: IndexWriter) -> Self {
        LocalWorkPlan {
            writer,
            works: Vec::new(),
        }
    }
}

impl IndexWorkPlan for LocalWorkPlan {
    fn push(&mut self, work: DocumentWork) {
        self.works.push(work);
    }

    fn len(&self) -> usize {
        self.works.len()
    }

    fn execute(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        let LocalWorkPlan { writer, works } = *self;
        if works.is_empty() {
            return futures::future::ready(Ok(())).boxed();
        }
        writer.submit(works)
    }
}
