//! Fixed-size worker pool
//!
//! `size` long-lived worker loops pull items from a bounded queue of the same
//! capacity, so at most `2 * size` items are held by the pool at any time and
//! no more than `size` are fetched, fingerprinted and submitted at once. Each
//! loop pushes its [`TaskOutcome`] onto a bounded completion channel in
//! completion order.
//!
//! Submitting waits for a free queue slot. A caller that also drains the
//! completion channel must reserve slots with [`WorkerPool::reserve`] inside a
//! `select!` against the channel, otherwise a full channel stalls the workers
//! and the queue never frees up.

use crate::error::{IngestError, Result};
use crate::models::Item;
use crate::worker::{TaskOutcome, Worker};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

pub struct WorkerPool {
    queue: Option<mpsc::Sender<Item>>,
    workers: JoinSet<()>,
    size: usize,
}

/// A reserved place in the pool's queue
///
/// Handing an item over through a slot never waits.
pub struct Slot<'a>(mpsc::Permit<'a, Item>);

impl Slot<'_> {
    pub fn submit(self, item: Item) {
        self.0.send(item);
    }
}

impl WorkerPool {
    /// Start `size` workers and return the receiving end of their completion
    /// channel
    pub fn new(worker: Worker, size: usize, capacity: usize) -> (Self, mpsc::Receiver<TaskOutcome>) {
        let size = size.max(1);
        let (queue, items) = mpsc::channel(size);
        let items = Arc::new(Mutex::new(items));
        let (done, completions) = mpsc::channel(capacity.max(1));

        let mut workers = JoinSet::new();
        for slot in 0..size {
            workers.spawn(work_loop(slot, worker.clone(), Arc::clone(&items), done.clone()));
        }
        debug!("Started {} workers", size);

        let pool = Self {
            queue: Some(queue),
            workers,
            size,
        };
        (pool, completions)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Worker loops still alive
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Items waiting in the queue for a free worker
    pub fn queued(&self) -> usize {
        self.queue
            .as_ref()
            .map_or(0, |queue| queue.max_capacity() - queue.capacity())
    }

    /// Wait for room in the queue
    ///
    /// Cancel safe. Fails with [`IngestError::PoolClosed`] once the pool is
    /// closed or every worker has stopped.
    pub async fn reserve(&self) -> Result<Slot<'_>> {
        let queue = self.queue.as_ref().ok_or(IngestError::PoolClosed)?;
        let permit = queue.reserve().await.map_err(|_| IngestError::PoolClosed)?;
        Ok(Slot(permit))
    }

    /// Queue one item, waiting for room
    pub async fn submit(&self, item: Item) -> Result<()> {
        self.reserve().await?.submit(item);
        Ok(())
    }

    /// Stop accepting items
    ///
    /// Workers finish what is queued, then exit; the completion channel
    /// closes after the last of them.
    pub fn close(&mut self) {
        self.queue = None;
    }

    /// Drop queued items and cancel in-flight work
    pub fn abort(&mut self) {
        self.close();
        self.workers.abort_all();
    }

    /// Close the pool and wait for every worker to exit
    pub async fn shutdown(mut self) {
        self.close();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!("Worker panicked: {}", e);
                }
            }
        }
        debug!("Worker pool shut down");
    }
}

async fn work_loop(
    slot: usize,
    worker: Worker,
    items: Arc<Mutex<mpsc::Receiver<Item>>>,
    done: mpsc::Sender<TaskOutcome>,
) {
    loop {
        let next = items.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };

        let outcome = worker.run(item).await;
        if let Err(e) = done.send(outcome).await {
            debug!(item_id = %e.0.id(), "Completion dropped, receiver is gone");
            break;
        }
    }
    debug!(worker = slot, "Worker exiting");
}
