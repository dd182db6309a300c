//! Serial work queue on a dedicated named thread

use crossbeam_channel::{unbounded, Sender};
use std::thread::{self, JoinHandle, ThreadId};

use crate::errors::{DualCamError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted closures one at a time, in submission order.
///
/// Dropping the queue lets already-queued work finish and joins the thread.
pub struct SerialQueue {
    label: String,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl SerialQueue {
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let (sender, receiver) = unbounded::<Job>();

        let worker = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                for job in receiver.iter() {
                    job();
                }
            })
            .map_err(|e| DualCamError::Session(format!("spawn {} failed: {}", label, e)))?;
        let thread_id = worker.thread().id();

        Ok(Self {
            label,
            sender: Some(sender),
            worker: Some(worker),
            thread_id,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True when called from this queue's worker thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `job` and return immediately.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        if sender.send(Box::new(job)).is_err() {
            log::warn!("{} is shut down; dropping work", self.label);
        }
    }

    /// Run `job` on the queue and wait for its result. Runs inline when
    /// already on the queue so a job can never wait on itself.
    pub fn dispatch_sync<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_current() {
            return Ok(job());
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.dispatch(move || {
            let _ = tx.send(job());
        });
        rx.recv()
            .map_err(|_| DualCamError::Session(format!("{} dropped the job", self.label)))
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                // Last handle dropped from inside a job; the thread exits on
                // its own once the channel drains.
                return;
            }
            if worker.join().is_err() {
                log::error!("{} worker panicked", self.label);
            }
        }
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_jobs_run_in_order_on_named_thread() {
        let queue = SerialQueue::new("dualcam-test-queue").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            queue.dispatch(move || {
                let name = thread::current().name().map(str::to_string);
                seen.lock().unwrap().push((i, name));
            });
        }
        queue.dispatch_sync(|| ()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 10);
        for (expected, (i, name)) in seen.iter().enumerate() {
            assert_eq!(*i, expected);
            assert_eq!(name.as_deref(), Some("dualcam-test-queue"));
        }
    }

    #[test]
    fn test_dispatch_sync_returns_value() {
        let queue = SerialQueue::new("dualcam-sync").unwrap();
        assert_eq!(queue.dispatch_sync(|| 21 * 2).unwrap(), 42);
    }

    #[test]
    fn test_drop_drains_pending_work() {
        let count = Arc::new(Mutex::new(0));
        {
            let queue = SerialQueue::new("dualcam-drain").unwrap();
            for _ in 0..5 {
                let count = count.clone();
                queue.dispatch(move || *count.lock().unwrap() += 1);
            }
        }
        assert_eq!(*count.lock().unwrap(), 5);
    }
}
