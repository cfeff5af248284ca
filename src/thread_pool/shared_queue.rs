use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, instrument};

use super::ThreadPool;
use crate::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool implemented with a shared job queue (i.e. channel).
///
/// This implementation uses the MPMC [`channel`] provided by the crossbeam crate as a single
/// producer, multiple consumer queue. The producer is the pool itself (driven by the accept
/// loop) and the worker threads are the consumers. The channel is unbounded: connections
/// accepted while every worker is busy wait in it.
///
/// If a job panics, its thread is replaced by a new one, so the number of concurrently running
/// jobs stays at the configured size. Dropping the pool closes the channel and the workers exit
/// once the queue is drained.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
pub struct SharedQueueThreadPool {
    /// the sending part of the channel
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    /// create a new "thread pool" with the given number of `threads`.
    /// Every thread created will have a handle to the receiving end of the channel
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        for id in 0..threads {
            let task_rx = TaskReceiver(rx.clone());
            thread::Builder::new()
                .name(format!("ramdb-worker-{}", id))
                .spawn(move || run_tasks(task_rx))?;
        }
        debug!("created shared queue pool with {} threads", threads);
        Ok(SharedQueueThreadPool { tx })
    }

    /// Queues a job on the shared channel.
    ///
    /// Jobs sent after every worker has died are dropped and logged.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            error!("no worker threads left in the pool, dropping job");
        }
    }
}

/// A type that can receive tasks (i.e. closures) from a channel and run them.
/// Additionally, this type is responsible for restarting any threads that panicked
#[derive(Clone, Debug)]
struct TaskReceiver(Receiver<Job>);

impl Drop for TaskReceiver {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("worker panicked, starting a replacement");
            let task_rx = self.clone();
            if let Err(e) = thread::Builder::new()
                .name("ramdb-worker".to_string())
                .spawn(move || run_tasks(task_rx))
            {
                error!("Failed to spawn a thread: {}", e);
            }
        }
    }
}

/// this function waits for a task to arrive on its (wrapped) receiver, and then runs the task
#[instrument(skip(rx))]
fn run_tasks(rx: TaskReceiver) {
    loop {
        match rx.0.recv() {
            Ok(task) => {
                debug!("received a new task");
                task();
            }
            Err(_) => {
                debug!("Thread exited because the thread pool was destroyed.");
                return;
            }
        }
    }
}
