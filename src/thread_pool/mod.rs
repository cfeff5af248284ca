//! Admission scheduling for accepted connections.
//!
//! A [`ThreadPool`] runs at most `threads` jobs at once. Jobs spawned while every thread is busy
//! wait in an unbounded queue until a thread frees up, so [`spawn`](ThreadPool::spawn) never
//! blocks the caller.
use crate::Result;

/// A fixed size pool of worker threads fed by a queue of jobs
pub trait ThreadPool {
    /// Creates a new thread pool, immediately spawning the specified number of threads.
    ///
    /// # Errors
    /// Returns an error if any thread fails to spawn. All previously-spawned threads are
    /// terminated.
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Queues a job to run on one of the pool's threads.
    ///
    /// A job that panics does not take its thread down with it; the pool keeps its size.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

mod rayon_pool;
mod shared_queue;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
