use tracing::{debug, error};

use super::ThreadPool;
use crate::{RamDbError, Result};

/// A thread pool that uses a work stealing strategy as implemented by the [`Rayon`] library.
///
/// Jobs are queued with [`rayon::ThreadPool::spawn`], which never blocks the caller. A panicking
/// job is logged by the pool's panic handler and its thread keeps running.
///
/// [`Rayon`]: https://docs.rs/rayon/latest/rayon/index.html
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|id| format!("ramdb-rayon-{}", id))
            // without a handler rayon aborts the process when a spawned job panics
            .panic_handler(|_| error!("a job panicked on the rayon pool"))
            .build()
            .map_err(|e| RamDbError::StringErr(format!("could not build thread pool: {:?}", &e)))?;
        debug!("created rayon pool with {} threads", &threads);

        Ok(Self { pool })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
