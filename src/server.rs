use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::channel::RsaKey;
use crate::config::ServerConfig;
use crate::engine::{MemStore, RamEngine};
use crate::session::{Session, SessionSettings};
use crate::thread_pool::ThreadPool;
use crate::Result;

/// A TCP socket server in front of a [`RamEngine`].
///
/// It accepts connections on a dedicated loop and hands each one to its [`ThreadPool`], which
/// runs at most `workers` sessions at a time. Connections accepted while every worker is busy
/// wait in the pool's queue; accepting itself is never throttled.
///
/// The server's RSA key is generated once, when the server is created, and shared by all
/// sessions.
///
/// # Example
/// Create and run a new server listening on "127.0.0.1:9090", with 4 workers on a shared queue
/// thread pool
/// ```rust
/// use ramdb::{Credentials, MemStore, RamDbServer, ServerConfig};
/// use ramdb::thread_pool::{SharedQueueThreadPool, ThreadPool};
/// # fn main() -> ramdb::Result<()> {
/// let mut config = ServerConfig::new(Credentials::new("admin", "secret")?);
/// config.addr = "127.0.0.1:9090".parse().unwrap();
/// let pool = SharedQueueThreadPool::new(config.workers)?;
/// let server = RamDbServer::new(MemStore::new(), pool, &config)?;
/// // server.run(config.addr)?;
/// # Ok(())
/// # }
/// ```
pub struct RamDbServer<E: RamEngine, P: ThreadPool> {
    /// the storage engine every session works on
    engine: E,
    /// a pool of threads that will run the sessions
    pool: P,
    settings: Arc<SessionSettings>,
}

impl<E: RamEngine, P: ThreadPool> RamDbServer<E, P> {
    /// Create a new `RamDbServer` using the given [`RamEngine`] and [`ThreadPool`] implementation.
    ///
    /// # Errors
    /// returns an error if `config` is invalid or the server key could not be generated
    pub fn new(engine: E, pool: P, config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let server_key = RsaKey::generate(config.key_bits)?;
        Ok(RamDbServer {
            engine,
            pool,
            settings: Arc::new(SessionSettings {
                credentials: config.credentials.clone(),
                server_key: Arc::new(server_key),
                auth_timeout: config.auth_timeout(),
            }),
        })
    }

    /// binds to `addr` and serves connections until the listener fails
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        self.serve(listener)
    }

    /// Serves connections accepted on an already bound `listener`.
    ///
    /// Each accepted connection is spawned onto the thread pool. A failed accept is logged and
    /// skipped. This only returns if reading the listener's local address fails.
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.dispatch(stream),
                Err(e) => error!("Connection failed: {}", e),
            }
        }
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream) {
        let peer = peer_label(&stream);
        debug!("accepted connection from {}", peer);
        let engine = self.engine.clone();
        let settings = Arc::clone(&self.settings);
        self.pool.spawn(move || {
            let result = Session::new(engine, stream, settings).and_then(Session::run);
            if let Err(e) = result {
                error!("Error on serving client {}: {}", peer, e);
            }
        });
    }
}

impl<P: ThreadPool> RamDbServer<MemStore, P> {
    /// Starts a background thread sweeping expired entries out of the store every `interval`.
    ///
    /// The thread runs for the rest of the process.
    pub fn spawn_purger(&self, interval: Duration) -> Result<()> {
        let store = self.engine.clone();
        thread::Builder::new()
            .name("ramdb-purger".to_string())
            .spawn(move || loop {
                thread::sleep(interval);
                store.purge_expired();
            })?;
        info!("purging expired entries every {:?}", interval);
        Ok(())
    }
}

fn peer_label(stream: &TcpStream) -> String {
    stream
        .peer_addr()
        .map(|addr: SocketAddr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}
