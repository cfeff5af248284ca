#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::thread;

use ramdb::{Credentials, MemStore, RamDbClient, RamDbServer, ServerConfig, SharedQueueThreadPool, ThreadPool};

/// small keys keep handshakes fast
pub const KEY_BITS: usize = 1024;
pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";

pub fn test_config(workers: u32) -> ServerConfig {
    let mut config = ServerConfig::new(Credentials::new(USERNAME, PASSWORD).unwrap());
    config.key_bits = KEY_BITS;
    config.workers = workers;
    config
}

/// starts a server with a shared queue pool on an ephemeral port
pub fn start_server(workers: u32) -> SocketAddr {
    start_server_with::<SharedQueueThreadPool>(workers)
}

pub fn start_server_with<P: ThreadPool + Send + 'static>(workers: u32) -> SocketAddr {
    let config = test_config(workers);
    let pool = P::new(workers).unwrap();
    let server = RamDbServer::new(MemStore::new(), pool, &config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || server.serve(listener));
    addr
}

pub fn connect(addr: SocketAddr) -> RamDbClient {
    RamDbClient::connect(addr, USERNAME, PASSWORD, KEY_BITS).unwrap()
}
