//! this binary starts the ramdb server
//! to see the list of options, type: `ramdb-server --help`
//!
//! Settings are read from the JSON file given with `--config` (if any) and then overridden by
//! the individual flags. Without a config file `--username` and `--password` are required.

use std::path::Path;
use std::process::exit;

use clap::{arg_enum, crate_version, value_t, App, Arg, ArgMatches};
use ramdb::{
    Credentials, MemStore, RamDbError, RamDbServer, RayonThreadPool, Result, ServerConfig,
    SharedQueueThreadPool, ThreadPool,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        shared,
        rayon
    }
}

const DEFAULT_POOL: Pool = Pool::shared;

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    config: ServerConfig,
    pool: Pool,
}

fn main() {
    let matches = App::new("ramdb-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("an in-memory key-value store served over an encrypted protocol")
        .arg(Arg::with_name("config")
            .long("config")
            .value_name("FILE")
            .help("reads settings from a JSON file"))
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT that the server listens on"))
        .arg(Arg::with_name("username")
            .long("username")
            .value_name("NAME")
            .help("the user name clients must authenticate with"))
        .arg(Arg::with_name("password")
            .long("password")
            .value_name("PASSWORD")
            .help("the password clients must authenticate with"))
        .arg(Arg::with_name("key-bits")
            .long("key-bits")
            .value_name("BITS")
            .help("size of the server's RSA key"))
        .arg(Arg::with_name("workers")
            .long("workers")
            .value_name("COUNT")
            .help("maximum number of sessions processed at the same time"))
        .arg(Arg::with_name("auth-timeout")
            .long("auth-timeout")
            .value_name("SECONDS")
            .help("time a client gets for each handshake step"))
        .arg(Arg::with_name("purge-interval")
            .long("purge-interval")
            .value_name("SECONDS")
            .help("sweep expired entries this often, 0 disables sweeping"))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .possible_values(&Pool::variants())
            .help("the thread pool that runs sessions")
            .default_value("shared"))
        .arg(Arg::with_name("log-level")
            .long("log-level")
            .value_name("LEVEL")
            .help("maximum level of log messages written to stderr")
            .default_value("info"))
        .get_matches();

    let level = matches
        .value_of("log-level")
        .and_then(|level| level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    // set up a tracing subscriber to log to STDERR
    subscriber_config(level);

    let opt = match parse_options(&matches) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // start the server
    if let Err(e) = run(opt) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// builds the server configuration from the config file and the command line flags
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let mut config = match matches.value_of("config") {
        Some(path) => ServerConfig::from_file(Path::new(path))?,
        None => {
            let username = matches.value_of("username");
            let password = matches.value_of("password");
            match (username, password) {
                (Some(username), Some(password)) => ServerConfig::new(Credentials::new(username, password)?),
                _ => {
                    return Err(RamDbError::Config(
                        "--username and --password are required without --config".to_string(),
                    ))
                }
            }
        }
    };

    if let Some(username) = matches.value_of("username") {
        config.credentials.username = username.to_string();
    }
    if let Some(password) = matches.value_of("password") {
        config.credentials.password = password.to_string();
    }
    if let Some(addr) = matches.value_of("addr") {
        config.addr = addr
            .parse()
            .map_err(|_| RamDbError::Parsing(format!("could not parse {} into an IP address and port", addr)))?;
    }
    if let Some(bits) = matches.value_of("key-bits") {
        config.key_bits = parse_number(bits, "--key-bits")?;
    }
    if let Some(workers) = matches.value_of("workers") {
        config.workers = parse_number(workers, "--workers")?;
    }
    if let Some(secs) = matches.value_of("auth-timeout") {
        config.auth_timeout_secs = parse_number(secs, "--auth-timeout")?;
    }
    if let Some(secs) = matches.value_of("purge-interval") {
        config.purge_interval_secs = parse_number(secs, "--purge-interval")?;
    }
    config.validate()?;

    let pool = value_t!(matches, "pool", Pool).unwrap_or(DEFAULT_POOL);
    Ok(Opt { config, pool })
}

fn parse_number<T: std::str::FromStr>(text: &str, flag: &str) -> Result<T> {
    text.parse()
        .map_err(|_| RamDbError::Parsing(format!("{} expects a number, got {}", flag, text)))
}

fn run(opt: Opt) -> Result<()> {
    info!("ramdb-server {}", env!("CARGO_PKG_VERSION"));
    info!("Thread pool: {} with {} workers", opt.pool, opt.config.workers);

    match opt.pool {
        Pool::shared => run_with_pool(SharedQueueThreadPool::new(opt.config.workers)?, &opt.config),
        Pool::rayon => run_with_pool(RayonThreadPool::new(opt.config.workers)?, &opt.config),
    }
}

fn run_with_pool<P: ThreadPool>(pool: P, config: &ServerConfig) -> Result<()> {
    info!("generating a {} bit server key", config.key_bits);
    let server = RamDbServer::new(MemStore::new(), pool, config)?;
    if let Some(interval) = config.purge_interval() {
        server.spawn_purger(interval)?;
    }
    server.run(config.addr)
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(level: Level) {
    let subscriber = FmtSubscriber::builder()
        // all spans/events at `level` or more severe will be written
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
