//! The ramdb-client executable runs a single command against a ramdb server:
//!
//! `ramdb-client set <KEY> <VALUE> [--ttl SECONDS]`
//!
//!     Set the value of a string key to a string, expiring after --ttl seconds (default 3600).
//!     Prints ADDED or UPDATED.
//!
//! `ramdb-client get <KEY>`
//!
//!     Get the string value of a given string key. Prints "Key not found" if it is absent or
//!     expired.
//!
//! `ramdb-client rm <KEY>`
//!
//!     Remove a given string key.
//!
//! `ramdb-client incr <KEY> <DELTA>` / `ramdb-client decr <KEY> <DELTA>`
//!
//!     Add to / subtract from the decimal stored at a key and print the result.
//!
//! Every command accepts `--addr IP:PORT` (default 127.0.0.1:9090), `--username`, `--password`
//! and `--key-bits`. Errors are printed and the exit code is non-zero.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use ramdb::{Decimal, RamDbClient, RamDbError, Result, WireValue};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:9090";
const DEFAULT_KEY_BITS: &str = "2048";
const DEFAULT_TTL_SECS: &str = "3600";

/// the command to run against the server
#[derive(Debug)]
enum Action {
    Get { key: String },
    Set { key: String, value: String, ttl: Duration },
    Remove { key: String },
    Increment { key: String, delta: Decimal },
    Decrement { key: String, delta: Decimal },
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    username: String,
    password: String,
    key_bits: usize,
    action: Action,
}

fn main() -> Result<()> {
    // configure a subscriber that will log warnings to STDERR
    subscriber_config();

    let matches = App::new("ramdb-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("runs a single command against a ramdb server")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommands(vec![
            SubCommand::with_name("set")
                .about("Set the value of a string key to a string")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(Arg::with_name("VALUE").required(true).index(2))
                .arg(Arg::with_name("ttl")
                    .long("ttl")
                    .value_name("SECONDS")
                    .help("seconds until the value expires")
                    .default_value(DEFAULT_TTL_SECS)),
            SubCommand::with_name("get")
                .about("Get the string value of a given string key")
                .arg(Arg::with_name("KEY").required(true).index(1)),
            SubCommand::with_name("rm")
                .about("Removes a given key")
                .arg(Arg::with_name("KEY").required(true).index(1)),
            SubCommand::with_name("incr")
                .about("Adds a decimal delta to the number stored at a key")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(Arg::with_name("DELTA").required(true).index(2)),
            SubCommand::with_name("decr")
                .about("Subtracts a decimal delta from the number stored at a key")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(Arg::with_name("DELTA").required(true).index(2)),
        ])
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .help("sets the IP_ADDR:PORT of the server to connect to")
            .global(true))
        .arg(Arg::with_name("username")
            .long("username")
            .value_name("NAME")
            .global(true))
        .arg(Arg::with_name("password")
            .long("password")
            .value_name("PASSWORD")
            .global(true))
        .arg(Arg::with_name("key-bits")
            .long("key-bits")
            .value_name("BITS")
            .help("size of the client's RSA key")
            .global(true))
        .get_matches();

    let opt = parse_options(&matches)?;
    run(opt)
}

/// runs the requested action on a freshly connected [`RamDbClient`]
fn run(opt: Opt) -> Result<()> {
    let client = RamDbClient::connect(opt.addr, &opt.username, &opt.password, opt.key_bits)?;
    match opt.action {
        Action::Get { key } => {
            if let Some(value) = client.get(&key)? {
                println!("{}", value);
            } else {
                println!("Key not found");
            }
        }
        Action::Set { key, value, ttl } => {
            let added = client.set(&key, &value, ttl)?;
            println!("{}", if added { "ADDED" } else { "UPDATED" });
        }
        Action::Remove { key } => client.remove(&key)?,
        Action::Increment { key, delta } => println!("{}", client.increment(&key, delta)?),
        Action::Decrement { key, delta } => println!("{}", client.decrement(&key, delta)?),
    }
    client.close()
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let (name, args) = match matches.subcommand() {
        (name, Some(args)) => (name, args),
        _ => return Err(RamDbError::Parsing("no command given".to_string())),
    };

    // global args may be given before or after the subcommand
    let global = |name: &str| args.value_of(name).or_else(|| matches.value_of(name));

    let addr = global("addr").unwrap_or(DEFAULT_ADDRESS);
    let addr: SocketAddr = addr
        .parse()
        .map_err(|_| RamDbError::Parsing(format!("could not parse {} into an IP address and port", addr)))?;
    let key_bits = global("key-bits").unwrap_or(DEFAULT_KEY_BITS);
    let key_bits = key_bits
        .parse()
        .map_err(|_| RamDbError::Parsing(format!("--key-bits expects a number, got {}", key_bits)))?;

    let key = args.value_of("KEY").map(String::from).unwrap_or_default();
    let delta = || Decimal::from_wire(args.value_of("DELTA").unwrap_or_default());
    let action = match name {
        "set" => {
            let secs = args.value_of("ttl").unwrap_or(DEFAULT_TTL_SECS);
            let secs: u64 = secs
                .parse()
                .map_err(|_| RamDbError::Parsing(format!("--ttl expects a number of seconds, got {}", secs)))?;
            Action::Set {
                key,
                value: args.value_of("VALUE").map(String::from).unwrap_or_default(),
                ttl: Duration::from_secs(secs),
            }
        }
        "get" => Action::Get { key },
        "rm" => Action::Remove { key },
        "incr" => Action::Increment { key, delta: delta()? },
        "decr" => Action::Decrement { key, delta: delta()? },
        other => return Err(RamDbError::Parsing(format!("unknown command {}", other))),
    };

    Ok(Opt {
        addr,
        username: global("username").unwrap_or_default().to_string(),
        password: global("password").unwrap_or_default().to_string(),
        key_bits,
        action,
    })
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        // only warnings and errors, stdout carries the command's result
        .with_max_level(Level::WARN)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
