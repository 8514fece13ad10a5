//! tikapi CLI Client
//!
//! Command-line interface for running API commands against a device.

use clap::{Parser, Subcommand};
use tikapi::{commands, ApiError, Attributes, Command, Config, Session};
use tracing_subscriber::{fmt, EnvFilter};

/// tikapi CLI
#[derive(Parser, Debug)]
#[command(name = "tikapi-cli")]
#[command(about = "Run management API commands against a device")]
#[command(version)]
struct Args {
    /// Device address
    #[arg(short = 'H', long, default_value = "192.168.88.1")]
    host: String,

    /// API port
    #[arg(short, long, default_value_t = tikapi::config::DEFAULT_PORT)]
    port: u16,

    /// Login user
    #[arg(short, long, default_value = "admin")]
    user: String,

    /// Login password
    #[arg(short = 'P', long, default_value = "")]
    password: String,

    /// Connect/read/write timeout in milliseconds
    #[arg(short, long, default_value = "10000")]
    timeout_ms: u64,

    /// Log protocol traffic to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an arbitrary command, e.g. `exec /interface/print where name=ether1`
    Exec {
        /// Menu path
        path: String,

        /// `key=value` attributes, `?query` words or a `where ...` clause
        args: Vec<String>,
    },

    /// Print the device identity
    Identity,

    /// List interfaces
    Interfaces,

    /// Show the ARP table
    Arp,

    /// Show DHCP leases
    Leases,

    /// List IP addresses
    Addresses,

    /// Ping an address from the device
    Ping {
        /// Target address
        address: String,

        /// Number of probes
        #[arg(short, long, default_value = "4")]
        count: u32,
    },
}

impl Commands {
    fn to_command(&self) -> Result<Command, ApiError> {
        Ok(match self {
            Commands::Exec { path, args } => {
                let mut line = path.clone();
                for arg in args {
                    line.push(' ');
                    if arg.contains(char::is_whitespace) {
                        line.push_str(&quote(arg));
                    } else {
                        line.push_str(arg);
                    }
                }
                Command::parse(&line)?
            }
            Commands::Identity => commands::identity(),
            Commands::Interfaces => commands::interfaces(),
            Commands::Arp => commands::arp_table(),
            Commands::Leases => commands::dhcp_leases(),
            Commands::Addresses => commands::addresses(),
            Commands::Ping { address, count } => commands::ping(address, *count),
        })
    }
}

/// Re-quote `key=some value` so the command-line parser keeps it whole
fn quote(arg: &str) -> String {
    match arg.split_once('=') {
        Some((key, value)) => format!("{}=\"{}\"", key, value),
        None => format!("\"{}\"", arg),
    }
}

fn main() {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.verbose {
        "info,tikapi=trace"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), ApiError> {
    let command = args.command.to_command()?;

    let config = Config::builder()
        .host(&args.host)
        .port(args.port)
        .username(&args.user)
        .password(&args.password)
        .connect_timeout_ms(args.timeout_ms)
        .read_timeout_ms(args.timeout_ms)
        .write_timeout_ms(args.timeout_ms)
        .build();

    tracing::info!("tikapi CLI v{}", tikapi::VERSION);
    tracing::info!("Connecting to {}", config.addr());

    let mut session = Session::open(config)?;
    let result = session.run(&command);
    session.disconnect();

    let response = result?;
    for (i, row) in response.rows.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_row(row);
    }
    if !response.done.is_empty() {
        if !response.rows.is_empty() {
            println!();
        }
        print_row(&response.done);
    }

    Ok(())
}

fn print_row(row: &Attributes) {
    for (key, value) in row {
        println!("{}={}", key, value);
    }
}
