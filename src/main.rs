use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use remote_shell::config::{ConfigLoader, ServerConfig, DEFAULT_CLIENT_ADDRESS};
use remote_shell::remote::{RemoteClient, Server};
use remote_shell::repl::{run_local_loop, run_remote_loop};

/// Runs shell pipelines locally, as a TCP server, or as a client of one.
#[derive(Parser, Debug)]
#[command(name = "rsh", version)]
struct Cli {
    /// Serve remote clients
    #[arg(short = 's', long, conflicts_with = "client")]
    server: bool,

    /// Connect to a server
    #[arg(short = 'c', long)]
    client: bool,

    /// Interface to bind, or server address to connect to
    #[arg(short = 'i', long)]
    interface: Option<String>,

    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// One worker thread per client
    #[arg(short = 'x', long)]
    threaded: bool,

    /// key=value settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("RSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> remote_shell::Result<i32> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.threaded |= cli.threaded;

    if cli.server {
        if let Some(interface) = cli.interface {
            config.interface = interface;
        }
        let outcome = Server::bind(config)?.serve()?;
        info!(sessions = outcome.sessions_served, "server stopped");
        Ok(0)
    } else if cli.client {
        let address = cli.interface.unwrap_or_else(|| DEFAULT_CLIENT_ADDRESS.to_string());
        let mut client = RemoteClient::connect((address.as_str(), config.port))?;
        run_remote_loop(io::stdin().lock(), io::stdout(), &mut client)?;
        Ok(0)
    } else {
        Ok(run_local_loop(io::stdin().lock(), io::stdout(), config.limits)?)
    }
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(code) => ExitCode::from((code & 0xff) as u8),
        Err(e) => {
            error!(error = %e, "fatal");
            eprintln!("rsh: {}", e);
            ExitCode::FAILURE
        }
    }
}
