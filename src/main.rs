use clap::{Parser, Subcommand};
use comlink::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use comlink::{list_endpoints, AppResult, RxMode};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod monitor;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "comlink",
    version,
    about = "Serial port monitor with bounded scrollback and session logs.",
    long_about = "Opens a serial endpoint, prints everything it receives with timestamps, \
                  sends each line typed on stdin, and optionally saves the session to disk."
)]
struct Args {
    /// Configuration file. Defaults to the standard search path.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the serial endpoints the OS exposes.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Open a port and monitor it until Ctrl+C.
    Monitor {
        /// Port name or alias from `[serial.port_aliases]`.
        port: String,
        #[arg(short, long)]
        baud: Option<u32>,
        /// Write every displayed line to a session file.
        #[arg(long)]
        save_log: bool,
        /// Directory for session files.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        #[arg(long, value_enum)]
        rx_mode: Option<RxMode>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load config, using defaults: {e}");
            ConfigLoader::with_defaults().into_config()
        }
    };
    init_tracing(&config.logging);

    match run(args.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> comlink::ConfigResult<Config> {
    let loader = match path {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader.into_config())
}

/// Diagnostics go to stderr so they never mix with monitor output.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = installed {
        eprintln!("Warning: tracing subscriber not installed: {e}");
    }
}

async fn run(command: Command, config: Config) -> AppResult<()> {
    match command {
        Command::List { json } => {
            let endpoints = list_endpoints()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&endpoints)?);
            } else if endpoints.is_empty() {
                println!("No serial ports found.");
            } else {
                for endpoint in endpoints {
                    println!("{:<24} {}", endpoint.id, endpoint.label);
                }
            }
            Ok(())
        }
        Command::Monitor {
            port,
            baud,
            save_log,
            log_dir,
            rx_mode,
        } => {
            let mut settings = monitor::MonitorSettings::from_config(&config, &port);
            if let Some(baud) = baud {
                settings.endpoint.baud_rate = baud;
            }
            if let Some(rx_mode) = rx_mode {
                settings.rx_mode = rx_mode;
            }
            if let Some(log_dir) = log_dir {
                settings.log_dir = log_dir;
            }
            settings.save_log |= save_log;
            monitor::run(&config, settings, shutdown_signal()).await
        }
    }
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    eprintln!("\nSignal received, closing port...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_args_parse() {
        let args = Args::try_parse_from([
            "comlink", "monitor", "COM3", "--baud", "9600", "--rx-mode", "text", "--save-log",
        ])
        .unwrap();
        match args.command {
            Command::Monitor {
                port,
                baud,
                save_log,
                rx_mode,
                ..
            } => {
                assert_eq!(port, "COM3");
                assert_eq!(baud, Some(9600));
                assert!(save_log);
                assert_eq!(rx_mode, Some(RxMode::Text));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_list_args_parse() {
        let args =
            Args::try_parse_from(["comlink", "--config", "x.toml", "list", "--json"]).unwrap();
        assert!(matches!(args.command, Command::List { json: true }));
        assert_eq!(args.config, Some(PathBuf::from("x.toml")));
    }
}
