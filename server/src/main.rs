use clap::Parser;
use log::{error, info};
use sim_server::config::{parse_role_list, parse_time_step, ServerConfig};
use sim_server::directory::{FileDirectory, ScenarioDirectory};
use sim_server::network::SimServer;
use sim_server::scheduler::TickConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, loads the scenario directory and runs the websocket server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8000")]
        port: u16,
        /// Milliseconds between simulation ticks
        #[clap(long, default_value = "1000")]
        tick_ms: u64,
        /// Simulated seconds advanced per tick
        #[clap(long, default_value = "1.0", value_parser = parse_time_step)]
        time_step: f64,
        /// JSON file with scenarios, roles and users
        #[clap(short, long)]
        data: Option<PathBuf>,
        /// Comma-separated role names allowed to control simulations
        #[clap(long, default_value = "Simulation Controller,Admin,C2,Primary")]
        control_roles: String,
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick: TickConfig {
            interval: Duration::from_millis(args.tick_ms.max(1)),
            time_step: args.time_step,
        },
        control_roles: parse_role_list(&args.control_roles),
        data: args.data,
    };

    let directory: Arc<dyn ScenarioDirectory> = match &config.data {
        Some(path) => {
            let directory = FileDirectory::open(path).await?;
            info!("Loaded scenario data from {}", path.display());
            Arc::new(directory)
        }
        None => {
            info!("No scenario data given, every scenario starts empty");
            Arc::new(FileDirectory::empty())
        }
    };

    info!(
        "Ticking every {:?}, advancing {}s per tick",
        config.tick.interval, config.tick.time_step
    );

    let server = SimServer::bind(&config, directory).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
