use std::path::PathBuf;

use clap::Parser;

use cronman::config::{Config, DEFAULT_REST_SERVER_PORT};
use cronman::daemon::Daemon;
use cronman::logging;

#[derive(Parser, Debug)]
#[command(name = "cronman")]
#[command(about = "A RESTful cron job manager")]
struct Args {
    /// Configuration file path (absolute path)
    #[arg(long = "configFilePath")]
    config_file_path: Option<PathBuf>,

    /// REST server port
    #[arg(long, default_value_t = DEFAULT_REST_SERVER_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let Some(config_path) = args.config_file_path else {
        eprintln!("Config file path is not specified");
        std::process::exit(1);
    };
    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error while reading the config - {e}");
            std::process::exit(1);
        }
    };

    // The guard flushes buffered log lines when main returns.
    let _guard = match logging::init(&config.log_directory(), &config.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error while setting up logging - {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        config_file = %config_path.display(),
        port = args.port,
        working_directory = %config.working_directory,
        max_running_jobs = config.max_running_jobs,
        "Starting cronman"
    );

    if let Err(e) = Daemon::new(config, args.port).run().await {
        tracing::error!(error = %e, "Daemon exited with an error");
        eprintln!("cronman: {e}");
        std::process::exit(1);
    }
}
