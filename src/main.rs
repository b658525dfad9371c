use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use gecko_triage::{DeliveryStatus, TriageConfig, TriageController};

#[derive(Parser)]
#[command(name = "gecko")]
#[command(version)]
#[command(about = "Collects logs, screenshots and system state into a triage bundle")]
struct Args {
    /// TOML configuration file
    config_file: PathBuf,

    /// What went wrong, in the operator's words
    #[arg(short, long, default_value = "")]
    message: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    println!(
        "
 ██████╗ ███████╗ ██████╗██╗  ██╗ ██████╗
██╔════╝ ██╔════╝██╔════╝██║ ██╔╝██╔═══██╗
██║  ███╗█████╗  ██║     █████╔╝ ██║   ██║
██║   ██║██╔══╝  ██║     ██╔═██╗ ██║   ██║
╚██████╔╝███████╗╚██████╗██║  ██╗╚██████╔╝
 ╚═════╝ ╚══════╝ ╚═════╝╚═╝  ╚═╝ ╚═════╝
==========================================
     Triage collector v{}
==========================================
",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    info!("Importing configuration from {}", args.config_file.display());
    let config = match TriageConfig::from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Configuration imported successfully");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Unable to start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let controller = TriageController::new(config);
    let result = runtime.block_on(controller.run(&args.message));

    // Abandoned captures may still be running; do not wait for them.
    runtime.shutdown_background();

    match result {
        Ok(summary) => {
            println!("Report:  {}", summary.report_path.display());
            println!("Archive: {}", summary.bundle.path.display());
            if let DeliveryStatus::Failed(reason) = &summary.delivery {
                println!("Delivery failed: {}", reason);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Triage run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
