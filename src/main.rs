use clap::{Parser, Subcommand};
use log::error;
use std::path::{Path, PathBuf};

use reel::configuration::{RecorderConfig, SessionOptions};
use reel::controller::Controller;

#[derive(Parser)]
#[command(name = "reel")]
#[command(version = "0.0.2")]
#[command(about = "Records browser test runs as video")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "REEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the HTTP control server
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Record one workload run and exit with its status code
    Run {
        /// Capture target: a ws:// debugger URL or an X display like :99
        #[arg(short, long)]
        target: Option<String>,

        /// Output video path (.mp4 or .webm)
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long)]
        fps: Option<u32>,

        /// Capture resolution, WxH
        #[arg(long)]
        resolution: Option<String>,

        /// X display to create when no target is given
        #[arg(long)]
        display: Option<String>,

        /// Capture frames only on explicit /frame requests
        #[arg(long)]
        manual: bool,

        /// Launch a ChromeDriver service for the duration of the run
        #[arg(long)]
        chromedriver: bool,

        /// Workload command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        workload: Vec<String>,
    },
}

fn load_config(path: Option<&Path>) -> Result<RecorderConfig, reel::error_handling::ConfigError> {
    match path {
        Some(path) => RecorderConfig::from_file(path),
        None => Ok(RecorderConfig::default()),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    match args.command {
        CliCommand::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let mut controller = match Controller::new(config) {
                Ok(controller) => controller,
                Err(e) => {
                    error!("Unable to create a controller instance: {}", e);
                    std::process::exit(1);
                }
            };
            if let Err(e) = controller.serve().await {
                error!("Control server failed: {}", e);
                std::process::exit(1);
            }
        }
        CliCommand::Run {
            target,
            output,
            fps,
            resolution,
            display,
            manual,
            chromedriver,
            workload,
        } => {
            let mut controller = match Controller::new(config) {
                Ok(controller) => controller,
                Err(e) => {
                    error!("Unable to create a controller instance: {}", e);
                    std::process::exit(1);
                }
            };
            let options = SessionOptions {
                target,
                output,
                fps,
                resolution,
                display,
                manual: manual.then_some(true),
            };
            match controller.run(&options, chromedriver, &workload).await {
                Ok(code) => std::process::exit(code),
                Err(e) => {
                    error!("Recorded run failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
