//! # VAS Model Container - Main Entry Point
//!
//! Starts one AI model container: discovers the requested model under the
//! models root, loads its weights onto the selected device, and serves
//! inference requests on a local unix socket until stopped.
//!
//! ## Usage
//!
//! ```bash
//! # Serve one model
//! vas-container --model-id yolov8n --models-root /opt/vas/models
//!
//! # Inspect what discovery would find, then exit
//! vas-container --list-models --models-root /opt/vas/models
//! ```
//!
//! ## Exit Codes
//!
//! - `1`: configuration error (unavailable model, invalid descriptor,
//!   bad socket directory)
//! - `2`: resource error (descriptor requires a GPU, none present)
//! - `3`: runtime error while serving

use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;
use vas_container::{discover, ModelContainer};

/// AI model container for the VAS serving edge
#[derive(Parser, Debug)]
#[command(name = "vas-container", version, about)]
struct Cli {
    /// Identifier of the model this container serves
    #[arg(long)]
    model_id: Option<String>,

    /// Root directory scanned for model descriptors
    #[arg(long, default_value = "/opt/vas/models")]
    models_root: PathBuf,

    /// Directory where the container's unix socket is created
    #[arg(long, default_value = "/tmp")]
    socket_dir: PathBuf,

    /// Logging verbosity when RUST_LOG is unset
    /// (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Discover models under the root, print their availability, and exit
    #[arg(long)]
    list_models: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if cli.list_models {
        list_models(&cli.models_root);
        return;
    }

    let Some(model_id) = cli.model_id else {
        eprintln!("error: --model-id is required unless --list-models is given");
        process::exit(1);
    };

    let mut container = ModelContainer::new(model_id, cli.models_root, cli.socket_dir);
    if let Err(err) = container.run().await {
        error!(error = %err, "model container failed");
        eprintln!("Error: {err}");
        process::exit(err.exit_code());
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn list_models(models_root: &std::path::Path) {
    let registry = discover(models_root);

    println!("Available models:");
    for descriptor in registry.available() {
        println!(
            "  {} ({} v{}, {}, gpu_required={})",
            descriptor.model_id,
            descriptor.model_name,
            descriptor.model_version,
            descriptor.model_type,
            descriptor.resource_requirements.gpu_required,
        );
    }
    if registry.available_count() == 0 {
        println!("  (none)");
    }

    println!("Unavailable entries:");
    for (entry, reason) in registry.unavailable() {
        println!("  {entry}: {reason}");
    }
    if registry.unavailable_count() == 0 {
        println!("  (none)");
    }
}
