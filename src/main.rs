use clap::Parser;
use tracing_subscriber::EnvFilter;

use grabber_teleop::config::Args;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug). Logs go to stderr, status lines to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Exit explicitly: an interrupted session may still be parked on a stdin read
    match grabber_teleop::runtime::run(args).await {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            eprintln!("Teleop error: {}", e);
            std::process::exit(1);
        }
    }
}
