use clap::Parser;
use streak_app::app::{run, AppConfig, Cli};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(err = %format!("{err:#}"), "ignoring analytics config");
            AppConfig::default()
        }
    };
    if let Err(err) = run(config, cli) {
        eprintln!("streakboard failed: {err:#}");
        std::process::exit(1);
    }
}
