use anyhow::Result;
use clap::Parser;
use run_monitor::cli;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Logs go to stderr so --json output on stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);
    let is_silent = args.silent;

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
