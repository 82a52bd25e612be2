use gcontacts::cli::{self, Cli};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status for every fatal error.
const FAILURE: u8 = 2;

/// Level used when `RUST_LOG` is unset or unparseable.
const DEFAULT_LOG_LEVEL: &str = "warn";

fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

fn init_logging() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse_args();

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_usage() => {
            eprintln!("{e}.\n");
            eprintln!("{}", Cli::usage());
            ExitCode::from(FAILURE)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(FAILURE)
        }
    }
}
