use clap::Parser;
use env_tests::plan::TestPlan;
use env_tests::{EnvironmentProfile, Selection, Session};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_FAILED: u8 = 1;
const EXIT_SETUP: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// Verify that a Yonda environment is reachable and minimally functional.
#[derive(Debug, Parser)]
#[command(name = "env-tests", version, about)]
struct Cli {
    /// Tiers to run.
    #[arg(long, value_enum, default_value_t = Selection::All)]
    tier: Selection,

    /// Variable file for the target environment. Variables already set in the
    /// process environment take precedence.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "env_tests=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let profile = match &cli.env_file {
        Some(path) => EnvironmentProfile::from_env_file(path),
        None => EnvironmentProfile::from_env(),
    };
    let profile = match profile {
        Ok(profile) => profile,
        Err(e) => {
            error!("Failed to resolve environment profile: {}", e);
            return ExitCode::from(EXIT_SETUP);
        }
    };

    let session = match Session::open(profile) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to open session: {}", e);
            return ExitCode::from(EXIT_SETUP);
        }
    };

    let plan = TestPlan::standard(session.profile());
    info!(tier = ?cli.tier, "Starting environment checks");

    let report = tokio::select! {
        report = session.run(&plan, cli.tier) => report,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, releasing session");
            session.release();
            return ExitCode::from(EXIT_INTERRUPTED);
        }
    };
    session.release();

    println!("{}", report);

    if report.has_failures() {
        ExitCode::from(EXIT_FAILED)
    } else {
        ExitCode::SUCCESS
    }
}
