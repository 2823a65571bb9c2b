use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{Local, NaiveDate};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;

use school_billing::infra::{
    config::AppConfig,
    scheduler::DailyScheduler,
    setup::{init_billing_run, init_tracing},
};

enum Command {
    Run { as_of: Option<NaiveDate> },
    Serve,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    match args.next().as_deref() {
        Some("run") => {
            let mut as_of = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--as-of" => {
                        let raw = args.next().context("--as-of needs a YYYY-MM-DD value")?;
                        as_of = Some(
                            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                                .with_context(|| format!("invalid --as-of date: {raw}"))?,
                        );
                    }
                    other => bail!("unknown argument: {other}"),
                }
            }
            Ok(Command::Run { as_of })
        }
        Some("serve") => Ok(Command::Serve),
        _ => bail!("usage: school-billing run [--as-of YYYY-MM-DD] | school-billing serve"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let command = parse_args(std::env::args().skip(1))?;
    let config = AppConfig::from_env()?;
    init_tracing(config.log_json);

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let use_cases = init_billing_run(&config).await?;

    match command {
        Command::Run { as_of } => {
            let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
            let summary = use_cases.run(as_of, &shutdown).await?;
            info!(summary = %serde_json::to_string(&summary)?, "Billing run summary");
            if summary.failed_units() > 0 {
                bail!("{} school units failed", summary.failed_units());
            }
        }
        Command::Serve => {
            DailyScheduler::new(Arc::new(use_cases), config.run_at, shutdown)
                .run()
                .await;
        }
    }

    Ok(())
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("Shutdown requested, finishing current school unit");
        shutdown.cancel();
    });
}
