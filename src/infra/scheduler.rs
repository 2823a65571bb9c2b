use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::use_cases::billing_run::BillingRunUseCases;

const FALLBACK_SLEEP: Duration = Duration::from_secs(60);

/// Runs the billing cron once a day at a fixed local time.
pub struct DailyScheduler {
    use_cases: Arc<BillingRunUseCases>,
    run_at: NaiveTime,
    shutdown: CancellationToken,
}

impl DailyScheduler {
    pub fn new(
        use_cases: Arc<BillingRunUseCases>,
        run_at: NaiveTime,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            use_cases,
            run_at,
            shutdown,
        }
    }

    pub async fn run(self) {
        info!(run_at = %self.run_at.format("%H:%M"), "Billing scheduler started");

        loop {
            let sleep_duration = duration_until_next_run(Local::now().naive_local(), self.run_at);
            info!(
                "Next billing run in {} minutes",
                sleep_duration.as_secs() / 60
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    let as_of = Local::now().date_naive();
                    match self.use_cases.run(as_of, &self.shutdown).await {
                        Ok(summary) if summary.failed_units() > 0 => {
                            error!(
                                run_id = %summary.run_id,
                                failed = summary.failed_units(),
                                "Billing run finished with failed school units"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(%as_of, error = %e, "Billing run aborted");
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Billing scheduler received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// Time from `now` until the next occurrence of `run_at` (tomorrow if it has passed today).
pub fn duration_until_next_run(now: NaiveDateTime, run_at: NaiveTime) -> Duration {
    let today = now.date();
    let target_date = if now.time() >= run_at {
        match today.succ_opt() {
            Some(tomorrow) => tomorrow,
            None => return FALLBACK_SLEEP,
        }
    } else {
        today
    };

    let remaining = target_date.and_time(run_at) - now;
    if remaining.num_seconds() <= 0 {
        return FALLBACK_SLEEP;
    }
    remaining.to_std().unwrap_or(FALLBACK_SLEEP)
}
