//! Background job scheduling

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::config::Settings;
use crate::services::Scanner;

/// Shortest interval accepted for the full update check
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Interval between full update checks, from `checkFullUpdate`
pub fn full_update_interval(settings: &Settings) -> Duration {
    Duration::from_millis(settings.check_full_update).max(MIN_CHECK_INTERVAL)
}

/// Initialize and start the job scheduler
pub async fn start_scheduler(scanner: Arc<Scanner>, settings: &Settings) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let interval = full_update_interval(settings);
    let full_update_job = Job::new_repeated_async(interval, move |_uuid, _l| {
        let scanner = scanner.clone();
        Box::pin(async move {
            let queued = scanner.full_update();
            if queued > 0 {
                info!(queued = queued, "Periodic full update queued items");
            }
        })
    })?;
    scheduler.add(full_update_job).await?;

    scheduler.start().await?;

    info!(interval_secs = interval.as_secs(), "Job scheduler started");
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_update_interval() {
        let mut settings = Settings::default();
        assert_eq!(full_update_interval(&settings), Duration::from_secs(60 * 60));

        settings.check_full_update = 15 * 60 * 1000;
        assert_eq!(full_update_interval(&settings), Duration::from_secs(15 * 60));

        settings.check_full_update = 0;
        assert_eq!(full_update_interval(&settings), MIN_CHECK_INTERVAL);
    }
}
