//! Daily trigger at a fixed local time.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Longest single wait between two clock checks.
const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Parse `HH:MM`.
pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| Error::Config(format!("invalid time {raw:?}: {e}")))
}

/// Next occurrence of `at` strictly after `now`: today if still ahead, else tomorrow.
pub fn next_run(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// How long to sleep before checking the clock again.
fn wait_step(now: NaiveDateTime, target: NaiveDateTime) -> Duration {
    (target - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .min(POLL_INTERVAL)
}

/// Call `job` every day at `at` local time, forever.
pub async fn run_daily<F, Fut>(at: NaiveTime, mut job: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let target = next_run(Local::now().naive_local(), at);
        info!(next_run = %target, "Waiting for next scheduled run");
        loop {
            let now = Local::now().naive_local();
            if now >= target {
                break;
            }
            let step = wait_step(now, target);
            debug!(?step, "Sleeping");
            sleep(step).await;
        }
        info!("Scheduled run starting");
        job().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("22:00").unwrap(), NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert_eq!(parse_time(" 07:05 ").unwrap(), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("ten").is_err());
    }

    #[test]
    fn test_next_run_today_or_tomorrow() {
        let ten_pm = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        assert_eq!(next_run(at(6, 9, 0), ten_pm), at(6, 22, 0));
        assert_eq!(next_run(at(6, 22, 0), ten_pm), at(7, 22, 0));
        assert_eq!(next_run(at(6, 23, 30), ten_pm), at(7, 22, 0));
    }

    #[test]
    fn test_wait_step_is_capped() {
        assert_eq!(wait_step(at(6, 9, 0), at(6, 22, 0)), POLL_INTERVAL);
        assert_eq!(wait_step(at(6, 21, 59), at(6, 22, 0)), Duration::from_secs(60));
        assert_eq!(
            wait_step(at(6, 21, 59) + ChronoDuration::seconds(30), at(6, 22, 0)),
            Duration::from_secs(30)
        );
        assert_eq!(wait_step(at(6, 22, 1), at(6, 22, 0)), Duration::ZERO);
    }
}
