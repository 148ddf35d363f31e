//! JSON output of the dashboard aggregate.
//!
//! One file per generation day:
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     └── dashboard.json
//! ```

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

use crate::dashboard::Dashboard;
use crate::error::Result;

/// Write a [`Dashboard`] to `{output_dir}/{date}/dashboard.json`, returning the path.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), %date))]
pub async fn write_dashboard(
    dashboard: &Dashboard,
    output_dir: &Path,
    date: NaiveDate,
) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(dashboard)?;

    let day_dir = output_dir.join(date.to_string());
    info!(day_dir = %day_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&day_dir).await {
        error!(day_dir = %day_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = day_dir.join("dashboard.json");
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote dashboard JSON");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::build;

    #[tokio::test]
    async fn test_write_dashboard_layout() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        let path = write_dashboard(&build(&[], None), dir.path(), date).await.unwrap();

        assert_eq!(path, dir.path().join("2025-05-06").join("dashboard.json"));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["total_publications"], 0);
        assert!(written["last_update"].is_null());
    }
}
