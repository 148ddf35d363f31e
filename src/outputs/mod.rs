//! Writers for the dashboard report.
//!
//! # Submodules
//!
//! - [`json`]: the full [`Dashboard`](crate::dashboard::Dashboard) as JSON, for other tools
//! - [`markdown`]: a readable summary of the same figures
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 2025-05-06/
//! │   └── dashboard.json
//! └── dashboard_2025-05-06.md
//! ```

pub mod json;
pub mod markdown;
