//! Data cleaning components.
//!
//! This module provides the building blocks the scrubbing pipeline chains:
//! - Structural snapshots ([`ConsistencyChecker`])
//! - Uniform missing-value substitution ([`MissingValueFiller`])
//! - Date parsing into a canonical representation ([`DateStandardizer`])
//! - Row-removing outlier policies ([`OutlierPolicy`])
//! - Name, whitespace, duplicate and critical-column sanitization

mod consistency;
mod dates;
mod missing;
mod outliers;
pub(crate) mod sanitizers;

pub use consistency::{ConsistencyChecker, duplicate_row_count};
pub use dates::{DateStandardizer, date_from_days, days_since_epoch, parse_date};
pub use missing::MissingValueFiller;
pub use outliers::OutlierPolicy;
