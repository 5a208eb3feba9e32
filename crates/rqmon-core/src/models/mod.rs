//! Data models for RQMon

mod alert;
mod metric;

pub use alert::*;
pub use metric::*;
