//! Foundation types: business-date management and minor-unit money.

pub mod money;
pub mod time;
