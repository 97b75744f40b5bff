//! Canonical domain types shared by all source adapters.

mod models;
mod period;
mod symbol;

pub use models::{Bar, BarSeries, Quote};
pub use period::Period;
pub use symbol::{Market, Symbol};
