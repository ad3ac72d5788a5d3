#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod time;
pub mod toggle;

pub use error::ChecklistError;
pub use time::Clock;
