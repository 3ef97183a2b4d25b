pub mod capital;
pub mod config;
pub mod error;
pub mod loss;
pub mod math;
pub mod portfolio;
pub mod results;
pub mod roller;
pub mod runner;
pub mod satellite;
pub mod scenario;
pub mod types;
pub mod vasicek;

#[cfg(feature = "transition")]
pub mod transition;

pub use error::CapitalStressError;
pub use types::*;

/// Standard result type for all capital-stress operations
pub type CapitalStressResult<T> = Result<T, CapitalStressError>;
