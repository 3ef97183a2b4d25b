use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Quarter index within the projection horizon, 1-based.
pub type Quarter = u8;

/// Number of projection quarters in a supervisory stress horizon.
pub const HORIZON_QUARTERS: Quarter = 9;

/// Metadata attached to every stress run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
    /// Whether segment projections ran on the rayon pool.
    pub parallel: bool,
}

impl ComputationMetadata {
    pub fn new(elapsed_us: u64) -> Self {
        ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
            parallel: cfg!(feature = "parallel"),
        }
    }
}
