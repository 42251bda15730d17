use serde::{Deserialize, Serialize};

/// How energy left in the battery after the last slot is valued.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminalValuation {
    /// Leftover energy is worth nothing.
    Zero,
    /// Leftover energy is credited at the cheapest import price of the horizon.
    #[default]
    MinImportPrice,
}

impl TerminalValuation {
    pub fn price_ct_per_kwh(self, min_import_price: Option<f64>) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::MinImportPrice => min_import_price.unwrap_or(0.0),
        }
    }
}
