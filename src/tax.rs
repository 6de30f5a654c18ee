// 🧾 Tax Apportionment
// One merchant-level rate applied to every eligible line item:
//   tax   = round(price * rate, 2)
//   total = round(price + tax, 2)

use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?(?:\d+(?:\.\d*)?|\.\d+)").expect("valid number regex"));

/// Round to cents, half away from zero
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Tax rate as a fraction (0.08 for 8%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxRate(f64);

impl TaxRate {
    pub const ZERO: TaxRate = TaxRate(0.0);

    /// Build from a percentage (8.0 → 0.08)
    pub fn from_percent(percent: f64) -> Result<Self, ExtractionError> {
        if !percent.is_finite() || percent < 0.0 {
            return Err(ExtractionError::InvalidFormat(format!(
                "tax rate must be a non-negative percentage, got {}",
                percent
            )));
        }
        Ok(TaxRate(percent / 100.0))
    }

    /// Parse the `taxRate` field of an analysis reply
    ///
    /// Accepts numbers and strings such as `"8"`, `"8%"`, `"8.25 %"`,
    /// `"0% (exempt)"`. Missing, blank, or text with no number in it
    /// (`"N/A"`) means no tax. A string holding several numbers is rejected.
    pub fn parse(value: Option<&serde_json::Value>) -> Result<Self, ExtractionError> {
        let value = match value {
            None | Some(serde_json::Value::Null) => {
                warn!("Receipt has no tax rate, applying 0%");
                return Ok(TaxRate::ZERO);
            }
            Some(v) => v,
        };

        match value {
            serde_json::Value::Number(n) => {
                let percent = n.as_f64().ok_or_else(|| {
                    ExtractionError::InvalidFormat(format!("unreadable tax rate {}", n))
                })?;
                TaxRate::from_percent(percent)
            }
            serde_json::Value::String(s) => {
                let numbers: Vec<&str> = NUMBER.find_iter(s).map(|m| m.as_str()).collect();
                match numbers.as_slice() {
                    [] => {
                        warn!("Receipt tax rate {:?} has no number, applying 0%", s);
                        Ok(TaxRate::ZERO)
                    }
                    [number] => {
                        let percent: f64 = number.parse().map_err(|_| {
                            ExtractionError::InvalidFormat(format!("unreadable tax rate '{}'", s))
                        })?;
                        TaxRate::from_percent(percent)
                    }
                    _ => Err(ExtractionError::InvalidFormat(format!(
                        "ambiguous tax rate '{}'",
                        s
                    ))),
                }
            }
            other => Err(ExtractionError::InvalidFormat(format!(
                "unexpected tax rate value {}",
                other
            ))),
        }
    }

    pub fn fraction(&self) -> f64 {
        self.0
    }

    pub fn percent(&self) -> f64 {
        self.0 * 100.0
    }
}

/// Price split into tax and total
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Apportioned {
    pub price: f64,
    pub tax: f64,
    pub total: f64,
}

pub fn apportion(price: f64, rate: TaxRate) -> Apportioned {
    let tax = round_cents(price * rate.fraction());
    let total = round_cents(price + tax);
    Apportioned { price, tax, total }
}
