//! Validation for bars coming from a data source.

use charter_core::Bar;

use crate::parse::RowError;

/// Check a bar has finite prices, non-negative volume and a consistent range.
pub fn validate_bar(bar: &Bar) -> Result<(), RowError> {
    let values = [bar.open, bar.high, bar.low, bar.close, bar.volume];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(RowError::NonFinite);
    }
    if bar.volume < 0.0 {
        return Err(RowError::NegativeVolume(bar.volume));
    }
    if bar.open <= 0.0 || bar.close <= 0.0 || bar.low <= 0.0 {
        return Err(RowError::NonPositivePrice);
    }
    if !bar.is_consistent() {
        return Err(RowError::InconsistentRange {
            low: bar.low,
            high: bar.high,
        });
    }
    Ok(())
}
