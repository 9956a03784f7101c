//! Resolution types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::calendar::SESSION_MINUTES;

/// Bucket width of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    Min1,  // 1 minute (base data)
    Min5,  // 5 minutes
    Min15, // 15 minutes
    Min30, // 30 minutes
    Min60, // 60 minutes, four fixed sub-session windows
    Daily, // one full session
    /// User-defined stride in session minutes.
    Custom(u32),
}

impl Resolution {
    /// Session minutes covered by one bar of this resolution.
    pub fn minutes(&self) -> u32 {
        match self {
            Resolution::Min1 => 1,
            Resolution::Min5 => 5,
            Resolution::Min15 => 15,
            Resolution::Min30 => 30,
            Resolution::Min60 => 60,
            Resolution::Daily => SESSION_MINUTES,
            Resolution::Custom(n) => (*n).clamp(1, SESSION_MINUTES),
        }
    }

    /// Returns a short label for this resolution.
    pub fn label(&self) -> String {
        match self {
            Resolution::Min1 => "1m".to_string(),
            Resolution::Min5 => "5m".to_string(),
            Resolution::Min15 => "15m".to_string(),
            Resolution::Min30 => "30m".to_string(),
            Resolution::Min60 => "60m".to_string(),
            Resolution::Daily => "D".to_string(),
            Resolution::Custom(n) => format!("{n}m*"),
        }
    }

    /// Period code understood by the data source.
    ///
    /// Custom strides have no server-side equivalent and are built from 1-minute rows.
    pub fn query_code(&self) -> &'static str {
        match self {
            Resolution::Min1 | Resolution::Custom(_) => "1",
            Resolution::Min5 => "5",
            Resolution::Min15 => "15",
            Resolution::Min30 => "30",
            Resolution::Min60 => "60",
            Resolution::Daily => "D",
        }
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, Resolution::Daily)
    }

    /// Whether rows for this resolution arrive as 1-minute rows.
    pub fn is_minute_feed(&self) -> bool {
        matches!(self, Resolution::Min1 | Resolution::Custom(_))
    }

    /// Calendar days of history that fit under a 1000-row request.
    pub fn max_window_days(&self) -> i64 {
        match self {
            Resolution::Min1 | Resolution::Custom(_) => 4,
            Resolution::Min5 => 20,
            Resolution::Min15 | Resolution::Min30 | Resolution::Min60 | Resolution::Daily => 60,
        }
    }

    /// Returns all fixed resolutions in order.
    pub fn all() -> &'static [Resolution] {
        &[
            Resolution::Min1,
            Resolution::Min5,
            Resolution::Min15,
            Resolution::Min30,
            Resolution::Min60,
            Resolution::Daily,
        ]
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Error returned when a resolution string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResolutionError(pub String);

impl fmt::Display for ParseResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resolution: {}", self.0)
    }
}

impl std::error::Error for ParseResolutionError {}

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "1" | "1m" => return Ok(Resolution::Min1),
            "5" | "5m" => return Ok(Resolution::Min5),
            "15" | "15m" => return Ok(Resolution::Min15),
            "30" | "30m" => return Ok(Resolution::Min30),
            "60" | "60m" | "1h" => return Ok(Resolution::Min60),
            "D" | "d" | "1d" | "daily" => return Ok(Resolution::Daily),
            _ => {}
        }

        // Custom strides: "45m*" or "custom:45"
        let digits = trimmed
            .strip_prefix("custom:")
            .or_else(|| trimmed.strip_suffix("m*"))
            .ok_or_else(|| ParseResolutionError(s.to_string()))?;
        match digits.parse::<u32>() {
            Ok(n) if n > 0 && n <= SESSION_MINUTES => Ok(Resolution::Custom(n)),
            _ => Err(ParseResolutionError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Resolution {
    type Error = ParseResolutionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.label()
    }
}
