//! Data source contract.

use std::future::Future;

use charter_core::Resolution;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// One request against a data source.
#[derive(Debug, Clone, PartialEq)]
pub struct BarQuery {
    pub symbol: String,
    pub resolution: Resolution,
    pub row_limit: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl BarQuery {
    pub fn new(symbol: impl Into<String>, resolution: Resolution, row_limit: usize) -> Self {
        Self {
            symbol: symbol.into(),
            resolution,
            row_limit,
            start_date: None,
            end_date: None,
        }
    }

    pub fn with_start(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn with_end(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    /// Query-string pairs in the `/api/kline` format.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("code", self.symbol.clone()),
            ("period", self.resolution.query_code().to_string()),
            ("limit", self.row_limit.to_string()),
        ];
        if let Some(start) = self.start_date {
            pairs.push(("start_date", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("end_date", end.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

/// One row as delivered by the source, before parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
    pub date: String,
    #[serde(deserialize_with = "number_or_string")]
    pub open: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub high: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub low: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub close: f64,
    #[serde(default, deserialize_with = "optional_number_or_string")]
    pub volume: Option<f64>,
}

impl RawRow {
    pub fn new(date: impl Into<String>, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date: date.into(),
            open,
            high,
            low,
            close,
            volume: Some(volume),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

impl NumberOrString {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid number: {s}"))),
        }
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_f64()
}

fn optional_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_f64)
        .transpose()
}

/// Body of a source response: an ordered row list or an error payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceResponse {
    Error { error: String },
    Rows(Vec<RawRow>),
}

impl SourceResponse {
    pub fn into_result(self) -> Result<Vec<RawRow>, SourceError> {
        match self {
            SourceResponse::Rows(rows) => Ok(rows),
            SourceResponse::Error { error } => Err(SourceError::Semantic(error)),
        }
    }
}

/// Data source errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    /// The source answered with an `{error}` payload.
    #[error("data source error: {0}")]
    Semantic(String),
}

impl SourceError {
    /// Network, status and decoding failures; the next natural trigger retries.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SourceError::Semantic(_))
    }
}

/// Trait for types that can answer bar queries.
pub trait DataSource {
    fn query(&self, query: &BarQuery) -> impl Future<Output = Result<Vec<RawRow>, SourceError>>;
}
