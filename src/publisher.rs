//! Status-API wire formats and forwarding.
//!
//! The update call is `{status, err, timestamp}` with `err` explicitly `null`
//! when there is no uncertainty; the query response (see `api::responses`)
//! omits its bound instead.

use crate::dispatch::ceil_count;
use crate::http::post_json_discard;
use crate::status::CrowdStatus;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub fn format_timestamp(timestamp: SystemTime) -> Result<String, time::error::Format> {
    OffsetDateTime::from(timestamp).format(&Rfc3339)
}

/// Outgoing status update call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub status: u64,
    pub err: Option<f64>,
    pub timestamp: String,
}

impl StatusUpdate {
    pub fn from_status(status: &CrowdStatus) -> Result<Self, time::error::Format> {
        Ok(Self {
            status: status.estimate,
            err: status.uncertainty,
            timestamp: format_timestamp(status.timestamp)?,
        })
    }
}

/// Incoming status update call, as posted by an external fog process.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: f64,
    #[serde(default)]
    pub err: Option<f64>,
    #[serde(default)]
    pub timestamp: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampSource {
    Parsed,
    Substituted { reason: String },
}

impl StatusUpdateRequest {
    /// Convert to a status. A missing, mistyped or unparseable timestamp is
    /// replaced by `now`; the caller decides how to log it.
    pub fn into_status(self, now: SystemTime) -> Result<(CrowdStatus, TimestampSource), String> {
        let estimate = ceil_count(self.status).map_err(|err| err.to_string())?;
        let uncertainty = match self.err {
            Some(value) if !value.is_finite() => {
                return Err(format!("non-finite err value: {value}"));
            }
            other => other,
        };
        let (timestamp, source) = match parse_timestamp(&self.timestamp) {
            Ok(timestamp) => (timestamp, TimestampSource::Parsed),
            Err(reason) => (now, TimestampSource::Substituted { reason }),
        };
        Ok((
            CrowdStatus {
                estimate,
                uncertainty,
                timestamp,
            },
            source,
        ))
    }
}

/// ISO-8601 forms without an offset, as produced by `isoformat()` on a naive
/// datetime. They are read as UTC.
const NAIVE_DATETIME_FORMATS: [&[BorrowedFormatItem<'static>]; 5] = [
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
];

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

fn parse_timestamp(value: &serde_json::Value) -> Result<SystemTime, String> {
    let text = value
        .as_str()
        .ok_or_else(|| format!("timestamp is not a string: {value}"))?;
    parse_iso8601(text.trim()).map(SystemTime::from)
}

fn parse_iso8601(text: &str) -> Result<OffsetDateTime, String> {
    if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(parsed);
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = PrimitiveDateTime::parse(text, format) {
            return Ok(parsed.assume_utc());
        }
    }
    Date::parse(text, DATE_FORMAT)
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| format!("timestamp {text:?} is not ISO-8601"))
}

/// Forward every published status to an external status API. Only the latest
/// status is sent when updates arrive faster than the API answers.
pub fn spawn_forwarder(
    mut updates: watch::Receiver<CrowdStatus>,
    url: String,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            let update = match StatusUpdate::from_status(&status) {
                Ok(update) => update,
                Err(err) => {
                    warn!(error = %err, "Failed to format status timestamp for forwarding");
                    continue;
                }
            };
            let target = url.clone();
            let result =
                tokio::task::spawn_blocking(move || post_json_discard(&target, &update, timeout))
                    .await;
            match result {
                Ok(Ok(())) => debug!(url = %url, estimate = status.estimate, "Forwarded status"),
                Ok(Err(err)) => warn!(url = %url, error = %err, "Status forwarding failed"),
                Err(err) => warn!(error = %err, "Status forwarding worker failed"),
            }
        }
        debug!("Status channel closed, forwarder stopping");
    })
}
