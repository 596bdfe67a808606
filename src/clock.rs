use crate::errors::{ClockError, RecordError};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub fn day_key(instant: DateTime<Utc>, zone: Tz) -> String {
    date_key(local_date(instant, zone))
}

pub fn local_date(instant: DateTime<Utc>, zone: Tz) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RecordError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RecordError::MissingTimestamp);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| RecordError::BadTimestamp(raw.to_string()))
}

/// Source of "now" for request handling.
///
/// With a remote URL configured, the time is fetched from a worldtimeapi-style
/// endpoint under a short timeout; any failure falls back to the local clock.
#[derive(Clone, Default)]
pub struct TimeSource {
    remote: Option<RemoteClock>,
}

#[derive(Clone)]
struct RemoteClock {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RemoteTime {
    #[serde(alias = "dateTime", alias = "currentDateTime")]
    datetime: Option<String>,
}

impl TimeSource {
    pub fn local() -> Self {
        Self { remote: None }
    }

    pub fn remote(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            remote: Some(RemoteClock {
                client,
                url: url.into(),
            }),
        })
    }

    pub async fn now(&self) -> DateTime<Utc> {
        let Some(remote) = &self.remote else {
            return Utc::now();
        };
        match remote.fetch().await {
            Ok(now) => now,
            Err(err) => {
                debug!("{err}; using local clock");
                Utc::now()
            }
        }
    }
}

impl RemoteClock {
    async fn fetch(&self) -> Result<DateTime<Utc>, ClockError> {
        let body: RemoteTime = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.datetime
            .as_deref()
            .and_then(|raw| parse_timestamp(raw).ok())
            .ok_or(ClockError::NoTime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_key_follows_configured_zone() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 3, 23, 30, 0).unwrap();
        assert_eq!(day_key(instant, Tz::UTC), "2025-03-03");
        assert_eq!(day_key(instant, chrono_tz::Europe::Paris), "2025-03-04");
    }

    #[test]
    fn timestamps_parse_with_offsets() {
        let parsed = parse_timestamp("2025-01-06T11:15:00+01:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 6, 10, 15, 0).unwrap());
        assert_eq!(parse_timestamp("  "), Err(RecordError::MissingTimestamp));
        assert!(matches!(
            parse_timestamp("Mon Mar 03 2025"),
            Err(RecordError::BadTimestamp(_))
        ));
    }

    #[test]
    fn formatted_timestamps_round_trip() {
        let instant = Utc.with_ymd_and_hms(2025, 5, 2, 9, 15, 0).unwrap();
        let text = format_timestamp(instant);
        assert_eq!(text, "2025-05-02T09:15:00.000Z");
        assert_eq!(parse_timestamp(&text).unwrap(), instant);
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_local() {
        let source = TimeSource::remote("http://127.0.0.1:9/time", Duration::from_millis(200))
            .expect("client");
        let before = Utc::now();
        let now = source.now().await;
        assert!(now >= before);
    }
}
