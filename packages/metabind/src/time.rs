//! Injected date/time parsing collaborator.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

type ParseFn = Arc<dyn Fn(&str) -> Result<DateTime<Utc>, String> + Send + Sync>;

/// The date/time parser carried on `Context`.
///
/// Injected rather than process-global so behavior stays deterministic
/// under concurrent and test use. The default tries RFC 3339 first,
/// then a handful of common date/time layouts interpreted as UTC.
#[derive(Clone)]
pub struct TimeParser {
    parse: ParseFn,
}

const LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

impl TimeParser {
    /// Install a custom parse function.
    pub fn custom<F>(parse: F) -> Self
    where
        F: Fn(&str) -> Result<DateTime<Utc>, String> + Send + Sync + 'static,
    {
        TimeParser {
            parse: Arc::new(parse),
        }
    }

    /// Parse a time string.
    pub fn parse(&self, s: &str) -> Result<DateTime<Utc>, String> {
        (self.parse)(s)
    }

    /// Parse and render the canonical RFC 3339 UTC string form stored
    /// in temporal fields.
    pub fn parse_canonical(&self, s: &str) -> Result<String, String> {
        self.parse(s)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl Default for TimeParser {
    fn default() -> Self {
        TimeParser::custom(default_parse)
    }
}

fn default_parse(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }

    for layout in LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(s, layout) {
            let naive = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(format!("unrecognized time '{}'", s))
}
