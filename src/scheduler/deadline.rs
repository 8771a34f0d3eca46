//! Submission deadline parsing.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Accepted deadline layouts, tried in order. The first that parses wins.
pub const DEADLINE_FORMATS: [&str; 4] = ["%d.%m.%Y %H:%M", "%Y-%m-%d %H:%M", "%d.%m.%Y", "%Y-%m-%d"];

/// How a deadline was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineSource {
    /// Parsed from the listing text
    Parsed,
    /// No deadline text; treated as due now
    Empty,
    /// Text matched no known format; treated as due now
    Unparseable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub at: DateTime<Utc>,
    pub source: DeadlineSource,
}

impl Deadline {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.at <= now
    }
}

/// Parse portal deadline text given in the portal's UTC `offset`.
///
/// Date-only forms mean midnight. Empty or unrecognised text yields `now`.
pub fn parse_deadline(text: &str, offset: FixedOffset, now: DateTime<Utc>) -> Deadline {
    let text = text.trim();
    if text.is_empty() {
        return Deadline {
            at: now,
            source: DeadlineSource::Empty,
        };
    }

    for format in DEADLINE_FORMATS {
        let naive = NaiveDateTime::parse_from_str(text, format).ok().or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });

        // A nonexistent local time cannot occur with a fixed offset
        if let Some(at) = naive.and_then(|n| offset.from_local_datetime(&n).single()) {
            return Deadline {
                at: at.with_timezone(&Utc),
                source: DeadlineSource::Parsed,
            };
        }
    }

    Deadline {
        at: now,
        source: DeadlineSource::Unparseable,
    }
}
