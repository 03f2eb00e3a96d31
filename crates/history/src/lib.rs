//! Lenta history: visited topics grouped into local calendar days.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate, TimeZone};
use lenta_core::{HistoryBucket, HistoryEntry, Topic};
use tracing::debug;

pub use lenta_core::DayLabel;

/// Group entries by the calendar day of `seen_at` in `tz`.
///
/// Buckets come out newest day first. Within a bucket topics keep input order
/// and repeated visits of the same topic are all kept.
pub fn aggregate<Tz: TimeZone>(entries: Vec<HistoryEntry>, tz: &Tz) -> Vec<HistoryBucket> {
    let total = entries.len();
    let mut days: BTreeMap<NaiveDate, Vec<Topic>> = BTreeMap::new();
    for entry in entries {
        let day = entry.seen_at.with_timezone(tz).date_naive();
        days.entry(day).or_default().push(entry.topic);
    }
    debug!(entries = total, buckets = days.len(), "history aggregated");
    days.into_iter().rev().map(|(day, topics)| HistoryBucket { day, topics }).collect()
}

/// [`aggregate`] in the process' local time zone.
pub fn aggregate_local(entries: Vec<HistoryEntry>) -> Vec<HistoryBucket> {
    aggregate(entries, &Local)
}

/// Current calendar day in `tz`, for [`HistoryBucket::label`].
pub fn today<Tz: TimeZone>(tz: &Tz) -> NaiveDate {
    chrono::Utc::now().with_timezone(tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use lenta_core::{ForumId, ForumRef, TopicId};

    fn entry(topic: u64, rfc3339: &str) -> HistoryEntry {
        let seen_at = chrono::DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc);
        HistoryEntry {
            seen_at,
            topic: Topic {
                id: TopicId(topic),
                name: format!("topic {topic}"),
                is_unread: false,
                is_pinned: false,
                is_closed: false,
                last_activity: seen_at,
                forum: ForumRef { id: ForumId(1), name: "f".into() },
                last_author: None,
                post_count: None,
            },
        }
    }

    #[test]
    fn empty_history() {
        assert!(aggregate(Vec::new(), &Utc).is_empty());
    }

    #[test]
    fn day_boundary_follows_time_zone() {
        // 22:30 UTC on the 7th is already the 8th in UTC+3.
        let entries = vec![entry(1, "2024-11-07T22:30:00Z"), entry(2, "2024-11-07T12:00:00Z")];
        let msk = FixedOffset::east_opt(3 * 3600).unwrap();
        let buckets = aggregate(entries.clone(), &msk);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].day, NaiveDate::from_ymd_opt(2024, 11, 8).unwrap());
        let in_utc = aggregate(entries, &Utc);
        assert_eq!(in_utc.len(), 1);
        assert_eq!(in_utc[0].topics.len(), 2);
    }
}
