use chrono::{DateTime, NaiveDate, Utc};
use lenta_core::{DayLabel, ForumId, ForumRef, HistoryEntry, Topic, TopicId};
use lenta_history::aggregate;

fn visit(topic: u64, at: &str) -> HistoryEntry {
    let seen_at = DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc);
    HistoryEntry {
        seen_at,
        topic: Topic {
            id: TopicId(topic),
            name: format!("topic {topic}"),
            is_unread: false,
            is_pinned: false,
            is_closed: false,
            last_activity: seen_at,
            forum: ForumRef { id: ForumId(3), name: "Ремонт".into() },
            last_author: None,
            post_count: None,
        },
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn three_visits_two_days() {
    let entries = vec![
        visit(10, "2024-11-08T09:15:00Z"),
        visit(11, "2024-09-07T18:00:00Z"),
        visit(12, "2024-11-08T21:40:00Z"),
    ];
    let buckets = aggregate(entries, &Utc);
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].day, day(2024, 11, 8));
    assert_eq!(buckets[0].topics.iter().map(|t| t.id.0).collect::<Vec<_>>(), vec![10, 12]);
    assert_eq!(buckets[1].day, day(2024, 9, 7));
    assert_eq!(buckets[1].topics.len(), 1);
}

#[test]
fn repeated_visits_are_kept() {
    let entries = vec![
        visit(5, "2024-11-08T08:00:00Z"),
        visit(6, "2024-11-08T09:00:00Z"),
        visit(5, "2024-11-08T10:00:00Z"),
    ];
    let buckets = aggregate(entries, &Utc);
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].topics.iter().map(|t| t.id.0).collect::<Vec<_>>(), vec![5, 6, 5]);
}

#[test]
fn buckets_strictly_descending_with_labels() {
    let entries = vec![
        visit(1, "2024-11-06T10:00:00Z"),
        visit(2, "2024-11-08T10:00:00Z"),
        visit(3, "2024-11-07T10:00:00Z"),
        visit(4, "2024-11-06T23:59:59Z"),
    ];
    let buckets = aggregate(entries, &Utc);
    assert!(buckets.windows(2).all(|w| w[0].day > w[1].day));
    let today = day(2024, 11, 8);
    let labels: Vec<_> = buckets.iter().map(|b| b.label(today)).collect();
    assert_eq!(labels, vec![DayLabel::Today, DayLabel::Yesterday, DayLabel::Date(day(2024, 11, 6))]);
    assert_eq!(buckets[2].topics.len(), 2);
}
