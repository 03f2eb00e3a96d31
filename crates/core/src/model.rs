//! Domain entities handed to the screen/state layer.
//!
//! Entities are plain values: no back-references into payloads, no interior
//! mutability. A re-fetch produces a new value instead of mutating the old one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::HtmlDocument;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(TopicId);
id_type!(ForumId);
id_type!(UserId);
id_type!(
    /// Identity of a comment or forum post.
    CommentId
);

/// Reference used when upstream provides no avatar.
pub const PLACEHOLDER_AVATAR: &str = "asset://avatar/default";

/// Seconds of inactivity after which a user is no longer shown as online.
pub const ONLINE_WINDOW_SECS: i64 = 900;

/// Image reference that is never null: either a remote URL or the placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageRef {
    Remote(Url),
    Placeholder,
}

impl ImageRef {
    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Remote(u) => u.as_str(),
            ImageRef::Placeholder => PLACEHOLDER_AVATAR,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ImageRef::Placeholder)
    }
}

/// News article preview, identified by its canonical URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub url: Url,
    pub title: String,
    pub description: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub cover: Url,
    pub is_review: bool,
    pub comment_count: u32,
}

/// Decoded article body.
pub type ArticleBody = HtmlDocument;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForumRef {
    pub id: ForumId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorRef {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub is_unread: bool,
    pub is_pinned: bool,
    pub is_closed: bool,
    pub last_activity: DateTime<Utc>,
    pub forum: ForumRef,
    pub last_author: Option<AuthorRef>,
    pub post_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub url: Url,
}

/// An article comment or a forum post. `parent == None` means root.
///
/// Deleted and hidden comments keep their place in the thread; the flags are
/// preserved for the presentation layer to act on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub parent: Option<CommentId>,
    pub author: AuthorRef,
    pub avatar: ImageRef,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub likes: u32,
    pub is_deleted: bool,
    pub is_hidden: bool,
    pub attachments: Vec<Attachment>,
}

impl Comment {
    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }
}

/// Karma as delivered upstream: a fixed-point value scaled by 100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Karma(i64);

impl Karma {
    pub fn from_hundredths(v: i64) -> Self {
        Self(v)
    }

    pub fn hundredths(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl std::fmt::Display for Karma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UserStats {
    pub karma: Karma,
    pub posts: u32,
    pub comments: u32,
    pub reputation: i64,
    pub topics: u32,
    pub replies: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub nickname: String,
    pub avatar: ImageRef,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub city: Option<String>,
    pub stats: UserStats,
}

impl UserProfile {
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        (now - self.last_seen_at).num_seconds() < ONLINE_WINDOW_SECS
    }
}

/// One visit of a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub seen_at: DateTime<Utc>,
    pub topic: Topic,
}

/// Topics seen on one local calendar day, in input order (duplicates kept).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryBucket {
    pub day: NaiveDate,
    pub topics: Vec<Topic>,
}

/// Heading of a history bucket relative to the viewer's current day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DayLabel {
    Today,
    Yesterday,
    Date(NaiveDate),
}

impl HistoryBucket {
    pub fn label(&self, today: NaiveDate) -> DayLabel {
        if self.day == today {
            DayLabel::Today
        } else if today.pred_opt() == Some(self.day) {
            DayLabel::Yesterday
        } else {
            DayLabel::Date(self.day)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn karma_formats_two_decimals() {
        assert_eq!(Karma::from_hundredths(1234).to_string(), "12.34");
        assert_eq!(Karma::from_hundredths(-50).to_string(), "-0.50");
        assert_eq!(Karma::from_hundredths(700).as_f64(), 7.0);
    }

    #[test]
    fn online_window_is_fifteen_minutes() {
        let seen = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let user = UserProfile {
            id: UserId(1),
            nickname: "n".into(),
            avatar: ImageRef::Placeholder,
            registered_at: seen,
            last_seen_at: seen,
            city: None,
            stats: UserStats::default(),
        };
        assert!(user.is_online(seen + chrono::Duration::seconds(899)));
        assert!(!user.is_online(seen + chrono::Duration::seconds(900)));
    }

    #[test]
    fn bucket_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 11, 8).unwrap();
        let bucket = |day| HistoryBucket { day, topics: Vec::new() };
        assert_eq!(bucket(today).label(today), DayLabel::Today);
        let yesterday = NaiveDate::from_ymd_opt(2024, 11, 7).unwrap();
        assert_eq!(bucket(yesterday).label(today), DayLabel::Yesterday);
        let older = NaiveDate::from_ymd_opt(2024, 9, 7).unwrap();
        assert_eq!(bucket(older).label(today), DayLabel::Date(older));
    }

    #[test]
    fn placeholder_reference_is_stable() {
        assert_eq!(ImageRef::Placeholder.as_str(), PLACEHOLDER_AVATAR);
        assert!(ImageRef::Placeholder.is_placeholder());
    }
}
