//! Positional layouts, one per entity kind.
//!
//! These tables are the single source of truth for the wire format: decoders
//! read slots only through the constants below. When upstream moves a field,
//! change it here and nowhere else.

use lenta_core::{EntityKind, FieldType};

use crate::record::{FieldSpec, IndexMap};

use FieldType::*;

/// List and single-record response wrapper.
pub mod envelope {
    use super::*;

    pub const STATUS: FieldSpec = FieldSpec::required(0, "status", Int);
    pub const REQUEST_ID: FieldSpec = FieldSpec::optional(1, "request_id", Int);
    pub const TOTAL: FieldSpec = FieldSpec::required(2, "total", Int);
    pub const ITEMS: FieldSpec = FieldSpec::required(3, "items", List);
    /// Single-record responses carry the record where lists carry the total.
    pub const RECORD: FieldSpec = FieldSpec::required(2, "record", List);

    pub const STATUS_OK: u64 = 0;
}

pub mod topic {
    use super::*;

    pub const ID: FieldSpec = FieldSpec::required(0, "id", Int);
    pub const NAME: FieldSpec = FieldSpec::required(1, "name", Str);
    pub const FLAGS: FieldSpec = FieldSpec::required(2, "flags", Flags);
    pub const FORUM_ID: FieldSpec = FieldSpec::required(3, "forum_id", Int);
    pub const FORUM_NAME: FieldSpec = FieldSpec::required(4, "forum_name", Str);
    pub const LAST_AUTHOR_ID: FieldSpec = FieldSpec::optional(5, "last_author_id", Int);
    pub const LAST_AUTHOR_NAME: FieldSpec = FieldSpec::optional(6, "last_author_name", Str);
    pub const POST_COUNT: FieldSpec = FieldSpec::optional(7, "post_count", Int);
    pub const LAST_ACTIVITY: FieldSpec = FieldSpec::required(8, "last_activity", Int);

    pub const FLAG_UNREAD: u64 = 1 << 0;
    pub const FLAG_PINNED: u64 = 1 << 1;
    pub const FLAG_CLOSED: u64 = 1 << 2;

    pub const MAP: IndexMap = IndexMap {
        kind: EntityKind::Topic,
        fields: &[ID, NAME, FLAGS, FORUM_ID, FORUM_NAME, LAST_AUTHOR_ID, LAST_AUTHOR_NAME, POST_COUNT, LAST_ACTIVITY],
    };
}

/// A history entry is a topic record whose timestamp slot is the visit time.
pub mod history {
    use super::*;

    pub const SEEN_AT: FieldSpec = FieldSpec::required(8, "seen_at", Int);

    pub const MAP: IndexMap = IndexMap {
        kind: EntityKind::History,
        fields: &[
            topic::ID,
            topic::NAME,
            topic::FLAGS,
            topic::FORUM_ID,
            topic::FORUM_NAME,
            topic::LAST_AUTHOR_ID,
            topic::LAST_AUTHOR_NAME,
            topic::POST_COUNT,
            SEEN_AT,
        ],
    };
}

pub mod comment {
    use super::*;

    pub const ID: FieldSpec = FieldSpec::required(0, "id", Int);
    pub const FLAGS: FieldSpec = FieldSpec::required(1, "flags", Flags);
    pub const AUTHOR_ID: FieldSpec = FieldSpec::required(2, "author_id", Int);
    pub const AUTHOR_NAME: FieldSpec = FieldSpec::required(3, "author_name", Str);
    pub const CREATED_AT: FieldSpec = FieldSpec::required(4, "created_at", Int);
    /// `null` or `0` marks a root comment.
    pub const PARENT_ID: FieldSpec = FieldSpec::optional(5, "parent_id", Int);
    pub const BODY: FieldSpec = FieldSpec::required(6, "body", Str);
    pub const LIKES: FieldSpec = FieldSpec::required(7, "likes", Int);
    pub const AVATAR_URL: FieldSpec = FieldSpec::optional(8, "avatar_url", Str);
    pub const EDITED_AT: FieldSpec = FieldSpec::optional(9, "edited_at", Int);

    pub const FLAG_DELETED: u64 = 1 << 0;
    pub const FLAG_HIDDEN: u64 = 1 << 1;

    pub const MAP: IndexMap = IndexMap {
        kind: EntityKind::Comment,
        fields: &[ID, FLAGS, AUTHOR_ID, AUTHOR_NAME, CREATED_AT, PARENT_ID, BODY, LIKES, AVATAR_URL, EDITED_AT],
    };
}

pub mod post {
    use super::*;

    pub const ID: FieldSpec = FieldSpec::required(0, "id", Int);
    pub const FLAGS: FieldSpec = FieldSpec::required(1, "flags", Flags);
    pub const AUTHOR_ID: FieldSpec = FieldSpec::required(2, "author_id", Int);
    pub const AUTHOR_NAME: FieldSpec = FieldSpec::required(3, "author_name", Str);
    pub const CREATED_AT: FieldSpec = FieldSpec::required(4, "created_at", Int);
    pub const BODY_HTML: FieldSpec = FieldSpec::required(5, "body_html", Str);
    pub const LIKES: FieldSpec = FieldSpec::required(6, "likes", Int);
    pub const AVATAR_URL: FieldSpec = FieldSpec::optional(7, "avatar_url", Str);
    pub const EDITED_AT: FieldSpec = FieldSpec::optional(8, "edited_at", Int);
    /// `null` or `0` marks a post that replies to nobody.
    pub const REPLY_TO: FieldSpec = FieldSpec::optional(9, "reply_to", Int);
    /// Absent list means "no attachments".
    pub const ATTACHMENTS: FieldSpec = FieldSpec::optional(10, "attachments", List);

    pub const FLAG_DELETED: u64 = 1 << 0;
    pub const FLAG_HIDDEN: u64 = 1 << 1;

    pub const MAP: IndexMap = IndexMap {
        kind: EntityKind::Post,
        fields: &[ID, FLAGS, AUTHOR_ID, AUTHOR_NAME, CREATED_AT, BODY_HTML, LIKES, AVATAR_URL, EDITED_AT, REPLY_TO, ATTACHMENTS],
    };
}

/// Items of `post::ATTACHMENTS`.
pub mod attachment {
    use super::*;

    pub const ID: FieldSpec = FieldSpec::required(0, "attachment.id", Int);
    pub const NAME: FieldSpec = FieldSpec::required(1, "attachment.name", Str);
    pub const SIZE: FieldSpec = FieldSpec::required(2, "attachment.size", Int);
    pub const URL: FieldSpec = FieldSpec::required(3, "attachment.url", Str);

    pub const MAP: IndexMap = IndexMap { kind: EntityKind::Post, fields: &[ID, NAME, SIZE, URL] };
}

pub mod user {
    use super::*;

    pub const ID: FieldSpec = FieldSpec::required(0, "id", Int);
    pub const NICKNAME: FieldSpec = FieldSpec::required(1, "nickname", Str);
    pub const AVATAR_URL: FieldSpec = FieldSpec::optional(2, "avatar_url", Str);
    pub const REGISTERED_AT: FieldSpec = FieldSpec::required(3, "registered_at", Int);
    pub const LAST_SEEN_AT: FieldSpec = FieldSpec::required(4, "last_seen_at", Int);
    pub const CITY: FieldSpec = FieldSpec::optional(5, "city", Str);
    /// Fixed point, scaled by 100.
    pub const KARMA: FieldSpec = FieldSpec::required(6, "karma", SignedInt);
    pub const POSTS: FieldSpec = FieldSpec::required(7, "posts", Int);
    pub const COMMENTS: FieldSpec = FieldSpec::required(8, "comments", Int);
    pub const REPUTATION: FieldSpec = FieldSpec::required(9, "reputation", SignedInt);
    pub const TOPICS: FieldSpec = FieldSpec::required(10, "topics", Int);
    pub const REPLIES: FieldSpec = FieldSpec::required(11, "replies", Int);

    pub const MAP: IndexMap = IndexMap {
        kind: EntityKind::User,
        fields: &[
            ID,
            NICKNAME,
            AVATAR_URL,
            REGISTERED_AT,
            LAST_SEEN_AT,
            CITY,
            KARMA,
            POSTS,
            COMMENTS,
            REPUTATION,
            TOPICS,
            REPLIES,
        ],
    };
}

pub mod article {
    use super::*;

    pub const URL: FieldSpec = FieldSpec::required(0, "url", Str);
    pub const TITLE: FieldSpec = FieldSpec::required(1, "title", Str);
    pub const DESCRIPTION: FieldSpec = FieldSpec::required(2, "description", Str);
    pub const AUTHOR: FieldSpec = FieldSpec::required(3, "author", Str);
    pub const PUBLISHED_AT: FieldSpec = FieldSpec::required(4, "published_at", Int);
    pub const COVER_URL: FieldSpec = FieldSpec::required(5, "cover_url", Str);
    pub const FLAGS: FieldSpec = FieldSpec::required(6, "flags", Flags);
    pub const COMMENT_COUNT: FieldSpec = FieldSpec::required(7, "comment_count", Int);

    pub const FLAG_REVIEW: u64 = 1 << 0;

    pub const MAP: IndexMap = IndexMap {
        kind: EntityKind::Article,
        fields: &[URL, TITLE, DESCRIPTION, AUTHOR, PUBLISHED_AT, COVER_URL, FLAGS, COMMENT_COUNT],
    };
}

/// Layout owned by `kind`.
pub fn for_kind(kind: EntityKind) -> &'static IndexMap {
    match kind {
        EntityKind::Topic => &topic::MAP,
        EntityKind::History => &history::MAP,
        EntityKind::Comment => &comment::MAP,
        EntityKind::Post => &post::MAP,
        EntityKind::User => &user::MAP,
        EntityKind::Article => &article::MAP,
    }
}
