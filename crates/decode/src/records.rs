//! Intermediate records: validated, typed, but not yet normalized (timestamps
//! are still epoch seconds, karma still scaled, URLs still strings).

use lenta_core::DecodeError;

use crate::layout::{article, attachment, comment, history, post, topic, user};
use crate::record::RawRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    pub id: u64,
    pub name: String,
    pub flags: u64,
    pub forum_id: u64,
    pub forum_name: String,
    pub last_author_id: Option<u64>,
    pub last_author_name: Option<String>,
    pub post_count: Option<u64>,
    pub last_activity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub seen_at: u64,
    pub topic: TopicRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRecord {
    pub id: u64,
    pub flags: u64,
    pub author_id: u64,
    pub author_name: String,
    pub created_at: u64,
    pub parent_id: Option<u64>,
    pub body: String,
    pub likes: u64,
    pub avatar_url: Option<String>,
    pub edited_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub id: u64,
    pub name: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: u64,
    pub flags: u64,
    pub author_id: u64,
    pub author_name: String,
    pub created_at: u64,
    pub body_html: String,
    pub likes: u64,
    pub avatar_url: Option<String>,
    pub edited_at: Option<u64>,
    pub reply_to: Option<u64>,
    pub attachments: Vec<AttachmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub nickname: String,
    pub avatar_url: Option<String>,
    pub registered_at: u64,
    pub last_seen_at: u64,
    pub city: Option<String>,
    pub karma: i64,
    pub posts: u64,
    pub comments: u64,
    pub reputation: i64,
    pub topics: u64,
    pub replies: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub published_at: u64,
    pub cover_url: String,
    pub flags: u64,
    pub comment_count: u64,
}

fn owned(s: Option<&str>) -> Option<String> {
    s.map(str::to_string)
}

/// `0` is upstream's "no parent".
fn nonzero(v: Option<u64>) -> Option<u64> {
    v.filter(|n| *n != 0)
}

pub(crate) fn topic_fields(r: &RawRecord<'_>) -> Result<TopicRecord, DecodeError> {
    Ok(TopicRecord {
        id: r.uint(&topic::ID)?,
        name: r.str(&topic::NAME)?.to_string(),
        flags: r.flags(&topic::FLAGS)?,
        forum_id: r.uint(&topic::FORUM_ID)?,
        forum_name: r.str(&topic::FORUM_NAME)?.to_string(),
        last_author_id: r.opt_uint(&topic::LAST_AUTHOR_ID)?,
        last_author_name: owned(r.opt_str(&topic::LAST_AUTHOR_NAME)?),
        post_count: r.opt_uint(&topic::POST_COUNT)?,
        last_activity: r.uint(&topic::LAST_ACTIVITY)?,
    })
}

pub(crate) fn history_fields(r: &RawRecord<'_>) -> Result<HistoryRecord, DecodeError> {
    let seen_at = r.uint(&history::SEEN_AT)?;
    let topic = topic_fields(r)?;
    Ok(HistoryRecord { seen_at, topic })
}

pub(crate) fn comment_fields(r: &RawRecord<'_>) -> Result<CommentRecord, DecodeError> {
    Ok(CommentRecord {
        id: r.uint(&comment::ID)?,
        flags: r.flags(&comment::FLAGS)?,
        author_id: r.uint(&comment::AUTHOR_ID)?,
        author_name: r.str(&comment::AUTHOR_NAME)?.to_string(),
        created_at: r.uint(&comment::CREATED_AT)?,
        parent_id: nonzero(r.opt_uint(&comment::PARENT_ID)?),
        body: r.str(&comment::BODY)?.to_string(),
        likes: r.uint(&comment::LIKES)?,
        avatar_url: owned(r.opt_str(&comment::AVATAR_URL)?),
        edited_at: r.opt_uint(&comment::EDITED_AT)?,
    })
}

fn attachment_fields(r: &RawRecord<'_>) -> Result<AttachmentRecord, DecodeError> {
    attachment::MAP.check(r)?;
    Ok(AttachmentRecord {
        id: r.uint(&attachment::ID)?,
        name: r.str(&attachment::NAME)?.to_string(),
        size: r.uint(&attachment::SIZE)?,
        url: r.str(&attachment::URL)?.to_string(),
    })
}

pub(crate) fn post_fields(r: &RawRecord<'_>) -> Result<PostRecord, DecodeError> {
    let attachments = match r.opt_list(&post::ATTACHMENTS)? {
        None => Vec::new(),
        Some(items) => items
            .iter()
            .map(|item| RawRecord::new(r.kind(), item).and_then(|a| attachment_fields(&a)))
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(PostRecord {
        id: r.uint(&post::ID)?,
        flags: r.flags(&post::FLAGS)?,
        author_id: r.uint(&post::AUTHOR_ID)?,
        author_name: r.str(&post::AUTHOR_NAME)?.to_string(),
        created_at: r.uint(&post::CREATED_AT)?,
        body_html: r.str(&post::BODY_HTML)?.to_string(),
        likes: r.uint(&post::LIKES)?,
        avatar_url: owned(r.opt_str(&post::AVATAR_URL)?),
        edited_at: r.opt_uint(&post::EDITED_AT)?,
        reply_to: nonzero(r.opt_uint(&post::REPLY_TO)?),
        attachments,
    })
}

pub(crate) fn user_fields(r: &RawRecord<'_>) -> Result<UserRecord, DecodeError> {
    Ok(UserRecord {
        id: r.uint(&user::ID)?,
        nickname: r.str(&user::NICKNAME)?.to_string(),
        avatar_url: owned(r.opt_str(&user::AVATAR_URL)?),
        registered_at: r.uint(&user::REGISTERED_AT)?,
        last_seen_at: r.uint(&user::LAST_SEEN_AT)?,
        city: owned(r.opt_str(&user::CITY)?),
        karma: r.int(&user::KARMA)?,
        posts: r.uint(&user::POSTS)?,
        comments: r.uint(&user::COMMENTS)?,
        reputation: r.int(&user::REPUTATION)?,
        topics: r.uint(&user::TOPICS)?,
        replies: r.uint(&user::REPLIES)?,
    })
}

pub(crate) fn article_fields(r: &RawRecord<'_>) -> Result<ArticleRecord, DecodeError> {
    Ok(ArticleRecord {
        url: r.str(&article::URL)?.to_string(),
        title: r.str(&article::TITLE)?.to_string(),
        description: r.str(&article::DESCRIPTION)?.to_string(),
        author: r.str(&article::AUTHOR)?.to_string(),
        published_at: r.uint(&article::PUBLISHED_AT)?,
        cover_url: r.str(&article::COVER_URL)?.to_string(),
        flags: r.flags(&article::FLAGS)?,
        comment_count: r.uint(&article::COMMENT_COUNT)?,
    })
}
