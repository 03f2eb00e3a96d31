//! Per-kind assemblers. Pure functions from an intermediate record to a domain
//! entity; cross-field invariants are checked here and nowhere else.

use chrono::{DateTime, TimeZone, Utc};
use lenta_core::{
    Article, AssemblyError, Attachment, AuthorRef, Comment, CommentId, EntityKind, ForumId, ForumRef,
    HistoryEntry, HtmlDocument, ImageRef, Karma, Topic, TopicId, UserId, UserProfile, UserStats,
};
use lenta_decode::layout::{article, comment, post, topic};
use lenta_decode::{decode_html, ArticleRecord, AttachmentRecord, CommentRecord, HistoryRecord, PostRecord, TopicRecord, UserRecord};
use url::Url;

/// City values upstream sends instead of "not set".
const CITY_SENTINELS: [&str; 2] = ["", "Нет"];

fn inconsistent(kind: EntityKind, id: impl ToString, reason: impl Into<String>) -> AssemblyError {
    AssemblyError::Inconsistent { kind, id: id.to_string(), reason: reason.into() }
}

fn timestamp(kind: EntityKind, id: impl ToString, field: &str, secs: u64) -> Result<DateTime<Utc>, AssemblyError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .ok_or_else(|| inconsistent(kind, id, format!("{field} {secs} out of range")))
}

fn http_url(raw: &str) -> Option<Url> {
    Url::parse(raw.trim()).ok().filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn avatar(raw: Option<&str>) -> ImageRef {
    raw.and_then(http_url).map(ImageRef::Remote).unwrap_or(ImageRef::Placeholder)
}

fn city(raw: Option<String>) -> Option<String> {
    raw.map(|c| c.trim().to_string()).filter(|c| !CITY_SENTINELS.contains(&c.as_str()))
}

fn count(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn has(flags: u64, bit: u64) -> bool {
    flags & bit != 0
}

fn edited(
    kind: EntityKind,
    id: u64,
    created_at: DateTime<Utc>,
    edited_at: Option<u64>,
) -> Result<Option<DateTime<Utc>>, AssemblyError> {
    let Some(secs) = edited_at else { return Ok(None) };
    let at = timestamp(kind, id, "edited_at", secs)?;
    if at < created_at {
        return Err(inconsistent(kind, id, "edited before created"));
    }
    Ok(Some(at))
}

fn parent(kind: EntityKind, id: u64, parent: Option<u64>) -> Result<Option<CommentId>, AssemblyError> {
    match parent {
        Some(p) if p == id => Err(inconsistent(kind, id, "comment is its own parent")),
        other => Ok(other.map(CommentId)),
    }
}

pub fn assemble_topic(r: TopicRecord) -> Result<Topic, AssemblyError> {
    let last_activity = timestamp(EntityKind::Topic, r.id, "last_activity", r.last_activity)?;
    let last_author = match (r.last_author_id, r.last_author_name) {
        (Some(id), Some(name)) => Some(AuthorRef { id: UserId(id), name }),
        _ => None,
    };
    Ok(Topic {
        id: TopicId(r.id),
        name: r.name,
        is_unread: has(r.flags, topic::FLAG_UNREAD),
        is_pinned: has(r.flags, topic::FLAG_PINNED),
        is_closed: has(r.flags, topic::FLAG_CLOSED),
        last_activity,
        forum: ForumRef { id: ForumId(r.forum_id), name: r.forum_name },
        last_author,
        post_count: r.post_count.map(count),
    })
}

pub fn assemble_history_entry(r: HistoryRecord) -> Result<HistoryEntry, AssemblyError> {
    let seen_at = timestamp(EntityKind::History, r.topic.id, "seen_at", r.seen_at)?;
    let topic = assemble_topic(r.topic).map_err(|e| match e {
        AssemblyError::Inconsistent { id, reason, .. } => AssemblyError::Inconsistent { kind: EntityKind::History, id, reason },
    })?;
    Ok(HistoryEntry { seen_at, topic })
}

pub fn assemble_comment(r: CommentRecord) -> Result<Comment, AssemblyError> {
    let kind = EntityKind::Comment;
    let created_at = timestamp(kind, r.id, "created_at", r.created_at)?;
    Ok(Comment {
        id: CommentId(r.id),
        parent: parent(kind, r.id, r.parent_id)?,
        author: AuthorRef { id: UserId(r.author_id), name: r.author_name },
        avatar: avatar(r.avatar_url.as_deref()),
        body: r.body,
        created_at,
        edited_at: edited(kind, r.id, created_at, r.edited_at)?,
        likes: count(r.likes),
        is_deleted: has(r.flags, comment::FLAG_DELETED),
        is_hidden: has(r.flags, comment::FLAG_HIDDEN),
        attachments: Vec::new(),
    })
}

fn attachment(post_id: u64, r: AttachmentRecord) -> Result<Attachment, AssemblyError> {
    let url = Url::parse(&r.url)
        .map_err(|e| inconsistent(EntityKind::Post, post_id, format!("attachment {} url: {e}", r.id)))?;
    Ok(Attachment { id: r.id, name: r.name, size: r.size, url })
}

/// Forum post with its HTML body decoded; `Comment::body` carries the plain
/// text rendering.
pub fn assemble_post_rich(r: PostRecord) -> Result<(Comment, HtmlDocument), AssemblyError> {
    let kind = EntityKind::Post;
    let created_at = timestamp(kind, r.id, "created_at", r.created_at)?;
    let edited_at = edited(kind, r.id, created_at, r.edited_at)?;
    let parent = parent(kind, r.id, r.reply_to)?;
    let id = r.id;
    let attachments = r.attachments.into_iter().map(|a| attachment(id, a)).collect::<Result<Vec<_>, _>>()?;
    let doc = decode_html(&r.body_html);
    let comment = Comment {
        id: CommentId(r.id),
        parent,
        author: AuthorRef { id: UserId(r.author_id), name: r.author_name },
        avatar: avatar(r.avatar_url.as_deref()),
        body: doc.plain_text(),
        created_at,
        edited_at,
        likes: count(r.likes),
        is_deleted: has(r.flags, post::FLAG_DELETED),
        is_hidden: has(r.flags, post::FLAG_HIDDEN),
        attachments,
    };
    Ok((comment, doc))
}

pub fn assemble_post(r: PostRecord) -> Result<Comment, AssemblyError> {
    assemble_post_rich(r).map(|(c, _)| c)
}

pub fn assemble_user(r: UserRecord) -> Result<UserProfile, AssemblyError> {
    let kind = EntityKind::User;
    let registered_at = timestamp(kind, r.id, "registered_at", r.registered_at)?;
    let last_seen_at = timestamp(kind, r.id, "last_seen_at", r.last_seen_at)?;
    if last_seen_at < registered_at {
        return Err(inconsistent(kind, r.id, "last seen before registration"));
    }
    Ok(UserProfile {
        id: UserId(r.id),
        nickname: r.nickname,
        avatar: avatar(r.avatar_url.as_deref()),
        registered_at,
        last_seen_at,
        city: city(r.city),
        stats: UserStats {
            karma: Karma::from_hundredths(r.karma),
            posts: count(r.posts),
            comments: count(r.comments),
            reputation: r.reputation,
            topics: count(r.topics),
            replies: count(r.replies),
        },
    })
}

pub fn assemble_article(r: ArticleRecord) -> Result<Article, AssemblyError> {
    let kind = EntityKind::Article;
    let Some(url) = http_url(&r.url) else {
        return Err(inconsistent(kind, &r.url, "url is not an absolute http(s) url"));
    };
    let cover = Url::parse(r.cover_url.trim()).map_err(|e| inconsistent(kind, &r.url, format!("cover url: {e}")))?;
    let published_at = timestamp(kind, &r.url, "published_at", r.published_at)?;
    Ok(Article {
        url,
        title: r.title,
        description: r.description,
        author: r.author,
        published_at,
        cover,
        is_review: has(r.flags, article::FLAG_REVIEW),
        comment_count: count(r.comment_count),
    })
}
