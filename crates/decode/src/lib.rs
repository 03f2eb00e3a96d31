//! Lenta decode: raw upstream payloads to validated intermediate records.
//!
//! List endpoints answer with a positional envelope
//! `[status, request_id, total, [record, ...]]`, single-record endpoints with
//! `[status, request_id, record]`. Records are positional arrays described by
//! the tables in [`layout`]. Article bodies arrive as HTML and go through the
//! best-effort decoder in [`html`].

#![forbid(unsafe_code)]

pub mod html;
pub mod layout;
pub mod record;
pub mod records;

use lenta_core::{DecodeError, EntityKind, HtmlDocument};
use metrics::counter;
use serde_json::Value;
use tracing::debug;

pub use html::{decode_entities, decode_html, decode_html_bytes};
pub use record::{FieldSpec, IndexMap, Presence, RawRecord};
pub use records::{
    ArticleRecord, AttachmentRecord, CommentRecord, HistoryRecord, PostRecord, TopicRecord, UserRecord,
};

/// One upstream payload, before decoding.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Positional(&'a Value),
    Html(&'a str),
}

/// Decoded but not yet normalized record.
#[derive(Debug, Clone, PartialEq)]
pub enum Intermediate {
    Topic(TopicRecord),
    Post(PostRecord),
    Comment(CommentRecord),
    User(UserRecord),
    Article(ArticleRecord),
    History(HistoryRecord),
    ArticleBody(HtmlDocument),
}

impl Intermediate {
    pub fn kind(&self) -> EntityKind {
        match self {
            Intermediate::Topic(_) => EntityKind::Topic,
            Intermediate::Post(_) => EntityKind::Post,
            Intermediate::Comment(_) => EntityKind::Comment,
            Intermediate::User(_) => EntityKind::User,
            Intermediate::Article(_) | Intermediate::ArticleBody(_) => EntityKind::Article,
            Intermediate::History(_) => EntityKind::History,
        }
    }
}

/// Decode a single record of `kind`.
///
/// Fails on the first missing or mistyped slot; never substitutes defaults.
pub fn decode(kind: EntityKind, payload: Payload<'_>) -> Result<Intermediate, DecodeError> {
    let res = decode_inner(kind, payload);
    if let Err(e) = &res {
        counter!("decode_failures_total", 1u64, "kind" => kind.as_str());
        debug!(kind = %kind, error = %e, "decode failed");
    }
    res
}

fn decode_inner(kind: EntityKind, payload: Payload<'_>) -> Result<Intermediate, DecodeError> {
    let raw = match payload {
        Payload::Html(html) => {
            return match kind {
                EntityKind::Article => Ok(Intermediate::ArticleBody(decode_html(html))),
                _ => Err(DecodeError::UnsupportedPayload { kind }),
            };
        }
        Payload::Positional(raw) => raw,
    };
    let rec = RawRecord::new(kind, raw)?;
    layout::for_kind(kind).check(&rec)?;
    let out = match kind {
        EntityKind::Topic => Intermediate::Topic(records::topic_fields(&rec)?),
        EntityKind::History => Intermediate::History(records::history_fields(&rec)?),
        EntityKind::Comment => Intermediate::Comment(records::comment_fields(&rec)?),
        EntityKind::Post => Intermediate::Post(records::post_fields(&rec)?),
        EntityKind::User => Intermediate::User(records::user_fields(&rec)?),
        EntityKind::Article => Intermediate::Article(records::article_fields(&rec)?),
    };
    Ok(out)
}

/// A decoded list response. Items fail independently.
#[derive(Debug, Clone)]
pub struct Page {
    pub total: u64,
    pub items: Vec<Result<Intermediate, DecodeError>>,
}

impl Page {
    pub fn failures(&self) -> usize {
        self.items.iter().filter(|r| r.is_err()).count()
    }
}

fn parse(bytes: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

fn open_envelope<'a>(kind: EntityKind, raw: &'a Value) -> Result<RawRecord<'a>, DecodeError> {
    let env = RawRecord::new(kind, raw)?;
    let status = env.uint(&layout::envelope::STATUS)?;
    if status != layout::envelope::STATUS_OK {
        return Err(DecodeError::UpstreamStatus { code: status });
    }
    if let Some(id) = env.opt_uint(&layout::envelope::REQUEST_ID)? {
        debug!(kind = %kind, request_id = id, "envelope");
    }
    Ok(env)
}

/// Decode a list envelope that is already parsed.
pub fn decode_page_value(kind: EntityKind, raw: &Value) -> Result<Page, DecodeError> {
    let env = open_envelope(kind, raw)?;
    let total = env.uint(&layout::envelope::TOTAL)?;
    let items = env.list(&layout::envelope::ITEMS)?;
    let items: Vec<_> = items.iter().map(|item| decode(kind, Payload::Positional(item))).collect();
    let page = Page { total, items };
    if page.failures() > 0 {
        debug!(kind = %kind, failed = page.failures(), of = page.items.len(), "partial page");
    }
    Ok(page)
}

/// Decode a list response body.
pub fn decode_page(kind: EntityKind, bytes: &[u8]) -> Result<Page, DecodeError> {
    let raw = parse(bytes)?;
    decode_page_value(kind, &raw)
}

/// Decode a single-record response body.
pub fn decode_single(kind: EntityKind, bytes: &[u8]) -> Result<Intermediate, DecodeError> {
    let raw = parse(bytes)?;
    let env = open_envelope(kind, &raw)?;
    let record = env.slot(&layout::envelope::RECORD)?.ok_or(DecodeError::NotARecord { kind })?;
    decode(kind, Payload::Positional(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn html_only_for_articles() {
        assert!(matches!(
            decode(EntityKind::Article, Payload::Html("<p>x</p>")),
            Ok(Intermediate::ArticleBody(_))
        ));
        assert_eq!(
            decode(EntityKind::User, Payload::Html("<p>x</p>")).unwrap_err(),
            DecodeError::UnsupportedPayload { kind: EntityKind::User }
        );
    }

    #[test]
    fn upstream_error_status() {
        let err = decode_page(EntityKind::Topic, br#"[3, null, 0, []]"#).unwrap_err();
        assert_eq!(err, DecodeError::UpstreamStatus { code: 3 });
    }

    #[test]
    fn not_json() {
        assert!(matches!(decode_page(EntityKind::Topic, b"<html>"), Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn envelope_without_items() {
        let v = json!([0, 7, 10]);
        let err = decode_page_value(EntityKind::Topic, &v).unwrap_err();
        assert_eq!(err.index(), Some(3));
    }
}
