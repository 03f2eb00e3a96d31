//! Lenta assemble: decoded records to domain entities, one page at a time.
//!
//! Each entity of a page is decoded and assembled independently; the result is
//! a [`Batch`] of successes plus per-position failures. Only an envelope
//! failure fails the whole page.

#![forbid(unsafe_code)]

mod entities;

pub use entities::{
    assemble_article, assemble_comment, assemble_history_entry, assemble_post, assemble_post_rich, assemble_topic,
    assemble_user,
};

use lenta_core::{
    Article, Batch, BatchFailure, Comment, DecodeError, EntityError, EntityKind, HistoryEntry, Topic, UserProfile,
};
use lenta_decode::{decode_page, Intermediate, Page};
use tracing::debug;

/// Assembler for one entity kind, used to pick the pipeline of
/// [`assemble_page`].
pub trait Assembler {
    type Output;
    const KIND: EntityKind;

    fn assemble(item: Intermediate) -> Result<Self::Output, EntityError>;
}

fn wrong_kind(kind: EntityKind) -> EntityError {
    DecodeError::UnsupportedPayload { kind }.into()
}

macro_rules! assembler {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $out:ty, $variant:ident => $f:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl Assembler for $name {
            type Output = $out;
            const KIND: EntityKind = EntityKind::$kind;

            fn assemble(item: Intermediate) -> Result<$out, EntityError> {
                match item {
                    Intermediate::$variant(r) => Ok($f(r)?),
                    _ => Err(wrong_kind(Self::KIND)),
                }
            }
        }
    };
}

assembler!(
    /// News list items.
    Articles, Article, Article, Article => assemble_article
);
assembler!(Topics, Topic, Topic, Topic => assemble_topic);
assembler!(
    /// Article comments.
    Comments, Comment, Comment, Comment => assemble_comment
);
assembler!(
    /// Forum posts, rendered to plain-text comments.
    Posts, Post, Comment, Post => assemble_post
);
assembler!(Users, User, UserProfile, User => assemble_user);
assembler!(Visits, History, HistoryEntry, History => assemble_history_entry);

/// Assemble an already decoded page.
pub fn assemble_decoded<A: Assembler>(page: Page) -> Batch<A::Output> {
    let mut batch = Batch { total: page.total, ..Batch::default() };
    for (position, item) in page.items.into_iter().enumerate() {
        match item.map_err(EntityError::from).and_then(A::assemble) {
            Ok(v) => batch.succeeded.push(v),
            Err(error) => {
                debug!(kind = %A::KIND, position, %error, "entity dropped from page");
                batch.failed.push(BatchFailure { position, error });
            }
        }
    }
    batch
}

/// Decode and assemble a list response body.
pub fn assemble_page<A: Assembler>(bytes: &[u8]) -> Result<Batch<A::Output>, DecodeError> {
    let page = decode_page(A::KIND, bytes)?;
    Ok(assemble_decoded::<A>(page))
}
