//! Lenta core types: the domain model handed to consumers, the entity kinds the
//! decoder knows about, and the error taxonomy shared by every stage.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod content;
pub mod model;

pub use content::{Block, DocumentIssue, HtmlDocument, Run, Runs, TextStyle};
pub use model::*;

pub mod prelude {
    pub use super::{
        Article, AssemblyError, Batch, BatchFailure, Comment, CommentId, DecodeError, EntityError,
        EntityKind, HistoryBucket, HistoryEntry, Topic, TopicId, UserId, UserProfile,
    };
}

/// Upstream entity kinds. Each kind owns exactly one positional layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Topic,
    Post,
    Comment,
    User,
    Article,
    History,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Topic => "topic",
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
            EntityKind::User => "user",
            EntityKind::Article => "article",
            EntityKind::History => "history",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type a positional slot is expected to hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldType {
    /// Non-negative JSON integer.
    Int,
    SignedInt,
    Str,
    /// Non-negative integer bitfield.
    Flags,
    List,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldType::Int => "unsigned integer",
            FieldType::SignedInt => "integer",
            FieldType::Str => "string",
            FieldType::Flags => "flags",
            FieldType::List => "list",
        };
        f.write_str(s)
    }
}

/// Failures of the raw payload decoder. Always surfaced, never defaulted.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{kind}: index {index} ({field}) missing or not of type {expected}")]
    SchemaMismatch {
        kind: EntityKind,
        index: usize,
        field: &'static str,
        expected: FieldType,
    },
    #[error("{kind}: payload is not a positional record")]
    NotARecord { kind: EntityKind },
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("upstream returned status {code}")]
    UpstreamStatus { code: u64 },
    #[error("{kind}: payload type not supported")]
    UnsupportedPayload { kind: EntityKind },
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

impl DecodeError {
    /// Index of the offending slot, for schema mismatches.
    pub fn index(&self) -> Option<usize> {
        match self {
            DecodeError::SchemaMismatch { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Cross-field invariant violations found while assembling a decoded record.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("{kind} {id}: inconsistent record: {reason}")]
    Inconsistent {
        kind: EntityKind,
        id: String,
        reason: String,
    },
}

/// Why a single entity of a batch was dropped.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EntityError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the item in the upstream list.
    pub position: usize,
    pub error: EntityError,
}

/// Per-entity outcome of a page: one bad record never discards the rest.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    /// Total reported by the upstream envelope (across all pages).
    pub total: u64,
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self { total: 0, succeeded: Vec::new(), failed: Vec::new() }
    }
}

impl<T> Batch<T> {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(Vec<T>) -> U) -> (U, Vec<BatchFailure>) {
        (f(self.succeeded), self.failed)
    }
}
