//! Structured rich text produced by the best-effort HTML decoder.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type Runs = SmallVec<[Run; 4]>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub code: bool,
}

impl TextStyle {
    pub fn is_plain(&self) -> bool {
        *self == TextStyle::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Run {
    Text { text: String, style: TextStyle },
    Link { href: String, text: String },
    Image { src: String, alt: Option<String> },
    Embed { src: String },
    LineBreak,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Block {
    Paragraph(Runs),
    Heading { level: u8, runs: Runs },
    Quote(Vec<Block>),
    ListItem { ordered: bool, runs: Runs },
    Code(String),
    Rule,
}

/// Something the decoder could not represent faithfully. Content degrades,
/// the document is still produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentIssue {
    UnknownTag(String),
    UnbalancedClose(String),
    DepthExceeded,
    Truncated,
    InvalidUtf8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HtmlDocument {
    pub blocks: Vec<Block>,
    pub issues: Vec<DocumentIssue>,
}

impl HtmlDocument {
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Flatten to plain text: blocks separated by newlines, links by their
    /// text, images and embeds omitted.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for b in &self.blocks {
            push_block_text(b, &mut out);
        }
        while out.ends_with('\n') {
            out.pop();
        }
        out
    }
}

fn push_runs_text(runs: &[Run], out: &mut String) {
    for r in runs {
        match r {
            Run::Text { text, .. } | Run::Link { text, .. } => out.push_str(text),
            Run::LineBreak => out.push('\n'),
            Run::Image { .. } | Run::Embed { .. } => {}
        }
    }
}

fn push_block_text(b: &Block, out: &mut String) {
    match b {
        Block::Paragraph(runs) | Block::Heading { runs, .. } | Block::ListItem { runs, .. } => {
            push_runs_text(runs, out);
            out.push('\n');
        }
        Block::Quote(inner) => {
            for b in inner {
                push_block_text(b, out);
            }
        }
        Block::Code(code) => {
            out.push_str(code);
            out.push('\n');
        }
        Block::Rule => {}
    }
}
