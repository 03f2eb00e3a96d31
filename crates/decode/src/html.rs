//! Best-effort HTML decoding for article bodies and rich post text.
//!
//! The walk is bounded (depth and token count) and allow-listed. Anything it
//! does not understand degrades to its text content and is recorded as a
//! [`DocumentIssue`]; decoding itself never fails.

use std::borrow::Cow;

use lenta_core::{Block, DecodeError, DocumentIssue, HtmlDocument, Run, Runs, TextStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub const MAX_DEPTH: usize = 32;
pub const MAX_TOKENS: usize = 20_000;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("valid tag pattern")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid attribute pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    P,
    Div,
    Br,
    A,
    Img,
    Iframe,
    Video,
    Source,
    Bold,
    Italic,
    Underline,
    Strike,
    Quote,
    Ul,
    Ol,
    Li,
    H(u8),
    Span,
    Code,
    Pre,
    Figure,
    Figcaption,
    Hr,
    Script,
    Style,
}

fn classify(name: &str) -> Option<Tag> {
    let tag = match name {
        "p" => Tag::P,
        "div" => Tag::Div,
        "br" => Tag::Br,
        "a" => Tag::A,
        "img" => Tag::Img,
        "iframe" => Tag::Iframe,
        "video" => Tag::Video,
        "source" => Tag::Source,
        "b" | "strong" => Tag::Bold,
        "i" | "em" => Tag::Italic,
        "u" => Tag::Underline,
        "s" | "del" | "strike" => Tag::Strike,
        "blockquote" => Tag::Quote,
        "ul" => Tag::Ul,
        "ol" => Tag::Ol,
        "li" => Tag::Li,
        "h1" => Tag::H(1),
        "h2" => Tag::H(2),
        "h3" => Tag::H(3),
        "h4" => Tag::H(4),
        "h5" => Tag::H(5),
        "h6" => Tag::H(6),
        "span" => Tag::Span,
        "code" => Tag::Code,
        "pre" => Tag::Pre,
        "figure" => Tag::Figure,
        "figcaption" => Tag::Figcaption,
        "hr" => Tag::Hr,
        "script" => Tag::Script,
        "style" => Tag::Style,
        _ => return None,
    };
    Some(tag)
}

fn is_void(tag: Tag) -> bool {
    matches!(tag, Tag::Br | Tag::Img | Tag::Source | Tag::Hr)
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Paragraph,
    Heading(u8),
    ListItem(bool),
}

#[derive(Debug, Default)]
struct StyleDepth {
    bold: u32,
    italic: u32,
    underline: u32,
    strike: u32,
    code: u32,
}

impl StyleDepth {
    fn current(&self) -> TextStyle {
        TextStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            underline: self.underline > 0,
            strike: self.strike > 0,
            code: self.code > 0,
        }
    }

    fn counter(&mut self, tag: Tag) -> Option<&mut u32> {
        match tag {
            Tag::Bold => Some(&mut self.bold),
            Tag::Italic => Some(&mut self.italic),
            Tag::Underline => Some(&mut self.underline),
            Tag::Strike => Some(&mut self.strike),
            Tag::Code => Some(&mut self.code),
            _ => None,
        }
    }
}

struct Walker {
    root: Vec<Block>,
    quotes: Vec<Vec<Block>>,
    runs: Runs,
    pending: Pending,
    style: StyleDepth,
    link: Option<(String, String)>,
    lists: Vec<bool>,
    pre: u32,
    code: String,
    skip: u32,
    open: Vec<Tag>,
    issues: Vec<DocumentIssue>,
}

impl Walker {
    fn new() -> Self {
        Self {
            root: Vec::new(),
            quotes: Vec::new(),
            runs: Runs::new(),
            pending: Pending::Paragraph,
            style: StyleDepth::default(),
            link: None,
            lists: Vec::new(),
            pre: 0,
            code: String::new(),
            skip: 0,
            open: Vec::new(),
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, issue: DocumentIssue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }

    fn at_line_start(&self) -> bool {
        match &self.link {
            Some((_, text)) => text.is_empty() && self.runs.is_empty(),
            None => matches!(self.runs.last(), None | Some(Run::LineBreak)),
        }
    }

    fn text(&mut self, raw: &str) {
        if self.skip > 0 {
            return;
        }
        let decoded = decode_entities(raw);
        if self.pre > 0 {
            self.code.push_str(&decoded);
            return;
        }
        let collapsed = collapse_ws(&decoded);
        let text = if self.at_line_start() { collapsed.trim_start() } else { collapsed.as_str() };
        if text.is_empty() {
            return;
        }
        if let Some((_, link_text)) = &mut self.link {
            if !(link_text.ends_with(' ') && text.starts_with(' ')) {
                link_text.push_str(text);
            } else {
                link_text.push_str(&text[1..]);
            }
            return;
        }
        self.push_text(text);
    }

    fn push_text(&mut self, text: &str) {
        let style = self.style.current();
        let prev_space = matches!(self.runs.last(), Some(Run::Text { text, .. }) if text.ends_with(' '));
        let text = if prev_space { text.trim_start() } else { text };
        if text.is_empty() {
            return;
        }
        if let Some(Run::Text { text: last, style: last_style }) = self.runs.last_mut() {
            if *last_style == style {
                last.push_str(text);
                return;
            }
        }
        self.runs.push(Run::Text { text: text.to_string(), style });
    }

    fn push_block(&mut self, block: Block) {
        match self.quotes.last_mut() {
            Some(inner) => inner.push(block),
            None => self.root.push(block),
        }
    }

    fn finish_link(&mut self) {
        if let Some((href, text)) = self.link.take() {
            let text = text.trim();
            let text = if text.is_empty() { href.clone() } else { text.to_string() };
            self.runs.push(Run::Link { href, text });
        }
    }

    fn flush(&mut self) {
        self.finish_link();
        while matches!(self.runs.last(), Some(Run::LineBreak)) {
            self.runs.pop();
        }
        if let Some(Run::Text { text, .. }) = self.runs.last_mut() {
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
            if text.is_empty() {
                self.runs.pop();
            }
        }
        // An empty flush keeps the pending kind: `<li><p>x</p></li>` is a list item.
        if self.runs.is_empty() {
            return;
        }
        let pending = std::mem::replace(&mut self.pending, Pending::Paragraph);
        let runs = std::mem::take(&mut self.runs);
        let block = match pending {
            Pending::Paragraph => Block::Paragraph(runs),
            Pending::Heading(level) => Block::Heading { level, runs },
            Pending::ListItem(ordered) => Block::ListItem { ordered, runs },
        };
        self.push_block(block);
    }

    /// Flush and forget any pending heading or list item.
    fn close_block(&mut self) {
        self.flush();
        self.pending = Pending::Paragraph;
    }

    fn open(&mut self, tag: Tag, attrs: &str) {
        if !is_void(tag) && self.open.len() >= MAX_DEPTH {
            self.issue(DocumentIssue::DepthExceeded);
            return;
        }
        match tag {
            Tag::Script | Tag::Style => self.skip += 1,
            Tag::P | Tag::Div | Tag::Figure | Tag::Figcaption => self.flush(),
            Tag::Br => {
                if self.pre > 0 {
                    self.code.push('\n');
                } else {
                    self.finish_link();
                    self.runs.push(Run::LineBreak);
                }
            }
            Tag::Hr => {
                self.close_block();
                self.push_block(Block::Rule);
            }
            Tag::H(level) => {
                self.flush();
                self.pending = Pending::Heading(level);
            }
            Tag::Quote => {
                self.close_block();
                self.quotes.push(Vec::new());
            }
            Tag::Ul | Tag::Ol => {
                self.close_block();
                self.lists.push(tag == Tag::Ol);
            }
            Tag::Li => {
                self.flush();
                self.pending = Pending::ListItem(self.lists.last().copied().unwrap_or(false));
            }
            Tag::Code if self.pre > 0 => {}
            Tag::Bold | Tag::Italic | Tag::Underline | Tag::Strike | Tag::Code => {
                if let Some(n) = self.style.counter(tag) {
                    *n += 1;
                }
            }
            Tag::Span => {}
            Tag::A => {
                self.finish_link();
                if let Some(href) = attr(attrs, "href") {
                    self.link = Some((href, String::new()));
                }
            }
            Tag::Img => {
                if let Some(src) = attr(attrs, "src") {
                    self.runs.push(Run::Image { src, alt: attr(attrs, "alt") });
                }
            }
            Tag::Iframe | Tag::Video => {
                if let Some(src) = attr(attrs, "src") {
                    self.runs.push(Run::Embed { src });
                }
            }
            Tag::Source => {
                if self.open.contains(&Tag::Video) {
                    if let Some(src) = attr(attrs, "src") {
                        self.runs.push(Run::Embed { src });
                    }
                }
            }
            Tag::Pre => {
                self.close_block();
                self.pre += 1;
            }
        }
        if !is_void(tag) {
            self.open.push(tag);
        }
    }

    fn close(&mut self, tag: Tag, name: &str) {
        if is_void(tag) {
            return;
        }
        match self.open.iter().rposition(|t| *t == tag) {
            Some(pos) => {
                while self.open.len() > pos {
                    if let Some(t) = self.open.pop() {
                        self.end(t);
                    }
                }
            }
            None => self.issue(DocumentIssue::UnbalancedClose(name.to_string())),
        }
    }

    fn end(&mut self, tag: Tag) {
        match tag {
            Tag::Script | Tag::Style => self.skip = self.skip.saturating_sub(1),
            Tag::P | Tag::Div | Tag::Figure | Tag::Figcaption => self.flush(),
            Tag::H(_) | Tag::Li => self.close_block(),
            Tag::Quote => {
                self.close_block();
                if let Some(inner) = self.quotes.pop() {
                    if !inner.is_empty() {
                        self.push_block(Block::Quote(inner));
                    }
                }
            }
            Tag::Ul | Tag::Ol => {
                self.close_block();
                self.lists.pop();
            }
            Tag::Code if self.pre > 0 => {}
            Tag::Bold | Tag::Italic | Tag::Underline | Tag::Strike | Tag::Code => {
                if let Some(n) = self.style.counter(tag) {
                    *n = n.saturating_sub(1);
                }
            }
            Tag::A => self.finish_link(),
            Tag::Pre => {
                self.pre = self.pre.saturating_sub(1);
                if self.pre == 0 {
                    let code = std::mem::take(&mut self.code);
                    let code = code.trim_matches('\n');
                    if !code.trim().is_empty() {
                        self.push_block(Block::Code(code.to_string()));
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(mut self) -> HtmlDocument {
        while let Some(t) = self.open.pop() {
            self.end(t);
        }
        self.flush();
        while let Some(inner) = self.quotes.pop() {
            if !inner.is_empty() {
                self.push_block(Block::Quote(inner));
            }
        }
        HtmlDocument { blocks: self.root, issues: self.issues }
    }
}

fn attr(attrs: &str, name: &str) -> Option<String> {
    for caps in ATTR_RE.captures_iter(attrs) {
        let key = caps.get(1)?;
        if !key.as_str().eq_ignore_ascii_case(name) {
            continue;
        }
        let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
        let value = decode_entities(value.as_str().trim());
        return if value.is_empty() { None } else { Some(value.into_owned()) };
    }
    None
}

fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "laquo" => '«',
        "raquo" => '»',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "copy" => '©',
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            return char::from_u32(code);
        }
    };
    Some(c)
}

/// Decode character references. Unknown references are kept verbatim.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        let tail = &rest[i + 1..];
        if let Some(j) = tail.find(';').filter(|j| *j > 0 && *j <= 10) {
            if let Some(c) = named_entity(&tail[..j]) {
                out.push(c);
                rest = &tail[j + 1..];
                continue;
            }
        }
        out.push('&');
        rest = tail;
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode an HTML fragment. Never fails; see [`HtmlDocument::issues`].
pub fn decode_html(input: &str) -> HtmlDocument {
    let mut w = Walker::new();
    let mut pos = 0usize;
    let mut tokens = 0usize;
    for caps in TAG_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > pos {
            w.text(&input[pos..whole.start()]);
            tokens += 1;
        }
        tokens += 1;
        if tokens > MAX_TOKENS {
            w.issue(DocumentIssue::Truncated);
            let rest = TAG_RE.replace_all(&input[whole.start()..], " ");
            w.skip = 0;
            w.pre = 0;
            w.text(&rest);
            pos = input.len();
            break;
        }
        pos = whole.end();
        let Some(name) = caps.get(2) else { continue };
        let closing = caps.get(1).map_or(false, |m| !m.as_str().is_empty());
        let attrs = caps.get(3).map_or("", |m| m.as_str());
        let lname = name.as_str().to_ascii_lowercase();
        match classify(&lname) {
            Some(tag) if closing => w.close(tag, &lname),
            Some(tag) => {
                w.open(tag, attrs);
                if attrs.trim_end().ends_with('/') && !is_void(tag) {
                    w.close(tag, &lname);
                }
            }
            None if closing => {}
            None => w.issue(DocumentIssue::UnknownTag(lname)),
        }
    }
    if pos < input.len() {
        w.text(&input[pos..]);
    }
    let doc = w.finish();
    if doc.is_degraded() {
        debug!(issues = doc.issues.len(), blocks = doc.blocks.len(), "html decoded with issues");
    }
    doc
}

/// Decode a raw HTML payload. Invalid UTF-8 is decoded lossily and reported;
/// a payload containing NUL bytes is binary and not a document at all.
pub fn decode_html_bytes(bytes: &[u8]) -> Result<HtmlDocument, DecodeError> {
    if bytes.contains(&0) {
        return Err(DecodeError::MalformedDocument("binary payload".to_string()));
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(decode_html(s)),
        Err(_) => {
            let s = String::from_utf8_lossy(bytes);
            let mut doc = decode_html(&s);
            doc.issues.insert(0, DocumentIssue::InvalidUtf8);
            Ok(doc)
        }
    }
}
