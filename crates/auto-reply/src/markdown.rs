//! Markdown normalization between channel dialects and the canonical subset
//! the agent sees (`**bold**`, `*italic*`, `~~strike~~`, `[label](url)`).
//!
//! Code fences and inline code spans are never rewritten.

use std::sync::LazyLock;

use {
    regex::Regex,
    rgbot_common::types::ChannelType,
    rgbot_config::TableMode,
};

/// `\r\n` and lone `\r` become `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Convert a channel's inbound markdown dialect to canonical markdown.
pub fn normalize_dialect(channel: ChannelType, text: &str) -> String {
    match channel {
        ChannelType::Slack => map_outside_code(text, slack_to_markdown),
        ChannelType::WhatsApp => map_outside_code(text, whatsapp_to_markdown),
        _ => text.to_string(),
    }
}

/// Default outbound table rendering for a channel. Signal and WhatsApp have
/// no monospace blocks worth relying on, so tables become bullets there.
pub fn default_table_mode(channel: ChannelType) -> TableMode {
    match channel {
        ChannelType::Signal | ChannelType::WhatsApp => TableMode::Bullets,
        _ => TableMode::Code,
    }
}

// ── Code-aware mapping ───────────────────────────────────────────────────

/// Apply `f` to every stretch of `text` outside fences and inline code.
fn map_outside_code(text: &str, f: fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    for (is_code, block) in split_fenced_blocks(text) {
        if is_code {
            out.push_str(block);
            continue;
        }
        for (is_span, part) in split_inline_code(block) {
            if is_span {
                out.push_str(part);
            } else {
                out.push_str(&f(part));
            }
        }
    }
    out
}

/// The fence marker (```` ``` ```` or `~~~`, possibly longer) opening a line.
pub(crate) fn fence_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let first = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == first).count();
    (len >= 3).then(|| &trimmed[..len])
}

/// Whether `line` closes a fence opened with `marker`.
pub(crate) fn closes_fence(line: &str, marker: &str) -> bool {
    fence_marker(line).is_some_and(|m| {
        m.starts_with(&marker[..1]) && m.len() >= marker.len() && line.trim() == m
    })
}

/// Split into alternating prose and fenced-code blocks. Blocks are exact
/// slices, so concatenating them reproduces `text`. An unclosed fence runs to
/// the end.
fn split_fenced_blocks(text: &str) -> Vec<(bool, &str)> {
    let mut blocks = Vec::new();
    let mut block_start = 0;
    let mut open: Option<&str> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        match open {
            None => {
                if let Some(marker) = fence_marker(line) {
                    if line_start > block_start {
                        blocks.push((false, &text[block_start..line_start]));
                    }
                    block_start = line_start;
                    open = Some(marker);
                }
            },
            Some(marker) => {
                if closes_fence(line.trim_end_matches('\n'), marker) {
                    blocks.push((true, &text[block_start..offset]));
                    block_start = offset;
                    open = None;
                }
            },
        }
    }
    if block_start < text.len() {
        blocks.push((open.is_some(), &text[block_start..]));
    }
    blocks
}

/// Split prose into plain text and `inline code` spans (exact slices). An
/// unmatched backtick run is plain text.
fn split_inline_code(text: &str) -> Vec<(bool, &str)> {
    let mut parts = Vec::new();
    let bytes = text.as_bytes();
    let mut plain_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = bytes[i..].iter().take_while(|b| **b == b'`').count();
        let delim = &text[i..i + run];
        match text[i + run..].find(delim) {
            Some(rel) => {
                let end = i + run + rel + run;
                if i > plain_start {
                    parts.push((false, &text[plain_start..i]));
                }
                parts.push((true, &text[i..end]));
                plain_start = end;
                i = end;
            },
            None => i += run,
        }
    }
    if plain_start < text.len() {
        parts.push((false, &text[plain_start..]));
    }
    parts
}

// ── Dialects ─────────────────────────────────────────────────────────────

static SLACK_LABELED_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<((?:https?|mailto):[^<>|\s]+)\|([^<>]+)>").ok());
static SLACK_BARE_LINK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<((?:https?|mailto):[^<>|\s]+)>").ok());
static SLACK_USER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<@([A-Za-z0-9]+)(?:\|[^<>]*)?>").ok());
static SLACK_CHANNEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<#[A-Za-z0-9]+\|([^<>]+)>").ok());
static SLACK_SPECIAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<!(here|channel|everyone)(?:\|[^<>]*)?>").ok());

fn replace(re: &LazyLock<Option<Regex>>, text: String, rep: &str) -> String {
    match re.as_ref() {
        Some(re) => re.replace_all(&text, rep).into_owned(),
        None => text,
    }
}

fn slack_to_markdown(text: &str) -> String {
    let text = replace(&SLACK_LABELED_LINK, text.to_string(), "[$2]($1)");
    let text = replace(&SLACK_BARE_LINK, text, "$1");
    let text = replace(&SLACK_USER, text, "@$1");
    let text = replace(&SLACK_CHANNEL, text, "#$1");
    let text = replace(&SLACK_SPECIAL, text, "@$1");
    let text = text.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&");
    // Bold first: italics produce `*` which must not be re-read as bold.
    let text = convert_delimited(&text, '*', "**");
    let text = convert_delimited(&text, '_', "*");
    convert_delimited(&text, '~', "~~")
}

fn whatsapp_to_markdown(text: &str) -> String {
    let text = convert_delimited(text, '*', "**");
    let text = convert_delimited(&text, '_', "*");
    convert_delimited(&text, '~', "~~")
}

/// Rewrite single-character emphasis (`*x*`) to `to` (`**x**`).
///
/// An opener follows start/whitespace/punctuation and precedes a non-space;
/// a closer on the same line follows a non-space and precedes
/// end/whitespace/punctuation. Doubled delimiters (`**x**`) are left alone.
fn convert_delimited(text: &str, delim: char, to: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_word = |c: char| c.is_alphanumeric();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let opens = c == delim
            && prev.is_none_or(|p| !is_word(p) && p != delim)
            && next.is_some_and(|n| !n.is_whitespace() && n != delim);
        if opens {
            let close = (i + 1..chars.len())
                .take_while(|j| chars[*j] != '\n')
                .find(|&j| {
                    chars[j] == delim
                        && !chars[j - 1].is_whitespace()
                        && chars.get(j + 1).is_none_or(|n| !is_word(*n) && *n != delim)
                });
            if let Some(j) = close {
                out.push_str(to);
                out.extend(&chars[i + 1..j]);
                out.push_str(to);
                i = j + 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

// ── Tables ───────────────────────────────────────────────────────────────

enum Segment<'a> {
    Text(Vec<&'a str>),
    Table(Vec<&'a str>),
}

/// Render markdown tables for channels that cannot display them. Tables inside
/// code fences are left alone.
pub fn convert_markdown_tables(text: &str, mode: TableMode) -> String {
    if mode == TableMode::Off || !text.contains('|') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for (is_code, block) in split_fenced_blocks(text) {
        if is_code {
            out.push_str(block);
        } else {
            out.push_str(&convert_block_tables(block, mode));
        }
    }
    out
}

fn convert_block_tables(block: &str, mode: TableMode) -> String {
    let trailing_newline = block.ends_with('\n');
    let body = block.strip_suffix('\n').unwrap_or(block);
    let rendered: Vec<String> = split_table_segments(body)
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(lines) => lines.join("\n"),
            Segment::Table(lines) => match mode {
                TableMode::Bullets => render_table_bullets(&table_rows(&lines)),
                TableMode::Code => render_table_code(&table_rows(&lines)),
                TableMode::Off => lines.join("\n"),
            },
        })
        .collect();
    let mut out = rendered.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

/// Split lines into alternating text and table segments. A table needs a
/// header row followed by a separator row.
fn split_table_segments(md: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut text_lines: Vec<&str> = Vec::new();
    let mut table_lines: Vec<&str> = Vec::new();

    for line in md.split('\n') {
        if is_table_line(line.trim()) {
            table_lines.push(line);
        } else {
            flush_table_block(&mut segments, &mut text_lines, &mut table_lines);
            text_lines.push(line);
        }
    }
    flush_table_block(&mut segments, &mut text_lines, &mut table_lines);
    if !text_lines.is_empty() {
        segments.push(Segment::Text(text_lines));
    }
    segments
}

fn flush_table_block<'a>(
    segments: &mut Vec<Segment<'a>>,
    text_lines: &mut Vec<&'a str>,
    table_lines: &mut Vec<&'a str>,
) {
    if table_lines.is_empty() {
        return;
    }
    if table_lines.len() >= 2 && is_separator_row(table_lines[1]) {
        if !text_lines.is_empty() {
            segments.push(Segment::Text(std::mem::take(text_lines)));
        }
        segments.push(Segment::Table(std::mem::take(table_lines)));
    } else {
        text_lines.append(table_lines);
    }
}

fn is_table_line(trimmed: &str) -> bool {
    if trimmed.len() <= 1 {
        return false;
    }
    // `use the | operator` has one pipe and is prose.
    trimmed.starts_with('|') || trimmed.chars().filter(|&c| c == '|').count() >= 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    !inner.is_empty()
        && inner.split('|').all(|cell| {
            let c = cell.trim();
            !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':')
        })
}

fn parse_table_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_owned()).collect()
}

/// Header plus data rows, separator dropped.
fn table_rows(lines: &[&str]) -> Vec<Vec<String>> {
    lines
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, line)| parse_table_cells(line))
        .collect()
}

/// Aligned monospace table inside a code fence.
fn render_table_code(rows: &[Vec<String>]) -> String {
    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; col_count];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::from("```\n");
    for (row_idx, row) in rows.iter().enumerate() {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(col, &w)| {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                format!("{cell:<w$}")
            })
            .collect();
        out.push_str(cells.join(" | ").trim_end());
        out.push('\n');
        if row_idx == 0 && rows.len() > 1 {
            let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
            out.push_str(&rule.join("-+-"));
            out.push('\n');
        }
    }
    out.push_str("```");
    out
}

/// One bullet block per data row: the first cell as a bold title, the rest
/// as `Header: value` bullets. Empty cells are skipped.
fn render_table_bullets(rows: &[Vec<String>]) -> String {
    let Some((headers, data)) = rows.split_first() else {
        return String::new();
    };
    if data.is_empty() {
        return headers.join(" · ");
    }
    let blocks: Vec<String> = data
        .iter()
        .map(|row| {
            let mut lines = Vec::new();
            if let Some(title) = row.first().filter(|t| !t.is_empty()) {
                lines.push(format!("**{title}**"));
            }
            for (col, cell) in row.iter().enumerate().skip(1) {
                if cell.is_empty() {
                    continue;
                }
                match headers.get(col).filter(|h| !h.is_empty()) {
                    Some(header) => lines.push(format!("• {header}: {cell}")),
                    None => lines.push(format!("• {cell}")),
                }
            }
            lines.join("\n")
        })
        .collect();
    blocks.join("\n\n")
}
