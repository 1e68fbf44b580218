//! Split outbound replies under a channel's length limit.
//!
//! Limits count Unicode scalar values. Splits land on whitespace and never
//! inside a mention token. A code fence is only split when a single block is
//! longer than the limit; the chunk is then closed with the fence marker and
//! the next chunk reopens it with the original opener line. Those added lines
//! and the whitespace dropped at each split are recorded on the chunk, so
//! [`reassemble`] reproduces the input exactly.

use {
    rgbot_common::types::ChannelType,
    rgbot_config::{ChannelConfig, ChunkMode, TableMode},
};

use crate::markdown::{closes_fence, default_table_mode, fence_marker};

/// One outbound message of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyChunk {
    /// Text to send, including any fence lines added at the split.
    pub text: String,
    pub is_last: bool,
    /// Whitespace dropped between the previous chunk and this one.
    pub delimiter: String,
    /// Fence opener added at the start (`"```rust\n"`).
    pub reopened_fence: Option<String>,
    /// Fence closer added at the end (`"\n```"`).
    pub closed_fence: Option<String>,
}

impl ReplyChunk {
    /// The part of `text` that came from the reply itself.
    pub fn body(&self) -> &str {
        let text = self.text.as_str();
        let text = self
            .reopened_fence
            .as_deref()
            .and_then(|f| text.strip_prefix(f))
            .unwrap_or(text);
        self.closed_fence
            .as_deref()
            .and_then(|f| text.strip_suffix(f))
            .unwrap_or(text)
    }
}

/// Concatenate chunks back into the original reply, dropping fence artifacts
/// and restoring split whitespace.
pub fn reassemble(chunks: &[ReplyChunk]) -> String {
    chunks
        .iter()
        .flat_map(|c| [c.delimiter.as_str(), c.body()])
        .collect()
}

pub fn default_text_chunk_limit(channel: ChannelType) -> usize {
    match channel {
        ChannelType::Discord => 2000,
        ChannelType::Telegram => 4096,
        ChannelType::Line => 5000,
        ChannelType::Slack
        | ChannelType::WhatsApp
        | ChannelType::Signal
        | ChannelType::IMessage => 4000,
    }
}

/// Account override → channel setting → platform default. Zero counts as unset.
pub fn resolve_text_chunk_limit(
    channel: ChannelType,
    config: Option<&ChannelConfig>,
    account_id: &str,
) -> usize {
    config
        .and_then(|c| c.text_chunk_limit_for(account_id))
        .filter(|limit| *limit > 0)
        .unwrap_or_else(|| default_text_chunk_limit(channel))
}

pub fn resolve_chunk_mode(config: Option<&ChannelConfig>, account_id: &str) -> ChunkMode {
    config
        .and_then(|c| c.chunk_mode_for(account_id))
        .unwrap_or_default()
}

pub fn resolve_table_mode(
    channel: ChannelType,
    config: Option<&ChannelConfig>,
    account_id: &str,
) -> TableMode {
    config
        .and_then(|c| c.markdown_tables_for(account_id))
        .unwrap_or_else(|| default_table_mode(channel))
}

// ── Fence map ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Fence {
    open_start: usize,
    /// First byte after the opener line's `\n`.
    open_end: usize,
    /// Start of the closer line, or the text length when unclosed.
    close_start: usize,
    /// End of the closer line, excluding its `\n`.
    close_end: usize,
    closed: bool,
    opener: String,
    marker: String,
}

fn find_fences(text: &str) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut open: Option<(usize, usize, String, String)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let bare = line.trim_end_matches('\n');
        match &open {
            None => {
                if let Some(marker) = fence_marker(bare) {
                    open = Some((
                        line_start,
                        offset,
                        bare.trim_start().to_string(),
                        marker.to_string(),
                    ));
                }
            },
            Some((_, _, _, marker)) => {
                if closes_fence(bare, marker)
                    && let Some((open_start, open_end, opener, marker)) = open.take()
                {
                    fences.push(Fence {
                        open_start,
                        open_end,
                        close_start: line_start,
                        close_end: line_start + bare.len(),
                        closed: true,
                        opener,
                        marker,
                    });
                }
            },
        }
    }
    if let Some((open_start, open_end, opener, marker)) = open {
        fences.push(Fence {
            open_start,
            open_end,
            close_start: text.len(),
            close_end: text.len(),
            closed: false,
            opener,
            marker,
        });
    }
    fences
}

enum Region<'a> {
    Outside,
    /// Inside a fence's code; splitting here needs close + reopen.
    Body(&'a Fence),
    /// On a fence opener/closer line (or the newline right before a closer).
    Marker,
}

fn region_at(fences: &[Fence], pos: usize) -> Region<'_> {
    for fence in fences {
        if pos >= fence.open_start && pos < fence.open_end {
            return Region::Marker;
        }
        if fence.closed && pos + 1 >= fence.close_start && pos < fence.close_end {
            return Region::Marker;
        }
        if pos >= fence.open_end && pos < fence.close_start {
            return Region::Body(fence);
        }
    }
    Region::Outside
}

// ── Splitting ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tier {
    ParagraphOutside,
    NewlineOutside,
    SpaceOutside,
    /// Any whitespace outside a fence.
    BreakOutside,
    NewlineInFence,
    SpaceInFence,
}

fn tiers(mode: ChunkMode) -> &'static [Tier] {
    match mode {
        ChunkMode::Plain => &[Tier::BreakOutside, Tier::NewlineInFence, Tier::SpaceInFence],
        ChunkMode::Newline => &[
            Tier::NewlineOutside,
            Tier::SpaceOutside,
            Tier::NewlineInFence,
            Tier::SpaceInFence,
        ],
        ChunkMode::Markdown => &[
            Tier::ParagraphOutside,
            Tier::NewlineOutside,
            Tier::SpaceOutside,
            Tier::NewlineInFence,
            Tier::SpaceInFence,
        ],
    }
}

/// A split point: the chunk ends at `at`, the next one starts at `resume`.
struct Split<'a> {
    at: usize,
    resume: usize,
    fence: Option<&'a Fence>,
}

/// Whitespace split candidates starting in `text[from..to]` as
/// `(start, run_end)`. A run of the same kind is one candidate.
fn candidates(text: &str, from: usize, to: usize, newline: bool) -> Vec<(usize, usize)> {
    let is_kind = |c: char| if newline { c == '\n' } else { c == ' ' || c == '\t' };
    let mut out = Vec::new();
    let mut iter = text[from..].char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        let start = from + i;
        if start >= to {
            break;
        }
        if !is_kind(c) {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(j, d)) = iter.peek() {
            if !is_kind(d) {
                break;
            }
            end = from + j + d.len_utf8();
            iter.next();
        }
        out.push((start, end));
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset `n` chars into `text[from..]`, clamped to the end.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map_or(text.len(), |(i, _)| from + i)
}

fn find_split<'a>(
    text: &str,
    pos: usize,
    budget: usize,
    mode: ChunkMode,
    fences: &'a [Fence],
) -> Split<'a> {
    let window_end = advance_chars(text, pos, budget);
    // A split at `window_end` itself keeps the head within budget.
    let scan_end = (window_end + 1).min(text.len());

    for tier in tiers(mode) {
        let (newline, inside) = match tier {
            Tier::ParagraphOutside | Tier::NewlineOutside => (Some(true), false),
            Tier::SpaceOutside => (Some(false), false),
            Tier::BreakOutside => (None, false),
            Tier::NewlineInFence => (Some(true), true),
            Tier::SpaceInFence => (Some(false), true),
        };
        let mut found = match newline {
            Some(newline) => candidates(text, pos, scan_end, newline),
            None => {
                let mut all = candidates(text, pos, scan_end, true);
                all.extend(candidates(text, pos, scan_end, false));
                all
            },
        };
        found.sort_unstable();

        let best = found.into_iter().rev().find_map(|(start, run_end)| {
            if start <= pos {
                return None;
            }
            match region_at(fences, start) {
                Region::Outside if !inside => {
                    if *tier == Tier::ParagraphOutside && run_end - start < 2 {
                        return None;
                    }
                    (char_len(&text[pos..start]) <= budget).then_some(Split {
                        at: start,
                        resume: run_end,
                        fence: None,
                    })
                },
                Region::Body(fence) if inside => {
                    let closer = fence.marker.chars().count() + 1;
                    (char_len(&text[pos..start]) + closer <= budget).then_some(Split {
                        at: start,
                        resume: start + 1,
                        fence: Some(fence),
                    })
                },
                _ => None,
            }
        });
        if let Some(split) = best {
            return split;
        }
    }

    hard_split(text, pos, budget, window_end, fences)
}

/// No whitespace fits: cut mid-token. Inside a fence the cut leaves room for
/// the closer and stays above the closing line; elsewhere it backs off to the
/// start of a mention token it would land in.
fn hard_split<'a>(
    text: &str,
    pos: usize,
    budget: usize,
    window_end: usize,
    fences: &'a [Fence],
) -> Split<'a> {
    let in_body = [pos, window_end.saturating_sub(1)]
        .into_iter()
        .find_map(|p| match region_at(fences, p) {
            Region::Body(fence) => Some(fence),
            _ => None,
        });
    if let Some(fence) = in_body {
        let closer = fence.marker.chars().count() + 1;
        if budget > closer {
            let last_body = if fence.closed {
                fence.close_start.saturating_sub(1)
            } else {
                fence.close_start
            };
            let cut = advance_chars(text, pos, budget - closer).min(last_body);
            if cut > pos && cut >= fence.open_end {
                return Split {
                    at: cut,
                    resume: cut,
                    fence: Some(fence),
                };
            }
        }
    }

    let mut cut = window_end;
    if let Some(start) = mention_start(text, pos, cut) {
        cut = start;
    }
    if cut <= pos {
        cut = advance_chars(text, pos, budget.max(1));
    }
    Split {
        at: cut,
        resume: cut,
        fence: None,
    }
}

fn is_mention_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | ':' | '|' | '>')
}

/// Start of the mention token (`@name`, `<@id>`) that `cut` falls inside.
fn mention_start(text: &str, pos: usize, cut: usize) -> Option<usize> {
    let after = text[cut..].chars().next()?;
    if !is_mention_char(after) {
        return None;
    }
    let window = &text[pos..cut];
    let at = window.rfind('@')?;
    if !window[at + 1..].chars().all(is_mention_char) {
        return None;
    }
    let mut start = pos + at;
    if text[..start].ends_with('<') {
        start -= 1;
    }
    (start > pos).then_some(start)
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Returns exactly one chunk with `is_last` set; an empty reply yields a
/// single empty chunk.
pub fn chunk_text(text: &str, limit: usize, mode: ChunkMode) -> Vec<ReplyChunk> {
    let limit = limit.max(1);
    let fences = find_fences(text);
    let mut chunks = Vec::new();
    let mut pos = 0;
    let mut delimiter = String::new();
    let mut reopen: Option<&Fence> = None;

    loop {
        let prefix = reopen.map(|f| format!("{}\n", f.opener));
        let prefix_len = prefix.as_deref().map_or(0, char_len);
        // An opener longer than the limit cannot be carried over.
        let (prefix, prefix_len) = if prefix_len >= limit {
            (None, 0)
        } else {
            (prefix, prefix_len)
        };
        let budget = limit - prefix_len;
        let rest = &text[pos..];

        if char_len(rest) <= budget {
            chunks.push(ReplyChunk {
                text: format!("{}{rest}", prefix.as_deref().unwrap_or("")),
                is_last: true,
                delimiter,
                reopened_fence: prefix,
                closed_fence: None,
            });
            return chunks;
        }

        let split = find_split(text, pos, budget, mode, &fences);
        let head = &text[pos..split.at];
        let closer = split.fence.map(|f| format!("\n{}", f.marker));
        chunks.push(ReplyChunk {
            text: format!(
                "{}{head}{}",
                prefix.as_deref().unwrap_or(""),
                closer.as_deref().unwrap_or("")
            ),
            is_last: false,
            delimiter,
            reopened_fence: prefix,
            closed_fence: closer,
        });

        delimiter = text[split.at..split.resume].to_string();
        reopen = split.fence.filter(|f| split.resume < f.close_start);
        pos = split.resume;
        if pos >= text.len() {
            // Trailing whitespace only: fold it into a final empty chunk.
            chunks.push(ReplyChunk {
                text: String::new(),
                is_last: true,
                delimiter,
                reopened_fence: None,
                closed_fence: None,
            });
            return chunks;
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn assert_invariants(text: &str, limit: usize, chunks: &[ReplyChunk]) {
        assert_eq!(reassemble(chunks), text, "round trip");
        assert_eq!(chunks.iter().filter(|c| c.is_last).count(), 1);
        assert!(chunks.last().is_some_and(|c| c.is_last));
        for chunk in chunks {
            assert!(
                chunk.text.chars().count() <= limit,
                "chunk over limit: {:?}",
                chunk.text
            );
        }
    }

    fn texts(chunks: &[ReplyChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("hello", 10, ChunkMode::Markdown);
        assert_eq!(texts(&chunks), vec!["hello"]);
        assert!(chunks[0].is_last);
    }

    #[test]
    fn empty_text_is_one_empty_chunk() {
        let chunks = chunk_text("", 10, ChunkMode::Plain);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_last);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn markdown_prefers_paragraph_breaks() {
        let text = "first para\nstill first\n\nsecond para";
        let chunks = chunk_text(text, 30, ChunkMode::Markdown);
        assert_eq!(texts(&chunks), vec!["first para\nstill first", "second para"]);
        assert_eq!(chunks[1].delimiter, "\n\n");
        assert_invariants(text, 30, &chunks);
    }

    #[test]
    fn newline_mode_splits_on_lines() {
        let text = "line one\nline two\nline three";
        let chunks = chunk_text(text, 18, ChunkMode::Newline);
        assert_eq!(texts(&chunks), vec!["line one\nline two", "line three"]);
        assert_invariants(text, 18, &chunks);
    }

    #[test]
    fn plain_mode_splits_on_last_whitespace() {
        let text = "aaa bbb\nccc ddd";
        let chunks = chunk_text(text, 10, ChunkMode::Plain);
        assert_eq!(texts(&chunks), vec!["aaa bbb", "ccc ddd"]);
        let chunks = chunk_text("aaa bbb ccc ddd", 10, ChunkMode::Plain);
        assert_eq!(texts(&chunks), vec!["aaa bbb", "ccc ddd"]);
        assert_eq!(chunks[1].delimiter, " ");
    }

    #[test]
    fn unbroken_text_is_hard_split() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text(text, 10, ChunkMode::Markdown);
        assert_eq!(texts(&chunks), vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
        assert_invariants(text, 10, &chunks);
    }

    #[test]
    fn limits_count_characters_not_bytes() {
        let text = "ééééé ééééé";
        let chunks = chunk_text(text, 5, ChunkMode::Plain);
        assert_eq!(texts(&chunks), vec!["ééééé", "ééééé"]);
        assert_invariants(text, 5, &chunks);
    }

    #[test]
    fn fence_that_fits_is_moved_whole() {
        let text = "intro line\n```\nlet a = 1;\nlet b = 2;\n```\noutro";
        let chunks = chunk_text(text, 35, ChunkMode::Markdown);
        assert_eq!(texts(&chunks), vec![
            "intro line",
            "```\nlet a = 1;\nlet b = 2;\n```\noutro"
        ]);
        assert!(chunks.iter().all(|c| c.closed_fence.is_none()));
        assert_invariants(text, 35, &chunks);
    }

    #[test]
    fn oversized_fence_is_closed_and_reopened() {
        let text = "```rust\nfn a() {}\nfn b() {}\nfn c() {}\n```";
        let chunks = chunk_text(text, 31, ChunkMode::Markdown);
        assert_eq!(texts(&chunks), vec![
            "```rust\nfn a() {}\nfn b() {}\n```",
            "```rust\nfn c() {}\n```",
        ]);
        assert_eq!(chunks[0].closed_fence.as_deref(), Some("\n```"));
        assert_eq!(chunks[1].reopened_fence.as_deref(), Some("```rust\n"));
        assert_invariants(text, 31, &chunks);
    }

    #[test]
    fn mention_tokens_are_not_split() {
        let text = "ping @averyveryverylonghandle";
        let chunks = chunk_text(text, 12, ChunkMode::Plain);
        assert_eq!(chunks[0].text, "ping");
        assert!(chunks[1].text.starts_with("@avery"));
        assert_invariants(text, 12, &chunks);

        // a lone mention longer than the limit still gets cut
        let chunks = chunk_text("@abcdefghijkl", 5, ChunkMode::Plain);
        assert_invariants("@abcdefghijkl", 5, &chunks);
    }

    #[test]
    fn hard_cut_backs_off_to_mention_start() {
        assert_eq!(mention_start("hi(@someone)", 0, 6), Some(3));
        assert_eq!(mention_start("hi <@U12345>", 0, 7), Some(3));
        assert_eq!(mention_start("abcdef", 0, 3), None);
        assert_eq!(mention_start("@bob) and more", 0, 7), None);
    }

    #[test]
    fn trailing_whitespace_survives_round_trip() {
        let text = "aaaa bbbb \n\n";
        let chunks = chunk_text(text, 4, ChunkMode::Markdown);
        assert_invariants(text, 4, &chunks);
    }

    #[rstest]
    #[case(ChunkMode::Plain)]
    #[case(ChunkMode::Newline)]
    #[case(ChunkMode::Markdown)]
    fn round_trip_mixed_content(#[case] mode: ChunkMode) {
        let text = "# Title\n\nSome prose with @alice and <@U123> mentions, \
                    plus a list:\n- one\n- two\n\n```python\nfor i in range(10):\n    \
                    print(i)\n```\n\nTrailing paragraph with ünïcödé text.";
        for limit in [24, 40, 80, 500] {
            let chunks = chunk_text(text, limit, mode);
            assert_invariants(text, limit, &chunks);
        }
    }

    #[test]
    fn chunk_limit_resolution() {
        let mut config = ChannelConfig::default();
        assert_eq!(
            resolve_text_chunk_limit(ChannelType::Discord, Some(&config), "default"),
            2000
        );
        assert_eq!(resolve_text_chunk_limit(ChannelType::Line, None, "default"), 5000);
        config.text_chunk_limit = Some(0);
        assert_eq!(
            resolve_text_chunk_limit(ChannelType::Telegram, Some(&config), "default"),
            4096
        );
        config.text_chunk_limit = Some(1200);
        assert_eq!(
            resolve_text_chunk_limit(ChannelType::Telegram, Some(&config), "default"),
            1200
        );
    }

    #[test]
    fn chunk_and_table_mode_resolution() {
        let mut config = ChannelConfig::default();
        assert_eq!(resolve_chunk_mode(None, "default"), ChunkMode::Markdown);
        config.chunk_mode = Some(ChunkMode::Newline);
        assert_eq!(resolve_chunk_mode(Some(&config), "default"), ChunkMode::Newline);

        assert_eq!(
            resolve_table_mode(ChannelType::Signal, None, "default"),
            TableMode::Bullets
        );
        config.markdown_tables = Some(TableMode::Off);
        assert_eq!(
            resolve_table_mode(ChannelType::Signal, Some(&config), "default"),
            TableMode::Off
        );
    }
}
