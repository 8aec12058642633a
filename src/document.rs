//! Block-level markdown events for recipe extraction.
//!
//! This is deliberately not a markdown renderer: it only recognizes the pieces
//! a recipe cares about (fenced code blocks, block-level HTML comments, and
//! external-looking links) and hands them to an [`EventSink`] in document order.
use regex::Regex;
use std::sync::OnceLock;

/// One block-level event observed while walking a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// Fenced code block body and the first word of its info string.
    CodeBlock { text: &'a str, lang: Option<&'a str> },
    /// Concatenated body text of the HTML comments in one block.
    Comment(&'a str),
    /// Inline, autolink, or reference-definition link target.
    Link(&'a str),
}

/// Receives document events in the order they appear.
pub trait EventSink {
    type Error;

    fn handle(&mut self, event: Event<'_>) -> Result<(), Self::Error>;
}

struct Fence {
    marker: char,
    len: usize,
    indent: usize,
    lang: Option<String>,
    body: String,
}

/// Walk `markdown` and deliver every recognized event to `sink`.
///
/// An unterminated fence runs to the end of the document, matching CommonMark.
pub fn render<S: EventSink>(markdown: &str, sink: &mut S) -> Result<(), S::Error> {
    let mut fence: Option<Fence> = None;
    let mut comment: Option<String> = None;

    for line in markdown.lines() {
        if let Some(open) = fence.as_mut() {
            if closes_fence(line, open) {
                if let Some(done) = fence.take() {
                    emit_code_block(&done, sink)?;
                }
            } else {
                open.body.push_str(strip_indent(line, open.indent));
                open.body.push('\n');
            }
            continue;
        }

        if let Some(buffer) = comment.as_mut() {
            buffer.push('\n');
            buffer.push_str(line);
            if line.contains("-->") {
                if let Some(block) = comment.take() {
                    sink.handle(Event::Comment(&comment_text(&block)))?;
                }
            }
            continue;
        }

        let stripped = line.trim_start();
        if let Some(open) = open_fence(line) {
            fence = Some(open);
            continue;
        }
        if stripped.starts_with("<!--") {
            if stripped[4..].contains("-->") {
                sink.handle(Event::Comment(&comment_text(stripped)))?;
            } else {
                comment = Some(stripped.to_string());
            }
            continue;
        }

        for url in link_targets(line) {
            sink.handle(Event::Link(&url))?;
        }
    }

    if let Some(open) = fence.take() {
        emit_code_block(&open, sink)?;
    }
    if let Some(block) = comment.take() {
        sink.handle(Event::Comment(&comment_text(&block)))?;
    }
    Ok(())
}

fn emit_code_block<S: EventSink>(fence: &Fence, sink: &mut S) -> Result<(), S::Error> {
    sink.handle(Event::CodeBlock {
        text: &fence.body,
        lang: fence.lang.as_deref(),
    })
}

fn open_fence(line: &str) -> Option<Fence> {
    let stripped = line.trim_start_matches(' ');
    let indent = line.len() - stripped.len();
    let marker = stripped.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let len = stripped.chars().take_while(|ch| *ch == marker).count();
    if len < 3 {
        return None;
    }
    let info = stripped[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    let lang = info
        .split_whitespace()
        .next()
        .map(|word| word.trim_matches(|ch| ch == '{' || ch == '}' || ch == '.'))
        .filter(|word| !word.is_empty())
        .map(str::to_string);
    Some(Fence {
        marker,
        len,
        indent,
        lang,
        body: String::new(),
    })
}

fn closes_fence(line: &str, fence: &Fence) -> bool {
    let stripped = line.trim();
    stripped.len() >= fence.len && stripped.chars().all(|ch| ch == fence.marker)
}

/// Drop up to `indent` leading ASCII spaces; other whitespace is content.
fn strip_indent(line: &str, indent: usize) -> &str {
    let spaces = line.bytes().take(indent).take_while(|byte| *byte == b' ').count();
    &line[spaces..]
}

/// Extract and concatenate every `<!-- ... -->` body in an HTML block.
fn comment_text(block: &str) -> String {
    let mut out = String::new();
    let mut rest = block;
    while let Some(start) = rest.find("<!--") {
        let after = &rest[start + 4..];
        match after.find("-->") {
            Some(end) => {
                out.push_str(&after[..end]);
                rest = &after[end + 3..];
            }
            None => {
                out.push_str(after);
                break;
            }
        }
    }
    out
}

fn code_span_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(`+)[^`]*?(`+)").expect("regex for code spans"))
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(!?)\[(?:[^\]\\]|\\.)*\]\(\s*<?([^\s)>]+)>?(?:\s+(?:"[^"]*"|'[^']*'|\([^)]*\)))?\s*\)|<([A-Za-z][A-Za-z0-9+.-]*://[^\s>]+)>|^\s{0,3}\[[^\]]+\]:\s*<?([^\s>]+)>?"#,
        )
        .expect("regex for markdown links")
    })
}

/// Link targets on a single text line, in the order they appear.
fn link_targets(line: &str) -> Vec<String> {
    let without_code = code_span_pattern().replace_all(line, "");
    let mut targets = Vec::new();
    for cap in link_pattern().captures_iter(&without_code) {
        if cap.get(1).is_some_and(|bang| bang.as_str() == "!") {
            continue;
        }
        let target = cap.get(2).or_else(|| cap.get(3)).or_else(|| cap.get(4));
        if let Some(target) = target {
            targets.push(target.as_str().to_string());
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<String>);

    impl EventSink for Collect {
        type Error = ();

        fn handle(&mut self, event: Event<'_>) -> Result<(), ()> {
            let rendered = match event {
                Event::CodeBlock { text, lang } => {
                    format!("code[{}]:{text}", lang.unwrap_or("-"))
                }
                Event::Comment(body) => format!("comment:{}", body.trim()),
                Event::Link(url) => format!("link:{url}"),
            };
            self.0.push(rendered);
            Ok(())
        }
    }

    fn events(markdown: &str) -> Vec<String> {
        let mut sink = Collect::default();
        render(markdown, &mut sink).expect("render");
        sink.0
    }

    #[test]
    fn fenced_blocks_carry_language_and_body() {
        let got = events("text\n```bash\necho one\necho two\n```\n~~~\nplain\n~~~\n");
        assert_eq!(
            got,
            vec![
                "code[bash]:echo one\necho two\n".to_string(),
                "code[-]:plain\n".to_string(),
            ]
        );
    }

    #[test]
    fn indented_fence_strips_its_indent() {
        let got = events("1. item\n   ```sh\n   ls -la\n   ```\n");
        assert_eq!(got, vec!["code[sh]:ls -la\n".to_string()]);
    }

    #[test]
    fn indented_fence_keeps_unicode_whitespace() {
        let got = events(" ```bash\n\u{a0}echo hi\n\u{3000}x\n ```\n");
        assert_eq!(got, vec!["code[bash]:\u{a0}echo hi\n\u{3000}x\n".to_string()]);
    }

    #[test]
    fn multi_line_comment_is_one_event() {
        let got = events("<!-- STEP\nname: demo\n-->\n\n<!-- END_STEP -->\n");
        assert_eq!(
            got,
            vec![
                "comment:STEP\nname: demo".to_string(),
                "comment:END_STEP".to_string(),
            ]
        );
    }

    #[test]
    fn links_skip_images_code_spans_and_fences() {
        let markdown = "See [docs](https://example.com/a \"title\") and ![img](https://example.com/i.png).\n\
                        `[not](https://example.com/code)` <https://example.com/auto>\n\
                        ```\n[fenced](https://example.com/fenced)\n```\n\
                        [ref]: http://example.com/ref\n";
        let got = events(markdown);
        assert_eq!(
            got,
            vec![
                "link:https://example.com/a".to_string(),
                "link:https://example.com/auto".to_string(),
                "code[-]:[fenced](https://example.com/fenced)\n".to_string(),
                "link:http://example.com/ref".to_string(),
            ]
        );
    }

    #[test]
    fn relative_links_are_still_delivered() {
        let got = events("[Relative Link](examples/README.md)\n");
        assert_eq!(got, vec!["link:examples/README.md".to_string()]);
    }
}
