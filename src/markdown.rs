//! Markdown rendering and plain-text extraction.
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};

/// Default length of a note-list preview.
pub const SNIPPET_LEN: usize = 120;

/// Average reading speed used for the "min read" estimate.
const WORDS_PER_MINUTE: usize = 200;

fn parser(markdown: &str) -> Parser<'_> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    Parser::new_ext(markdown, options)
}

/// Renders a note body to HTML for previews.
pub fn render_html(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser(markdown));
    out
}

/// Prose text of a document: no markup, no code, no image alt text.
/// Block boundaries become single spaces.
fn plain_text(markdown: &str, keep_inline_code: bool) -> String {
    let mut text = String::new();
    let mut skip_depth = 0usize;

    for event in parser(markdown) {
        match event {
            Event::Start(Tag::Image { .. }) | Event::Start(Tag::CodeBlock(_)) => skip_depth += 1,
            Event::End(TagEnd::Image) | Event::End(TagEnd::CodeBlock) => {
                skip_depth = skip_depth.saturating_sub(1);
                text.push(' ');
            }
            _ if skip_depth > 0 => {}
            Event::Text(t) => text.push_str(&t),
            Event::Code(code) if keep_inline_code => text.push_str(&code),
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::TableCell) => text.push(' '),
            _ => {}
        }
    }
    text
}

/// A single-line plain-text preview of at most `max_len` characters.
pub fn extract_snippet(markdown: &str, max_len: usize) -> String {
    let text = plain_text(markdown, false);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_len).collect()
}

/// Words of prose, excluding code.
pub fn count_words(markdown: &str) -> usize {
    plain_text(markdown, false).split_whitespace().count()
}

/// Whole minutes needed to read `markdown`; never less than one.
pub fn reading_minutes(markdown: &str) -> usize {
    count_words(markdown).div_ceil(WORDS_PER_MINUTE).max(1)
}
