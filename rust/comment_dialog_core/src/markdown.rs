//! Markdown escaping for plain-text comments opened in the Markdown editor.

/// Escape `text` so that it renders literally when read as Markdown.
///
/// Inline markup characters are always escaped. Block markers (`#`, `>`,
/// list bullets and ordered-list numbers) are only escaped where they start a
/// line, which is the only place they carry meaning.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 { out.push('\n'); }
        escape_line(line, &mut out);
    }
    out
}

fn escape_line(line: &str, out: &mut String) {
    let indent = line.len() - line.trim_start().len();
    out.push_str(&line[..indent]);
    let body = &line[indent..];

    let mut rest = body;
    if let Some(first) = body.chars().next() {
        match first {
            '#' | '>' => {
                out.push('\\');
                out.push(first);
                rest = &body[first.len_utf8()..];
            }
            '+' | '-' if body[1..].starts_with(' ') => {
                out.push('\\');
                out.push(first);
                rest = &body[1..];
            }
            _ => {
                let digits = body.chars().take_while(|c| c.is_ascii_digit()).count();
                if digits > 0 && body[digits..].starts_with('.') {
                    out.push_str(&body[..digits]);
                    out.push_str("\\.");
                    rest = &body[digits + 1..];
                }
            }
        }
    }

    for ch in rest.chars() {
        match ch {
            '\\' | '`' | '*' | '_' | '{' | '}' | '[' | ']' | '(' | ')' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_emphasis_markers() {
        assert_eq!(escape_markdown("this _is_ a _test_"), "this \\_is\\_ a \\_test\\_");
        assert_eq!(escape_markdown("2 * 3"), "2 \\* 3");
    }

    #[test]
    fn escapes_block_markers_only_at_line_start() {
        assert_eq!(escape_markdown("# title\na # b"), "\\# title\na # b");
        assert_eq!(escape_markdown("- item\n  > quote"), "\\- item\n  \\> quote");
        assert_eq!(escape_markdown("1. first\nv1.2"), "1\\. first\nv1.2");
        assert_eq!(escape_markdown("-5 degrees"), "-5 degrees");
    }

    #[test]
    fn escapes_backslashes_and_links() {
        assert_eq!(escape_markdown("a\\b [x](y)"), "a\\\\b \\[x\\]\\(y\\)");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(escape_markdown(""), "");
        assert_eq!(escape_markdown("nothing special here"), "nothing special here");
    }
}
