//! Small lexical helpers shared by the header scanner, the formatter and the
//! patcher.
//!
//! None of these understand a grammar. They only know about bracket nesting
//! and string literals, which is all the line-oriented passes need to find
//! declaration boundaries reliably.

/// Replace `//` and `/* */` comments with spaces.
///
/// Newlines inside block comments are kept, so byte offsets and line numbers
/// in the result match the input. String literals are left alone.
pub fn strip_comments(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let end = string_end(bytes, i);
                out.extend_from_slice(&bytes[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                out.extend_from_slice(b"  ");
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    out.push(if bytes[i] == b'\n' { b'\n' } else { b' ' });
                    i += 1;
                }
                if i < bytes.len() {
                    out.extend_from_slice(b"  ");
                    i += 2;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    // Only ASCII bytes were substituted, and only outside multi-byte
    // sequences, so the buffer is still valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// 1-based line number of `offset` in `src`.
pub fn line_at(src: &str, offset: usize) -> usize {
    src[..offset.min(src.len())].matches('\n').count() + 1
}

/// Index one past the closing quote of the string literal opening at `start`.
fn string_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn closer(open: u8) -> Option<u8> {
    match open {
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        b'{' => Some(b'}'),
        b'<' => Some(b'>'),
        _ => None,
    }
}

/// Find the bracket closing the one at `open_idx`.
///
/// Only the bracket kind found at `open_idx` is counted; quoted strings are
/// skipped.
pub fn matching_close(src: &str, open_idx: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let open = *bytes.get(open_idx)?;
    let close = closer(open)?;
    let mut depth = 0usize;
    let mut i = open_idx;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            i = string_end(bytes, i);
            continue;
        }
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Split `src` on `sep`, ignoring separators nested in brackets or strings.
///
/// Pieces are trimmed and empty pieces are dropped.
pub fn split_top_level(src: &str, sep: char) -> Vec<&str> {
    let bytes = src.as_bytes();
    let sep = sep as u8;
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' | b'\'' => {
                i = string_end(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ if b == sep && depth == 0 => {
                parts.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&src[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Net bracket depth change over `line`, ignoring quoted strings and a
/// trailing `#` comment.
pub fn bracket_balance(line: &str) -> i32 {
    let bytes = line.as_bytes();
    let mut depth = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = string_end(bytes, i);
                continue;
            }
            b'#' => break,
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    depth
}

/// Where a line of Python source stands relative to triple-quoted strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringState {
    /// The line begins inside a string opened on an earlier line.
    pub starts_inside: bool,
    /// A string opened on this or an earlier line is still open at its end.
    pub ends_inside: bool,
}

/// Track triple-quoted strings across `lines` of Python source.
///
/// Single-quoted strings and `#` comments are skipped so that quotes inside
/// them do not open anything.
pub fn triple_quoted<S: AsRef<str>>(lines: &[S]) -> Vec<StringState> {
    let mut open: Option<&[u8]> = None;
    let mut states = Vec::with_capacity(lines.len());
    for line in lines {
        let bytes = line.as_ref().as_bytes();
        let starts_inside = open.is_some();
        let mut i = 0;
        while i < bytes.len() {
            if let Some(delim) = open {
                if bytes[i] == b'\\' {
                    i += 2;
                } else if bytes[i..].starts_with(delim) {
                    open = None;
                    i += delim.len();
                } else {
                    i += 1;
                }
                continue;
            }
            match bytes[i] {
                b'#' => break,
                b'"' | b'\'' => {
                    if bytes[i..].starts_with(b"\"\"\"") {
                        open = Some(&b"\"\"\""[..]);
                        i += 3;
                    } else if bytes[i..].starts_with(b"'''") {
                        open = Some(&b"'''"[..]);
                        i += 3;
                    } else {
                        i = string_end(bytes, i);
                    }
                }
                _ => i += 1,
            }
        }
        states.push(StringState {
            starts_inside,
            ends_inside: open.is_some(),
        });
    }
    states
}

/// Collapse every run of whitespace into a single space.
pub fn collapse_whitespace(src: &str) -> String {
    src.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_become_spaces_but_keep_lines() {
        let src = "a /* x\ny */ b // z\nc \"//kept\"";
        let out = strip_comments(src);
        assert_eq!(out.len(), src.len());
        assert_eq!(out.lines().count(), 3);
        assert!(out.contains("\"//kept\""));
        assert!(!out.contains('x'));
        assert!(!out.contains('z'));
    }

    #[test]
    fn split_respects_nesting() {
        let parts = split_top_level("int x[2], (*cb)(int, int), y", ',');
        assert_eq!(parts, vec!["int x[2]", "(*cb)(int, int)", "y"]);

        let parts = split_top_level("a = (1, 2), b = \"x,y\"", ',');
        assert_eq!(parts, vec!["a = (1, 2)", "b = \"x,y\""]);
    }

    #[test]
    fn brackets_match_across_nesting() {
        let src = "f(a, (b), c) -> d";
        assert_eq!(matching_close(src, 1), Some(11));
        assert_eq!(matching_close(src, 5), Some(7));
        assert_eq!(matching_close("f(a", 1), None);
    }

    #[test]
    fn balance_ignores_strings_and_comments() {
        assert_eq!(bracket_balance("def f(self, x=\")\""), 1);
        assert_eq!(bracket_balance("):  # (("), -1);
    }

    #[test]
    fn triple_quoted_strings_span_lines() {
        let lines = [
            r#"x = '"""'  # """"#,
            r#"doc = """first"#,
            "",
            r#"  last""" + '''a'''"#,
            "y = '''",
            "z",
        ];
        let states: Vec<_> = triple_quoted(&lines)
            .into_iter()
            .map(|s| (s.starts_inside, s.ends_inside))
            .collect();
        assert_eq!(
            states,
            [
                (false, false),
                (false, true),
                (true, true),
                (true, false),
                (false, true),
                (true, true),
            ]
        );
    }

    #[test]
    fn line_numbers_are_one_based() {
        assert_eq!(line_at("a\nb\nc", 0), 1);
        assert_eq!(line_at("a\nb\nc", 4), 3);
    }
}
