//! Module format sniffing.
//!
//! A file reached through `main` or a `require` condition may still be an
//! ES module. This scanner looks for top-level `import`/`export` syntax
//! without a full parse, skipping comments and string literals.

/// Whether `source` uses ES module syntax.
///
/// Recognized: `import x from`, `import {`, `import *`, `import "x"`,
/// `import.meta`, and `export` followed by a declaration or `{`/`*`.
/// Dynamic `import(...)` is allowed in CommonJS and does not count.
#[must_use]
pub fn is_esm_source(source: &str) -> bool {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        let c = chars[i];

        // Line comment
        if c == '/' && i + 1 < len && chars[i + 1] == '/' {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        // Block comment
        if c == '/' && i + 1 < len && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            i = skip_string(&chars, i);
            continue;
        }

        if matches_keyword(&chars, i, "import") && !is_member_access(&chars, i) {
            let next = next_non_ws(&chars, i + 6);
            match next.map(|j| chars[j]) {
                Some('(') | None => {}
                Some('.') => {
                    if next.is_some_and(|j| matches_word_at(&chars, j + 1, "meta")) {
                        return true;
                    }
                }
                Some(_) => return true,
            }
            i += 6;
            continue;
        }

        if matches_keyword(&chars, i, "export") && !is_member_access(&chars, i) {
            let next = next_non_ws(&chars, i + 6).map(|j| chars[j]);
            if next.is_some_and(|n| n == '{' || n == '*' || n.is_alphabetic()) {
                return true;
            }
            i += 6;
            continue;
        }

        i += 1;
    }

    false
}

/// Index just past the string literal opening at `start`.
fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() && chars[i] != quote {
        if chars[i] == '\\' {
            i += 1;
        } else if chars[i] == '\n' && quote != '`' {
            break;
        }
        i += 1;
    }
    i + 1
}

fn next_non_ws(chars: &[char], mut i: usize) -> Option<usize> {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    (i < chars.len()).then_some(i)
}

/// `foo.import` / `exports.export` are property names, not keywords.
fn is_member_access(chars: &[char], pos: usize) -> bool {
    let mut i = pos;
    while i > 0 && chars[i - 1].is_whitespace() {
        i -= 1;
    }
    i > 0 && chars[i - 1] == '.'
}

fn matches_word_at(chars: &[char], pos: usize, word: &str) -> bool {
    let mut i = pos;
    for c in word.chars() {
        if i >= chars.len() || chars[i] != c {
            return false;
        }
        i += 1;
    }
    true
}

/// Check if chars at position match a keyword (with word boundary).
fn matches_keyword(chars: &[char], pos: usize, keyword: &str) -> bool {
    let len = keyword.chars().count();
    if pos + len > chars.len() {
        return false;
    }
    if pos > 0 && (chars[pos - 1].is_alphanumeric() || chars[pos - 1] == '_' || chars[pos - 1] == '$')
    {
        return false;
    }
    if !matches_word_at(chars, pos, keyword) {
        return false;
    }
    !(pos + len < chars.len()
        && (chars[pos + len].is_alphanumeric() || chars[pos + len] == '_' || chars[pos + len] == '$'))
}
