use regex::Regex;
use thiserror::Error;

/// Character class names accepted inside `[...]`, e.g. `[[:digit:]]`.
const POSIX_CLASSES: &[&str] = &[
    "alnum", "alpha", "ascii", "blank", "cntrl", "digit", "graph",
    "lower", "print", "punct", "space", "upper", "word", "xdigit",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("Unbalanced bracket in pattern '{0}'")]
    UnbalancedBracket(String),
    #[error("Unbalanced brace in pattern '{0}'")]
    UnbalancedBrace(String),
    #[error("Invalid pattern '{pattern}': {reason}")]
    Invalid {
        pattern: String,
        reason: String,
    },
}

/// A compiled glob pattern.
///
/// Matching always covers the full tag, so `5.*` matches `5.2.1` but not `15.2.1`.
/// Braces are alternatives, `{1.24,1.25}.*` matches both release lines.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    regex: Regex,
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let source = glob_to_regex(pattern)?;
        let regex = Regex::new(&source)
            .map_err(|e| PatternError::Invalid {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { regex })
    }

    pub fn is_match(&self, tag: &str) -> bool {
        self.regex.is_match(tag)
    }
}

/// Translate a glob into an anchored regular expression.
fn glob_to_regex(pattern: &str) -> Result<String, PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 4);
    out.push_str(r"\A");

    // Open `{` groups, commas inside one separate alternatives.
    let mut depth = 0usize;

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Collapse runs of stars, `**` means the same thing for tags.
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            },
            '?' => out.push('.'),
            '[' => {
                i = push_class(&chars, i, &mut out)
                    .ok_or_else(|| PatternError::UnbalancedBracket(pattern.to_string()))?;
                continue;
            },
            ']' => return Err(PatternError::UnbalancedBracket(pattern.to_string())),
            '{' => {
                depth += 1;
                out.push_str("(?:");
            },
            ',' if depth > 0 => out.push('|'),
            '}' => {
                if depth == 0 {
                    return Err(PatternError::UnbalancedBrace(pattern.to_string()));
                }
                depth -= 1;
                out.push(')');
            },
            '\\' => {
                // A trailing backslash is a literal backslash.
                let escaped = chars.get(i + 1).copied().unwrap_or('\\');
                push_literal(escaped, &mut out);
                i += 1;
            },
            c => push_literal(c, &mut out),
        }
        i += 1;
    }

    if depth > 0 {
        return Err(PatternError::UnbalancedBrace(pattern.to_string()));
    }

    out.push_str(r"\z");
    Ok(out)
}

fn push_literal(c: char, out: &mut String) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

/// Push the character class starting at `chars[start] == '['`.
///
/// Returns the index right after the closing bracket, or `None` if the class never closes.
fn push_class(chars: &[char], start: usize, out: &mut String) -> Option<usize> {
    let mut i = start + 1;
    out.push('[');

    if matches!(chars.get(i), Some('!') | Some('^')) {
        out.push('^');
        i += 1;
    }

    let mut first = true;
    loop {
        let c = *chars.get(i)?;

        // A `]` right after the opening bracket is a member, not the end.
        if c == ']' && !first {
            out.push(']');
            return Some(i + 1);
        }
        first = false;

        if c == '[' && chars.get(i + 1) == Some(&':') {
            if let Some(end) = posix_class_end(chars, i) {
                let name: String = chars[i + 2..end - 1].iter().collect();
                if POSIX_CLASSES.contains(&name.as_str()) {
                    out.push_str(&format!("[:{}:]", name));
                    i = end + 1;
                    continue;
                }
            }
        }

        let c = if c == '\\' {
            i += 1;
            *chars.get(i)?
        } else {
            c
        };

        push_literal(c, out);

        // Range such as `0-9`, unless the dash is the last member.
        if chars.get(i + 1) == Some(&'-') {
            if let Some(&end) = chars.get(i + 2) {
                if end != ']' {
                    out.push('-');
                    push_literal(end, out);
                    i += 3;
                    continue;
                }
            }
        }

        i += 1;
    }
}

/// Index of the `]` closing a `[:name:]` starting at `start`.
fn posix_class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == ':' && chars[i + 1] == ']' {
            return Some(i + 1);
        }
        if !chars[i].is_ascii_alphabetic() {
            return None;
        }
        i += 1;
    }
    None
}
