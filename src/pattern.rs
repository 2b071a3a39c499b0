//! Target site patterns.
//!
//! A pattern is `host` or `host/path-expression`. The path expression is a
//! shell glob (`*`, `?`, `[...]`, `[!...]`) matched against the URL path
//! without its leading slash, or a regular expression when it starts with
//! `~`. Both match the whole path, ignoring case.
//!
//! ```text
//! nytimes.com
//! nytimes.com/[0-9][0-9][0-9][0-9]/[0-9][0-9]/*
//! example.com/~20\d\d/.*/climate-.*
//! ```

use regex::{Regex, RegexBuilder};
use std::fmt;
use url::Url;

use crate::error::{IngestError, Result};

/// How a pattern's path expression is evaluated.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    Glob { expr: String, regex: Regex },
    Regex { expr: String, regex: Regex },
}

impl PathMatcher {
    fn is_match(&self, path: &str) -> bool {
        match self {
            PathMatcher::Glob { regex, .. } | PathMatcher::Regex { regex, .. } => {
                regex.is_match(path)
            }
        }
    }
}

/// A site the caller wants articles from.
#[derive(Debug, Clone)]
pub struct TargetPattern {
    source: String,
    host: String,
    path: Option<PathMatcher>,
}

impl TargetPattern {
    /// Parse `host[/path-expression]`. A leading `http://` or `https://` is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);

        let (host, expr) = match without_scheme.split_once('/') {
            Some((host, expr)) => (host, Some(expr)),
            None => (without_scheme, None),
        };

        let host = host.to_ascii_lowercase();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(IngestError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "missing or malformed host".to_string(),
            });
        }

        let (source, path) = match expr {
            None | Some("") => (host.clone(), None),
            Some(expr) => (format!("{host}/{expr}"), Some(compile_path(raw, expr)?)),
        };

        Ok(Self { source, host, path })
    }

    /// Identity used by resume cursors: lowercase host, path expression as
    /// written, no scheme and no trailing bare slash.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> Option<&PathMatcher> {
        self.path.as_ref()
    }

    /// Literal leading part of a glob path expression, usable for
    /// server-side prefix filtering. `None` when there is no glob expression.
    pub fn literal_prefix(&self) -> Option<&str> {
        match &self.path {
            Some(PathMatcher::Glob { expr, .. }) => {
                let end = expr.find(['*', '?', '[']).unwrap_or(expr.len());
                Some(&expr[..end])
            }
            _ => None,
        }
    }

    /// Whether the path of `url` satisfies the path expression.
    /// Patterns without a path expression accept every URL.
    pub fn matches_url(&self, url: &str) -> bool {
        let Some(matcher) = &self.path else {
            return true;
        };
        match url_path(url) {
            Some(path) => matcher.is_match(path.trim_start_matches('/')),
            None => false,
        }
    }
}

impl fmt::Display for TargetPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn url_path(url: &str) -> Option<String> {
    Url::parse(url)
        .or_else(|_| Url::parse(&format!("http://{url}")))
        .ok()
        .map(|parsed| parsed.path().to_string())
}

fn compile_path(raw: &str, expr: &str) -> Result<PathMatcher> {
    let (regex_src, is_regex) = match expr.strip_prefix('~') {
        Some(re) => (re.to_string(), true),
        None => (glob_to_regex(expr), false),
    };

    let regex = RegexBuilder::new(&format!("^(?:{regex_src})$"))
        .case_insensitive(true)
        .build()
        .map_err(|e| IngestError::InvalidPattern {
            pattern: raw.to_string(),
            reason: e.to_string(),
        })?;

    Ok(if is_regex {
        PathMatcher::Regex {
            expr: expr.to_string(),
            regex,
        }
    } else {
        PathMatcher::Glob {
            expr: expr.to_string(),
            regex,
        }
    })
}

/// Translate an fnmatch-style glob into regex source.
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i + 1..end]));
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }
    out
}

/// Index of the `]` closing the class opened at `start`. A `]` right after
/// `[` or `[!` is literal.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}

fn translate_class(body: &[char]) -> String {
    let (negated, body) = match body.first() {
        Some('!') => (true, &body[1..]),
        _ => (false, body),
    };

    let mut out = String::from(if negated { "[^" } else { "[" });
    for (k, c) in body.iter().enumerate() {
        match c {
            '\\' | '[' | ']' | '&' | '~' => {
                out.push('\\');
                out.push(*c);
            }
            '^' if k == 0 => out.push_str(r"\^"),
            c => out.push(*c),
        }
    }
    out.push(']');
    out
}
