//! Path templates with embedded time tokens.
//!
//! A template is literal text interspersed with tokens in braces:
//!
//! | Token | Replaced with |
//! |---|---|
//! | `{time:<pattern>}` | the window start formatted with the chrono strftime `pattern`, in UTC |
//! | `{env:NAME}` | the value of environment variable `NAME` when the template was parsed |
//! | `{{` / `}}` | a literal `{` / `}` |
//!
//! Templates are parsed once, when the destination is built, so a malformed
//! template is a configuration error and never a rotation-time failure.
//!
//! ```rust
//! use rollsink::template::PathTemplate;
//! use chrono::{TimeZone, Utc};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = PathTemplate::parse("/audit/{time:%Y%m%d}/app.log")?;
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! assert_eq!(template.resolve(start)?, "/audit/20240101/app.log");
//! # Ok(())
//! # }
//! ```

use std::fmt::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::error::TemplateError;

/// Pattern used for the suffix of a file moved aside by the append fallback.
pub const MOVED_FILE_SUFFIX_PATTERN: &str = "-%Y%m%d-%H%M.%S";

const TIME_PREFIX: &str = "time:";
const ENV_PREFIX: &str = "env:";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Time(String),
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if a token is unterminated, unknown, or
    /// carries an invalid time pattern, or if a `}` is not escaped.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(pos) = rest.find(['{', '}']) {
            literal.push_str(&rest[..pos]);
            let brace = &rest[pos..];

            if let Some(tail) = brace.strip_prefix("{{") {
                literal.push('{');
                offset += pos + 2;
                rest = tail;
                continue;
            }
            if let Some(tail) = brace.strip_prefix("}}") {
                literal.push('}');
                offset += pos + 2;
                rest = tail;
                continue;
            }
            if brace.starts_with('}') {
                return Err(TemplateError::UnmatchedClose {
                    template: template.to_string(),
                    offset: offset + pos,
                });
            }

            let Some(end) = brace.find('}') else {
                return Err(TemplateError::Unterminated {
                    template: template.to_string(),
                    offset: offset + pos,
                });
            };

            let token = &brace[1..end];
            if let Some(pattern) = token.strip_prefix(TIME_PREFIX) {
                validate_time_pattern(pattern)?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Time(pattern.to_string()));
            } else if let Some(name) = token.strip_prefix(ENV_PREFIX) {
                literal.push_str(&std::env::var(name).unwrap_or_default());
            } else {
                return Err(TemplateError::UnknownToken {
                    token: token.to_string(),
                });
            }

            offset += pos + end + 1;
            rest = &brace[end + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// Returns the template text this was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the template contains at least one time token.
    pub fn is_time_dependent(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Time(_)))
    }

    /// Resolves the template for the given instant.
    ///
    /// Resolution is deterministic: the same template and instant always
    /// yield the same path.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Format`] if chrono fails to render a pattern,
    /// which cannot happen for patterns accepted by [`PathTemplate::parse`].
    pub fn resolve(&self, instant: DateTime<Utc>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Time(pattern) => write!(out, "{}", instant.format(pattern))
                    .map_err(|_: fmt::Error| TemplateError::Format {
                        pattern: pattern.clone(),
                    })?,
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Joins a directory template and a filename template with a single `/`.
pub fn join(directory: &str, filename: &str) -> String {
    if directory.is_empty() {
        return filename.to_string();
    }
    let directory = directory.trim_end_matches('/');
    let filename = filename.trim_start_matches('/');
    format!("{directory}/{filename}")
}

/// Inserts `suffix` before the extension of the final path segment.
///
/// The extension is everything from the last `.` of the final segment;
/// without one, the suffix is appended.
///
/// ```rust
/// use rollsink::template::append_to_filename;
///
/// assert_eq!(append_to_filename("/a/app.log", "-1"), "/a/app-1.log");
/// assert_eq!(append_to_filename("/a.d/app", "-1"), "/a.d/app-1");
/// ```
pub fn append_to_filename(path: &str, suffix: &str) -> String {
    let name_start = path.rfind('/').map_or(0, |pos| pos + 1);
    match path[name_start..].rfind('.') {
        Some(dot) => {
            let dot = name_start + dot;
            format!("{}{suffix}{}", &path[..dot], &path[dot..])
        }
        None => format!("{path}{suffix}"),
    }
}

/// Returns the path a file is moved to when the backend cannot append to it.
pub fn moved_file_name(path: &str, window_start: DateTime<Utc>) -> String {
    numbered_moved_file_name(path, window_start, 0)
}

/// Like [`moved_file_name`], with `-<attempt>` after the timestamp when
/// `attempt` is nonzero. Used when earlier names in the window are taken.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use rollsink::template::numbered_moved_file_name;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// assert_eq!(
///     numbered_moved_file_name("/a/app.log", start, 2),
///     "/a/app-20240101-0000.00-2.log"
/// );
/// ```
pub fn numbered_moved_file_name(path: &str, window_start: DateTime<Utc>, attempt: u32) -> String {
    let stamp = window_start.format(MOVED_FILE_SUFFIX_PATTERN);
    let suffix = match attempt {
        0 => stamp.to_string(),
        n => format!("{stamp}-{n}"),
    };
    append_to_filename(path, &suffix)
}

fn validate_time_pattern(pattern: &str) -> Result<(), TemplateError> {
    let invalid = pattern.is_empty()
        || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
        // Some items parse but cannot be formatted (`%#z`).
        || write!(String::new(), "{}", DateTime::<Utc>::default().format(pattern)).is_err();
    if invalid {
        return Err(TemplateError::InvalidTimePattern {
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}
