//! Text encoding of records onto a raw byte handle.
//!
//! The backend hands out byte streams; records arrive as Rust strings. An
//! [`EncodedWriter`] sits between the two and encodes each line with the
//! configured [`TextEncoding`]. Unknown encoding names fall back to UTF-8.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::error::UnknownEncoding;

/// Line separator appended to every record.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";

/// Line separator appended to every record.
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Replacement byte for characters a single-byte encoding cannot represent.
const REPLACEMENT: u8 = b'?';

/// Supported record encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8, the platform default.
    #[default]
    Utf8,
    /// UTF-16, big-endian, no byte order mark.
    Utf16Be,
    /// UTF-16, little-endian, no byte order mark.
    Utf16Le,
    /// ISO-8859-1. Characters above U+00FF are replaced with `?`.
    Latin1,
    /// 7-bit ASCII. Characters above U+007F are replaced with `?`.
    Ascii,
}

impl FromStr for TextEncoding {
    type Err = UnknownEncoding;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "utf8" => Ok(Self::Utf8),
            "utf16be" => Ok(Self::Utf16Be),
            "utf16le" => Ok(Self::Utf16Le),
            "iso88591" | "latin1" => Ok(Self::Latin1),
            "ascii" | "usascii" => Ok(Self::Ascii),
            _ => Err(UnknownEncoding(name.to_string())),
        }
    }
}

impl TextEncoding {
    /// Resolves an optional configured name, falling back to UTF-8.
    ///
    /// An unset name silently selects the default; an unrecognized one is
    /// logged and then falls back.
    pub fn resolve(name: Option<&str>) -> Self {
        match name.map(str::parse::<Self>) {
            None => Self::default(),
            Some(Ok(encoding)) => encoding,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "falling back to UTF-8");
                Self::default()
            }
        }
    }

    /// Canonical name of the encoding.
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16Be => "UTF-16BE",
            Self::Utf16Le => "UTF-16LE",
            Self::Latin1 => "ISO-8859-1",
            Self::Ascii => "US-ASCII",
        }
    }

    /// Appends the encoded form of `text` to `out`.
    pub fn encode_into(self, text: &str, out: &mut Vec<u8>) {
        match self {
            Self::Utf8 => out.extend_from_slice(text.as_bytes()),
            Self::Utf16Be => text
                .encode_utf16()
                .for_each(|unit| out.extend_from_slice(&unit.to_be_bytes())),
            Self::Utf16Le => text
                .encode_utf16()
                .for_each(|unit| out.extend_from_slice(&unit.to_le_bytes())),
            Self::Latin1 => out.extend(
                text.chars()
                    .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT)),
            ),
            Self::Ascii => out.extend(
                text.chars()
                    .map(|c| {
                        u8::try_from(u32::from(c))
                            .ok()
                            .filter(u8::is_ascii)
                            .unwrap_or(REPLACEMENT)
                    }),
            ),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A byte handle that accepts text lines.
#[derive(Debug)]
pub struct EncodedWriter<W: Write> {
    inner: W,
    encoding: TextEncoding,
    scratch: Vec<u8>,
}

impl<W: Write> EncodedWriter<W> {
    /// Wraps `inner`, encoding text with `encoding`.
    pub fn new(inner: W, encoding: TextEncoding) -> Self {
        Self {
            inner,
            encoding,
            scratch: Vec::new(),
        }
    }

    /// Returns the encoding in use.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Writes `text` followed by [`LINE_SEPARATOR`] as a single write.
    ///
    /// # Errors
    ///
    /// Returns the error from the underlying handle.
    pub fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.scratch.clear();
        self.encoding.encode_into(text, &mut self.scratch);
        self.encoding.encode_into(LINE_SEPARATOR, &mut self.scratch);
        self.inner.write_all(&self.scratch)
    }

    /// Flushes the underlying handle.
    ///
    /// # Errors
    ///
    /// Returns the error from the underlying handle.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Unwraps the underlying handle.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
