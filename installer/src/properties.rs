//! Property sets and the `.properties` file codec.
//!
//! Build engines receive their configuration as a flat map of string
//! properties. Property files use the Java `.properties` layout that Ant
//! reads: ISO-8859-1 text, `#`/`!` comments, `=`, `:` or whitespace between
//! key and value, backslash line continuations, and `\uXXXX` escapes.

use crate::error::{ActionError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// An ordered map of build properties.
///
/// Assignment always overwrites, so the last value set for a key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    /// Create an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a property value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns true if the property is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of defined properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no property is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set every property of `other`, overwriting existing values.
    pub fn set_all(&mut self, other: &Self) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    /// Parse `.properties` text.
    ///
    /// # Example
    ///
    /// ```
    /// use buildcall_installer::properties::Properties;
    ///
    /// let props = Properties::parse("# comment\nenv = prod\npath=C:\\\\opt\n");
    /// assert_eq!(props.get("env"), Some("prod"));
    /// assert_eq!(props.get("path"), Some("C:\\opt"));
    /// ```
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut props = Self::new();
        for line in logical_lines(input) {
            let (key, value) = split_entry(&line);
            props.set(unescape(key), unescape(value));
        }
        props
    }

    /// Parse the raw bytes of a property file, decoded as ISO-8859-1.
    #[must_use]
    pub fn from_latin1(bytes: &[u8]) -> Self {
        let text: String = bytes.iter().copied().map(char::from).collect();
        Self::parse(&text)
    }

    /// Read a property file from disk.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading the file.
    pub fn read(path: &Utf8Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_latin1(&bytes))
    }

    /// Render the set in `.properties` layout, escaping everything outside
    /// printable ASCII.
    #[must_use]
    pub fn to_file_contents(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            out.push_str(&escape(name, true));
            out.push('=');
            out.push_str(&escape(value, false));
            out.push('\n');
        }
        out
    }

    /// Write the set in `.properties` layout.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the writer.
    pub fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(self.to_file_contents().as_bytes())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (name, value) in iter {
            props.set(name, value);
        }
        props
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Load and merge property files in order.
///
/// Files are read in list order and later files override earlier ones.
///
/// # Errors
///
/// Returns [`ActionError::PropertyFileMissing`] for the first path that does
/// not exist, or [`ActionError::PropertyFileUnreadable`] if reading fails.
pub fn load_files(paths: &[Utf8PathBuf]) -> Result<Properties> {
    let mut merged = Properties::new();
    for path in paths {
        if !path.exists() {
            return Err(ActionError::PropertyFileMissing { path: path.clone() });
        }
        let props = Properties::read(path).map_err(|source| {
            ActionError::PropertyFileUnreadable {
                path: path.clone(),
                source,
            }
        })?;
        log::trace!("loaded {} properties from {path}", props.len());
        merged.set_all(&props);
    }
    Ok(merged)
}

const fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{c}')
}

/// Split on `\n`, `\r\n`, and a lone `\r`.
fn physical_lines(input: &str) -> impl Iterator<Item = &str> {
    let mut rest = input;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(end) = rest.find(['\n', '\r']) else {
            return Some(std::mem::take(&mut rest));
        };
        let (line, tail) = rest.split_at(end);
        let terminator = if tail.starts_with("\r\n") { 2 } else { 1 };
        rest = tail.get(terminator..).unwrap_or_default();
        Some(line)
    })
}

/// Join continuation lines and drop blanks and comments.
fn logical_lines(input: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;

    for raw in physical_lines(input) {
        let line = raw.trim_start_matches(is_blank);
        let mut current = match pending.take() {
            Some(prefix) => prefix,
            None => {
                if line.is_empty() || line.starts_with(['#', '!']) {
                    continue;
                }
                String::new()
            }
        };

        let trailing = line.chars().rev().take_while(|&c| c == '\\').count();
        if trailing % 2 == 1 {
            current.push_str(line.strip_suffix('\\').unwrap_or(line));
            pending = Some(current);
        } else {
            current.push_str(line);
            lines.push(current);
        }
    }

    if let Some(rest) = pending {
        lines.push(rest);
    }
    lines
}

/// Split a logical line into its raw key and value.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    let mut separator = None;

    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = index;
                separator = Some(c);
                break;
            }
            c if is_blank(c) => {
                key_end = index;
                break;
            }
            _ => {}
        }
    }

    let (key, rest) = line.split_at(key_end);
    let rest = match separator {
        Some(sep) => rest.strip_prefix(sep).unwrap_or(rest),
        None => {
            let trimmed = rest.trim_start_matches(is_blank);
            trimmed
                .strip_prefix(['=', ':'])
                .unwrap_or(trimmed)
        }
    };
    (key, rest.trim_start_matches(is_blank))
}

/// Resolve escapes, including `\uXXXX` surrogate pairs.
fn unescape(raw: &str) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut buf = [0_u16; 2];

    while let Some(c) = chars.next() {
        let resolved = if c == '\\' {
            match chars.next() {
                Some('t') => '\t',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('f') => '\u{c}',
                Some('u') => {
                    let hex: String = chars.clone().take(4).collect();
                    let well_formed =
                        hex.len() == 4 && hex.chars().all(|digit| digit.is_ascii_hexdigit());
                    match u16::from_str_radix(&hex, 16) {
                        Ok(unit) if well_formed => {
                            for _ in 0..4 {
                                chars.next();
                            }
                            units.push(unit);
                            continue;
                        }
                        _ => 'u',
                    }
                }
                Some(other) => other,
                None => break,
            }
        } else {
            c
        };
        units.extend_from_slice(resolved.encode_utf16(&mut buf));
    }

    String::from_utf16_lossy(&units)
}

/// Escape a key or value for the `.properties` layout.
fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut buf = [0_u16; 2];

    for (index, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            ' ' if is_key || index == 0 => out.push_str("\\ "),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => {
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{unit:04X}"));
                }
            }
        }
    }
    out
}
