//! Repository configuration in Git's INI dialect.
//!
//! ```text
//! # comment
//! [core]
//!     repositoryformatversion = 0
//!     bare = false
//! [remote "origin"]
//!     url = "https://example.com/repo.git"
//! ```
//!
//! Section and key names are case-insensitive and stored lower-cased.
//! Subsection names are case-sensitive. A key with no `=` is boolean true.
//! When a key repeats, the last value wins.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{RepoError, RepoResult};

/// The only repository format this implementation reads or writes.
pub const REPOSITORY_FORMAT_VERSION: i64 = 0;

/// One `[name "subsection"]` block and its entries in file order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Section {
    pub name: String,
    pub subsection: Option<String>,
    pub entries: Vec<(String, String)>,
}

impl Section {
    fn new(name: impl Into<String>, subsection: Option<String>) -> Self {
        Self {
            name: name.into(),
            subsection,
            entries: Vec::new(),
        }
    }

    fn matches(&self, name: &str, subsection: Option<&str>) -> bool {
        self.name == name && self.subsection.as_deref() == subsection
    }
}

/// Parsed configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    sections: Vec<Section>,
}

impl Config {
    /// The configuration written by repository creation.
    pub fn default_config() -> Self {
        let mut core = Section::new("core", None);
        core.entries = vec![
            (
                "repositoryformatversion".to_string(),
                REPOSITORY_FORMAT_VERSION.to_string(),
            ),
            ("filemode".to_string(), "false".to_string()),
            ("bare".to_string(), "false".to_string()),
        ];
        Self {
            sections: vec![core],
        }
    }

    /// Read and parse a config file. A missing file is a corrupt repository.
    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = match fs::read(path) {
            Ok(bytes) => String::from_utf8(bytes)
                .map_err(|_| RepoError::corrupt(None, "file is not valid UTF-8"))
                .map_err(|e| e.at_path(path))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RepoError::corrupt(None, "configuration file is missing").at_path(path))
            }
            Err(e) => return Err(RepoError::io(path, e)),
        };
        Self::parse(&text).map_err(|e| e.at_path(path))
    }

    /// Parse config text.
    pub fn parse(text: &str) -> RepoResult<Self> {
        let mut sections: Vec<Section> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = Some(idx + 1);
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let header = section_header_body(rest)
                    .ok_or_else(|| RepoError::corrupt(line_no, "unterminated section header"))?;
                let (name, subsection) = parse_section_header(header)
                    .map_err(|reason| RepoError::corrupt(line_no, reason))?;
                sections.push(Section::new(name, subsection));
                continue;
            }

            let section = sections
                .last_mut()
                .ok_or_else(|| RepoError::corrupt(line_no, "key outside of any section"))?;
            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (
                    key.trim(),
                    parse_value(value).map_err(|reason| RepoError::corrupt(line_no, reason))?,
                ),
                None => (line, "true".to_string()),
            };
            if !is_valid_key(key) {
                return Err(RepoError::corrupt(line_no, format!("invalid key {key:?}")));
            }
            section.entries.push((key.to_ascii_lowercase(), value));
        }

        Ok(Self { sections })
    }

    /// All sections in file order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Look up `section.key` or `section.subsection.key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let (section, subsection, name) = split_key(key)?;
        self.sections
            .iter()
            .filter(|s| s.matches(&section, subsection))
            .flat_map(|s| s.entries.iter())
            .filter(|(k, _)| *k == name)
            .last()
            .map(|(_, v)| v.as_str())
    }

    /// Look up a boolean. Accepts `true/yes/on/1` and `false/no/off/0/""`.
    pub fn get_bool(&self, key: &str) -> RepoResult<Option<bool>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" | "" => Ok(Some(false)),
            _ => Err(RepoError::corrupt(
                None,
                format!("{key} = {value:?} is not a boolean"),
            )),
        }
    }

    /// Look up an integer, with Git's `k`/`m`/`g` suffixes.
    pub fn get_int(&self, key: &str) -> RepoResult<Option<i64>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        parse_int(value)
            .map(Some)
            .ok_or_else(|| RepoError::corrupt(None, format!("{key} = {value:?} is not an integer")))
    }

    /// Set `key` to `value`, replacing the last existing occurrence or
    /// appending to (or creating) the matching section.
    ///
    /// The key must name a section and a variable that [`Config::parse`]
    /// accepts, otherwise nothing changes.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> RepoResult<()> {
        let (section, subsection, name) =
            settable_key(key).map_err(|reason| RepoError::InvalidConfigKey {
                key: key.to_string(),
                reason,
            })?;
        let value = value.into();

        let existing = self
            .sections
            .iter_mut()
            .rev()
            .filter(|s| s.matches(&section, subsection))
            .flat_map(|s| s.entries.iter_mut().rev())
            .find(|(k, _)| *k == name);
        if let Some(entry) = existing {
            entry.1 = value;
            return Ok(());
        }

        match self
            .sections
            .iter_mut()
            .rev()
            .find(|s| s.matches(&section, subsection))
        {
            Some(s) => s.entries.push((name, value)),
            None => {
                let mut s = Section::new(section, subsection.map(str::to_string));
                s.entries.push((name, value));
                self.sections.push(s);
            }
        }
        Ok(())
    }

    /// `core.repositoryformatversion`, which must be present and numeric.
    pub fn format_version(&self) -> RepoResult<i64> {
        let raw = self
            .get("core.repositoryformatversion")
            .ok_or_else(|| RepoError::corrupt(None, "core.repositoryformatversion is missing"))?;
        raw.trim().parse().map_err(|_| {
            RepoError::corrupt(
                None,
                format!("core.repositoryformatversion = {raw:?} is not an integer"),
            )
        })
    }

    /// Reject any repository format other than 0.
    pub fn validate(&self) -> RepoResult<()> {
        let found = self.format_version()?;
        if found != REPOSITORY_FORMAT_VERSION {
            return Err(RepoError::UnsupportedFormatVersion {
                path: Default::default(),
                found,
            });
        }
        Ok(())
    }

    /// Render in the same dialect [`Config::parse`] reads.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            match &section.subsection {
                Some(sub) => {
                    out.push_str(&format!("[{} \"{}\"]\n", section.name, escape_subsection(sub)))
                }
                None => out.push_str(&format!("[{}]\n", section.name)),
            }
            for (key, value) in &section.entries {
                out.push_str(&format!("\t{key} = {}\n", quote_value(value)));
            }
        }
        out
    }

    /// Write atomically: temporary file in the same directory, then rename.
    pub fn save(&self, path: &Path) -> RepoResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix(".config")
            .tempfile_in(dir)
            .map_err(|e| RepoError::io(dir, e))?;
        tmp.write_all(self.to_text().as_bytes())
            .map_err(|e| RepoError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| RepoError::io(path, e.error))?;
        Ok(())
    }
}

/// Split `core.bare` / `remote.origin.url` into (section, subsection, key).
fn split_key(key: &str) -> Option<(String, Option<&str>, String)> {
    let (section, rest) = key.split_once('.')?;
    let (subsection, name) = match rest.rsplit_once('.') {
        Some((sub, name)) => (Some(sub), name),
        None => (None, rest),
    };
    if section.is_empty() || name.is_empty() {
        return None;
    }
    Some((
        section.to_ascii_lowercase(),
        subsection,
        name.to_ascii_lowercase(),
    ))
}

/// The text between `[` and the closing `]`, which may only be followed by
/// whitespace or a comment. Brackets inside a quoted subsection do not close.
fn section_header_body(rest: &str) -> Option<&str> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ']' if !in_quotes => {
                let trailing = rest[i + 1..].trim_start();
                let ok = trailing.is_empty() || trailing.starts_with(['#', ';']);
                return ok.then_some(&rest[..i]);
            }
            _ => {}
        }
    }
    None
}

/// [`split_key`] plus the naming rules a written file must satisfy.
fn settable_key(key: &str) -> Result<(String, Option<&str>, String), String> {
    let (section, subsection, name) =
        split_key(key).ok_or("expected section.key or section.subsection.key")?;
    if !is_valid_section_name(&section) {
        return Err(format!("invalid section name {section:?}"));
    }
    if subsection.is_some_and(|sub| sub.contains(['\n', '\0'])) {
        return Err("subsection may not contain a newline".into());
    }
    if !is_valid_key(&name) {
        return Err(format!("invalid key {name:?}"));
    }
    Ok((section, subsection, name))
}

fn is_valid_section_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

fn parse_section_header(header: &str) -> Result<(String, Option<String>), String> {
    let header = header.trim();
    let (name, subsection) = match header.split_once(char::is_whitespace) {
        Some((name, rest)) => {
            let quoted = rest
                .trim()
                .strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .ok_or_else(|| format!("subsection in [{header}] must be quoted"))?;
            (name, Some(unescape_subsection(quoted)?))
        }
        None => (header, None),
    };
    if !is_valid_section_name(name) {
        return Err(format!("invalid section name {name:?}"));
    }
    Ok((name.to_ascii_lowercase(), subsection))
}

fn unescape_subsection(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err("subsection ends with a backslash".into()),
            },
            '"' => return Err("unescaped quote in subsection".into()),
            c => out.push(c),
        }
    }
    Ok(out)
}

fn escape_subsection(sub: &str) -> String {
    sub.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Decode the right-hand side of `key = value`: quotes, escapes, and
/// trailing comments.
fn parse_value(raw: &str) -> Result<String, String> {
    let mut out = String::new();
    let mut in_quotes = false;
    // Length of `out` up to the last character that must survive trimming.
    let mut keep = 0;
    let mut chars = raw.trim_start().chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' => {
                let escaped = match chars.next() {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('b') => '\u{8}',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some(other) => return Err(format!("unknown escape sequence \\{other}")),
                    None => return Err("line continuation is not supported".into()),
                };
                out.push(escaped);
            }
            '#' | ';' if !in_quotes => break,
            c => out.push(c),
        }
        if in_quotes || !out.ends_with(char::is_whitespace) || c == '\\' {
            keep = out.len();
        }
    }
    if in_quotes {
        return Err("unterminated quoted value".into());
    }
    out.truncate(keep);
    Ok(out)
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || value.contains(['#', ';']);
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
        .replace('\u{8}', "\\b");
    if needs_quotes {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (digits, scale) = match raw.chars().last()?.to_ascii_lowercase() {
        'k' => (&raw[..raw.len() - 1], 1024),
        'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        'g' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    digits.parse::<i64>().ok()?.checked_mul(scale)
}
