use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, TimeZone};
use serde::Serialize;
use strand_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::kvlm::Kvlm;
use crate::object::ObjectKind;

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Identity line of an `author`, `committer`, or `tagger` header:
/// `Name <email> <seconds> <+hhmm>`.
///
/// Fields are only reachable through [`Signature::new`] and parsing, so every
/// value prints to a line that parses back to itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Signature {
    name: String,
    email: String,
    /// Seconds since the Unix epoch.
    timestamp: i64,
    /// Timezone offset exactly as written, e.g. `+0200` or `-0000`.
    offset: String,
}

impl Signature {
    /// Create a signature. The name and email may not contain `<`, `>`, or a
    /// newline, the timestamp may not be negative, and the offset must look
    /// like `+hhmm` or `-hhmm`.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: i64,
        offset: impl Into<String>,
    ) -> StoreResult<Self> {
        let sig = Self {
            name: name.into(),
            email: email.into(),
            timestamp,
            offset: offset.into(),
        };
        if sig.name.contains(['<', '>', '\n']) || sig.email.contains(['<', '>', '\n']) {
            return Err(StoreError::malformed(format!(
                "identity {:?} <{:?}> contains reserved characters",
                sig.name, sig.email
            )));
        }
        if sig.timestamp < 0 {
            return Err(StoreError::malformed(format!(
                "timestamp {} is before the epoch",
                sig.timestamp
            )));
        }
        sig.offset_minutes()?;
        Ok(sig)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Timezone offset exactly as written.
    pub fn offset(&self) -> &str {
        &self.offset
    }

    /// Offset from UTC in minutes.
    pub fn offset_minutes(&self) -> StoreResult<i32> {
        let bytes = self.offset.as_bytes();
        let valid = bytes.len() == 5
            && matches!(bytes[0], b'+' | b'-')
            && bytes[1..].iter().all(u8::is_ascii_digit);
        if !valid {
            return Err(StoreError::malformed(format!(
                "invalid timezone offset {:?}",
                self.offset
            )));
        }
        let digits = |r: std::ops::Range<usize>| -> i32 {
            bytes[r].iter().fold(0, |acc, b| acc * 10 + i32::from(b - b'0'))
        };
        let minutes = digits(1..3) * 60 + digits(3..5);
        Ok(if bytes[0] == b'-' { -minutes } else { minutes })
    }

    /// The moment this signature records, in its own timezone.
    pub fn when(&self) -> StoreResult<DateTime<FixedOffset>> {
        let tz = FixedOffset::east_opt(self.offset_minutes()? * 60)
            .ok_or_else(|| StoreError::malformed(format!("offset {} out of range", self.offset)))?;
        tz.timestamp_opt(self.timestamp, 0)
            .single()
            .ok_or_else(|| {
                StoreError::malformed(format!("timestamp {} out of range", self.timestamp))
            })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.offset
        )
    }
}

impl FromStr for Signature {
    type Err = StoreError;

    /// Strict parse: the result must print back to exactly `s`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || StoreError::malformed(format!("malformed identity {s:?}"));

        let lt = s.find('<').ok_or_else(bad)?;
        let gt = lt + s[lt..].find('>').ok_or_else(bad)?;
        let name = match &s[..lt] {
            "" => "",
            prefix => prefix.strip_suffix(' ').ok_or_else(bad)?,
        };
        let email = &s[lt + 1..gt];
        let rest = s[gt + 1..].strip_prefix(' ').ok_or_else(bad)?;
        let (time, offset) = rest.split_once(' ').ok_or_else(bad)?;

        let canonical_time = !time.is_empty()
            && time.bytes().all(|b| b.is_ascii_digit())
            && (time == "0" || !time.starts_with('0'));
        if !canonical_time {
            return Err(bad());
        }
        let timestamp: i64 = time.parse().map_err(|_| bad())?;

        let sig = Self::new(name, email, timestamp, offset)?;
        // An empty name prints as " <email>", which is not what we parsed.
        if sig.to_string() != s {
            return Err(bad());
        }
        Ok(sig)
    }
}

fn parse_id(field: &str, value: &str) -> StoreResult<ObjectId> {
    ObjectId::from_hex(value)
        .map_err(|e| StoreError::malformed(format!("{field} header {value:?}: {e}")))
}

fn parse_signature(field: &str, value: &str) -> StoreResult<Signature> {
    value
        .parse()
        .map_err(|e: StoreError| StoreError::malformed(format!("{field} header: {e}")))
}

/// Check an extra header key against what the header parser accepts back.
fn validate_extra_key(kind: &str, reserved: &[&str], key: &str) -> StoreResult<()> {
    if key.is_empty() || key.contains([' ', '\n']) {
        return Err(StoreError::malformed(format!(
            "{kind} header key {key:?} must be non-empty without spaces or newlines"
        )));
    }
    if reserved.contains(&key) {
        return Err(StoreError::malformed(format!(
            "{kind} header {key:?} is reserved"
        )));
    }
    Ok(())
}

/// Walks header fields in order, enforcing the fixed prefix of a commit or tag.
struct HeaderCursor<'a> {
    fields: std::iter::Peekable<std::slice::Iter<'a, (String, String)>>,
    kind: &'static str,
}

impl<'a> HeaderCursor<'a> {
    fn new(kvlm: &'a Kvlm, kind: &'static str) -> Self {
        Self {
            fields: kvlm.fields.iter().peekable(),
            kind,
        }
    }

    fn expect(&mut self, key: &str) -> StoreResult<&'a str> {
        match self.fields.next() {
            Some((k, v)) if k == key => Ok(v.as_str()),
            Some((k, _)) => Err(StoreError::malformed(format!(
                "{} header {k:?} found where {key:?} was expected",
                self.kind
            ))),
            None => Err(StoreError::malformed(format!(
                "{} is missing the {key:?} header",
                self.kind
            ))),
        }
    }

    fn take_repeated(&mut self, key: &str) -> Vec<&'a str> {
        let mut values = Vec::new();
        while let Some((_, v)) = self.fields.next_if(|(k, _)| k == key) {
            values.push(v.as_str());
        }
        values
    }

    /// Remaining headers, none of which may repeat a fixed-position key.
    fn rest(self, reserved: &[&str]) -> StoreResult<Vec<(String, String)>> {
        let kind = self.kind;
        self.fields
            .map(|(k, v)| {
                if reserved.contains(&k.as_str()) {
                    Err(StoreError::malformed(format!(
                        "{kind} header {k:?} is out of order"
                    )))
                } else {
                    Ok((k.clone(), v.clone()))
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

const COMMIT_HEADERS: &[&str] = &["tree", "parent", "author", "committer"];

/// Commit object. Header order on disk is `tree`, `parent`*, `author`,
/// `committer`, then any extra headers in their original order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Further headers such as `gpgsig`, `encoding`, or `mergetag`.
    extra_headers: Vec<(String, String)>,
    pub message: String,
}

impl Commit {
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            committer,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Value of an extra header such as `gpgsig`.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Extra headers in on-disk order.
    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    /// Append an extra header after `committer`. The value may span lines.
    pub fn push_header(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> StoreResult<()> {
        let key = key.into();
        validate_extra_key("commit", COMMIT_HEADERS, &key)?;
        self.extra_headers.push((key, value.into()));
        Ok(())
    }

    fn to_kvlm(&self) -> Kvlm {
        let mut kvlm = Kvlm::new();
        kvlm.push("tree", self.tree.to_hex());
        for parent in &self.parents {
            kvlm.push("parent", parent.to_hex());
        }
        kvlm.push("author", self.author.to_string());
        kvlm.push("committer", self.committer.to_string());
        kvlm.fields.extend(self.extra_headers.iter().cloned());
        kvlm.message = self.message.clone();
        kvlm
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.to_kvlm().serialize()
    }

    pub fn deserialize(raw: &[u8]) -> StoreResult<Self> {
        let kvlm = Kvlm::parse(raw)?;
        let mut cursor = HeaderCursor::new(&kvlm, "commit");

        let tree = parse_id("tree", cursor.expect("tree")?)?;
        let parents = cursor
            .take_repeated("parent")
            .into_iter()
            .map(|v| parse_id("parent", v))
            .collect::<StoreResult<Vec<_>>>()?;
        let author = parse_signature("author", cursor.expect("author")?)?;
        let committer = parse_signature("committer", cursor.expect("committer")?)?;
        let extra_headers = cursor.rest(COMMIT_HEADERS)?;

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            extra_headers,
            message: kvlm.message,
        })
    }
}

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

const TAG_HEADERS: &[&str] = &["object", "type", "tag", "tagger"];

/// Annotated tag object. Header order on disk is `object`, `type`, `tag`,
/// `tagger`, then any extra headers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub object: ObjectId,
    pub target_kind: ObjectKind,
    name: String,
    pub tagger: Signature,
    extra_headers: Vec<(String, String)>,
    pub message: String,
}

fn validate_tag_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('\n') {
        return Err(StoreError::malformed(format!("invalid tag name {name:?}")));
    }
    Ok(())
}

impl Tag {
    /// Create a tag. The name must be non-empty and fit on one line.
    pub fn new(
        object: ObjectId,
        target_kind: ObjectKind,
        name: impl Into<String>,
        tagger: Signature,
        message: impl Into<String>,
    ) -> StoreResult<Self> {
        let name = name.into();
        validate_tag_name(&name)?;
        Ok(Self {
            object,
            target_kind,
            name,
            tagger,
            extra_headers: Vec::new(),
            message: message.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extra headers in on-disk order.
    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    /// Append an extra header after `tagger`.
    pub fn push_header(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> StoreResult<()> {
        let key = key.into();
        validate_extra_key("tag", TAG_HEADERS, &key)?;
        self.extra_headers.push((key, value.into()));
        Ok(())
    }

    fn to_kvlm(&self) -> Kvlm {
        let mut kvlm = Kvlm::new();
        kvlm.push("object", self.object.to_hex());
        kvlm.push("type", self.target_kind.name());
        kvlm.push("tag", self.name.clone());
        kvlm.push("tagger", self.tagger.to_string());
        kvlm.fields.extend(self.extra_headers.iter().cloned());
        kvlm.message = self.message.clone();
        kvlm
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.to_kvlm().serialize()
    }

    pub fn deserialize(raw: &[u8]) -> StoreResult<Self> {
        let kvlm = Kvlm::parse(raw)?;
        let mut cursor = HeaderCursor::new(&kvlm, "tag");

        let object = parse_id("object", cursor.expect("object")?)?;
        let type_name = cursor.expect("type")?;
        let target_kind = ObjectKind::from_name(type_name).map_err(|_| {
            StoreError::malformed(format!("tag type header names unknown type {type_name:?}"))
        })?;
        let name = cursor.expect("tag")?.to_string();
        validate_tag_name(&name)?;
        let tagger = parse_signature("tagger", cursor.expect("tagger")?)?;
        let extra_headers = cursor.rest(TAG_HEADERS)?;

        Ok(Self {
            object,
            target_kind,
            name,
            tagger,
            extra_headers,
            message: kvlm.message,
        })
    }
}
