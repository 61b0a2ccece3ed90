use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use strand_types::object::OID_LEN;
use strand_types::ObjectId;

use crate::error::{StoreError, StoreResult};

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree / directory (0o040000).
    Directory,
    /// Submodule commit (0o160000).
    Gitlink,
}

impl EntryMode {
    /// Octal mode value.
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
            Self::Gitlink => 0o160000,
        }
    }

    /// Parse from an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Directory),
            0o160000 => Some(Self::Gitlink),
            _ => None,
        }
    }

    /// Parse the mode field of a tree record.
    ///
    /// Directory modes are commonly written with five digits (`40000`); a
    /// five-digit field is zero-padded to six before it is interpreted.
    pub fn parse(field: &[u8]) -> StoreResult<Self> {
        let padded: Vec<u8> = match field.len() {
            5 => std::iter::once(b'0').chain(field.iter().copied()).collect(),
            6 => field.to_vec(),
            n => {
                return Err(StoreError::malformed(format!(
                    "tree entry mode has {n} digits, expected 5 or 6"
                )))
            }
        };
        let text = std::str::from_utf8(&padded)
            .map_err(|_| StoreError::malformed("tree entry mode is not ASCII"))?;
        u32::from_str_radix(text, 8)
            .ok()
            .filter(|_| text.bytes().all(|b| (b'0'..=b'7').contains(&b)))
            .and_then(Self::from_mode_bits)
            .ok_or_else(|| StoreError::malformed(format!("unsupported tree entry mode {text:?}")))
    }

    /// The mode as written inside tree objects: octal without padding, so a
    /// directory is `40000`.
    pub fn as_record(&self) -> String {
        format!("{:o}", self.mode_bits())
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File mode (regular, executable, symlink, directory, gitlink).
    pub mode: EntryMode,
    /// Entry name: a single path segment.
    pub name: String,
    /// Identifier of the referenced object.
    pub object_id: ObjectId,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }

    /// Canonical tree order: raw name bytes, with directories compared as if
    /// their name ended in `/`.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(other.sort_key())
    }

    fn sort_key(&self) -> impl Iterator<Item = u8> + Clone + '_ {
        let suffix: &[u8] = if self.mode.is_tree() { b"/" } else { b"" };
        self.name.bytes().chain(suffix.iter().copied())
    }

    fn validate_name(name: &str) -> StoreResult<()> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(StoreError::malformed(format!("invalid tree entry name {name:?}")));
        }
        if name.contains('/') || name.contains('\0') {
            return Err(StoreError::malformed(format!(
                "tree entry name {name:?} is not a single path segment"
            )));
        }
        Ok(())
    }
}

/// Directory snapshot: entries in canonical order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree, sorting entries into canonical order.
    ///
    /// Fails on invalid names or two entries with the same sort key.
    pub fn new(mut entries: Vec<TreeEntry>) -> StoreResult<Self> {
        for entry in &entries {
            TreeEntry::validate_name(&entry.name)?;
        }
        entries.sort_by(TreeEntry::canonical_cmp);
        if let Some(pair) = entries
            .windows(2)
            .find(|w| w[0].canonical_cmp(&w[1]) == Ordering::Equal)
        {
            return Err(StoreError::malformed(format!(
                "duplicate tree entry {:?}",
                pair[1].name
            )));
        }
        Ok(Self { entries })
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Entries in canonical order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode as consecutive `<mode> SP <name> NUL <20-byte id>` records.
    ///
    /// Modes are written without a leading zero, so a tree read with a
    /// six-digit `040000` directory re-encodes as `40000` and gets a new id.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_record().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.object_id.as_bytes());
        }
        out
    }

    /// Decode tree records, requiring strictly increasing canonical order.
    pub fn deserialize(raw: &[u8]) -> StoreResult<Self> {
        let mut entries: Vec<TreeEntry> = Vec::new();
        let mut pos = 0;

        while pos < raw.len() {
            let space = raw[pos..]
                .iter()
                .position(|&b| b == b' ')
                .map(|p| pos + p)
                .ok_or_else(|| StoreError::malformed(format!("tree entry at {pos} has no mode")))?;
            let mode = EntryMode::parse(&raw[pos..space])?;

            let nul = raw[space..]
                .iter()
                .position(|&b| b == 0)
                .map(|p| space + p)
                .ok_or_else(|| StoreError::malformed("tree entry name is not NUL-terminated"))?;
            let name = String::from_utf8(raw[space + 1..nul].to_vec())
                .map_err(|_| StoreError::malformed("tree entry name is not valid UTF-8"))?;
            TreeEntry::validate_name(&name)?;

            let id_end = nul + 1 + OID_LEN;
            if id_end > raw.len() {
                return Err(StoreError::malformed(format!(
                    "tree entry {name:?} is truncated: needs {OID_LEN} id bytes, has {}",
                    raw.len() - nul - 1
                )));
            }
            let object_id = ObjectId::from_slice(&raw[nul + 1..id_end])
                .map_err(|e| StoreError::malformed(e.to_string()))?;

            let entry = TreeEntry::new(mode, name, object_id);
            if let Some(prev) = entries.last() {
                if prev.canonical_cmp(&entry) != Ordering::Less {
                    return Err(StoreError::malformed(format!(
                        "tree entries out of order: {:?} before {:?}",
                        prev.name, entry.name
                    )));
                }
            }
            entries.push(entry);
            pos = id_end;
        }

        Ok(Self { entries })
    }
}

impl<'a> IntoIterator for &'a Tree {
    type Item = &'a TreeEntry;
    type IntoIter = std::slice::Iter<'a, TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(seed: &[u8]) -> ObjectId {
        ObjectId::digest(seed)
    }

    fn record(mode: &str, name: &str, id: &ObjectId) -> Vec<u8> {
        let mut out = format!("{mode} {name}\0").into_bytes();
        out.extend_from_slice(id.as_bytes());
        out
    }

    #[test]
    fn entries_sorted_on_construction() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "zebra.txt", oid(b"z")),
            TreeEntry::new(EntryMode::Regular, "alpha.txt", oid(b"a")),
            TreeEntry::new(EntryMode::Directory, "middle", oid(b"m")),
        ])
        .unwrap();
        let names: Vec<_> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["alpha.txt", "middle", "zebra.txt"]);
    }

    #[test]
    fn directories_sort_as_if_slash_appended() {
        // '.' (0x2e) < '/' (0x2f) < '0' (0x30)
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "foo0", oid(b"1")),
            TreeEntry::new(EntryMode::Directory, "foo", oid(b"2")),
            TreeEntry::new(EntryMode::Regular, "foo.txt", oid(b"3")),
        ])
        .unwrap();
        let names: Vec<_> = tree.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["foo.txt", "foo", "foo0"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "same", oid(b"1")),
            TreeEntry::new(EntryMode::Executable, "same", oid(b"2")),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::MalformedObject { .. }));
    }

    #[test]
    fn names_with_slash_are_rejected() {
        assert!(Tree::new(vec![TreeEntry::new(EntryMode::Regular, "a/b", oid(b"1"))]).is_err());
        assert!(Tree::new(vec![TreeEntry::new(EntryMode::Regular, "", oid(b"1"))]).is_err());
    }

    #[test]
    fn five_digit_mode_is_padded() {
        assert_eq!(EntryMode::parse(b"40000").unwrap(), EntryMode::Directory);
        assert_eq!(EntryMode::parse(b"040000").unwrap(), EntryMode::Directory);
        assert_eq!(EntryMode::Directory.to_string(), "040000");
    }

    #[test]
    fn bad_modes_are_rejected() {
        assert!(EntryMode::parse(b"100").is_err());
        assert!(EntryMode::parse(b"100645").is_err());
        assert!(EntryMode::parse(b"10064x").is_err());
        assert!(EntryMode::parse(b"1000644").is_err());
    }

    #[test]
    fn git_encoded_tree_roundtrips_byte_identical() {
        let blob = oid(b"blob");
        let sub = oid(b"sub");
        let mut raw = record("100644", "README", &blob);
        raw.extend(record("40000", "src", &sub));

        let tree = Tree::deserialize(&raw).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("src").unwrap().mode, EntryMode::Directory);
        assert_eq!(tree.serialize(), raw);
    }

    #[test]
    fn six_digit_directory_mode_reencodes_canonically() {
        let mut raw = record("040000", "dir", &oid(b"d"));
        let tree = Tree::deserialize(&raw).unwrap();
        let encoded = tree.serialize();
        raw.remove(0);
        assert_eq!(encoded, raw);
        assert_eq!(Tree::deserialize(&encoded).unwrap(), tree);
    }

    #[test]
    fn encode_decode_encode_is_stable() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Executable, "run.sh", oid(b"run")),
            TreeEntry::new(EntryMode::Symlink, "link", oid(b"link")),
            TreeEntry::new(EntryMode::Gitlink, "vendor", oid(b"vendor")),
            TreeEntry::new(EntryMode::Directory, "lib", oid(b"lib")),
        ])
        .unwrap();
        let first = tree.serialize();
        let decoded = Tree::deserialize(&first).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(decoded.serialize(), first);
    }

    #[test]
    fn out_of_order_entries_are_malformed() {
        let mut raw = record("100644", "b", &oid(b"b"));
        raw.extend(record("100644", "a", &oid(b"a")));
        let err = Tree::deserialize(&raw).unwrap_err();
        assert!(err.to_string().contains("out of order"), "{err}");
    }

    #[test]
    fn truncated_id_is_malformed() {
        let mut raw = record("100644", "file", &oid(b"f"));
        raw.truncate(raw.len() - 3);
        assert!(matches!(Tree::deserialize(&raw), Err(StoreError::MalformedObject { .. })));
    }

    #[test]
    fn missing_nul_is_malformed() {
        assert!(Tree::deserialize(b"100644 file-without-terminator").is_err());
    }

    #[test]
    fn empty_payload_is_empty_tree() {
        let tree = Tree::deserialize(b"").unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree, Tree::empty());
    }

    #[test]
    fn iterates_in_order() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "b", oid(b"b")),
            TreeEntry::new(EntryMode::Regular, "a", oid(b"a")),
        ])
        .unwrap();
        let names: Vec<_> = (&tree).into_iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
