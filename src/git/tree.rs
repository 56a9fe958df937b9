//! git::tree
//!
//! Structured tree listings.
//!
//! A [`TreeSnapshot`] is the decoded form of one tree object: its entries in
//! stored order, each carrying the raw name bytes and raw filemode so that
//! writing the snapshot back produces a byte-identical object. Rewrites work
//! on these discrete entries keyed by name, never on serialized text.

use crate::core::types::Oid;

/// Filemode of a gitlink (commit-reference) entry.
pub const GITLINK_MODE: u32 = 0o160000;
/// Filemode of a subtree entry.
pub const TREE_MODE: u32 = 0o040000;

/// What a tree entry points at, derived from its filemode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// File content (regular, executable, or symlink).
    Blob,
    /// A subdirectory.
    Tree,
    /// A pinned commit of a nested repository.
    Commit,
}

impl EntryKind {
    /// Classify a raw filemode the way Git does (by its type bits).
    pub fn from_mode(mode: u32) -> Self {
        match mode & 0o170000 {
            0o040000 => EntryKind::Tree,
            0o160000 => EntryKind::Commit,
            _ => EntryKind::Blob,
        }
    }

    /// Get a human-readable description of the kind.
    pub fn description(&self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
            EntryKind::Commit => "commit-reference",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry name exactly as stored (not necessarily UTF-8).
    pub name: Vec<u8>,
    /// Raw filemode as stored.
    pub mode: u32,
    /// Target object id.
    pub oid: Oid,
}

impl TreeEntry {
    /// Create an entry from a UTF-8 name.
    pub fn new(name: impl Into<String>, mode: u32, oid: Oid) -> Self {
        Self {
            name: name.into().into_bytes(),
            mode,
            oid,
        }
    }

    /// The entry kind derived from its mode.
    pub fn kind(&self) -> EntryKind {
        EntryKind::from_mode(self.mode)
    }

    /// Whether this entry is a gitlink.
    pub fn is_gitlink(&self) -> bool {
        self.kind() == EntryKind::Commit
    }

    /// Whether the entry name equals `name`.
    pub fn has_name(&self, name: &str) -> bool {
        self.name == name.as_bytes()
    }

    /// The name as UTF-8, lossily, for display.
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Ordered listing of one tree object.
///
/// Order is the stored (canonical) order and is never changed by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    entries: Vec<TreeEntry>,
}

impl TreeSnapshot {
    /// Wrap entries that are already in stored order.
    pub fn from_entries(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    /// All entries in order.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the entry called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.has_name(name))
    }

    /// The entry called `name`.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.position(name).map(|i| &self.entries[i])
    }

    /// Copy of this snapshot with the target of entry `index` replaced.
    /// Name, mode and position of every entry are preserved.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn with_target(&self, index: usize, oid: Oid) -> Self {
        let mut entries = self.entries.clone();
        entries[index].oid = oid;
        Self { entries }
    }
}
