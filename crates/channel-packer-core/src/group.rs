//! Clusters loose source files into material groups sharing a base name.

use crate::model::SuffixMap;
use crate::suffix::resolve_suffix;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Marks where the role suffix was cut out of a group key.
pub const SUFFIX_PLACEHOLDER: &str = "@S@";

/// Source files describing one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    key: String,
    head: String,
    tail: String,
    members: Vec<(String, PathBuf)>,
}

impl Group {
    fn new(head: String, tail: String) -> Self {
        Self {
            key: format!("{head}{SUFFIX_PLACEHOLDER}{tail}"),
            head,
            tail,
            members: Vec::new(),
        }
    }

    /// Relative path without extension, role suffix replaced by [`SUFFIX_PLACEHOLDER`].
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Role -> source path, in order of first appearance.
    pub fn members(&self) -> &[(String, PathBuf)] {
        &self.members
    }

    pub fn member(&self, role: &str) -> Option<&Path> {
        self.members
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, p)| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Group key with the placeholder replaced by `suffix` (no extension).
    ///
    /// Only the position recorded at grouping time is substituted, so a literal
    /// placeholder sequence elsewhere in the name is left alone.
    pub fn output_stem(&self, suffix: &str) -> String {
        format!("{}{}{}", self.head, suffix, self.tail)
    }

    /// Registers `path` under `role`; a repeated role keeps its slot and takes the newer path.
    pub fn insert(&mut self, role: impl Into<String>, path: PathBuf) {
        let role = role.into();
        match self.members.iter_mut().find(|(r, _)| *r == role) {
            Some(slot) => {
                debug!(group = %self.key, role = %role, old = %slot.1.display(), new = %path.display(), "role reassigned");
                slot.1 = path;
            }
            None => self.members.push((role, path)),
        }
    }
}

/// Result of grouping: groups by key plus files without a known suffix.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub groups: BTreeMap<String, Group>,
    pub skipped: Vec<PathBuf>,
}

impl Grouping {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }
}

/// Partitions `paths` into groups keyed by their base name relative to `root`.
///
/// Each path lands in exactly one group or in `skipped`. Within a group a role seen
/// twice keeps the later path, so callers wanting stable results should pass a
/// sorted listing.
pub fn group_files<P: AsRef<Path>>(paths: &[P], root: &Path, map: &SuffixMap) -> Grouping {
    let mut out = Grouping::default();
    for path in paths {
        let path = path.as_ref();
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) else {
            warn!(path = %path.display(), "skip: no file name");
            out.skipped.push(path.to_path_buf());
            continue;
        };
        let Some(m) = resolve_suffix(&stem, map) else {
            warn!(path = %path.display(), "skip: no suffix from the suffix map");
            out.skipped.push(path.to_path_buf());
            continue;
        };

        let rel = relative_stem(path, root);
        // the stem is the tail of `rel`; shift the match into `rel` coordinates
        let offset = rel.len().saturating_sub(stem.len());
        let span = m.span();
        let head = rel[..offset + span.start].to_string();
        let tail = rel[offset + span.end..].to_string();

        let role = map.canonical_role(m.suffix).to_string();
        let group = Group::new(head, tail);
        out.groups
            .entry(group.key.clone())
            .or_insert(group)
            .insert(role, path.to_path_buf());
    }
    out
}

/// Path relative to `root` without its extension, `/`-separated.
fn relative_stem(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = rel.with_extension("");
    rel.to_string_lossy().replace('\\', "/")
}
