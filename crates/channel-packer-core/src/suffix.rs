//! Suffix resolution: which role does a file stem carry, and where.

use crate::model::SuffixMap;

/// A raw suffix located inside a stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuffixMatch<'a> {
    /// Raw suffix as declared in the map.
    pub suffix: &'a str,
    /// Byte offset of the right-most occurrence in the stem.
    pub index: usize,
}

impl SuffixMatch<'_> {
    /// Byte range of the match inside the stem.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.index..self.index + self.suffix.len()
    }
}

/// Finds the first map entry (declared order) occurring anywhere in `stem`,
/// comparing case-insensitively, and returns its right-most position.
///
/// The map is never re-sorted here: callers that want the most specific suffix
/// to win must declare longer suffixes first (see [`SuffixMap::sort_longest_first`]).
/// ASCII lowercasing keeps byte offsets valid for the unmodified stem.
pub fn resolve_suffix<'a>(stem: &str, map: &'a SuffixMap) -> Option<SuffixMatch<'a>> {
    let lowered = stem.to_ascii_lowercase();
    map.iter().find_map(|entry| {
        if entry.suffix.is_empty() {
            return None;
        }
        let needle = entry.suffix.to_ascii_lowercase();
        lowered.rfind(needle.as_str()).map(|index| SuffixMatch {
            suffix: entry.suffix.as_str(),
            index,
        })
    })
}
