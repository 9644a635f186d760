use serde::{Deserialize, Serialize};
use std::fmt;

/// Source channel selector. `R`..`A` address planes 0..3 of a decoded source image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    R,
    G,
    B,
    A,
}

impl Channel {
    pub fn index(self) -> usize {
        match self {
            Self::R => 0,
            Self::G => 1,
            Self::B => 2,
            Self::A => 3,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Self::R),
            1 => Some(Self::G),
            2 => Some(Self::B),
            3 => Some(Self::A),
            _ => None,
        }
    }

    pub fn token(self) -> char {
        match self {
            Self::R => 'r',
            Self::G => 'g',
            Self::B => 'b',
            Self::A => 'a',
        }
    }
}

/// One output channel: take plane `channel` of the image registered under role
/// `source`, optionally inverted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackingRule {
    pub source: String,
    pub channel: Channel,
    #[serde(default)]
    pub invert: bool,
}

impl PackingRule {
    pub fn new(source: impl Into<String>, channel: Channel) -> Self {
        Self {
            source: source.into(),
            channel,
            invert: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

impl fmt::Display for PackingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.channel.token())?;
        if self.invert {
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// A single output texture: its suffix and the ordered rules producing its channels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackTarget {
    pub suffix: String,
    pub rules: Vec<PackingRule>,
}

/// Ordered table of output suffix -> rules. Order decides emission order only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PackSpec {
    targets: Vec<PackTarget>,
}

impl PackSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a target. Replacing keeps the earlier position.
    pub fn insert(&mut self, suffix: impl Into<String>, rules: Vec<PackingRule>) {
        let suffix = suffix.into();
        match self.targets.iter_mut().find(|t| t.suffix == suffix) {
            Some(t) => t.rules = rules,
            None => self.targets.push(PackTarget { suffix, rules }),
        }
    }

    pub fn with(mut self, suffix: impl Into<String>, rules: Vec<PackingRule>) -> Self {
        self.insert(suffix, rules);
        self
    }

    pub fn get(&self, suffix: &str) -> Option<&[PackingRule]> {
        self.targets
            .iter()
            .find(|t| t.suffix == suffix)
            .map(|t| t.rules.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Distinct source roles referenced by any rule, in first-reference order.
    pub fn referenced_roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = Vec::new();
        for rule in self.targets.iter().flat_map(|t| t.rules.iter()) {
            if !roles.contains(&rule.source.as_str()) {
                roles.push(rule.source.as_str());
            }
        }
        roles
    }

    /// Copy of this spec keeping only the targets for which `keep` returns true.
    pub fn filtered(&self, mut keep: impl FnMut(&PackTarget) -> bool) -> PackSpec {
        PackSpec {
            targets: self.targets.iter().filter(|t| keep(t)).cloned().collect(),
        }
    }
}

/// Raw filename suffix and the canonical role it stands for (empty = same as raw).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuffixEntry {
    pub suffix: String,
    #[serde(default)]
    pub role: String,
}

/// Ordered suffix table. Lookup walks entries in declared order, so longer
/// suffixes must come before the shorter ones they contain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SuffixMap {
    entries: Vec<SuffixEntry>,
}

impl SuffixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mapping. A repeated raw suffix replaces the earlier role in place.
    pub fn insert(&mut self, suffix: impl Into<String>, role: impl Into<String>) {
        let suffix = suffix.into();
        let role = role.into();
        match self.entries.iter_mut().find(|e| e.suffix == suffix) {
            Some(e) => e.role = role,
            None => self.entries.push(SuffixEntry { suffix, role }),
        }
    }

    pub fn with(mut self, suffix: impl Into<String>, role: impl Into<String>) -> Self {
        self.insert(suffix, role);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &SuffixEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical role for a raw suffix; unknown or identity entries yield the raw suffix.
    pub fn canonical_role<'a>(&'a self, raw: &'a str) -> &'a str {
        match self.entries.iter().find(|e| e.suffix == raw) {
            Some(e) if !e.role.trim().is_empty() => e.role.as_str(),
            _ => raw,
        }
    }

    /// Stable sort, longest raw suffix first.
    pub fn sort_longest_first(&mut self) {
        self.entries
            .sort_by(|a, b| b.suffix.len().cmp(&a.suffix.len()));
    }
}
