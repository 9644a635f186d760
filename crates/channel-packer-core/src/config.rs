use crate::error::{ChannelPackerError, Result};
use crate::model::{Channel, PackSpec, PackingRule, SuffixMap};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Separates `role:channels` items inside one target's rule text.
pub const RULE_SEPARATOR: char = '|';
/// Separates the role from its channel tokens.
pub const CHANNEL_SEPARATOR: char = ':';
/// Flips the invert flag of the rule added just before it.
pub const INVERT_MARKER: char = '*';

/// Encoded format of packed textures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpg,
    Bmp,
    Tga,
}

impl OutputFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Bmp => "bmp",
            Self::Tga => "tga",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Tga => image::ImageFormat::Tga,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "bmp" => Ok(Self::Bmp),
            "tga" => Ok(Self::Tga),
            _ => Err(()),
        }
    }
}

/// Fully resolved run configuration. Read-only once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackConfig {
    /// Directory holding the source maps.
    #[serde(default)]
    pub src_dir: PathBuf,
    /// Directory receiving packed textures.
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
    /// Rewrite outputs that already exist. When false, existing targets are skipped.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    /// Lowercase output names below `dest_dir`.
    #[serde(default)]
    pub lowercase_names: bool,
    /// Accepted source extensions, with leading dot, compared case-insensitively.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_suffix_map")]
    pub suffix_map: SuffixMap,
    #[serde(default = "default_pack_spec")]
    pub pack_spec: PackSpec,
    /// Compose groups on the rayon pool when feature "parallel" is on.
    #[serde(default)]
    pub parallel: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::new(),
            dest_dir: default_dest_dir(),
            output_format: default_output_format(),
            overwrite: default_overwrite(),
            lowercase_names: false,
            extensions: default_extensions(),
            suffix_map: default_suffix_map(),
            pack_spec: default_pack_spec(),
            parallel: false,
        }
    }
}

impl PackConfig {
    /// Validates the configuration.
    ///
    /// Returns `ConfigInvalid` if there is nothing to match against (no extensions or
    /// no suffixes) or a pack target has a rule count that cannot form an image.
    pub fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            return Err(ChannelPackerError::ConfigInvalid(
                "no source extensions configured".into(),
            ));
        }
        if self.suffix_map.is_empty() {
            return Err(ChannelPackerError::ConfigInvalid(
                "suffix map is empty".into(),
            ));
        }
        for entry in self.suffix_map.iter() {
            if entry.suffix.is_empty() {
                return Err(ChannelPackerError::ConfigInvalid(
                    "suffix map contains an empty suffix".into(),
                ));
            }
        }
        for target in self.pack_spec.iter() {
            if target.suffix.is_empty() {
                return Err(ChannelPackerError::ConfigInvalid(
                    "pack target with empty suffix".into(),
                ));
            }
            if target.rules.is_empty() || target.rules.len() > 4 {
                return Err(ChannelPackerError::ConfigInvalid(format!(
                    "pack target '{}' has {} rules (expected 1..=4)",
                    target.suffix,
                    target.rules.len()
                )));
            }
        }
        Ok(())
    }

    /// True if `ext` (with or without leading dot) is an accepted source extension.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.extensions
            .iter()
            .any(|e| e.trim().trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("dest")
}
fn default_output_format() -> OutputFormat {
    OutputFormat::Png
}
fn default_overwrite() -> bool {
    true
}
fn default_extensions() -> Vec<String> {
    vec![".png".into(), ".jpg".into(), ".tga".into()]
}

/// Suffix table for a Godot-style albedo / ORM / normal / height pipeline.
pub fn default_suffix_map() -> SuffixMap {
    SuffixMap::new()
        .with("_base_color", "_albedo")
        .with("_color", "_albedo")
        .with("_ambient_occlusion", "_ao")
        .with("_albedo", "")
        .with("_normal", "")
        .with("_ao", "")
        .with("_roughness", "")
        .with("_metallic", "")
        .with("_height", "")
}

pub fn default_pack_spec() -> PackSpec {
    use Channel::*;
    PackSpec::new()
        .with(
            "_albedo",
            vec![
                PackingRule::new("_albedo", R),
                PackingRule::new("_albedo", G),
                PackingRule::new("_albedo", B),
            ],
        )
        .with(
            "_orm",
            vec![
                PackingRule::new("_ao", R),
                PackingRule::new("_roughness", R),
                PackingRule::new("_metallic", R),
            ],
        )
        .with(
            "_normal",
            vec![
                PackingRule::new("_normal", R),
                PackingRule::new("_normal", G).inverted(),
                PackingRule::new("_normal", B),
            ],
        )
}

/// Accumulates rules token by token; an invert marker mutates the pending rule.
#[derive(Debug, Default)]
struct RuleBuilder {
    rules: Vec<PackingRule>,
    last_rule: Option<PackingRule>,
    last_was_marker: bool,
}

impl RuleBuilder {
    fn channel(&mut self, role: &str, channel: Channel) {
        if let Some(prev) = self.last_rule.take() {
            self.rules.push(prev);
        }
        self.last_rule = Some(PackingRule::new(role, channel));
        self.last_was_marker = false;
    }

    fn invert(&mut self, item: &str) -> Result<()> {
        match self.last_rule.as_mut() {
            Some(rule) if !self.last_was_marker => {
                rule.invert = true;
                self.last_was_marker = true;
                Ok(())
            }
            Some(_) => Err(ChannelPackerError::ConfigInvalid(format!(
                "repeated '{INVERT_MARKER}' in '{item}'"
            ))),
            None => Err(ChannelPackerError::ConfigInvalid(format!(
                "'{INVERT_MARKER}' without a preceding channel in '{item}'"
            ))),
        }
    }

    /// Item boundary: a marker may not reach back into the previous item.
    fn end_item(&mut self) {
        if let Some(prev) = self.last_rule.take() {
            self.rules.push(prev);
        }
        self.last_was_marker = false;
    }

    fn finish(mut self) -> Vec<PackingRule> {
        self.end_item();
        self.rules
    }
}

/// Parses rule text such as `_normal:r | _normal:g* | _normal:b` or `_normal:rg*b`.
pub fn parse_rules(text: &str) -> Result<Vec<PackingRule>> {
    let mut builder = RuleBuilder::default();
    for item in text.split(RULE_SEPARATOR).map(str::trim) {
        if item.is_empty() {
            return Err(ChannelPackerError::ConfigInvalid(format!(
                "empty rule item in '{text}'"
            )));
        }
        let Some((role, tokens)) = item.split_once(CHANNEL_SEPARATOR) else {
            return Err(ChannelPackerError::ConfigInvalid(format!(
                "rule '{item}' is missing '{CHANNEL_SEPARATOR}'"
            )));
        };
        let role = role.trim();
        let tokens = tokens.trim();
        if role.is_empty() {
            return Err(ChannelPackerError::ConfigInvalid(format!(
                "rule '{item}' has no source role"
            )));
        }
        if tokens.is_empty() {
            return Err(ChannelPackerError::ConfigInvalid(format!(
                "rule '{item}' has no channels"
            )));
        }
        for tok in tokens.chars() {
            match tok.to_ascii_lowercase() {
                'r' => builder.channel(role, Channel::R),
                'g' => builder.channel(role, Channel::G),
                'b' => builder.channel(role, Channel::B),
                'a' => builder.channel(role, Channel::A),
                INVERT_MARKER => builder.invert(item)?,
                other => {
                    return Err(ChannelPackerError::ConfigInvalid(format!(
                        "unknown channel token '{other}' in '{item}'"
                    )));
                }
            }
        }
        builder.end_item();
    }
    Ok(builder.finish())
}

/// Inverse of [`parse_rules`]: one `role:channel` item per rule.
pub fn format_rules(rules: &[PackingRule]) -> String {
    rules
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Builder for `PackConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct PackConfigBuilder {
    cfg: PackConfig,
}

impl PackConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: PackConfig::default(),
        }
    }
    pub fn src_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.src_dir = v.into();
        self
    }
    pub fn dest_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.dest_dir = v.into();
        self
    }
    pub fn output_format(mut self, v: OutputFormat) -> Self {
        self.cfg.output_format = v;
        self
    }
    pub fn overwrite(mut self, v: bool) -> Self {
        self.cfg.overwrite = v;
        self
    }
    pub fn lowercase_names(mut self, v: bool) -> Self {
        self.cfg.lowercase_names = v;
        self
    }
    pub fn extensions<I, S>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.extensions = v.into_iter().map(Into::into).collect();
        self
    }
    pub fn suffix_map(mut self, v: SuffixMap) -> Self {
        self.cfg.suffix_map = v;
        self
    }
    pub fn pack_spec(mut self, v: PackSpec) -> Self {
        self.cfg.pack_spec = v;
        self
    }
    pub fn parallel(mut self, v: bool) -> Self {
        self.cfg.parallel = v;
        self
    }
    pub fn build(self) -> PackConfig {
        self.cfg
    }
}

impl PackConfig {
    /// Create a fluent builder for `PackConfig`.
    pub fn builder() -> PackConfigBuilder {
        PackConfigBuilder::new()
    }
}
