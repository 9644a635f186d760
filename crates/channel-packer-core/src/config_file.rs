//! Sectioned text configuration.
//!
//! ```text
//! # comment
//! [settings]
//! dest_dir > packed
//! overwrite > false
//! [filters]
//! .png
//! [map suffixes]
//! _base_color > _albedo
//! _roughness
//! [pack]
//! _orm > _ao:r | _roughness:r | _metallic:r
//! ```
//!
//! Settings are typed: a value that does not parse as the key's type is an error.

use crate::config::{OutputFormat, PackConfig, format_rules, parse_rules};
use crate::error::{ChannelPackerError, Result};
use crate::model::{PackSpec, SuffixMap};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ASSIGN_SIGN: char = '>';
pub const COMMENT_SIGN: char = '#';

const SECTION_SETTINGS: &str = "settings";
const SECTION_FILTERS: &str = "filters";
const SECTION_MAP_SUFFIXES: &str = "map suffixes";
const SECTION_PACK: &str = "pack";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingKind {
    Path,
    Bool,
    Format,
}

/// Declared type of every recognised `[settings]` key.
fn setting_kind(key: &str) -> Option<SettingKind> {
    match key {
        "src_dir" | "dest_dir" => Some(SettingKind::Path),
        "overwrite" | "owerwrite" | "lowercase_names" | "parallel" => Some(SettingKind::Bool),
        "output_format" | "save_format" => Some(SettingKind::Format),
        _ => None,
    }
}

fn invalid(line_no: usize, msg: impl std::fmt::Display) -> ChannelPackerError {
    ChannelPackerError::ConfigInvalid(format!("line {line_no}: {msg}"))
}

fn parse_bool(line_no: usize, key: &str, v: &str) -> Result<bool> {
    match v.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(
            line_no,
            format!("'{key}' expects true or false, got '{v}'"),
        )),
    }
}

fn apply_setting(cfg: &mut PackConfig, line_no: usize, key: &str, value: &str) -> Result<()> {
    let Some(kind) = setting_kind(key) else {
        warn!(key, line = line_no, "unknown setting ignored");
        return Ok(());
    };
    match kind {
        SettingKind::Path => {
            let path = PathBuf::from(value);
            if key == "src_dir" {
                cfg.src_dir = path;
            } else {
                cfg.dest_dir = path;
            }
        }
        SettingKind::Bool => {
            let v = parse_bool(line_no, key, value)?;
            match key {
                "lowercase_names" => cfg.lowercase_names = v,
                "parallel" => cfg.parallel = v,
                _ => cfg.overwrite = v,
            }
        }
        SettingKind::Format => {
            cfg.output_format = value.parse::<OutputFormat>().map_err(|_| {
                invalid(
                    line_no,
                    format!("'{key}' expects png, jpg, bmp or tga, got '{value}'"),
                )
            })?;
        }
    }
    Ok(())
}

/// Parses configuration text on top of `base`. Sections that are absent keep `base` values.
///
/// `[map suffixes]` entries are re-ordered longest suffix first so that a short suffix
/// cannot claim a file that carries a longer one.
pub fn parse_config_text(text: &str, base: PackConfig) -> Result<PackConfig> {
    let mut cfg = base;
    let mut section: Option<String> = None;
    let mut filters: Option<Vec<String>> = None;
    let mut suffixes: Option<SuffixMap> = None;
    let mut pack: Option<PackSpec> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT_SIGN) {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_ascii_lowercase();
            match name.as_str() {
                SECTION_FILTERS => {
                    filters.get_or_insert_with(Vec::new);
                }
                SECTION_MAP_SUFFIXES => {
                    suffixes.get_or_insert_with(SuffixMap::new);
                }
                SECTION_PACK => {
                    pack.get_or_insert_with(PackSpec::new);
                }
                SECTION_SETTINGS => {}
                other => warn!(section = other, line = line_no, "unknown section ignored"),
            }
            section = Some(name);
            continue;
        }
        let Some(current) = section.as_deref() else {
            continue;
        };
        match current {
            SECTION_SETTINGS => {
                let Some((key, value)) = line.split_once(ASSIGN_SIGN) else {
                    return Err(invalid(line_no, format!("expected 'key > value', got '{line}'")));
                };
                apply_setting(&mut cfg, line_no, key.trim(), value.trim())?;
            }
            SECTION_FILTERS => {
                if let Some(list) = filters.as_mut() {
                    list.push(line.to_string());
                }
            }
            SECTION_MAP_SUFFIXES => {
                let (raw_suffix, role) = match line.split_once(ASSIGN_SIGN) {
                    Some((s, r)) => (s.trim(), r.trim()),
                    None => (line, ""),
                };
                if raw_suffix.is_empty() {
                    return Err(invalid(line_no, "empty suffix"));
                }
                if let Some(map) = suffixes.as_mut() {
                    map.insert(raw_suffix, role);
                }
            }
            SECTION_PACK => {
                let Some((target, rules)) = line.split_once(ASSIGN_SIGN) else {
                    return Err(invalid(line_no, format!("expected 'target > rules', got '{line}'")));
                };
                let target = target.trim();
                if target.is_empty() {
                    return Err(invalid(line_no, "empty pack target"));
                }
                let rules = parse_rules(rules).map_err(|e| invalid(line_no, e))?;
                if let Some(spec) = pack.as_mut() {
                    spec.insert(target, rules);
                }
            }
            _ => {}
        }
    }

    if let Some(list) = filters {
        cfg.extensions = list;
    }
    if let Some(mut map) = suffixes {
        map.sort_longest_first();
        cfg.suffix_map = map;
    }
    if let Some(spec) = pack {
        cfg.pack_spec = spec;
    }
    Ok(cfg)
}

/// Reads and parses a configuration file on top of `base`.
pub fn load_config_file(path: &Path, base: PackConfig) -> Result<PackConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_config_text(&text, base)
}

/// Renders `cfg` in the sectioned format; [`parse_config_text`] reads it back.
pub fn to_config_text(cfg: &PackConfig) -> String {
    let mut out: Vec<String> = Vec::new();
    out.push(format!("[{SECTION_SETTINGS}]"));
    out.push(format!("src_dir > {}", cfg.src_dir.display()));
    out.push(format!("dest_dir > {}", cfg.dest_dir.display()));
    out.push(format!("output_format > {}", cfg.output_format.extension()));
    out.push(format!("overwrite > {}", cfg.overwrite));
    out.push(format!("lowercase_names > {}", cfg.lowercase_names));
    out.push(format!("parallel > {}", cfg.parallel));

    out.push(format!("[{SECTION_FILTERS}]"));
    out.extend(cfg.extensions.iter().cloned());

    out.push(format!("[{SECTION_MAP_SUFFIXES}]"));
    for e in cfg.suffix_map.iter() {
        if e.role.trim().is_empty() {
            out.push(e.suffix.clone());
        } else {
            out.push(format!("{} > {}", e.suffix, e.role));
        }
    }

    out.push(format!("[{SECTION_PACK}]"));
    for t in cfg.pack_spec.iter() {
        out.push(format!("{} > {}", t.suffix, format_rules(&t.rules)));
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}
