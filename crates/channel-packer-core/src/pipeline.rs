use crate::bands::{ImageDecoder, load_bands};
use crate::compose::compose;
use crate::config::{OutputFormat, PackConfig};
use crate::error::{ChannelPackerError, Result};
use crate::group::{Group, Grouping, group_files};
use crate::model::PackSpec;
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Asked before a packed texture replaces an existing file in the source directory.
pub trait ConfirmOverwrite {
    fn confirm(&self, path: &Path) -> bool;
}

impl<F: Fn(&Path) -> bool> ConfirmOverwrite for F {
    fn confirm(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Receives finished textures. Called sequentially, in group order.
pub trait TextureSink {
    fn write(&mut self, path: &Path, image: &DynamicImage, format: OutputFormat) -> Result<()>;
}

impl<F> TextureSink for F
where
    F: FnMut(&Path, &DynamicImage, OutputFormat) -> Result<()>,
{
    fn write(&mut self, path: &Path, image: &DynamicImage, format: OutputFormat) -> Result<()> {
        self(path, image, format)
    }
}

/// Writes textures to disk with [`save_texture`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink;

impl TextureSink for FileSink {
    fn write(&mut self, path: &Path, image: &DynamicImage, format: OutputFormat) -> Result<()> {
        save_texture(path, image, format)
    }
}

/// Encodes `image` to `path`, creating missing parent directories.
/// JPEG has no alpha, so RGBA (and gray-alpha) images are flattened to RGB first.
pub fn save_texture(path: &Path, image: &DynamicImage, format: OutputFormat) -> Result<()> {
    let wrap = |source: image::ImageError| ChannelPackerError::DestinationWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!(dir = %parent.display(), "creating output directory");
            std::fs::create_dir_all(parent).map_err(|e| wrap(image::ImageError::IoError(e)))?;
        }
    }
    if matches!(format, OutputFormat::Jpg) && image.color().has_alpha() {
        let flat = DynamicImage::ImageRgb8(image.to_rgb8());
        return flat.save_with_format(path, format.image_format()).map_err(wrap);
    }
    image
        .save_with_format(path, format.image_format())
        .map_err(wrap)
}

/// A composed texture waiting to be emitted.
#[derive(Debug, Clone)]
pub struct PackedTexture {
    pub suffix: String,
    pub path: PathBuf,
    pub image: DynamicImage,
}

/// Something worth reporting that did not stop the run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackEvent {
    /// File skipped: none of the configured suffixes occurs in its name.
    UnresolvedSuffix { path: PathBuf },
    /// Target skipped because its output exists and overwriting is off.
    OutputExists { path: PathBuf },
    /// Role treated as missing because its source could not be decoded.
    DecodeFailed {
        group: String,
        role: String,
        path: PathBuf,
        error: String,
    },
    /// Target could not be assembled (channel count or size mismatch).
    TargetFailed {
        group: String,
        suffix: String,
        error: String,
    },
    /// Target has no contributing source in this group; nothing written.
    EmptyTarget { group: String, suffix: String },
    OverwriteDeclined { path: PathBuf },
    WriteFailed { path: PathBuf, error: String },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    /// Every target already existed; no source was decoded.
    Skipped,
    Emitted {
        written: usize,
        declined: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GroupReport {
    pub key: String,
    #[serde(flatten)]
    pub status: GroupStatus,
}

/// Outcome of a packing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackReport {
    /// Paths handed to the sink successfully, in emission order.
    pub written: Vec<PathBuf>,
    pub events: Vec<PackEvent>,
    pub groups: Vec<GroupReport>,
}

impl PackReport {
    /// Number of groups left out entirely because all their outputs existed.
    pub fn skipped_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.status, GroupStatus::Skipped))
            .count()
    }

    /// True if any decode, compose or write step failed.
    pub fn has_failures(&self) -> bool {
        self.events.iter().any(|e| {
            matches!(
                e,
                PackEvent::DecodeFailed { .. }
                    | PackEvent::TargetFailed { .. }
                    | PackEvent::WriteFailed { .. }
            )
        })
    }

    /// Returns a human-readable summary of the run.
    pub fn summary(&self) -> String {
        format!(
            "Groups: {}, Skipped: {}, Written: {}, Events: {}",
            self.groups.len(),
            self.skipped_groups(),
            self.written.len(),
            self.events.len(),
        )
    }
}

/// Destination of `suffix` for `group`: group key with the suffix substituted,
/// plus the output extension, below `dest_dir`. `lowercase_names` applies to the
/// part below `dest_dir` only.
pub fn output_path(cfg: &PackConfig, group: &Group, suffix: &str) -> PathBuf {
    let mut rel = format!(
        "{}.{}",
        group.output_stem(suffix),
        cfg.output_format.extension()
    );
    if cfg.lowercase_names {
        rel = rel.to_lowercase();
    }
    cfg.dest_dir.join(rel)
}

/// Pack targets still to build for `group`, plus the outputs that already exist.
/// With `overwrite` on nothing is filtered.
pub fn pending_targets(cfg: &PackConfig, group: &Group) -> (PackSpec, Vec<PathBuf>) {
    if cfg.overwrite {
        return (cfg.pack_spec.clone(), Vec::new());
    }
    let mut existing = Vec::new();
    let spec = cfg.pack_spec.filtered(|t| {
        let path = output_path(cfg, group, &t.suffix);
        if path.exists() {
            debug!(path = %path.display(), "skip: file exists");
            existing.push(path);
            false
        } else {
            true
        }
    });
    (spec, existing)
}

/// Loaded and composed outputs of one group, not yet emitted.
#[derive(Debug, Clone)]
pub struct ComposedGroup {
    pub key: String,
    pub textures: Vec<PackedTexture>,
    pub events: Vec<PackEvent>,
}

/// Decodes the roles `spec` needs (each source once) and composes every target.
#[instrument(skip_all, fields(group = group.key()))]
pub fn compose_group(
    cfg: &PackConfig,
    group: &Group,
    spec: &PackSpec,
    decoder: &dyn ImageDecoder,
) -> ComposedGroup {
    let key = group.key().to_string();
    let mut events = Vec::new();
    let (bands, failures) = load_bands(group, spec, decoder);
    for f in failures {
        events.push(PackEvent::DecodeFailed {
            group: key.clone(),
            role: f.role,
            path: f.path,
            error: f.error.to_string(),
        });
    }

    let mut textures = Vec::new();
    for target in spec.iter() {
        match compose(&bands, &target.rules) {
            Ok(Some(image)) => textures.push(PackedTexture {
                suffix: target.suffix.clone(),
                path: output_path(cfg, group, &target.suffix),
                image,
            }),
            Ok(None) => {
                debug!(suffix = %target.suffix, "no source channels, nothing to pack");
                events.push(PackEvent::EmptyTarget {
                    group: key.clone(),
                    suffix: target.suffix.clone(),
                });
            }
            Err(e) => {
                warn!(suffix = %target.suffix, error = %e, "target skipped");
                events.push(PackEvent::TargetFailed {
                    group: key.clone(),
                    suffix: target.suffix.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    ComposedGroup {
        key,
        textures,
        events,
    }
}

struct Emitter<'a> {
    dest_is_src: bool,
    format: OutputFormat,
    confirm: &'a dyn ConfirmOverwrite,
    sink: &'a mut dyn TextureSink,
}

impl Emitter<'_> {
    fn emit(&mut self, composed: ComposedGroup, report: &mut PackReport) {
        let (mut written, mut declined, mut failed) = (0, 0, 0);
        report.events.extend(composed.events);
        for tex in composed.textures {
            if self.dest_is_src && tex.path.exists() && !self.confirm.confirm(&tex.path) {
                info!(path = %tex.path.display(), "overwrite declined");
                report
                    .events
                    .push(PackEvent::OverwriteDeclined { path: tex.path });
                declined += 1;
                continue;
            }
            match self.sink.write(&tex.path, &tex.image, self.format) {
                Ok(()) => {
                    info!(path = %tex.path.display(), "saved");
                    report.written.push(tex.path);
                    written += 1;
                }
                Err(e) => {
                    warn!(path = %tex.path.display(), error = %e, "write failed");
                    report.events.push(PackEvent::WriteFailed {
                        path: tex.path,
                        error: e.to_string(),
                    });
                    failed += 1;
                }
            }
        }
        report.groups.push(GroupReport {
            key: composed.key,
            status: GroupStatus::Emitted {
                written,
                declined,
                failed,
            },
        });
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Packs already-grouped sources and hands each texture to `sink`.
///
/// Groups whose outputs all exist (overwrite off) are reported as skipped before any
/// decode. With feature "parallel" and `cfg.parallel`, loading and composition run on
/// the rayon pool one batch of groups at a time; emission stays sequential.
#[instrument(skip_all)]
pub fn pack_groups(
    cfg: &PackConfig,
    grouping: &Grouping,
    decoder: &dyn ImageDecoder,
    confirm: &dyn ConfirmOverwrite,
    sink: &mut dyn TextureSink,
) -> PackReport {
    let mut report = PackReport::default();
    for path in &grouping.skipped {
        report
            .events
            .push(PackEvent::UnresolvedSuffix { path: path.clone() });
    }

    let mut pending: Vec<(&Group, PackSpec)> = Vec::new();
    for group in grouping.iter() {
        let (spec, existing) = pending_targets(cfg, group);
        report
            .events
            .extend(existing.into_iter().map(|path| PackEvent::OutputExists { path }));
        if spec.is_empty() && !cfg.pack_spec.is_empty() {
            debug!(group = group.key(), "skip group: all outputs exist");
            report.groups.push(GroupReport {
                key: group.key().to_string(),
                status: GroupStatus::Skipped,
            });
        } else {
            pending.push((group, spec));
        }
    }

    let mut emitter = Emitter {
        dest_is_src: same_dir(&cfg.src_dir, &cfg.dest_dir),
        format: cfg.output_format,
        confirm,
        sink,
    };

    #[cfg(feature = "parallel")]
    {
        if cfg.parallel {
            let batch = rayon::current_num_threads().max(1);
            for chunk in pending.chunks(batch) {
                let composed: Vec<ComposedGroup> = chunk
                    .par_iter()
                    .map(|(group, spec)| compose_group(cfg, group, spec, decoder))
                    .collect();
                for c in composed {
                    emitter.emit(c, &mut report);
                }
            }
            return report;
        }
    }

    for (group, spec) in &pending {
        let composed = compose_group(cfg, group, spec, decoder);
        emitter.emit(composed, &mut report);
    }
    report
}

/// Full run over a directory listing: validates, groups, packs and emits.
///
/// Fails only on setup errors: a missing source directory or an invalid configuration.
/// `paths` is sorted before grouping so role collisions resolve the same way every run.
#[instrument(skip_all)]
pub fn pack_files(
    cfg: &PackConfig,
    paths: &[PathBuf],
    decoder: &dyn ImageDecoder,
    confirm: &dyn ConfirmOverwrite,
    sink: &mut dyn TextureSink,
) -> Result<PackReport> {
    if !cfg.src_dir.is_dir() {
        return Err(ChannelPackerError::SourceDirMissing(cfg.src_dir.clone()));
    }
    cfg.validate()?;

    let mut sorted = paths.to_vec();
    sorted.sort();
    let grouping = group_files(&sorted, &cfg.src_dir, &cfg.suffix_map);
    info!(
        files = sorted.len(),
        groups = grouping.len(),
        skipped = grouping.skipped.len(),
        "grouped sources"
    );
    Ok(pack_groups(cfg, &grouping, decoder, confirm, sink))
}
