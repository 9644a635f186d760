//! Core library for packing grayscale texture maps into multi-channel textures.
//!
//! - Grouping: source files are clustered by base name once their role suffix
//!   (`_roughness`, `_base_color`, ...) is resolved through a [`SuffixMap`]
//! - Packing: each [`PackSpec`] target lists which source plane feeds which output
//!   channel, optionally inverted; missing sources become black planes
//! - Pipeline: [`pack_files`] drives grouping, decoding, composition and emission
//!   through caller-supplied decoder / confirmation / sink collaborators
//!
//! Quick example:
//! ```ignore
//! use channel_packer_core::prelude::*;
//! # fn main() -> anyhow::Result<()> {
//! let cfg = PackConfig::builder()
//!     .src_dir("textures")
//!     .dest_dir("packed")
//!     .overwrite(false)
//!     .build();
//! let paths = vec!["textures/wall_roughness.png".into(), "textures/wall_ao.png".into()];
//! let report = pack_files(&cfg, &paths, &FileDecoder, &|_: &std::path::Path| false, &mut FileSink)?;
//! println!("{}", report.summary());
//! # Ok(()) }
//! ```

pub mod bands;
pub mod compose;
pub mod config;
pub mod config_file;
pub mod error;
pub mod group;
pub mod model;
pub mod pipeline;
pub mod suffix;

pub use bands::*;
pub use compose::*;
pub use config::*;
pub use config_file::*;
pub use error::*;
pub use group::*;
pub use model::*;
pub use pipeline::*;
pub use suffix::*;

/// Convenience prelude for common types and functions.
/// Importing `channel_packer_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::bands::{
        ChannelBand, FileDecoder, ImageDecoder, MemoryDecoder, RoleBands, load_bands,
        split_channels,
    };
    pub use crate::compose::{compose, merge_channels};
    pub use crate::config::{OutputFormat, PackConfig, PackConfigBuilder, parse_rules};
    pub use crate::error::{ChannelPackerError, Result};
    pub use crate::group::{Group, Grouping, SUFFIX_PLACEHOLDER, group_files};
    pub use crate::model::{Channel, PackSpec, PackTarget, PackingRule, SuffixMap};
    pub use crate::pipeline::{
        ConfirmOverwrite, FileSink, PackEvent, PackReport, TextureSink, pack_files, pack_groups,
    };
    pub use crate::suffix::resolve_suffix;
}
