use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use channel_packer_core::{
    ChannelPackerError, FileDecoder, FileSink, OutputFormat, PackConfig, PackEvent, PackReport,
    TextureSink, load_config_file, pack_files, to_config_text,
};
use clap::{ArgAction, Parser, Subcommand};
use image::DynamicImage;
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

const DEFAULT_CONFIG: &str = "config.txt";

#[derive(Parser, Debug)]
#[command(
    name = "channel-packer",
    about = "Batch-pack grayscale texture maps into multi-channel textures",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack source maps into textures
    Pack(PackArgs),
    /// Write the default configuration in the sectioned text format
    InitConfig(InitArgs),
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    // Input/Output
    /// Config file: sectioned text, or .yaml/.yml/.json. Defaults to ./config.txt when present
    #[arg(short, long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Directory with source textures (overrides config)
    #[arg(short, long = "src", help_heading = "Input/Output")]
    src_dir: Option<PathBuf>,
    /// Destination directory (overrides config)
    #[arg(short, long = "dest", help_heading = "Input/Output")]
    dest_dir: Option<PathBuf>,
    /// Output format: png | jpg | bmp | tga
    #[arg(short, long, value_parser = ["png", "jpg", "jpeg", "bmp", "tga"], help_heading = "Input/Output")]
    output_format: Option<String>,

    // Behaviour
    /// Overwrite packed textures that already exist
    #[arg(long, overrides_with = "no_overwrite", help_heading = "Behaviour")]
    overwrite: bool,
    /// Keep packed textures that already exist (skip those targets)
    #[arg(long, help_heading = "Behaviour")]
    no_overwrite: bool,
    /// Lowercase output file names
    #[arg(long, default_value_t = false, help_heading = "Behaviour")]
    lowercase_names: bool,
    /// Compose groups in parallel (requires core feature `parallel`)
    #[arg(long, default_value_t = false, help_heading = "Behaviour")]
    parallel: bool,
    /// Overwrite source files without asking when dest == src
    #[arg(short = 'y', long, default_value_t = false, help_heading = "Behaviour")]
    yes: bool,

    // Export
    /// Dry run: group and compose but do not write files
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
    /// Export the run report (JSON) to this file
    #[arg(long, help_heading = "Export")]
    export_report: Option<PathBuf>,
    /// Print the merged configuration (after config file/CLI) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml|text
    #[arg(long, default_value = "json", value_parser = ["json", "yaml", "text"], help_heading = "Export")]
    print_config_format: String,
}

#[derive(Parser, Debug, Clone)]
struct InitArgs {
    /// Where to write the configuration
    #[arg(default_value = DEFAULT_CONFIG)]
    path: PathBuf,
    /// Replace an existing file
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Pack(args) => run_pack(args, cli.progress && !cli.quiet),
        Commands::InitConfig(args) => run_init(args),
    }
}

fn run_init(args: &InitArgs) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to replace it)",
            args.path.display()
        );
    }
    fs::write(&args.path, to_config_text(&PackConfig::default()))
        .with_context(|| format!("write {}", args.path.display()))?;
    info!(path = %args.path.display(), "default configuration written");
    Ok(())
}

fn run_pack(cli: &PackArgs, show_progress: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let cfg = resolve_config(cli)?;

    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&cfg)?),
            "text" => print!("{}", to_config_text(&cfg)),
            _ => println!("{}", serde_json::to_string_pretty(&cfg)?),
        }
        return Ok(());
    }

    if cfg.overwrite {
        info!("overwrite mode: existing packed textures will be replaced");
    } else {
        info!("no-overwrite mode: existing packed textures are kept");
    }

    let src_dir = resolve_dir(&cfg.src_dir)?;
    if !src_dir.is_dir() {
        return Err(ChannelPackerError::SourceDirMissing(src_dir).into());
    }
    let cfg = PackConfig {
        src_dir,
        dest_dir: resolve_dir(&cfg.dest_dir)?,
        ..cfg
    };
    let paths = gather_paths(&cfg)?;
    info!(count = paths.len(), dir = %cfg.src_dir.display(), "found source files");

    let assume_yes = cli.yes;
    let confirm = move |path: &Path| assume_yes || confirm_overwrite(path);
    let mut sink = ProgressSink::new(cli.dry_run, show_progress);
    let report = pack_files(&cfg, &paths, &FileDecoder, &confirm, &mut sink)?;
    sink.finish();

    log_events(&report);
    if let Some(report_path) = &cli.export_report {
        fs::write(report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("write {}", report_path.display()))?;
        info!(path = %report_path.display(), "report exported");
    }
    info!(
        elapsed = format!("{:.2}s", start.elapsed().as_secs_f64()),
        "{}",
        report.summary()
    );
    info!("packing complete");
    Ok(())
}

/// Defaults < config file < command line.
fn resolve_config(cli: &PackArgs) -> anyhow::Result<PackConfig> {
    let mut cfg = match &cli.config {
        Some(path) => load_any_config(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG);
            if default_path.is_file() {
                load_any_config(default_path)?
            } else {
                warn!(
                    path = DEFAULT_CONFIG,
                    "config file not found, using built-in defaults"
                );
                PackConfig::default()
            }
        }
    };
    if let Some(v) = &cli.src_dir {
        cfg.src_dir = v.clone();
    }
    if let Some(v) = &cli.dest_dir {
        cfg.dest_dir = v.clone();
    }
    if let Some(v) = &cli.output_format {
        cfg.output_format = v
            .parse::<OutputFormat>()
            .map_err(|_| anyhow::anyhow!("unknown output format: {}", v))?;
    }
    if cli.overwrite {
        cfg.overwrite = true;
    }
    if cli.no_overwrite {
        cfg.overwrite = false;
    }
    if cli.lowercase_names {
        cfg.lowercase_names = true;
    }
    if cli.parallel {
        cfg.parallel = true;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn load_any_config(path: &Path) -> anyhow::Result<PackConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase());
    let cfg = match ext.as_deref() {
        Some("yaml") | Some("yml") => {
            let file = fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            let y: FileConfig = serde_yaml::from_str(&file)?;
            y.into_pack_config(PackConfig::default())?
        }
        Some("json") => {
            let file = fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            let y: FileConfig = serde_json::from_str(&file)?;
            y.into_pack_config(PackConfig::default())?
        }
        _ => load_config_file(path, PackConfig::default())
            .with_context(|| format!("load config {}", path.display()))?,
    };
    info!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Absolute form of a configured directory; an empty path means the working directory.
fn resolve_dir(p: &Path) -> anyhow::Result<PathBuf> {
    if p.as_os_str().is_empty() {
        return std::env::current_dir().context("resolve current directory");
    }
    Ok(std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf()))
}

/// Files directly inside the source directory with an accepted extension, sorted by name.
fn gather_paths(cfg: &PackConfig) -> anyhow::Result<Vec<PathBuf>> {
    let mut list: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(&cfg.src_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("list {}", cfg.src_dir.display()))?;
        let p = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let accepted = p
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| cfg.accepts_extension(ext));
        if accepted {
            list.push(p.to_path_buf());
        }
    }
    Ok(list)
}

fn confirm_overwrite(path: &Path) -> bool {
    println!("[?] Overwrite source file <{}> ?", path.display());
    println!(" -> [Y] [ENTER] to overwrite");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
        Err(_) => false,
    }
}

/// File sink with a progress spinner; in dry-run mode nothing is written.
struct ProgressSink {
    dry_run: bool,
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressSink {
    fn new(dry_run: bool, progress: bool) -> Self {
        use indicatif::{ProgressBar, ProgressStyle};
        let bar = if progress {
            let b = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::with_template("{spinner:.green} packed {pos} [{elapsed_precise}] {wide_msg}")
            {
                b.set_style(style);
            }
            Some(b)
        } else {
            None
        };
        Self { dry_run, bar }
    }

    fn finish(&self) {
        if let Some(b) = &self.bar {
            b.finish_and_clear();
        }
    }
}

impl TextureSink for ProgressSink {
    fn write(
        &mut self,
        path: &Path,
        image: &DynamicImage,
        format: OutputFormat,
    ) -> channel_packer_core::Result<()> {
        if let Some(b) = &self.bar {
            let msg = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
            b.set_message(msg.to_string());
            b.inc(1);
        }
        if self.dry_run {
            info!(path = %path.display(), color = ?image.color(), "dry run: would write");
            return Ok(());
        }
        FileSink.write(path, image, format)
    }
}

fn log_events(report: &PackReport) {
    for event in &report.events {
        match event {
            PackEvent::UnresolvedSuffix { path } => {
                warn!(path = %path.display(), "skip: no valid suffix (see [map suffixes])")
            }
            PackEvent::OutputExists { path } => {
                info!(path = %path.display(), "skip: file exists")
            }
            PackEvent::DecodeFailed { path, error, .. } => {
                warn!(path = %path.display(), %error, "image not loaded")
            }
            PackEvent::TargetFailed {
                group,
                suffix,
                error,
            } => warn!(group = %group, suffix = %suffix, %error, "target not packed"),
            PackEvent::EmptyTarget { .. } => {}
            PackEvent::OverwriteDeclined { path } => {
                info!(path = %path.display(), "cancelled")
            }
            PackEvent::WriteFailed { path, error } => {
                warn!(path = %path.display(), %error, "write failed")
            }
        }
    }
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

/// Partial configuration from YAML/JSON; unset fields keep the base value.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    src_dir: Option<PathBuf>,
    dest_dir: Option<PathBuf>,
    output_format: Option<String>,
    overwrite: Option<bool>,
    lowercase_names: Option<bool>,
    parallel: Option<bool>,
    extensions: Option<Vec<String>>,
    /// `raw_suffix: canonical_role` pairs, sorted longest suffix first on load.
    map_suffixes: Option<Vec<SuffixPair>>,
    /// `target: "role:channels | ..."` pairs in emission order.
    pack: Option<Vec<PackLine>>,
}

#[derive(Debug, Deserialize)]
struct SuffixPair {
    suffix: String,
    #[serde(default)]
    role: String,
}

#[derive(Debug, Deserialize)]
struct PackLine {
    target: String,
    rules: String,
}

impl FileConfig {
    fn into_pack_config(self, mut cfg: PackConfig) -> anyhow::Result<PackConfig> {
        if let Some(v) = self.src_dir {
            cfg.src_dir = v;
        }
        if let Some(v) = self.dest_dir {
            cfg.dest_dir = v;
        }
        if let Some(v) = self.output_format {
            cfg.output_format = v
                .parse()
                .map_err(|_| ChannelPackerError::ConfigInvalid(format!("unknown output format: {v}")))?;
        }
        if let Some(v) = self.overwrite {
            cfg.overwrite = v;
        }
        if let Some(v) = self.lowercase_names {
            cfg.lowercase_names = v;
        }
        if let Some(v) = self.parallel {
            cfg.parallel = v;
        }
        if let Some(v) = self.extensions {
            cfg.extensions = v;
        }
        if let Some(pairs) = self.map_suffixes {
            let mut map = channel_packer_core::SuffixMap::new();
            for p in pairs {
                map.insert(p.suffix, p.role);
            }
            map.sort_longest_first();
            cfg.suffix_map = map;
        }
        if let Some(lines) = self.pack {
            let mut spec = channel_packer_core::PackSpec::new();
            for line in lines {
                spec.insert(line.target, channel_packer_core::parse_rules(&line.rules)?);
            }
            cfg.pack_spec = spec;
        }
        Ok(cfg)
    }
}
