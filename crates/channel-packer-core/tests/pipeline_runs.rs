use channel_packer_core::bands::{FileDecoder, ImageDecoder, MemoryDecoder};
use channel_packer_core::error::{ChannelPackerError, Result};
use channel_packer_core::pipeline::{FileSink, GroupStatus, PackEvent, pack_files};
use channel_packer_core::{Channel, OutputFormat, PackConfig, PackSpec, PackingRule};
use image::{DynamicImage, GrayImage, Luma};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

fn gradient(w: u32, h: u32, k: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| Luma([((x * k + y * 3 + k) % 256) as u8]))
}

fn write_sources(dir: &Path, files: &[(&str, &GrayImage)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, img)| {
            let p = dir.join(name);
            img.save(&p).expect("save source");
            p
        })
        .collect()
}

fn orm_spec() -> PackSpec {
    PackSpec::new().with(
        "_orm",
        vec![
            PackingRule::new("_ao", Channel::R),
            PackingRule::new("_roughness", Channel::R),
            PackingRule::new("_metallic", Channel::R),
        ],
    )
}

fn never(_: &Path) -> bool {
    false
}

struct CountingFileDecoder(AtomicUsize);

impl ImageDecoder for CountingFileDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        self.0.fetch_add(1, Ordering::SeqCst);
        FileDecoder.decode(path)
    }
}

#[test]
fn wall_material_packs_into_orm() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    std::fs::create_dir_all(&src).unwrap();

    let albedo = gradient(8, 4, 5);
    let rough = gradient(8, 4, 7);
    let metal = gradient(8, 4, 11);
    let ao = gradient(8, 4, 13);
    let paths = write_sources(
        &src,
        &[
            ("wall_base_color.png", &albedo),
            ("wall_roughness.png", &rough),
            ("wall_metallic.png", &metal),
            ("wall_ambient_occlusion.png", &ao),
        ],
    );

    let cfg = PackConfig::builder()
        .src_dir(&src)
        .dest_dir(&dest)
        .pack_spec(orm_spec())
        .build();
    let report = pack_files(&cfg, &paths, &FileDecoder, &never, &mut FileSink).expect("run");

    let out_path = dest.join("wall_orm.png");
    assert_eq!(report.written, vec![out_path.clone()]);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].key, "wall@S@");
    assert!(!report.has_failures());

    let out = image::open(&out_path).expect("open output");
    assert!(matches!(out, DynamicImage::ImageRgb8(_)));
    let out = out.to_rgb8();
    for (x, y, p) in out.enumerate_pixels() {
        assert_eq!(p[0], ao.get_pixel(x, y)[0]);
        assert_eq!(p[1], rough.get_pixel(x, y)[0]);
        assert_eq!(p[2], metal.get_pixel(x, y)[0]);
    }
}

#[test]
fn second_run_without_overwrite_writes_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    let img = gradient(4, 4, 3);
    let paths = write_sources(
        &src,
        &[
            ("a_ao.png", &img),
            ("a_roughness.png", &img),
            ("b_metallic.png", &img),
        ],
    );
    let cfg = PackConfig::builder()
        .src_dir(&src)
        .dest_dir(tmp.path().join("out"))
        .pack_spec(orm_spec())
        .overwrite(false)
        .build();

    let first = pack_files(&cfg, &paths, &FileDecoder, &never, &mut FileSink).expect("run");
    assert_eq!(first.written.len(), 2);

    let decoder = CountingFileDecoder(AtomicUsize::new(0));
    let second = pack_files(&cfg, &paths, &decoder, &never, &mut FileSink).expect("run");
    assert!(second.written.is_empty());
    assert_eq!(second.skipped_groups(), 2);
    assert!(second.groups.iter().all(|g| g.status == GroupStatus::Skipped));
    assert_eq!(decoder.0.load(Ordering::SeqCst), 0);
    let exists = second
        .events
        .iter()
        .filter(|e| matches!(e, PackEvent::OutputExists { .. }))
        .count();
    assert_eq!(exists, 2);
}

#[test]
fn missing_source_dir_is_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = PackConfig::builder()
        .src_dir(tmp.path().join("nope"))
        .dest_dir(tmp.path().join("out"))
        .build();
    let err = pack_files(&cfg, &[], &FileDecoder, &never, &mut FileSink).unwrap_err();
    assert!(matches!(err, ChannelPackerError::SourceDirMissing(_)));
    assert!(err.is_fatal());
}

#[test]
fn invalid_config_is_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = PackConfig::builder()
        .src_dir(tmp.path())
        .pack_spec(PackSpec::new().with("_x", Vec::new()))
        .build();
    let err = pack_files(&cfg, &[], &FileDecoder, &never, &mut FileSink).unwrap_err();
    assert!(matches!(err, ChannelPackerError::ConfigInvalid(_)));
}

#[test]
fn in_place_overwrite_asks_per_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = tmp.path().to_path_buf();
    let rough = gradient(4, 4, 9);
    let paths = write_sources(&dir, &[("rock_roughness.png", &rough)]);
    let existing = dir.join("rock_orm.png");
    let marker = GrayImage::from_pixel(1, 1, Luma([42]));
    marker.save(&existing).unwrap();

    let cfg = PackConfig::builder()
        .src_dir(&dir)
        .dest_dir(&dir)
        .pack_spec(orm_spec())
        .build();

    let asked = AtomicUsize::new(0);
    let decline = |p: &Path| {
        asked.fetch_add(1, Ordering::SeqCst);
        assert_eq!(p, existing.as_path());
        false
    };
    let report = pack_files(&cfg, &paths, &FileDecoder, &decline, &mut FileSink).expect("run");
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert!(report.written.is_empty());
    assert_eq!(
        report.events,
        vec![PackEvent::OverwriteDeclined {
            path: existing.clone()
        }]
    );
    assert_eq!(image::open(&existing).unwrap().width(), 1);

    let accept = |_: &Path| true;
    let report = pack_files(&cfg, &paths, &FileDecoder, &accept, &mut FileSink).expect("run");
    assert_eq!(report.written, vec![existing.clone()]);
    assert_eq!(image::open(&existing).unwrap().width(), 4);
}

#[test]
fn recoverable_problems_are_reported_not_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().to_path_buf();
    let paths = vec![
        src.join("readme.png"),
        src.join("g1_ao.png"),
        src.join("g1_metallic.png"),
        src.join("g2_roughness.png"),
    ];
    let decoder = MemoryDecoder::new()
        .with(src.join("g1_ao.png"), DynamicImage::ImageLuma8(gradient(2, 2, 1)))
        .with(src.join("g2_roughness.png"), DynamicImage::ImageLuma8(gradient(2, 2, 2)));
    let spec = orm_spec().with("_albedo", vec![PackingRule::new("_albedo", Channel::R)]);
    let cfg = PackConfig::builder()
        .src_dir(&src)
        .dest_dir(src.join("out"))
        .pack_spec(spec)
        .build();

    let failing = src.join("out").join("g2_orm.png");
    let mut written: Vec<(PathBuf, u8)> = Vec::new();
    let mut sink = |p: &Path, img: &DynamicImage, _: OutputFormat| -> Result<()> {
        if p == failing.as_path() {
            return Err(ChannelPackerError::DestinationWrite {
                path: p.to_path_buf(),
                source: image::ImageError::IoError(std::io::Error::other("disk full")),
            });
        }
        written.push((p.to_path_buf(), img.color().channel_count()));
        Ok(())
    };
    let report = pack_files(&cfg, &paths, &decoder, &never, &mut sink).expect("run");

    assert_eq!(written, vec![(src.join("out").join("g1_orm.png"), 3)]);
    assert_eq!(report.written, vec![src.join("out").join("g1_orm.png")]);
    assert!(report.has_failures());
    assert!(report.events.contains(&PackEvent::UnresolvedSuffix {
        path: src.join("readme.png")
    }));
    assert!(report.events.iter().any(|e| matches!(
        e,
        PackEvent::DecodeFailed { role, .. } if role == "_metallic"
    )));
    assert!(report.events.iter().any(|e| matches!(
        e,
        PackEvent::WriteFailed { path, .. } if *path == failing
    )));
    assert!(report.events.iter().any(|e| matches!(
        e,
        PackEvent::EmptyTarget { group, suffix } if group == "g1@S@" && suffix == "_albedo"
    )));
}

#[test]
fn targets_of_one_group_may_differ_in_resolution() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().to_path_buf();
    let albedo = image::RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8, y as u8, 90]));
    let ao = gradient(4, 4, 13);
    let rough = gradient(4, 4, 7);
    let metal = gradient(4, 4, 11);
    let decoder = MemoryDecoder::new()
        .with(src.join("wall_albedo.png"), DynamicImage::ImageRgb8(albedo))
        .with(src.join("wall_ao.png"), DynamicImage::ImageLuma8(ao.clone()))
        .with(src.join("wall_roughness.png"), DynamicImage::ImageLuma8(rough.clone()))
        .with(src.join("wall_metallic.png"), DynamicImage::ImageLuma8(metal.clone()));
    let paths = vec![
        src.join("wall_albedo.png"),
        src.join("wall_ao.png"),
        src.join("wall_roughness.png"),
        src.join("wall_metallic.png"),
    ];
    let cfg = PackConfig::builder()
        .src_dir(&src)
        .dest_dir(src.join("out"))
        .build();

    let mut seen: Vec<(PathBuf, DynamicImage)> = Vec::new();
    let mut sink = |p: &Path, img: &DynamicImage, _: OutputFormat| -> Result<()> {
        seen.push((p.to_path_buf(), img.clone()));
        Ok(())
    };
    let report = pack_files(&cfg, &paths, &decoder, &never, &mut sink).expect("run");
    assert!(!report.has_failures(), "{:?}", report.events);

    let out = src.join("out");
    assert_eq!(
        report.written,
        vec![out.join("wall_albedo.png"), out.join("wall_orm.png")]
    );
    assert_eq!((seen[0].1.width(), seen[0].1.height()), (8, 8));
    let orm = seen[1].1.to_rgb8();
    assert_eq!(orm.dimensions(), (4, 4));
    for (x, y, p) in orm.enumerate_pixels() {
        assert_eq!(p[0], ao.get_pixel(x, y)[0]);
        assert_eq!(p[1], rough.get_pixel(x, y)[0]);
        assert_eq!(p[2], metal.get_pixel(x, y)[0]);
    }
}

#[test]
fn lowercase_names_apply_below_dest_only() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().to_path_buf();
    let dest = src.join("Packed");
    let paths = vec![src.join("Crate_Roughness.png")];
    let decoder = MemoryDecoder::new().with(
        src.join("Crate_Roughness.png"),
        DynamicImage::ImageLuma8(gradient(2, 2, 4)),
    );
    let cfg = PackConfig::builder()
        .src_dir(&src)
        .dest_dir(&dest)
        .pack_spec(orm_spec())
        .output_format(OutputFormat::Tga)
        .lowercase_names(true)
        .build();
    let mut seen = Vec::new();
    let mut sink = |p: &Path, _: &DynamicImage, f: OutputFormat| -> Result<()> {
        seen.push((p.to_path_buf(), f));
        Ok(())
    };
    pack_files(&cfg, &paths, &decoder, &never, &mut sink).expect("run");
    assert_eq!(seen, vec![(dest.join("crate_orm.tga"), OutputFormat::Tga)]);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_run_emits_in_group_order() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().to_path_buf();
    let mut decoder = MemoryDecoder::new();
    let mut paths = Vec::new();
    for i in 0..20 {
        let p = src.join(format!("m{i:02}_ao.png"));
        decoder.insert(p.clone(), DynamicImage::ImageLuma8(gradient(2, 2, i)));
        paths.push(p);
    }
    let cfg = PackConfig::builder()
        .src_dir(&src)
        .dest_dir(src.join("out"))
        .pack_spec(orm_spec())
        .parallel(true)
        .build();
    let mut seen = Vec::new();
    let mut sink = |p: &Path, _: &DynamicImage, _: OutputFormat| -> Result<()> {
        seen.push(p.to_path_buf());
        Ok(())
    };
    pack_files(&cfg, &paths, &decoder, &never, &mut sink).expect("run");
    let expected: Vec<PathBuf> = (0..20)
        .map(|i| src.join("out").join(format!("m{i:02}_orm.png")))
        .collect();
    assert_eq!(seen, expected);
}
