use channel_packer_core::prelude::*;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::hint::black_box;

fn noise(rng: &mut StdRng, size: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |_, _| {
        Luma([rng.r#gen::<u8>()])
    }))
}

fn role_bands(size: u32) -> RoleBands {
    let mut rng = StdRng::seed_from_u64(7);
    let mut bands = RoleBands::new();
    for role in ["_ao", "_roughness", "_metallic", "_normal"] {
        bands.insert(role, Some(split_channels(&noise(&mut rng, size))));
    }
    bands
}

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose");
    let orm = parse_rules("_ao:r | _roughness:r | _metallic:r").unwrap_or_default();
    let normal = parse_rules("_normal:r | _normal:g* | _normal:b").unwrap_or_default();
    let rgba = parse_rules("_ao:r | _roughness:r | _metallic:r | _normal:r*").unwrap_or_default();

    for size in [256u32, 1024] {
        let bands = role_bands(size);
        group.throughput(Throughput::Elements(u64::from(size) * u64::from(size)));

        group.bench_with_input(BenchmarkId::new("orm", size), &bands, |b, bands| {
            b.iter(|| black_box(compose(bands, &orm)))
        });
        group.bench_with_input(BenchmarkId::new("normal_inverted_g", size), &bands, |b, bands| {
            b.iter(|| black_box(compose(bands, &normal)))
        });
        group.bench_with_input(BenchmarkId::new("rgba", size), &bands, |b, bands| {
            b.iter(|| black_box(compose(bands, &rgba)))
        });
    }
    group.finish();
}

fn bench_pack_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_groups");
    let mut rng = StdRng::seed_from_u64(11);

    for count in [8usize, 32] {
        let mut decoder = MemoryDecoder::new();
        let mut paths = Vec::with_capacity(count * 3);
        for i in 0..count {
            for role in ["_ao", "_roughness", "_metallic"] {
                let p = std::path::PathBuf::from(format!("src/mat{i}{role}.png"));
                decoder.insert(p.clone(), noise(&mut rng, 128));
                paths.push(p);
            }
        }
        let cfg = PackConfig::builder().src_dir("src").dest_dir("out").build();
        let grouping = group_files(&paths, std::path::Path::new("src"), &cfg.suffix_map);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("in_memory", count), &grouping, |b, grouping| {
            b.iter(|| {
                let mut sink = |_: &std::path::Path, img: &DynamicImage, _: OutputFormat| -> Result<()> {
                    black_box(img.width());
                    Ok(())
                };
                let report = pack_groups(&cfg, grouping, &decoder, &|_: &std::path::Path| false, &mut sink);
                black_box(report)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compose, bench_pack_groups);
criterion_main!(benches);
