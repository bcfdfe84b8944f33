//! Performance benchmarks for sky-htm-lib
//!
//! Run with: cargo bench --package sky-htm-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sky_htm_lib::region::Domain;
use sky_htm_lib::{CatalogIndex, Config, SkipList, trixel};
use std::hint::black_box;

/// Uniform-ish sky positions, reproducible across runs
fn generate_positions(count: usize) -> Vec<(f64, f64)> {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    (0..count)
        .map(|_| {
            let ra = rng.gen_range(0.0..360.0);
            let dec = rng.gen_range(-1.0f64..1.0).asin().to_degrees();
            (ra, dec)
        })
        .collect()
}

/// A domain file with many small triangles and cones
fn generate_domain_text(convexes: usize) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut text = format!("# generated\n{convexes}\n");
    for i in 0..convexes {
        let ra: f64 = rng.gen_range(0.0..350.0);
        let dec: f64 = rng.gen_range(-80.0..80.0);
        if i % 2 == 0 {
            text.push_str(&format!(
                "#TRIANGLE_RADEC\n{ra} {dec}\n{} {dec}\n{} {}\n",
                ra + 2.0,
                ra + 1.0,
                dec + 2.0
            ));
        } else {
            text.push_str(&format!("#CONVEX_RADEC\n1\n{ra} {dec} 0.999\n"));
        }
    }
    text
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    let positions = generate_positions(10_000);
    group.throughput(Throughput::Elements(positions.len() as u64));

    for depth in [5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("ra_dec_to_id", depth), &depth, |b, &depth| {
            b.iter(|| {
                for &(ra, dec) in &positions {
                    black_box(trixel::ra_dec_to_id(ra, dec, depth).ok());
                }
            });
        });
    }

    let names: Vec<String> = positions
        .iter()
        .filter_map(|&(ra, dec)| trixel::ra_dec_to_id(ra, dec, 20).ok())
        .map(|id| id.name())
        .collect();
    group.bench_function("name_roundtrip_20", |b| {
        b.iter(|| {
            for name in &names {
                let id = trixel::name_to_id(name).ok();
                black_box(id.map(|id| id.name()));
            }
        });
    });

    group.finish();
}

fn bench_skip_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("skip_list");
    group.sample_size(20);

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let keys: Vec<i64> = (0..50_000).map(|_| rng.gen_range(0..1_000_000)).collect();
    group.throughput(Throughput::Elements(keys.len() as u64));

    group.bench_function("insert_50k", |b| {
        b.iter(|| {
            let mut list = SkipList::with_seed(0.5, 3).unwrap();
            for (i, &key) in keys.iter().enumerate() {
                list.insert(key, i as i32);
            }
            black_box(list.len())
        });
    });

    let mut list = SkipList::with_seed(0.5, 3).unwrap();
    list.extend(keys.iter().map(|&key| (key, 0)));
    group.bench_function("search_50k", |b| {
        b.iter(|| {
            for &key in &keys {
                black_box(list.search(key));
            }
        });
    });
    group.bench_function("find_min_50k", |b| {
        b.iter(|| {
            for &key in &keys {
                black_box(list.find_min(key));
            }
        });
    });

    group.finish();
}

fn bench_catalog(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");
    group.sample_size(20);

    let positions = generate_positions(100_000);
    let config = Config {
        depth: 8,
        seed: Some(9),
        ..Config::default()
    };
    group.throughput(Throughput::Elements(positions.len() as u64));

    group.bench_function("locate_all_100k", |b| {
        let index = CatalogIndex::new(config.clone()).unwrap();
        b.iter(|| black_box(index.locate_all(&positions).unwrap().len()));
    });

    group.bench_function("bulk_load_100k", |b| {
        b.iter(|| {
            let mut index = CatalogIndex::new(config.clone()).unwrap();
            let ids = index.locate_all(&positions).unwrap();
            index.bulk_load(ids.into_iter().zip(0..)).unwrap()
        });
    });

    group.finish();
}

fn bench_region_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("region");
    let text = generate_domain_text(1_000);
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("parse_domain_1k", |b| {
        b.iter(|| black_box(text.parse::<Domain>().unwrap().len()));
    });

    let domain: Domain = text.parse().unwrap();
    group.bench_function("write_domain_1k", |b| {
        b.iter(|| black_box(domain.to_string().len()));
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_encoding,
    bench_skip_list,
    bench_catalog,
    bench_region_parsing,
);

criterion_main!(benches);
