use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mirador::core::{ConnectionProfile, ConnectionSession, KeyType};
use mirador::driver::memory::MemoryValue;
use mirador::driver::MemoryDriver;
use mirador::keys::{KeyCatalogService, KeyDescriptorResolver};
use mirador::stats::parser::{parse_info_text, parse_snapshot};
use mirador::utils::glob_match;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

/// 构造一份接近真实服务器的 INFO 文本
fn sample_info_text() -> String {
    let mut text = String::from(
        "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\nuptime_in_seconds:86400\r\n\r\n\
         # Clients\r\nconnected_clients:42\r\nblocked_clients:0\r\n\r\n\
         # Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n\r\n\
         # Stats\r\ntotal_commands_processed:123456789\r\ninstantaneous_ops_per_sec:17\r\n\r\n\
         # Keyspace\r\n",
    );
    for db in 0..16 {
        text.push_str(&format!("db{}:keys={},expires=0,avg_ttl=0\r\n", db, db * 100));
    }
    text
}

/// INFO 解析性能基准测试
fn bench_info_parsing(c: &mut Criterion) {
    let text = sample_info_text();
    let sections = parse_info_text(&text);

    let mut group = c.benchmark_group("info_parser");
    group.bench_function("parse_info_text", |b| {
        b.iter(|| black_box(parse_info_text(black_box(&text))))
    });
    group.bench_function("parse_snapshot", |b| {
        b.iter(|| black_box(parse_snapshot(black_box(&sections))))
    });
    group.finish();
}

/// 通配符匹配性能基准测试
fn bench_glob_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("glob_match");

    let cases = [
        ("literal", "user:1000:profile"),
        ("star", "user:*:profile"),
        ("class", "user:[0-9]*:prof?le"),
        ("many_stars", "*a*b*c*d*"),
    ];
    for (name, pattern) in cases.iter() {
        group.bench_with_input(BenchmarkId::new("match", name), pattern, |b, pattern| {
            b.iter(|| black_box(glob_match(pattern, black_box("user:1000:profile"))))
        });
    }
    group.finish();
}

fn bench_resolver(c: &mut Criterion) {
    c.bench_function("resolver_from_probes", |b| {
        b.iter(|| {
            black_box(KeyDescriptorResolver::from_probes(
                black_box("session:abc".to_string()),
                Ok(KeyType::String),
                Ok(Some(Duration::from_secs(30))),
                Some(Ok(128)),
            ))
        })
    });
}

/// 键枚举性能基准测试（内存驱动）
fn bench_key_catalog(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("key_catalog");

    for key_count in [100, 1000].iter() {
        let driver = MemoryDriver::new();
        for i in 0..*key_count {
            driver.insert(0, &format!("key:{}", i), MemoryValue::String("value".into()));
        }

        let session = Arc::new(ConnectionSession::new(Arc::new(driver)));
        rt.block_on(async {
            assert!(session.connect(ConnectionProfile::default()).await);
        });
        let catalog = KeyCatalogService::new(session);

        group.bench_with_input(
            BenchmarkId::new("list_keys", key_count),
            key_count,
            |b, _| {
                b.to_async(&rt)
                    .iter(|| async { black_box(catalog.list_keys("key:*").await) });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_info_parsing,
    bench_glob_matching,
    bench_resolver,
    bench_key_catalog
);
criterion_main!(benches);
