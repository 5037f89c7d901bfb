use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use tokio::runtime::Runtime;

use worklane_auth::IdentityContext;
use worklane_core::{OrderBy, Predicate, QueryDescriptor, TenantId};
use worklane_infra::{GenericDataAccessService, InMemoryStore, SqliteStore, StoragePort};
use worklane_tenancy::Organization;

const TENANTS: usize = 4;

/// Seeds `rows` organizations for each of [`TENANTS`] tenants; returns the first tenant.
async fn seed(storage: Arc<dyn StoragePort>, rows: usize) -> (GenericDataAccessService<Organization>, TenantId) {
    let service = GenericDataAccessService::<Organization>::new(storage);
    let mut first = None;
    for _ in 0..TENANTS {
        let tenant = TenantId::new();
        let ctx = IdentityContext::system(tenant);
        for i in 0..rows {
            let mut org = Organization::new(format!("org-{i:05}"));
            org.is_default = i % 7 == 0;
            service.create(&ctx, org).await.unwrap();
        }
        first.get_or_insert(tenant);
    }
    (service, first.unwrap())
}

fn backends(rt: &Runtime) -> Vec<(&'static str, Arc<dyn StoragePort>)> {
    let sqlite = rt.block_on(SqliteStore::in_memory()).unwrap();
    vec![
        ("memory", Arc::new(InMemoryStore::new()) as Arc<dyn StoragePort>),
        ("sqlite", Arc::new(sqlite) as Arc<dyn StoragePort>),
    ]
}

fn bench_paginate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("scoped_paginate");
    group.sample_size(50);

    for rows in [100usize, 1000] {
        for (name, storage) in backends(&rt) {
            let (service, tenant) = rt.block_on(seed(storage, rows));
            let ctx = IdentityContext::system(tenant);
            let descriptor = QueryDescriptor::new()
                .order_by(OrderBy::desc("name"))
                .skip((rows / 2) as i64)
                .take(25);

            group.throughput(Throughput::Elements(25));
            group.bench_with_input(BenchmarkId::new(name, rows), &rows, |b, _| {
                b.to_async(&rt).iter(|| async {
                    let page = service.paginate(&ctx, black_box(&descriptor)).await.unwrap();
                    black_box(page.items.len())
                });
            });
        }
    }

    group.finish();
}

fn bench_filtered_count(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("scoped_count_by");
    group.sample_size(50);

    for (name, storage) in backends(&rt) {
        let (service, tenant) = rt.block_on(seed(storage, 1000));
        let ctx = IdentityContext::system(tenant);

        group.bench_function(name, |b| {
            b.to_async(&rt).iter(|| async {
                let n = service
                    .count_by(&ctx, black_box(Predicate::eq("is_default", true)))
                    .await
                    .unwrap();
                black_box(n)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_paginate, bench_filtered_count);
criterion_main!(benches);
