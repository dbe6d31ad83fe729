use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tablemanager::models::{ActivityUse, Slot, SlotDefinition, Table};
use tablemanager::platform::{Rect, WindowHandle, WindowInfo};
use tablemanager::services::SlotAssigner;

fn layout(count: i32) -> Vec<Arc<Slot>> {
    (0..count)
        .map(|i| {
            let activity_use = if i % 4 == 3 {
                ActivityUse::Inactive
            } else {
                ActivityUse::Active
            };
            Arc::new(Slot::new(SlotDefinition::new(
                activity_use,
                count - i,
                Rect::new(i * 100, 0, 100, 100),
            )))
        })
        .collect()
}

fn tables(count: u64) -> Vec<Arc<Table>> {
    (0..count)
        .map(|id| {
            let info = WindowInfo::new(WindowHandle(id), format!("Table {id}"), Rect::default());
            Arc::new(Table::new(&info, ActivityUse::Active))
        })
        .collect()
}

fn benchmark_rank_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_candidates");
    for size in [4, 16, 64] {
        let slots = layout(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &slots, |b, slots| {
            b.iter(|| black_box(SlotAssigner::rank_candidates(slots, ActivityUse::Active)))
        });
    }
    group.finish();
}

fn benchmark_fill_layout(c: &mut Criterion) {
    c.bench_function("fill_layout_24_tables_16_slots", |b| {
        b.iter(|| {
            let slots = layout(16);
            let assigner = SlotAssigner::new();
            for table in tables(24) {
                black_box(assigner.assign(&slots, &table));
            }
        })
    });
}

criterion_group!(benches, benchmark_rank_candidates, benchmark_fill_layout);
criterion_main!(benches);
