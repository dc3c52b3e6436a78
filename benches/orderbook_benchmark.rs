//! Benchmarks for order book operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use depth_ladder::orderbook::{compute_depth, BookUpdate, OrderBook, PriceLevel};

fn create_snapshot(levels: usize) -> BookUpdate {
    let bids: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel::new(50000.0 - i as f64 * 0.5, 1500.0))
        .collect();

    let asks: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel::new(50000.5 + i as f64 * 0.5, 1500.0))
        .collect();

    BookUpdate::new(bids, asks)
}

fn create_delta() -> BookUpdate {
    BookUpdate::from_pairs(
        &[(49999.0, 2000.0), (50000.25, 750.0), (49990.0, 0.0)],
        &[(50001.0, 2500.0), (50000.75, 120.0)],
    )
}

fn benchmark_snapshot(c: &mut Criterion) {
    let snapshot = create_snapshot(100);

    c.bench_function("on_snapshot_100_levels", |b| {
        b.iter(|| {
            let mut book = OrderBook::new("PI_XBTUSD");
            book.on_snapshot(black_box(&snapshot));
        })
    });
}

fn benchmark_delta(c: &mut Criterion) {
    let snapshot = create_snapshot(100);
    let delta = create_delta();

    c.bench_function("on_delta", |b| {
        b.iter_batched(
            || {
                let mut book = OrderBook::new("PI_XBTUSD");
                book.on_snapshot(&snapshot);
                book
            },
            |mut book| {
                book.on_delta(black_box(&delta));
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn benchmark_depth(c: &mut Criterion) {
    let mut book = OrderBook::new("PI_XBTUSD");
    book.on_snapshot(&create_snapshot(100));
    let view = book.view();

    c.bench_function("compute_depth_25_rows", |b| {
        b.iter(|| {
            black_box(compute_depth(black_box(&view), 25));
        })
    });
}

criterion_group!(benches, benchmark_snapshot, benchmark_delta, benchmark_depth);
criterion_main!(benches);
