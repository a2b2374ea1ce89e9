use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use feed_core::{MovingAverage, SamplerCfg, SpeedFilter, SpeedMap, WINDOW_SIZE};

// Synthetic potentiometer trace: slow sweep with xorshift noise
fn synth_trace(n: usize, noise: u32, seed: u32) -> Vec<u32> {
    let mut state = seed.max(1);
    (0..n)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let sweep = (i as u32 * 7) % 4096;
            let jitter = state % (noise * 2 + 1);
            (sweep + jitter).saturating_sub(noise).min(4095)
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let trace = synth_trace(10_000, 12, 0x1234_5678);

    c.bench_function("moving_average_push_10k", |b| {
        b.iter_batched(
            MovingAverage::<WINDOW_SIZE>::new,
            |mut ma| {
                let mut last = 0;
                for &raw in &trace {
                    last = ma.push(black_box(raw));
                }
                last
            },
            BatchSize::SmallInput,
        );
    });

    let map = SpeedMap::new(0, 4095, 0, 13_000).unwrap();
    c.bench_function("speed_map_10k", |b| {
        b.iter(|| trace.iter().map(|&raw| map.map(black_box(raw))).max());
    });

    let cfg = SamplerCfg::default();
    c.bench_function("speed_filter_pipeline_10k", |b| {
        b.iter_batched(
            || SpeedFilter::new(&cfg).unwrap(),
            |mut f| {
                let mut last = 0;
                for &raw in &trace {
                    last = f.push(black_box(raw));
                }
                last
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_filter);
criterion_main!(benches);
