//! Decoding benchmarks: fused vs two-phase strategies, and the two argmax
//! reducers on a single column.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ctc_bestpath::decoder::argmax::{argmax_strided, argmax_tree, load_slots};
use ctc_bestpath::{BatchDecoder, DecoderConfig, ScoreTensor, Strategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint;

const MAX_T: usize = 100;
const MAX_C: usize = 80;

fn random_scores(len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..len).map(|_| rng.gen::<f32>()).collect()
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("Batch Decode");

    for batch_size in [1, 8, 32] {
        let shape = [batch_size, MAX_C + 1, MAX_T];
        let scores = random_scores(shape.iter().product());
        group.throughput(Throughput::Elements((batch_size * MAX_T) as u64));

        for strategy in [Strategy::Fused, Strategy::TwoPhase] {
            let config = DecoderConfig::new(batch_size, MAX_T, MAX_C).with_strategy(strategy);
            let Ok(mut decoder) = BatchDecoder::new(config) else {
                continue;
            };
            let Ok(tensor) = ScoreTensor::new(&scores, shape) else {
                continue;
            };

            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), batch_size),
                &tensor,
                |b, tensor| {
                    b.iter(|| {
                        let labels = decoder.compute(black_box(tensor)).map(|l| l.as_slice()[0]);
                        hint::black_box(labels.ok());
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_reducers(c: &mut Criterion) {
    let mut group = c.benchmark_group("Argmax");

    for classes in [16, 81, 256] {
        let column = random_scores(classes);
        let mut slots = vec![(0.0, 0); classes];

        group.bench_with_input(BenchmarkId::new("Strided", classes), &column, |b, data| {
            b.iter(|| hint::black_box(argmax_strided(black_box(data), 0, 1, classes)));
        });

        group.bench_with_input(BenchmarkId::new("Tree", classes), &column, |b, data| {
            b.iter(|| {
                load_slots(black_box(data), 0, 1, &mut slots);
                hint::black_box(argmax_tree(&mut slots))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_reducers);
criterion_main!(benches);
