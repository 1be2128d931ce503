use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::Rng;

use featnorm::features::{BoundaryTable, FeatureStream, UtteranceBoundary};
use featnorm::processing::{MomentAccumulator, Normalizer, Segmenter, StatisticsAccumulator};

const DIM: usize = 40;

fn random_frames(frames: usize) -> Array2<f32> {
    let mut rng = rand::thread_rng();
    Array2::from_shape_fn((frames, DIM), |_| rng.gen_range(-5.0f32..5.0))
}

fn bench_two_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_pass_statistics");
    for frames in [1_000usize, 10_000, 100_000] {
        let data = random_frames(frames);
        group.bench_with_input(BenchmarkId::from_parameter(frames), &data, |b, data| {
            b.iter(|| {
                let mut acc = StatisticsAccumulator::new(DIM);
                acc.add_mean_contribution("global", &MomentAccumulator::from_frames(data.view()))
                    .unwrap();
                acc.finalize_means().unwrap();

                let mean = acc.mean("global").unwrap().clone();
                let mut deviations = MomentAccumulator::new(DIM);
                deviations.accumulate_deviations(data.view(), &mean);
                acc.add_variance_contribution("global", &deviations).unwrap();
                black_box(acc.finalize().unwrap())
            })
        });
    }
    group.finish();
}

fn bench_segment_and_normalize(c: &mut Criterion) {
    let frames = 50_000;
    let stream = FeatureStream::new("S01", random_frames(frames));
    let entries = (0..frames / 500)
        .map(|i| UtteranceBoundary::new(format!("{:04}", i), i * 500, i * 500 + 400, ""))
        .collect();
    let table = BoundaryTable::new("S01", entries).unwrap();

    c.bench_function("segment_50k_pad_50", |b| {
        let segmenter = Segmenter::with_padding(50);
        b.iter(|| black_box(segmenter.segment(&stream, &table).unwrap()))
    });

    c.bench_function("normalize_by_self_50k", |b| {
        b.iter(|| {
            let mut matrix = stream.view().to_owned();
            black_box(Normalizer::normalize_by_self(&mut matrix, "S01").unwrap())
        })
    });
}

criterion_group!(benches, bench_two_pass, bench_segment_and_normalize);
criterion_main!(benches);
