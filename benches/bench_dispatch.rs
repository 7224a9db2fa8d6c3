use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use harvest_search::{
    dispatch::{GridDispatcher, LogLevel, OptimizeOptions},
    heuristic::{
        genetic::GeneticParameters, tabu::TabuParameters, threshold::ThresholdParameters,
        HeuristicParameters,
    },
    trajectory::TabularTrajectory,
};

fn options(threads: usize) -> OptimizeOptions {
    OptimizeOptions::builder()
        .best_of(4)
        .first_thin_periods(vec![Some(2), Some(3), Some(4)])
        .second_thin_periods(vec![None, Some(6)])
        .rotation_lengths(vec![8, 10])
        .threads(threads)
        .base_seed(42)
        .log_level(LogLevel::None)
        .build()
}

fn bench_dispatch(c: &mut Criterion) {
    let stand = TabularTrajectory::synthetic(60, 10, 5);
    let strategies = [
        (
            "threshold",
            HeuristicParameters::ThresholdAccepting(ThresholdParameters::default()),
        ),
        (
            "tabu",
            HeuristicParameters::Tabu(TabuParameters::default().with_iterations(20)),
        ),
        (
            "genetic",
            HeuristicParameters::Genetic(GeneticParameters::default().with_maximum_generations(10)),
        ),
    ];

    let mut group = c.benchmark_group("grid_dispatch");
    group.sample_size(10);
    for (name, parameters) in strategies.iter() {
        for threads in [1, 4].iter() {
            group.bench_with_input(
                BenchmarkId::new(*name, threads),
                threads,
                |b, &threads| {
                    b.iter(|| {
                        let dispatcher = GridDispatcher::new(
                            stand.clone(),
                            vec![parameters.clone()],
                            options(threads),
                        );
                        black_box(dispatcher.run().unwrap()).runs_completed()
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
