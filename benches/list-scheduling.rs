use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use hls_opt::schedule::{
    BasicBlockScheduler, ForceDirectedScheduler, ListScheduler, MobilityPriority,
    SchedulingConstraints, TaskGraph, TaskId,
};

/// A layered graph of `layers * width` tasks. Every task reads two tasks of
/// the previous layer; one task in four is a three-cycle multiply.
fn layered(layers: usize, width: usize) -> (TaskGraph<&'static str>, Vec<TaskId>) {
    let mut g = TaskGraph::new();
    let mut prev: Vec<TaskId> = Vec::new();
    for layer in 0..layers {
        let mut current = Vec::with_capacity(width);
        for i in 0..width {
            let task = if (layer + i) % 4 == 0 {
                g.add_task(3, "mul")
            } else {
                g.add_task(1, "alu")
            };
            if !prev.is_empty() {
                let other = (i * 7 + layer) % width;
                g.depend(prev[i], task);
                if other != i {
                    g.depend(prev[other], task);
                }
            }
            current.push(task);
        }
        prev = current;
    }
    g.set_limit("alu", 2);
    g.set_limit("mul", 1);
    let tasks = g.tasks().collect();
    (g, tasks)
}

fn list_scheduling_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("list");
    for size in [8usize, 16, 32, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || layered(size, size / 2),
                |(mut g, tasks)| {
                    let mut constraints = SchedulingConstraints::default();
                    ListScheduler::new(MobilityPriority)
                        .schedule(&tasks, &mut g, &mut constraints)
                        .unwrap();
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();

    let mut group = c.benchmark_group("force-directed");
    for size in [8usize, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || layered(size, size / 2),
                |(mut g, tasks)| {
                    let mut constraints = SchedulingConstraints::default();
                    ForceDirectedScheduler
                        .schedule(&tasks, &mut g, &mut constraints)
                        .unwrap();
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group! {
    name = list_scheduling;
    config = Criterion::default().sample_size(20);
    targets = list_scheduling_bench
}
criterion_main!(list_scheduling);
