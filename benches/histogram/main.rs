use criterion::*;
use histo2d::grid::walk;
use histo2d::{histogram_reference, Device, Geometry, IncrementStrategy, LaunchConfig, PixelGrid};

// Grids to benchmark: (label, geometry). The last one is the default 4096 x 4000 input.
pub fn geometries() -> Vec<(&'static str, Geometry)> {
    vec![
        ("256x256/1024bins", Geometry::new(10, 1, 256, 256).unwrap()),
        ("1024x1024/1024bins", Geometry::new(10, 1, 1024, 1024).unwrap()),
        ("1024x1024/64Kbins", Geometry::new(8, 256, 1024, 1024).unwrap()),
        ("default", Geometry::DEFAULT),
    ]
}

// Generate a clustered random-walk grid, the same every run.
pub fn generate_test_data(geometry: Geometry) -> PixelGrid {
    walk::generate(geometry, 0).unwrap()
}

// Benchmark group configuration
#[cfg(not(target_os = "windows"))]
use pprof::criterion::{Output, PProfProfiler};

#[cfg(not(target_os = "windows"))]
pub fn get_benchmark_config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

#[cfg(target_os = "windows")]
pub fn get_benchmark_config() -> Criterion {
    Criterion::default().sample_size(20)
}

// Main benchmark function
pub fn run_histogram_benchmarks(c: &mut Criterion) {
    for (label, geometry) in geometries() {
        let mut group = c.benchmark_group("histogram");
        group.throughput(Throughput::Elements(geometry.pixels() as u64));

        let grid = generate_test_data(geometry);

        // Sequential reference.
        group.bench_with_input(BenchmarkId::new("reference", label), &grid, |b, grid| {
            b.iter(|| histogram_reference(black_box(grid)))
        });

        for strategy in IncrementStrategy::ALL {
            let device =
                Device::new(geometry, LaunchConfig::default().with_strategy(strategy)).unwrap();

            // Pass only, input already staged. This is what the harness times.
            let mut input = device.allocate_input_buffer().unwrap();
            let mut bins = device.allocate_bin_buffer().unwrap();
            device
                .stage_input_and_clear_bins(&grid, &mut input, &mut bins)
                .unwrap();
            group.bench_function(BenchmarkId::new(format!("pass/{strategy:?}"), label), |b| {
                b.iter(|| device.run_histogram_pass(black_box(&input), &mut bins).unwrap())
            });

            // Whole lifecycle, including allocation and transfers.
            group.bench_with_input(
                BenchmarkId::new(format!("lifecycle/{strategy:?}"), label),
                &grid,
                |b, grid| b.iter(|| device.histogram(black_box(grid)).unwrap()),
            );

            device.release(input, bins);
        }

        group.finish();
    }
}

criterion_group! {
    name = benches;
    config = get_benchmark_config();
    targets = run_histogram_benchmarks
}

criterion_main!(benches);
