// Benchmarks for the concentrator's per-tick work.
//
// A 30 fps stream of 200 devices has to sort every measurement, build a frame and
// encode it well inside 33 ms. These benches measure those steps for growing station
// counts.
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pdc_core::concentrator::channel::RecordingChannel;
use pdc_core::concentrator::events::NullEventSink;
use pdc_core::concentrator::random::{random_base_configuration, simulated_measurements};
use pdc_core::concentrator::{Clock, Concentrator, ConcentratorSettings, ManualClock};

const STATION_COUNTS: [usize; 4] = [1, 10, 50, 200];

fn loaded_concentrator(devices: usize) -> (Concentrator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
    ));
    let concentrator = Concentrator::new(
        ConcentratorSettings::new(235),
        clock.clone(),
        Arc::new(NullEventSink),
        Arc::new(RecordingChannel::new()),
    );
    concentrator
        .update_configuration(&random_base_configuration(235, 30, devices))
        .unwrap();
    (concentrator, clock)
}

// Building and encoding a frame without any measurements
fn bench_data_frame_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_frame_image");
    group.measurement_time(Duration::from_secs(10));

    for &devices in &STATION_COUNTS {
        let (concentrator, clock) = loaded_concentrator(devices);
        let size = concentrator
            .configuration_frame()
            .unwrap()
            .calc_data_frame_size();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("stations", devices), &devices, |b, _| {
            b.iter(|| {
                let frame = concentrator.build_data_frame(clock.now()).unwrap();
                frame.to_hex().unwrap()
            });
        });
    }

    group.finish();
}

// Sorting one frame's worth of simulated measurements
fn bench_measurement_sorting(c: &mut Criterion) {
    let mut group = c.benchmark_group("measurement_sorting");
    group.measurement_time(Duration::from_secs(10));

    for &devices in &STATION_COUNTS {
        let (concentrator, clock) = loaded_concentrator(devices);
        let configuration = concentrator.configuration_frame().unwrap();
        let measurements = simulated_measurements(&configuration, clock.now(), &mut rand::rng());
        group.throughput(Throughput::Elements(measurements.len() as u64));

        group.bench_with_input(BenchmarkId::new("stations", devices), &devices, |b, _| {
            b.iter(|| concentrator.sort_measurements(measurements.iter()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_data_frame_image, bench_measurement_sorting);
criterion_main!(benches);
