use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use pdc_core::concentrator::channel::RecordingChannel;
use pdc_core::concentrator::descriptor::{
    BaseConfigurationFrame, DeviceDescriptor, FrequencyDescriptor, PhasorDescriptor,
};
use pdc_core::concentrator::events::RecordingEventSink;
use pdc_core::concentrator::frame_queue::SortOutcome;
use pdc_core::concentrator::measurement::{Measurement, SignalKind, SignalReference};
use pdc_core::concentrator::{
    Clock, Concentrator, ConcentratorSettings, ManualClock, MessageLevel,
};
use pdc_core::ieee_c37_118::commands::{CommandFrame, DeviceCommand};
use pdc_core::ieee_c37_118::data_frame::DataFrame;
use pdc_core::ieee_c37_118::units::PhasorType;

const STREAM_ID: u16 = 235;

fn start_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_010, 0).single().unwrap()
}

struct Harness {
    clock: Arc<ManualClock>,
    events: Arc<RecordingEventSink>,
    channel: Arc<RecordingChannel>,
    concentrator: Concentrator,
}

impl Harness {
    fn new(settings: ConcentratorSettings) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let events = Arc::new(RecordingEventSink::new());
        let channel = Arc::new(RecordingChannel::new());
        let concentrator =
            Concentrator::new(settings, clock.clone(), events.clone(), channel.clone());
        Harness {
            clock,
            events,
            channel,
            concentrator,
        }
    }

    /// Data frames published since the last clear, parsed against the live configuration.
    fn published_data_frames(&self) -> Vec<DataFrame> {
        let configuration = self.concentrator.configuration_frame().unwrap();
        self.channel
            .sent()
            .iter()
            .filter(|frame| frame.client.is_none() && frame.image[1] == 0x01)
            .map(|frame| DataFrame::from_hex(&frame.image, configuration.clone()).unwrap())
            .collect()
    }

    fn command(&self, command: DeviceCommand) {
        let image = CommandFrame::new(STREAM_ID, command, self.clock.now())
            .to_hex()
            .unwrap();
        self.concentrator
            .handle_command(uuid::Uuid::new_v4(), "10.0.0.5:4712", &image);
    }
}

fn device(id_code: u16, name: &str, phasors: &[&str]) -> DeviceDescriptor {
    DeviceDescriptor {
        id_code,
        station_name: name.to_string(),
        id_label: name.to_string(),
        nominal_frequency: None,
        data_format: None,
        coordinate_format: None,
        phasors: phasors
            .iter()
            .map(|label| PhasorDescriptor {
                label: label.to_string(),
                phasor_type: PhasorType::Voltage,
                scaling_value: 0,
                offset: 0.0,
            })
            .collect(),
        frequency: Some(FrequencyDescriptor::default()),
        analogs: Vec::new(),
        digitals: Vec::new(),
        is_virtual: false,
    }
}

fn station_set() -> BaseConfigurationFrame {
    BaseConfigurationFrame {
        id_code: STREAM_ID,
        frame_rate: 30,
        devices: vec![
            device(1, "SHELBY", &["VA", "VB", "VC"]),
            device(2, "GRIFFIN", &["V1"]),
        ],
    }
}

#[test]
fn test_change_window_follows_rebuild() {
    let harness = Harness::new(ConcentratorSettings::new(STREAM_ID));

    // Build A opens no window.
    harness.concentrator.update_configuration(&station_set()).unwrap();
    harness.concentrator.process_tick();
    let first = harness.published_data_frames();
    assert_eq!(first.len(), 1);
    assert!(first[0].cells.iter().all(|cell| !cell.status.configuration_changed()));

    // Build B opens one at the swap instant.
    harness.concentrator.update_configuration(&station_set()).unwrap();
    for (offset, flagged) in [(1, true), (30, true), (61, false)] {
        harness.clock.set(start_time() + Duration::seconds(offset));
        harness.channel.clear();
        assert!(harness.concentrator.process_tick() > 0);
        let frames = harness.published_data_frames();
        assert!(
            frames
                .iter()
                .flat_map(|frame| frame.cells.iter())
                .all(|cell| cell.status.configuration_changed() == flagged),
            "offset {}s",
            offset
        );
    }
}

#[test]
fn test_phasor_definitions_keep_input_order() {
    let harness = Harness::new(ConcentratorSettings::new(STREAM_ID));
    let frame = harness.concentrator.update_configuration(&station_set()).unwrap();
    let labels: Vec<&str> = frame.cells[0]
        .phasors
        .iter()
        .map(|phasor| phasor.label.as_str())
        .collect();
    assert_eq!(labels, ["VA", "VB", "VC"]);
    assert_eq!(frame.cells[1].phasors.len(), 1);
    assert_eq!(frame.id_code, STREAM_ID);
}

#[test]
fn test_unknown_command_changes_nothing() {
    let harness = Harness::new(ConcentratorSettings::new(STREAM_ID));
    harness.concentrator.update_configuration(&station_set()).unwrap();
    harness.events.clear();

    harness.command(DeviceCommand::SendConfigurationFrame3);
    let statuses = harness.events.statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].0, MessageLevel::Info);
    assert!(statuses[0].1.ends_with("was ignored - device command is unsupported."));
    assert!(harness.events.exceptions().is_empty());
    assert!(harness.channel.sent().is_empty());
    assert!(harness.concentrator.is_streaming());
}

#[test]
fn test_enable_is_idempotent() {
    let mut settings = ConcentratorSettings::new(STREAM_ID);
    settings.auto_start_data_channel = false;
    let harness = Harness::new(settings);
    harness.concentrator.update_configuration(&station_set()).unwrap();
    harness.events.clear();
    assert!(!harness.concentrator.is_streaming());

    harness.command(DeviceCommand::EnableRealTimeData);
    assert!(harness.concentrator.is_streaming());
    assert_eq!(harness.events.statuses().len(), 1);
    assert!(harness.channel.sent().is_empty());

    harness.command(DeviceCommand::EnableRealTimeData);
    assert!(harness.concentrator.is_streaming());
    assert_eq!(harness.events.statuses().len(), 2);
    assert!(harness.events.exceptions().is_empty());

    harness.command(DeviceCommand::DisableRealTimeData);
    assert!(!harness.concentrator.is_streaming());
}

#[test]
fn test_measurements_reach_published_frames() {
    let harness = Harness::new(ConcentratorSettings::new(STREAM_ID));
    let configuration = harness.concentrator.update_configuration(&station_set()).unwrap();
    let now = harness.clock.now();

    let late = Measurement::new(
        SignalReference::new(0, SignalKind::Frequency, 0),
        now - Duration::seconds(4),
        60.0,
    );
    let future = Measurement::new(
        SignalReference::new(0, SignalKind::Frequency, 0),
        now + Duration::seconds(2),
        60.0,
    );
    assert_eq!(harness.concentrator.sort_measurement(&late), SortOutcome::DiscardedLate);
    assert_eq!(harness.concentrator.sort_measurement(&future), SortOutcome::DiscardedFuture);

    // Every value of the second device, only the frequency of the first.
    let griffin = |kind, value| {
        Measurement::new(SignalReference::new(1, kind, 0), now, value)
    };
    let measurements = [
        griffin(SignalKind::Magnitude, 135_000.0),
        griffin(SignalKind::Angle, 90.0),
        griffin(SignalKind::Frequency, 59.98),
        griffin(SignalKind::DfDt, 0.01),
        griffin(SignalKind::Status, 0.0),
        Measurement::new(SignalReference::new(0, SignalKind::Frequency, 0), now, 60.02),
    ];
    assert_eq!(harness.concentrator.sort_measurements(measurements.iter()), 6);

    harness.clock.advance(Duration::seconds(3));
    harness.concentrator.process_tick();
    let frames = harness.published_data_frames();
    let frame = frames.last().unwrap();
    assert_eq!(frame.timestamp, now);
    assert_eq!(frame.cells.len(), configuration.cells.len());

    let shelby = &frame.cells[0];
    assert!((shelby.frequency - 60.02).abs() < 1e-4);
    assert!(!shelby.status.data_is_valid());

    let griffin = &frame.cells[1];
    assert!(griffin.status.data_is_valid());
    assert!((griffin.phasors[0].magnitude - 135_000.0).abs() < 1.0);
    assert!((griffin.phasors[0].angle - std::f64::consts::FRAC_PI_2).abs() < 1e-4);
    assert!((griffin.frequency - 59.98).abs() < 1e-4);

    let statistics = harness.concentrator.statistics();
    assert_eq!(statistics.received_measurements, 8);
    assert_eq!(statistics.processed_measurements, 6);
    assert_eq!(statistics.discarded_measurements, 2);

    let stale = Measurement::new(SignalReference::new(0, SignalKind::Frequency, 0), now, 60.0);
    assert_eq!(
        harness.concentrator.sort_measurement(&stale),
        SortOutcome::MissedSortByTimeout
    );
    assert_eq!(harness.concentrator.statistics().missed_sorts_by_timeout, 1);
}

#[test]
fn test_settings_from_connection_string() {
    let settings = ConcentratorSettings::from_connection_string(
        "IDCode=235; commandChannel={port=4712}; FramesPerSecond=60; autoStartDataChannel=false",
    )
    .unwrap();
    let harness = Harness::new(settings);
    assert!(!harness.concentrator.is_streaming());
    assert_eq!(harness.concentrator.settings().frames_per_second, 60);

    harness.concentrator.update_configuration(&station_set()).unwrap();
    harness.concentrator.start_data_channel();
    harness.clock.advance(Duration::milliseconds(500));
    harness.concentrator.process_tick();
    harness.channel.clear();
    harness.clock.advance(Duration::milliseconds(500));
    assert_eq!(harness.concentrator.process_tick(), 30);
}

#[test]
fn test_data_rate_follows_publication_rate() {
    let mut settings = ConcentratorSettings::new(STREAM_ID);
    settings.frames_per_second = 60;
    let harness = Harness::new(settings);

    let mut base = station_set();
    base.frame_rate = 30;
    let frame = harness.concentrator.update_configuration(&base).unwrap();
    assert_eq!(frame.frame_rate, 60);
    assert_eq!(harness.concentrator.configuration_frame().unwrap().frame_rate, 60);
}

#[test]
fn test_rebuilds_race_with_frame_building() {
    let harness = Harness::new(ConcentratorSettings::new(STREAM_ID));
    let mut wide = station_set();
    wide.devices.push(device(3, "MCDONOUGH", &["V1", "V2"]));
    let narrow = station_set();
    harness.concentrator.update_configuration(&narrow).unwrap();

    let concentrator = &harness.concentrator;
    let now = harness.clock.now();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..200 {
                let base = if round % 2 == 0 { &wide } else { &narrow };
                concentrator.update_configuration(base).unwrap();
            }
        });
        for _ in 0..3 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let frame = concentrator.build_data_frame(now).unwrap();
                    assert_eq!(frame.cells.len(), frame.configuration.cells.len());
                    assert!(frame.to_hex().is_ok());
                    concentrator.process_tick();
                }
            });
        }
    });

    let live = harness.concentrator.configuration_frame().unwrap();
    assert_eq!(live.cells.len(), narrow.devices.len());
    assert!(harness.events.exceptions().is_empty());
}

#[test]
fn test_concurrent_commands_are_all_answered() {
    const THREADS: usize = 4;
    const COMMANDS: usize = 50;

    let harness = Harness::new(ConcentratorSettings::new(STREAM_ID));
    harness.concentrator.update_configuration(&station_set()).unwrap();
    harness.events.clear();

    std::thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..COMMANDS {
                    harness.command(DeviceCommand::SendConfigurationFrame3);
                }
            });
        }
    });

    let statuses = harness.events.statuses();
    assert_eq!(statuses.len(), THREADS * COMMANDS);
    assert!(statuses
        .iter()
        .all(|(_, message)| message.ends_with("was ignored - device command is unsupported.")));
    assert!(harness.concentrator.is_streaming());
    assert!(harness.channel.sent().is_empty());
}
