//! # Hosting a Concentrator
//!
//! `pdc serve` publishes a stream for a set of devices read from a JSON file, or for
//! randomly generated stations, and feeds it simulated measurements at the frame rate.
//!
//! ## Device file
//!
//! A JSON array of device descriptors:
//!
//! ```json
//! [
//!   {
//!     "id_code": 1,
//!     "station_name": "SHELBY",
//!     "id_label": "SHLB",
//!     "phasors": [{ "label": "VA", "phasor_type": "Voltage" }],
//!     "frequency": {}
//!   }
//! ]
//! ```

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use pdc_core::concentrator::descriptor::{BaseConfigurationFrame, DeviceDescriptor};
use pdc_core::concentrator::events::NullEventSink;
use pdc_core::concentrator::random::{random_base_configuration, simulated_measurements};
use pdc_core::concentrator::{Concentrator, ConcentratorSettings, SystemClock};
use pdc_core::pdc_server::{run_command_listener, run_publisher, ClientRegistry};

pub const DEFAULT_SETTINGS: &str = "IDCode=235; commandChannel={port=4712}";

/// Where the published devices come from.
#[derive(Debug, Clone)]
pub enum DeviceSource {
    File(std::path::PathBuf),
    Random(usize),
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub bind: String,
    pub settings: ConcentratorSettings,
    pub devices: DeviceSource,
}

/// Parses a device file's contents.
pub fn parse_devices(
    json: &str,
    settings: &ConcentratorSettings,
) -> Result<BaseConfigurationFrame, serde_json::Error> {
    let devices: Vec<DeviceDescriptor> = serde_json::from_str(json)?;
    Ok(BaseConfigurationFrame {
        id_code: settings.id_code,
        frame_rate: settings.frames_per_second,
        devices,
    })
}

fn load_devices(
    source: &DeviceSource,
    settings: &ConcentratorSettings,
) -> Result<BaseConfigurationFrame, Box<dyn Error>> {
    match source {
        DeviceSource::File(path) => {
            let json = std::fs::read_to_string(Path::new(path))?;
            Ok(parse_devices(&json, settings)?)
        }
        DeviceSource::Random(count) => Ok(random_base_configuration(
            settings.id_code,
            settings.frames_per_second,
            *count,
        )),
    }
}

/// Sorts one set of simulated measurements per frame interval until `shutdown` flips.
pub async fn run_simulation(concentrator: Arc<Concentrator>, mut shutdown: watch::Receiver<bool>) {
    let frames_per_second = concentrator.settings().frames_per_second.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(
        1.0 / frames_per_second as f64,
    ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rng = StdRng::from_os_rng();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(configuration) = concentrator.configuration_frame() else {
                    continue;
                };
                let measurements = simulated_measurements(&configuration, Utc::now(), &mut rng);
                concentrator.sort_measurements(measurements.iter());
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Runs a concentrator until Ctrl-C.
pub async fn serve(config: ServeConfig) -> Result<(), Box<dyn Error>> {
    let base = load_devices(&config.devices, &config.settings)?;

    let registry = Arc::new(ClientRegistry::new());
    let concentrator = Arc::new(Concentrator::new(
        config.settings,
        Arc::new(SystemClock),
        Arc::new(NullEventSink),
        registry.clone(),
    ));
    let frame = concentrator.update_configuration(&base)?;
    info!(
        "Publishing {} devices as stream {} at {} frames per second",
        frame.cells.len(),
        frame.id_code,
        concentrator.settings().frames_per_second
    );

    let listener = TcpListener::bind(&config.bind).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let publisher = tokio::spawn(run_publisher(concentrator.clone(), shutdown_rx.clone()));
    let simulation = tokio::spawn(run_simulation(concentrator.clone(), shutdown_rx.clone()));
    let listener_task = tokio::spawn(run_command_listener(
        listener,
        concentrator.clone(),
        registry,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    publisher.await?;
    simulation.await?;
    if let Err(e) = listener_task.await? {
        error!("Command channel failed: {}", e);
    }

    let statistics = concentrator.statistics();
    info!(
        "Published {} frames, sorted {} of {} measurements",
        statistics.published_frames,
        statistics.processed_measurements,
        statistics.received_measurements
    );
    Ok(())
}
