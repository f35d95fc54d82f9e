use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use pdc_cli::request::{request, RequestKind};
use pdc_cli::serve::DEFAULT_SETTINGS;
use pdc_core::concentrator::events::NullEventSink;
use pdc_core::concentrator::random::random_base_configuration;
use pdc_core::concentrator::{Concentrator, ConcentratorSettings, SystemClock};
use pdc_core::pdc_server::{run_command_listener, run_publisher, ClientRegistry};

async fn start(settings: ConcentratorSettings) -> (String, watch::Sender<bool>) {
    let registry = Arc::new(ClientRegistry::new());
    let concentrator = Arc::new(Concentrator::new(
        settings,
        Arc::new(SystemClock),
        Arc::new(NullEventSink),
        registry.clone(),
    ));
    concentrator
        .update_configuration(&random_base_configuration(235, 30, 3))
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(run_publisher(concentrator.clone(), shutdown_rx.clone()));
    tokio::spawn(run_command_listener(listener, concentrator, registry, shutdown_rx));
    (address, shutdown)
}

#[tokio::test]
async fn test_request_configuration_as_json() {
    let settings = ConcentratorSettings::from_connection_string(DEFAULT_SETTINGS).unwrap();
    let (address, shutdown) = start(settings).await;

    let reply = request(&address, 235, RequestKind::Config2).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(json["id_code"], 235);
    assert_eq!(json["cells"].as_array().unwrap().len(), 3);
    assert_eq!(json["cells"][2]["station_name"], "STATION02");

    let header = request(&address, 235, RequestKind::Header).await.unwrap();
    assert!(header.starts_with("IEEE C37.118 Concentrator:"));

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn test_request_first_data_frame() {
    let mut settings = ConcentratorSettings::from_connection_string(DEFAULT_SETTINGS).unwrap();
    settings.auto_start_data_channel = false;
    let (address, shutdown) = start(settings).await;

    let reply = request(&address, 235, RequestKind::On).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(json["cells"].as_array().unwrap().len(), 3);

    let reply = request(&address, 235, RequestKind::Off).await.unwrap();
    assert!(reply.starts_with("Sent DisableRealTimeData"));

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn test_requests_skip_streamed_data_frames() {
    let settings = ConcentratorSettings::from_connection_string(
        "IDCode=235; commandChannel={port=4712}; FramesPerSecond=240; LagTime=0.01",
    )
    .unwrap();
    assert!(settings.auto_start_data_channel);
    let (address, shutdown) = start(settings).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    for attempt in 0..50 {
        let reply = request(&address, 235, RequestKind::Config2).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(json["cells"].as_array().unwrap().len(), 3, "attempt {}", attempt);

        let header = request(&address, 235, RequestKind::Header).await.unwrap();
        assert!(
            header.starts_with("IEEE C37.118 Concentrator:"),
            "attempt {}: {}",
            attempt,
            header
        );
    }

    let _ = shutdown.send(true);
}
