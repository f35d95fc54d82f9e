//! `pdc request`: send one command frame to a concentrator and print the reply.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use pdc_core::ieee_c37_118::commands::{CommandFrame, DeviceCommand};
use pdc_core::ieee_c37_118::common::{FrameType, PrefixFrame, PREFIX_SIZE};
use pdc_core::ieee_c37_118::config::ConfigurationFrame;
use pdc_core::ieee_c37_118::data_frame::DataFrame;
use pdc_core::ieee_c37_118::header::HeaderFrame;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RequestKind {
    Config1,
    Config2,
    Header,
    On,
    Off,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Config1 => write!(f, "config1"),
            RequestKind::Config2 => write!(f, "config2"),
            RequestKind::Header => write!(f, "header"),
            RequestKind::On => write!(f, "on"),
            RequestKind::Off => write!(f, "off"),
        }
    }
}

async fn send_command(
    stream: &mut TcpStream,
    id_code: u16,
    command: DeviceCommand,
) -> Result<(), Box<dyn Error>> {
    let image = CommandFrame::new(id_code, command, Utc::now()).to_hex()?;
    stream.write_all(&image).await?;
    Ok(())
}

/// Reads one complete frame using the FRAMESIZE field of its prefix.
async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut frame = vec![0u8; PREFIX_SIZE];
    tokio::time::timeout(REPLY_TIMEOUT, stream.read_exact(&mut frame)).await??;
    let prefix = PrefixFrame::from_hex(&frame)?;
    let frame_size = prefix.framesize as usize;
    if frame_size < PREFIX_SIZE {
        return Err(format!("Frame size {} is shorter than a frame prefix", frame_size).into());
    }
    frame.resize(frame_size, 0);
    tokio::time::timeout(REPLY_TIMEOUT, stream.read_exact(&mut frame[PREFIX_SIZE..]))
        .await??;
    Ok(frame)
}

/// Reads frames until one of `frame_type` arrives.
///
/// Broadcast data and configuration frames share the connection with replies, so
/// anything else is skipped.
async fn read_frame_of_type(
    stream: &mut TcpStream,
    frame_type: FrameType,
) -> Result<Vec<u8>, Box<dyn Error>> {
    loop {
        let image = read_frame(stream).await?;
        if PrefixFrame::from_hex(&image)?.frame_type()? == frame_type {
            return Ok(image);
        }
    }
}

async fn read_configuration(
    stream: &mut TcpStream,
    id_code: u16,
    command: DeviceCommand,
) -> Result<ConfigurationFrame, Box<dyn Error>> {
    let frame_type = if command == DeviceCommand::SendConfigurationFrame1 {
        FrameType::Config1
    } else {
        FrameType::Config2
    };
    send_command(stream, id_code, command).await?;
    let image = read_frame_of_type(stream, frame_type).await?;
    Ok(ConfigurationFrame::from_hex(&image)?)
}

/// Sends `kind` to the concentrator at `address`.
///
/// # Returns
///
/// The text to print: configuration frames as JSON, the header text, the first data
/// frame after `on` as JSON, or a confirmation after `off`.
pub async fn request(
    address: &str,
    id_code: u16,
    kind: RequestKind,
) -> Result<String, Box<dyn Error>> {
    let mut stream = TcpStream::connect(address).await?;
    tracing::info!("Connected to {} for {}", address, kind);

    match kind {
        RequestKind::Config1 | RequestKind::Config2 => {
            let command = if kind == RequestKind::Config1 {
                DeviceCommand::SendConfigurationFrame1
            } else {
                DeviceCommand::SendConfigurationFrame2
            };
            let frame = read_configuration(&mut stream, id_code, command).await?;
            Ok(serde_json::to_string_pretty(&frame)?)
        }
        RequestKind::Header => {
            send_command(&mut stream, id_code, DeviceCommand::SendHeaderFrame).await?;
            let image = read_frame_of_type(&mut stream, FrameType::Header).await?;
            // Header frames do not carry their time base; the text does not depend on it.
            let header = HeaderFrame::from_hex(&image, 1_000_000)?;
            Ok(header.text)
        }
        RequestKind::On => {
            let configuration = Arc::new(
                read_configuration(
                    &mut stream,
                    id_code,
                    DeviceCommand::SendConfigurationFrame2,
                )
                .await?,
            );
            send_command(&mut stream, id_code, DeviceCommand::EnableRealTimeData).await?;
            let image = read_frame_of_type(&mut stream, FrameType::Data).await?;
            let frame = DataFrame::from_hex(&image, configuration)?;
            let summary = serde_json::json!({
                "id_code": frame.configuration.id_code,
                "timestamp": frame.timestamp,
                "cells": frame.cells,
            });
            Ok(serde_json::to_string_pretty(&summary)?)
        }
        RequestKind::Off => {
            send_command(&mut stream, id_code, DeviceCommand::DisableRealTimeData).await?;
            Ok(format!("Sent DisableRealTimeData to {}", address))
        }
    }
}
