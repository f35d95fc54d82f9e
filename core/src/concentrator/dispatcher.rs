//! Command frame handling.
//!
//! Every inbound message on the command channel ends up in
//! `Concentrator::handle_command`. Each call reports at most one status or exception and
//! never fails, so a client sending garbage keeps its connection.

use super::channel::ClientId;
use super::events::MessageLevel;
use super::manager::Concentrator;
use crate::error::ConcentratorError;
use crate::ieee_c37_118::commands::{CommandFrame, DeviceCommand};
use crate::ieee_c37_118::common::FrameType;
use crate::ieee_c37_118::header::HeaderFrame;

/// Formats an integer with `,` thousands separators.
fn with_thousands_separators(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

impl Concentrator {
    /// Handles one message received from `client_id`.
    ///
    /// # Parameters
    ///
    /// * `client_id`: Destination of any reply.
    /// * `connection_id`: Human readable peer description used in messages.
    /// * `bytes`: The complete message as received.
    pub fn handle_command(&self, client_id: ClientId, connection_id: &str, bytes: &[u8]) {
        let frame = match CommandFrame::from_hex(bytes) {
            Ok(frame) => frame,
            Err(source) => {
                self.report_exception(
                    MessageLevel::Warning,
                    &ConcentratorError::UnrecognizedData {
                        connection: connection_id.to_string(),
                        source,
                    },
                );
                return;
            }
        };

        let command = frame.command;
        if self.settings().validate_id_code && frame.id_code != self.settings().id_code {
            self.report_status(
                MessageLevel::Warning,
                &format!(
                    "Concentrator ID code validation failed for device command \"{}\" from \
                     \"{}\" - no action was taken.",
                    command, connection_id
                ),
            );
            return;
        }

        match command {
            DeviceCommand::SendConfigurationFrame1 => {
                self.reply_with_configuration(client_id, connection_id, FrameType::Config1, 1)
            }
            DeviceCommand::SendConfigurationFrame2 => {
                self.reply_with_configuration(client_id, connection_id, FrameType::Config2, 2)
            }
            DeviceCommand::SendHeaderFrame => self.reply_with_header(client_id, connection_id),
            DeviceCommand::EnableRealTimeData | DeviceCommand::DisableRealTimeData => {
                self.toggle_data_channel(command, connection_id)
            }
            _ => self.report_status(
                MessageLevel::Info,
                &format!(
                    "Request for \"{}\" from \"{}\" was ignored - device command is unsupported.",
                    command, connection_id
                ),
            ),
        }
    }

    fn reply_with_configuration(
        &self,
        client_id: ClientId,
        connection_id: &str,
        frame_type: FrameType,
        type_number: u8,
    ) {
        let sent = self
            .configuration_image(frame_type)
            .and_then(|image| self.channel().send_to(client_id, &image));
        match sent {
            Ok(()) => self.report_status(
                MessageLevel::Info,
                &format!(
                    "Received request for \"SendConfigurationFrame{}\" from \"{}\" - type {} \
                     config frame was returned.",
                    type_number, connection_id, type_number
                ),
            ),
            Err(error) => self.report_exception(MessageLevel::Error, &error),
        }
    }

    /// Text of the header frame describing this concentrator.
    pub fn header_text(&self) -> String {
        let settings = self.settings();
        format!(
            "IEEE C37.118 Concentrator:\n\n \
             Revision for config frame: {}\n \
             Auto-publish config frame: {}\n   \
             Auto-start data channel: {}\n       \
             Data stream ID code: {}\n       \
             Derived system time: {} UTC",
            settings.target_configuration_type,
            settings.auto_publish_config_frame,
            settings.auto_start_data_channel,
            with_thousands_separators(settings.id_code as u64),
            self.now().format("%Y-%m-%d %H:%M:%S%.3f"),
        )
    }

    fn reply_with_header(&self, client_id: ClientId, connection_id: &str) {
        let settings = self.settings();
        let header = HeaderFrame {
            id_code: settings.id_code,
            version: settings.target_configuration_type,
            timestamp: self.now(),
            time_base: settings.time_base,
            text: self.header_text(),
        };
        let sent = header
            .to_hex()
            .map_err(ConcentratorError::from)
            .and_then(|image| self.channel().send_to(client_id, &image));
        match sent {
            Ok(()) => self.report_status(
                MessageLevel::Info,
                &format!(
                    "Received request for \"SendHeaderFrame\" from \"{}\" - frame was returned.",
                    connection_id
                ),
            ),
            Err(error) => self.report_exception(MessageLevel::Error, &error),
        }
    }

    fn toggle_data_channel(&self, command: DeviceCommand, connection_id: &str) {
        if self.settings().auto_start_data_channel {
            self.report_status(
                MessageLevel::Info,
                &format!(
                    "Request for \"{}\" from \"{}\" was ignored - concentrator data channel is \
                     set for auto-start.",
                    command, connection_id
                ),
            );
            return;
        }

        let outcome = if command == DeviceCommand::EnableRealTimeData {
            self.start_data_channel();
            "started"
        } else {
            self.stop_data_channel();
            "stopped"
        };
        self.report_status(
            MessageLevel::Info,
            &format!(
                "Received request for \"{}\" from \"{}\" - concentrator real-time data stream \
                 was {}.",
                command, connection_id, outcome
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concentrator::channel::RecordingChannel;
    use crate::concentrator::clock::ManualClock;
    use crate::concentrator::descriptor::{
        BaseConfigurationFrame, DeviceDescriptor, FrequencyDescriptor,
    };
    use crate::concentrator::events::RecordingEventSink;
    use crate::concentrator::settings::ConcentratorSettings;
    use crate::ieee_c37_118::config::ConfigurationFrame;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    struct Fixture {
        events: Arc<RecordingEventSink>,
        channel: Arc<RecordingChannel>,
        concentrator: Concentrator,
    }

    fn fixture(settings: ConcentratorSettings) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_149_580_800, 250_000_000).single().unwrap(),
        ));
        let events = Arc::new(RecordingEventSink::new());
        let channel = Arc::new(RecordingChannel::new());
        let concentrator = Concentrator::new(settings, clock, events.clone(), channel.clone());
        Fixture {
            events,
            channel,
            concentrator,
        }
    }

    fn configure(concentrator: &Concentrator) {
        let base = BaseConfigurationFrame {
            id_code: 235,
            frame_rate: 30,
            devices: vec![DeviceDescriptor {
                id_code: 1,
                station_name: "SHELBY".to_string(),
                id_label: "SHEL".to_string(),
                nominal_frequency: None,
                data_format: None,
                coordinate_format: None,
                phasors: Vec::new(),
                frequency: Some(FrequencyDescriptor::default()),
                analogs: Vec::new(),
                digitals: Vec::new(),
                is_virtual: false,
            }],
        };
        concentrator.update_configuration(&base).unwrap();
    }

    fn command(id_code: u16, command: DeviceCommand) -> Vec<u8> {
        CommandFrame::new(id_code, command, Utc::now()).to_hex().unwrap()
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(with_thousands_separators(0), "0");
        assert_eq!(with_thousands_separators(235), "235");
        assert_eq!(with_thousands_separators(7734), "7,734");
        assert_eq!(with_thousands_separators(65535), "65,535");
        assert_eq!(with_thousands_separators(1_234_567), "1,234,567");
    }

    #[test]
    fn test_configuration_request_is_answered_point_to_point() {
        let f = fixture(ConcentratorSettings::new(235));
        configure(&f.concentrator);
        f.events.clear();
        let client = Uuid::new_v4();

        f.concentrator.handle_command(
            client,
            "10.0.0.1:5000",
            &command(235, DeviceCommand::SendConfigurationFrame1),
        );
        let sent = f.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].client, Some(client));
        let frame = ConfigurationFrame::from_hex(&sent[0].image).unwrap();
        assert_eq!(frame.frame_type, FrameType::Config1);
        assert_eq!(
            f.events.statuses(),
            vec![(
                MessageLevel::Info,
                "Received request for \"SendConfigurationFrame1\" from \"10.0.0.1:5000\" - type 1 \
                 config frame was returned."
                    .to_string()
            )]
        );
    }

    #[test]
    fn test_configuration_request_without_configuration() {
        let f = fixture(ConcentratorSettings::new(235));
        f.concentrator.handle_command(
            Uuid::new_v4(),
            "peer",
            &command(235, DeviceCommand::SendConfigurationFrame2),
        );
        assert!(f.channel.sent().is_empty());
        assert_eq!(f.events.exceptions().len(), 1);
        assert!(f.events.statuses().is_empty());
    }

    #[test]
    fn test_header_request() {
        let f = fixture(ConcentratorSettings::new(7734));
        f.concentrator.handle_command(
            Uuid::new_v4(),
            "peer",
            &command(7734, DeviceCommand::SendHeaderFrame),
        );
        let sent = f.channel.sent();
        assert_eq!(sent.len(), 1);
        let header = HeaderFrame::from_hex(&sent[0].image, 16_777_215).unwrap();
        assert_eq!(
            header.text,
            "IEEE C37.118 Concentrator:\n\n \
             Revision for config frame: IEEE Std C37.118-2005\n \
             Auto-publish config frame: false\n   \
             Auto-start data channel: true\n       \
             Data stream ID code: 7,734\n       \
             Derived system time: 2006-06-06 08:00:00.250 UTC"
        );
        assert_eq!(f.events.statuses().len(), 1);
    }

    #[test]
    fn test_unknown_command_changes_nothing() {
        let f = fixture(ConcentratorSettings::new(235));
        configure(&f.concentrator);
        f.events.clear();
        let streaming = f.concentrator.is_streaming();

        for unsupported in [
            DeviceCommand::Reserved(7),
            DeviceCommand::SendConfigurationFrame3,
            DeviceCommand::ExtendedFrame,
        ] {
            f.events.clear();
            f.concentrator.handle_command(Uuid::new_v4(), "peer", &command(235, unsupported));
            let statuses = f.events.statuses();
            assert_eq!(statuses.len(), 1);
            assert!(statuses[0].1.ends_with("was ignored - device command is unsupported."));
            assert!(f.events.exceptions().is_empty());
        }
        assert!(f.channel.sent().is_empty());
        assert_eq!(f.concentrator.is_streaming(), streaming);
    }

    #[test]
    fn test_enable_with_manual_start_is_idempotent() {
        let mut settings = ConcentratorSettings::new(235);
        settings.auto_start_data_channel = false;
        let f = fixture(settings);
        assert!(!f.concentrator.is_streaming());

        let enable = command(235, DeviceCommand::EnableRealTimeData);
        f.concentrator.handle_command(Uuid::new_v4(), "peer", &enable);
        assert!(f.concentrator.is_streaming());
        assert_eq!(f.events.statuses().len(), 1);

        f.concentrator.handle_command(Uuid::new_v4(), "peer", &enable);
        assert!(f.concentrator.is_streaming());
        assert_eq!(f.events.statuses().len(), 2);
        assert!(f.events.exceptions().is_empty());
        assert!(f.channel.sent().is_empty());

        f.concentrator.handle_command(
            Uuid::new_v4(),
            "peer",
            &command(235, DeviceCommand::DisableRealTimeData),
        );
        assert!(!f.concentrator.is_streaming());
        assert!(f.events.statuses()[2].1.ends_with("real-time data stream was stopped."));
    }

    #[test]
    fn test_enable_with_auto_start_is_ignored() {
        let f = fixture(ConcentratorSettings::new(235));
        f.concentrator.handle_command(
            Uuid::new_v4(),
            "peer",
            &command(235, DeviceCommand::DisableRealTimeData),
        );
        assert!(f.concentrator.is_streaming());
        assert_eq!(
            f.events.statuses(),
            vec![(
                MessageLevel::Info,
                "Request for \"DisableRealTimeData\" from \"peer\" was ignored - concentrator \
                 data channel is set for auto-start."
                    .to_string()
            )]
        );
    }

    #[test]
    fn test_id_code_validation() {
        let mut settings = ConcentratorSettings::new(235);
        settings.validate_id_code = true;
        let f = fixture(settings);
        configure(&f.concentrator);
        f.events.clear();

        f.concentrator.handle_command(
            Uuid::new_v4(),
            "peer",
            &command(1, DeviceCommand::SendConfigurationFrame2),
        );
        assert!(f.channel.sent().is_empty());
        let statuses = f.events.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].0, MessageLevel::Warning);

        f.concentrator.handle_command(
            Uuid::new_v4(),
            "peer",
            &command(235, DeviceCommand::SendConfigurationFrame2),
        );
        assert_eq!(f.channel.sent().len(), 1);
    }

    #[test]
    fn test_garbage_is_reported_not_raised() {
        let f = fixture(ConcentratorSettings::new(235));
        f.concentrator.handle_command(Uuid::new_v4(), "10.0.0.9:1", &[0x00, 0x01, 0x02]);
        let mut corrupted = command(235, DeviceCommand::SendHeaderFrame);
        corrupted[15] ^= 0xFF;
        f.concentrator.handle_command(Uuid::new_v4(), "10.0.0.9:1", &corrupted);

        let exceptions = f.events.exceptions();
        assert_eq!(exceptions.len(), 2);
        assert!(exceptions.iter().all(|(level, message)| {
            *level == MessageLevel::Warning
                && message.starts_with(
                    "Remotely connected device \"10.0.0.9:1\" sent an unrecognized data sequence",
                )
        }));
        assert!(f.channel.sent().is_empty());
    }
}
