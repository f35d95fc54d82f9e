//! # Concentrator
//!
//! The `Concentrator` owns one output stream: its live configuration frame, the queue of
//! measurements waiting for publication and the stream's on/off state.
//!
//! ## Key Components
//!
//! - `update_configuration`: Builds and atomically publishes a new configuration frame.
//! - `build_data_frame`: Creates an empty data frame for a timestamp, applying the
//!   change notification and virtual device rules.
//! - `sort_measurement`: Places a measurement into its publication slot.
//! - `process_tick`: Publishes every slot older than the lag time.
//!
//! ## Usage
//!
//! The command listener and the publisher share one `Arc<Concentrator>`. Readers of the
//! live configuration load a whole `Arc<LiveConfiguration>`, so a rebuild never tears a
//! frame that is being encoded or served.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;

use super::builder::{build_configuration_frame, BuildOptions};
use super::channel::FrameChannel;
use super::clock::Clock;
use super::descriptor::BaseConfigurationFrame;
use super::events::{log_event, EventSink, MessageLevel};
use super::frame_queue::{FrameQueue, SortOutcome, SortingStatistics};
use super::measurement::Measurement;
use super::notification::{LiveConfiguration, NotificationState};
use super::settings::ConcentratorSettings;
use crate::error::{ConcentratorError, Result};
use crate::ieee_c37_118::common::FrameType;
use crate::ieee_c37_118::config::ConfigurationFrame;
use crate::ieee_c37_118::data_frame::DataFrame;
use crate::ieee_c37_118::flags::{StatusFlags, StatusUpdate};

const NO_BROADCAST_YET: i64 = i64::MIN;

pub struct Concentrator {
    settings: ConcentratorSettings,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    channel: Arc<dyn FrameChannel>,
    live: ArcSwapOption<LiveConfiguration>,
    streaming: AtomicBool,
    queue: Mutex<FrameQueue>,
    last_broadcast_minute: AtomicI64,
}

impl Concentrator {
    /// Creates a concentrator with no configuration.
    ///
    /// The data stream starts enabled when `autoStartDataChannel` is on.
    pub fn new(
        settings: ConcentratorSettings,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        channel: Arc<dyn FrameChannel>,
    ) -> Self {
        Concentrator {
            streaming: AtomicBool::new(settings.auto_start_data_channel),
            queue: Mutex::new(FrameQueue::new(&settings)),
            settings,
            clock,
            events,
            channel,
            live: ArcSwapOption::empty(),
            last_broadcast_minute: AtomicI64::new(NO_BROADCAST_YET),
        }
    }

    pub fn settings(&self) -> &ConcentratorSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn channel(&self) -> &dyn FrameChannel {
        self.channel.as_ref()
    }

    pub(crate) fn report_status(&self, level: MessageLevel, message: &str) {
        log_event(level, message);
        self.events.status(level, message);
    }

    pub(crate) fn report_exception(&self, level: MessageLevel, error: &ConcentratorError) {
        log_event(level, &error.to_string());
        self.events.exception(level, error);
    }

    pub fn live_configuration(&self) -> Option<Arc<LiveConfiguration>> {
        self.live.load_full()
    }

    pub fn configuration_frame(&self) -> Option<Arc<ConfigurationFrame>> {
        self.live.load().as_ref().map(|live| live.frame.clone())
    }

    pub fn notification_state(&self) -> NotificationState {
        match self.live.load().as_ref() {
            Some(live) => live.notification_state(self.clock.now()),
            None => NotificationState::Stable,
        }
    }

    /// Builds a configuration frame from `base` and makes it the live configuration.
    ///
    /// Devices that cannot be built are reported as warnings and left out. When a
    /// configuration was already live, the revision count of every cell is one more
    /// than the previous frame's and the change notification window opens now.
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<ConfigurationFrame>)`: The frame now being served.
    /// * `Err(ConcentratorError::Parse)`: If the frame is too large to encode. The
    ///   previous configuration stays live.
    pub fn update_configuration(
        &self,
        base: &BaseConfigurationFrame,
    ) -> Result<Arc<ConfigurationFrame>> {
        let now = self.clock.now();
        let options = BuildOptions::from_settings(&self.settings, now);
        let build = build_configuration_frame(base, &options);

        for failure in &build.failures {
            self.report_exception(
                MessageLevel::Warning,
                &ConcentratorError::InvalidDevice {
                    device: failure.device.clone(),
                    message: failure.message.clone(),
                },
            );
        }

        let mut frame = build.frame;
        frame.id_code = self.settings.id_code;
        // DATA_RATE advertises the rate the publisher actually runs at.
        frame.frame_rate = i16::try_from(self.settings.frames_per_second).unwrap_or(i16::MAX);
        let changed_at = match self.live.load().as_ref() {
            Some(previous) => {
                let revision = previous.frame.revision_count().wrapping_add(1);
                for cell in &mut frame.cells {
                    cell.revision_count = revision;
                }
                Some(now)
            }
            None => None,
        };

        let cell_count = frame.cells.len();
        let live = Arc::new(LiveConfiguration::new(frame, changed_at)?);
        let published = live.frame.clone();
        self.live.store(Some(live));

        self.report_status(
            MessageLevel::Info,
            &format!("Defined {} output stream devices...", cell_count),
        );
        Ok(published)
    }

    /// The cached wire image of the live configuration.
    ///
    /// # Returns
    ///
    /// * `Err(ConcentratorError::Unsupported)`: For configuration frame 3 or a
    ///   non-configuration frame type.
    /// * `Err(ConcentratorError::NoConfiguration)`: If nothing has been published yet.
    pub fn configuration_image(&self, frame_type: FrameType) -> Result<Vec<u8>> {
        if !matches!(frame_type, FrameType::Config1 | FrameType::Config2) {
            return Err(ConcentratorError::Unsupported(format!(
                "Serving {} frames",
                frame_type
            )));
        }
        let live = self.live.load_full().ok_or(ConcentratorError::NoConfiguration)?;
        live.image(frame_type)
            .map(<[u8]>::to_vec)
            .ok_or(ConcentratorError::NoConfiguration)
    }

    /// Creates the data frame for `timestamp` against the live configuration.
    ///
    /// Every cell starts empty. While the change notification window is open each cell
    /// reports ConfigurationChanged; virtual cells then have their status cleared.
    pub fn build_data_frame(&self, timestamp: DateTime<Utc>) -> Result<DataFrame> {
        let live = self.live.load_full().ok_or(ConcentratorError::NoConfiguration)?;
        Ok(self.data_frame_for(&live, timestamp))
    }

    fn data_frame_for(&self, live: &LiveConfiguration, timestamp: DateTime<Utc>) -> DataFrame {
        let mut frame = DataFrame::new(live.frame.clone(), timestamp);
        let notifying = live.notification_state(self.clock.now()) == NotificationState::Notifying;
        for (cell, configuration) in frame.cells.iter_mut().zip(&live.frame.cells) {
            if notifying {
                cell.apply_status(StatusUpdate::ConfigurationChanged(true));
            }
            if configuration.is_virtual {
                cell.status = StatusFlags::default();
            }
        }
        frame
    }

    /// Last adjustments before a frame goes out: the notification flag (a status
    /// measurement may have replaced it), the data valid rule and the virtual rule.
    fn finalize(&self, live: &LiveConfiguration, frame: &mut DataFrame) {
        let notifying = live.notification_state(self.clock.now()) == NotificationState::Notifying;
        for (cell, configuration) in frame.cells.iter_mut().zip(&live.frame.cells) {
            if notifying {
                cell.apply_status(StatusUpdate::ConfigurationChanged(true));
            }
            if self.settings.process_data_valid_flag && !cell.all_values_assigned() {
                cell.apply_status(StatusUpdate::DataValid(false));
            }
            if configuration.is_virtual {
                cell.status = StatusFlags::default();
            }
        }
    }

    /// Sorts one measurement into its publication slot.
    pub fn sort_measurement(&self, measurement: &Measurement) -> SortOutcome {
        let now = self.clock.now();
        self.queue
            .lock()
            .sort(measurement, now, |timestamp| self.build_data_frame(timestamp).ok())
    }

    /// Sorts a batch of measurements and returns how many were placed.
    pub fn sort_measurements<'a, I>(&self, measurements: I) -> usize
    where
        I: IntoIterator<Item = &'a Measurement>,
    {
        measurements
            .into_iter()
            .map(|measurement| self.sort_measurement(measurement))
            .filter(|outcome| matches!(outcome, SortOutcome::Sorted | SortOutcome::SortedByArrival))
            .count()
    }

    pub fn statistics(&self) -> SortingStatistics {
        self.queue.lock().statistics()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn start_data_channel(&self) {
        self.streaming.store(true, Ordering::SeqCst);
    }

    pub fn stop_data_channel(&self) {
        self.streaming.store(false, Ordering::SeqCst);
    }

    /// Publishes every slot older than the lag time, oldest first.
    ///
    /// While the stream is stopped (or no configuration is live) ready slots are
    /// dropped. A queued frame built against an older configuration is replaced by a
    /// fresh one. Frame errors are reported and do not stop the remaining slots.
    ///
    /// # Returns
    ///
    /// The number of data frames broadcast.
    pub fn process_tick(&self) -> usize {
        let now = self.clock.now();
        let ready = self.queue.lock().take_ready(now);
        if ready.is_empty() || !self.is_streaming() {
            return 0;
        }
        let Some(live) = self.live.load_full() else {
            return 0;
        };

        let mut published = 0;
        for slot in ready {
            let mut frame = match slot.frame {
                Some(frame) if Arc::ptr_eq(&frame.configuration, &live.frame) => frame,
                _ => self.data_frame_for(&live, slot.timestamp),
            };
            self.finalize(&live, &mut frame);

            if self.settings.auto_publish_config_frame {
                self.publish_configuration_on_minute(&live, frame.timestamp);
            }

            match frame.to_hex() {
                Ok(image) => {
                    self.channel.broadcast(&image);
                    self.queue.lock().record_publication();
                    published += 1;
                }
                Err(error) => {
                self.report_exception(MessageLevel::Error, &ConcentratorError::from(error))
            }
            }
        }
        published
    }

    /// Broadcasts the configuration frame ahead of the first data frame of each minute.
    fn publish_configuration_on_minute(&self, live: &LiveConfiguration, timestamp: DateTime<Utc>) {
        if timestamp.second() != 0 {
            return;
        }
        let minute = timestamp.timestamp().div_euclid(60);
        if self.last_broadcast_minute.swap(minute, Ordering::SeqCst) == minute {
            return;
        }
        let mut frame = live.frame.as_ref().clone();
        frame.timestamp = timestamp;
        match frame.to_hex() {
            Ok(image) => {
                self.channel.broadcast(&image);
            }
            Err(error) => {
                self.report_exception(MessageLevel::Error, &ConcentratorError::from(error))
            }
        }
    }
}
