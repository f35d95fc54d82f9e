//! Outbound frame delivery.
//!
//! The concentrator hands finished frame images to a `FrameChannel`: replies go to the
//! client that asked, data and scheduled configuration frames go to everyone.

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::Result;

/// Identifies one connected client of the command channel.
pub type ClientId = Uuid;

pub trait FrameChannel: Send + Sync {
    /// Sends an image to one client.
    fn send_to(&self, client: ClientId, image: &[u8]) -> Result<()>;

    /// Sends an image to every connected client and returns how many were reached.
    fn broadcast(&self, image: &[u8]) -> usize;
}

/// A frame handed to `RecordingChannel`. `client` is `None` for broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub client: Option<ClientId>,
    pub image: Vec<u8>,
}

/// Channel that stores every frame instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentFrame>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl FrameChannel for RecordingChannel {
    fn send_to(&self, client: ClientId, image: &[u8]) -> Result<()> {
        self.sent.lock().push(SentFrame {
            client: Some(client),
            image: image.to_vec(),
        });
        Ok(())
    }

    fn broadcast(&self, image: &[u8]) -> usize {
        self.sent.lock().push(SentFrame {
            client: None,
            image: image.to_vec(),
        });
        1
    }
}
