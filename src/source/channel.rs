// src/source/channel.rs
//! In-process source fed through an mpsc channel

use super::{AcquisitionSource, PollParams, RawEvent};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Source whose events are pushed by the embedding application.
///
/// Dropping every sender ends the feed with [`RawEvent::Shutdown`].
pub struct ChannelSource {
    events: mpsc::Receiver<RawEvent>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<RawEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { events: rx })
    }
}

#[async_trait]
impl AcquisitionSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self, _params: PollParams) -> Result<RawEvent> {
        Ok(self.events.recv().await.unwrap_or(RawEvent::Shutdown))
    }

    async fn stop(&mut self) {
        self.events.close();
    }
}
