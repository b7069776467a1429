// src/source/mod.rs
//! Acquisition sources: the raw event feed behind a location provider

pub mod channel;
pub mod gpsd;
pub mod nmea;

use crate::{config::SourceConfig, error::Result, location::Location, provider::ProviderState};
use async_trait::async_trait;
use std::time::Duration;

pub use channel::ChannelSource;
pub use gpsd::GpsdSource;
pub use nmea::NmeaSerialSource;

/// One event from an acquisition source
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// A position sample, possibly invalid when no data was available
    Fix(Location),
    StateChange(ProviderState),
    /// The source is going away; terminal for the provider
    Shutdown,
}

/// Request hints handed to the source on every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollParams {
    /// Zero when the listener only wants state changes
    pub interval: Duration,
    /// How long the source may wait before reporting an invalid fix
    pub timeout: Duration,
    /// Oldest cached sample the source may hand back
    pub max_age: Duration,
}

/// A blocking feed of raw positioning events.
///
/// `next_event` may be called repeatedly with different parameters. The
/// polling task drops in-flight `next_event` futures on timeout and
/// shutdown, so implementations must be cancellation safe.
#[async_trait]
pub trait AcquisitionSource: Send {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Bring up the hardware. Fails with `Unavailable` when there is none.
    async fn start(&mut self) -> Result<()>;

    /// Wait for the next event.
    async fn next_event(&mut self, params: PollParams) -> Result<RawEvent>;

    /// Release the hardware after the polling task exits.
    async fn stop(&mut self) {}
}

#[async_trait]
impl<S: AcquisitionSource + ?Sized> AcquisitionSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn start(&mut self) -> Result<()> {
        (**self).start().await
    }

    async fn next_event(&mut self, params: PollParams) -> Result<RawEvent> {
        (**self).next_event(params).await
    }

    async fn stop(&mut self) {
        (**self).stop().await
    }
}

/// Build the source selected by configuration
pub fn from_config(config: &SourceConfig) -> Box<dyn AcquisitionSource> {
    match config {
        SourceConfig::Gpsd { host, port } => Box::new(GpsdSource::new(host.clone(), *port)),
        SourceConfig::Serial { port, baudrate } => {
            Box::new(NmeaSerialSource::new(port.clone(), *baudrate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_backend() {
        let gpsd = from_config(&SourceConfig::Gpsd {
            host: "localhost".to_string(),
            port: 2947,
        });
        assert_eq!(gpsd.name(), "gpsd");

        let serial = from_config(&SourceConfig::Serial {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: 9600,
        });
        assert_eq!(serial.name(), "nmea-serial");
    }
}
