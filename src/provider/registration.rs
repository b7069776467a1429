// src/provider/registration.rs
//! Listener registration, parameter validation and location throttling

use super::ProviderState;
use crate::{
    error::{LocationError, Result},
    location::Location,
    source::PollParams,
};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

/// Sentinel selecting the provider default for interval, timeout or max age.
pub const USE_DEFAULT: i64 = -1;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(3_000);

/// Receives provider events on the polling task.
///
/// Callbacks may read the provider ([`state`], [`last_known_location`] and
/// friends) and see the state that triggered them. They hold up the next
/// poll, and calling `register` or `reset` from inside one deadlocks. An
/// `Err` or a panic is recorded as a listener fault and dispatch carries on.
///
/// [`state`]: super::LocationProvider::state
/// [`last_known_location`]: super::LocationProvider::last_known_location
pub trait LocationListener: Send + Sync {
    fn location_updated(&self, location: &Location) -> anyhow::Result<()>;

    fn provider_state_changed(&self, state: ProviderState) -> anyhow::Result<()>;
}

/// How often locations reach the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// State changes only, never locations
    StatusOnly,
    /// At most one location per interval
    Every(Duration),
}

/// A validated listener registration. Replaced as a whole, never patched.
#[derive(Clone)]
pub struct Registration {
    listener: Option<Arc<dyn LocationListener>>,
    cadence: Cadence,
    timeout: Duration,
    max_age: Duration,
}

impl Registration {
    /// Validate raw millisecond arguments.
    ///
    /// `interval`: -1 default, 0 status only, >0 throttle window.
    /// `timeout`/`max_age`: -1 default, otherwise in [1, interval]. Both are
    /// ignored when `interval` is -1.
    pub fn new(
        listener: Option<Arc<dyn LocationListener>>,
        interval: i64,
        timeout: i64,
        max_age: i64,
    ) -> Result<Self> {
        if interval < USE_DEFAULT {
            return Err(LocationError::invalid(format!(
                "interval ({}) must be -1, 0 or positive",
                interval
            )));
        }

        if interval == USE_DEFAULT {
            return Ok(Self {
                listener,
                cadence: Cadence::Every(DEFAULT_INTERVAL),
                timeout: DEFAULT_TIMEOUT,
                max_age: DEFAULT_MAX_AGE,
            });
        }

        let timeout = bounded_by_interval("timeout", timeout, interval, DEFAULT_TIMEOUT)?;
        let max_age = bounded_by_interval("maxAge", max_age, interval, DEFAULT_MAX_AGE)?;
        let cadence = if interval == 0 {
            Cadence::StatusOnly
        } else {
            Cadence::Every(millis(interval))
        };

        Ok(Self {
            listener,
            cadence,
            timeout,
            max_age,
        })
    }

    /// No listener, status-only cadence, default timeout and max age
    pub fn cleared() -> Self {
        Self {
            listener: None,
            cadence: Cadence::StatusOnly,
            timeout: DEFAULT_TIMEOUT,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn listener(&self) -> Option<&Arc<dyn LocationListener>> {
        self.listener.as_ref()
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn poll_params(&self) -> PollParams {
        let interval = match self.cadence {
            Cadence::StatusOnly => Duration::ZERO,
            Cadence::Every(interval) => interval,
        };
        PollParams {
            interval,
            timeout: self.timeout,
            max_age: self.max_age,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("listener", &self.listener.is_some())
            .field("cadence", &self.cadence)
            .field("timeout", &self.timeout)
            .field("max_age", &self.max_age)
            .finish()
    }
}

/// Validate the timeout of a synchronous fetch: -1 default, otherwise > 0.
pub fn fetch_timeout(timeout: i64) -> Result<Duration> {
    match timeout {
        USE_DEFAULT => Ok(DEFAULT_TIMEOUT),
        t if t > 0 => Ok(millis(t)),
        t => Err(LocationError::invalid(format!(
            "timeout ({}) must be -1 or positive",
            t
        ))),
    }
}

fn bounded_by_interval(name: &str, value: i64, interval: i64, default: Duration) -> Result<Duration> {
    if value == USE_DEFAULT {
        return Ok(default);
    }
    if value < 1 || value > interval {
        return Err(LocationError::invalid(format!(
            "{} ({}) must be -1 or within [1, {}]",
            name, value, interval
        )));
    }
    Ok(millis(value))
}

fn millis(value: i64) -> Duration {
    Duration::from_millis(value.unsigned_abs())
}

/// Drop-not-queue rate limiter for location notifications.
#[derive(Debug, Default)]
pub(crate) struct Throttle {
    last_dispatch: Option<Instant>,
}

impl Throttle {
    /// Whether a location arriving at `now` may be forwarded. Admitting it
    /// starts a new window.
    pub(crate) fn admit(&mut self, cadence: Cadence, now: Instant) -> bool {
        let Cadence::Every(interval) = cadence else {
            return false;
        };
        if let Some(last) = self.last_dispatch {
            if now.saturating_duration_since(last) < interval {
                return false;
            }
        }
        self.last_dispatch = Some(now);
        true
    }

    /// Forget the last dispatch so the next location goes straight through.
    pub(crate) fn restart(&mut self) {
        self.last_dispatch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl LocationListener for Silent {
        fn location_updated(&self, _location: &Location) -> anyhow::Result<()> {
            Ok(())
        }

        fn provider_state_changed(&self, _state: ProviderState) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn listener() -> Option<Arc<dyn LocationListener>> {
        Some(Arc::new(Silent))
    }

    #[test]
    fn test_interval_below_floor_rejected() {
        let err = Registration::new(listener(), -2, -1, -1).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_timeout_above_interval_rejected() {
        assert!(Registration::new(listener(), 100, 200, -1).unwrap_err().is_invalid_argument());
        assert!(Registration::new(listener(), 100, -1, 101).is_err());
        assert!(Registration::new(listener(), 100, 0, -1).is_err());
        assert!(Registration::new(listener(), 100, -1, -5).is_err());
        assert!(Registration::new(listener(), 0, 1, -1).is_err());
    }

    #[test]
    fn test_default_interval_ignores_timeout_and_max_age() {
        let reg = Registration::new(listener(), -1, 99_999, -7).unwrap();
        assert_eq!(reg.cadence(), Cadence::Every(DEFAULT_INTERVAL));
        assert_eq!(
            reg.poll_params(),
            PollParams {
                interval: DEFAULT_INTERVAL,
                timeout: DEFAULT_TIMEOUT,
                max_age: DEFAULT_MAX_AGE,
            }
        );
    }

    #[test]
    fn test_explicit_values() {
        let reg = Registration::new(listener(), 5_000, 5_000, 1).unwrap();
        assert_eq!(reg.cadence(), Cadence::Every(Duration::from_secs(5)));
        let params = reg.poll_params();
        assert_eq!(params.timeout, Duration::from_secs(5));
        assert_eq!(params.max_age, Duration::from_millis(1));
        assert!(reg.listener().is_some());
    }

    #[test]
    fn test_status_only_and_cleared() {
        let reg = Registration::new(None, 0, -1, -1).unwrap();
        assert_eq!(reg.cadence(), Cadence::StatusOnly);
        assert!(reg.listener().is_none());

        let cleared = Registration::cleared();
        assert_eq!(cleared.cadence(), Cadence::StatusOnly);
        assert_eq!(cleared.poll_params().interval, Duration::ZERO);
    }

    #[test]
    fn test_fetch_timeout() {
        assert_eq!(fetch_timeout(-1).unwrap(), DEFAULT_TIMEOUT);
        assert_eq!(fetch_timeout(250).unwrap(), Duration::from_millis(250));
        assert!(fetch_timeout(0).unwrap_err().is_invalid_argument());
        assert!(fetch_timeout(-2).is_err());
    }

    #[test]
    fn test_throttle_drops_within_window() {
        let mut throttle = Throttle::default();
        let cadence = Cadence::Every(Duration::from_millis(1_000));
        let t0 = Instant::now();

        assert!(throttle.admit(cadence, t0));
        assert!(!throttle.admit(cadence, t0 + Duration::from_millis(10)));
        assert!(!throttle.admit(cadence, t0 + Duration::from_millis(999)));
        assert!(throttle.admit(cadence, t0 + Duration::from_millis(1_000)));
        // Dropped arrivals never extend the window
        assert!(!throttle.admit(cadence, t0 + Duration::from_millis(1_500)));
        assert!(throttle.admit(cadence, t0 + Duration::from_millis(2_000)));
    }

    #[test]
    fn test_throttle_status_only_never_admits() {
        let mut throttle = Throttle::default();
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(!throttle.admit(Cadence::StatusOnly, t0 + Duration::from_secs(i * 5)));
        }
    }

    #[test]
    fn test_throttle_restart() {
        let mut throttle = Throttle::default();
        let cadence = Cadence::Every(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(throttle.admit(cadence, t0));
        assert!(!throttle.admit(cadence, t0 + Duration::from_secs(1)));
        throttle.restart();
        assert!(throttle.admit(cadence, t0 + Duration::from_secs(2)));
    }
}
