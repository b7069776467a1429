// src/provider/engine.rs
//! Polling and dispatch engine
//!
//! One task per provider pulls raw events from the acquisition source and
//! applies them to [`Shared`]. Two locks split that state:
//!
//! - `status` holds availability, the last-known-location cache and the
//!   fault counter. It is only ever held for a few assignments and never
//!   across a listener callback, so callbacks may read provider state.
//! - `dispatch` holds the registration and its throttle. It is held for a
//!   whole dispatch, so a registration swap never lands halfway through one.
//!
//! When both are needed, `dispatch` is taken first.

use super::{
    registration::{Registration, Throttle, DEFAULT_MAX_AGE},
    state::StateMachine,
    LocationListener, ProviderState,
};
use crate::{
    error::{LocationError, Result},
    location::Location,
    source::{AcquisitionSource, PollParams, RawEvent},
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Pause after every event so a source that returns instantly cannot spin.
pub(crate) const POLL_YIELD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Stop,
}

/// What the foreground API reads
#[derive(Default)]
pub(crate) struct Status {
    state: StateMachine,
    last_known: Option<Location>,
    listener_faults: u64,
    shut_down: bool,
}

impl Status {
    pub(crate) fn state(&self) -> ProviderState {
        self.state.current()
    }

    pub(crate) fn last_known(&self) -> Option<Location> {
        self.last_known.clone()
    }

    pub(crate) fn listener_faults(&self) -> u64 {
        self.listener_faults
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The answer `get_location` can give without waiting, if any.
    pub(crate) fn immediate_fix(&self) -> Result<Option<Location>> {
        if self.shut_down {
            return Err(LocationError::Unavailable("location provider shut down".to_string()));
        }
        if self.state.current() == ProviderState::OutOfService {
            return Err(LocationError::Unavailable("location provider out of service".to_string()));
        }
        Ok(self
            .last_known
            .as_ref()
            .filter(|fix| fix.is_younger_than(DEFAULT_MAX_AGE))
            .cloned())
    }
}

struct Dispatch {
    registration: Registration,
    throttle: Throttle,
}

impl Dispatch {
    /// Hand `location` to the listener if the throttle lets it through.
    fn offer(&mut self, location: &Location, now: Instant) -> Option<String> {
        self.registration.listener()?;
        if !self.throttle.admit(self.registration.cadence(), now) {
            tracing::trace!(valid = location.is_valid(), "Throttled location");
            return None;
        }
        self.notify(|l| l.location_updated(location))
    }

    /// Run one callback. Returns the error text when it failed or panicked.
    fn notify<F>(&self, call: F) -> Option<String>
    where
        F: FnOnce(&dyn LocationListener) -> anyhow::Result<()>,
    {
        let listener = self.registration.listener()?;
        match panic::catch_unwind(AssertUnwindSafe(|| call(&**listener))) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Everything the polling task and the foreground API share
pub(crate) struct Shared {
    dispatch: Mutex<Dispatch>,
    status: Mutex<Status>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            dispatch: Mutex::new(Dispatch {
                registration: Registration::cleared(),
                throttle: Throttle::default(),
            }),
            status: Mutex::new(Status::default()),
        }
    }

    pub(crate) fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listener panics are caught inside the lock, so a poisoned lock still
    /// holds consistent state.
    fn dispatch(&self) -> MutexGuard<'_, Dispatch> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn poll_params(&self) -> PollParams {
        self.dispatch().registration.poll_params()
    }

    /// Swap the whole registration and open a fresh throttle window.
    ///
    /// Waits for a dispatch in progress, so calling this from inside a
    /// listener callback deadlocks.
    pub(crate) fn replace_registration(&self, registration: Registration) {
        tracing::debug!(?registration, "Replacing listener registration");
        let mut dispatch = self.dispatch();
        dispatch.registration = registration;
        dispatch.throttle.restart();
    }

    pub(crate) fn mark_shut_down(&self) {
        self.status().shut_down = true;
    }

    /// Apply one raw event arriving at `now`.
    pub(crate) fn apply(&self, event: RawEvent, now: Instant) -> Step {
        let mut dispatch = self.dispatch();

        // Status settles before any callback runs
        let (announce, location) = {
            let mut status = self.status();
            if status.shut_down {
                return Step::Stop;
            }
            match event {
                RawEvent::Shutdown => {
                    tracing::info!("Acquisition source signalled shutdown");
                    status.shut_down = true;
                    return Step::Stop;
                }
                RawEvent::StateChange(reported) => {
                    let announce = status.state.on_state_code(reported);
                    if announce.is_none() {
                        tracing::debug!("Suppressed explicit AVAILABLE state code");
                    }
                    (announce, None)
                }
                RawEvent::Fix(location) => {
                    let announce = status.state.on_fix(location.is_valid());
                    if location.is_valid() {
                        status.last_known = Some(location.clone());
                    }
                    (announce, Some(location))
                }
            }
        };

        if let Some(state) = announce {
            tracing::debug!(%state, "Provider state changed");
            if let Some(error) = dispatch.notify(|l| l.provider_state_changed(state)) {
                self.record_fault("provider_state_changed", &error);
            }
        }
        if let Some(location) = location {
            if let Some(error) = dispatch.offer(&location, now) {
                self.record_fault("location_updated", &error);
            }
        }
        Step::Continue
    }

    fn record_fault(&self, callback: &'static str, error: &str) {
        let faults = {
            let mut status = self.status();
            status.listener_faults += 1;
            status.listener_faults
        };
        tracing::warn!(callback, error, faults, "Listener fault");
    }
}

/// The background polling task
pub(crate) struct Engine<S> {
    source: S,
    shared: Arc<Shared>,
    fixes: watch::Sender<Option<Location>>,
    cancel: CancellationToken,
}

impl<S: AcquisitionSource> Engine<S> {
    pub(crate) fn new(
        source: S,
        shared: Arc<Shared>,
        fixes: watch::Sender<Option<Location>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            shared,
            fixes,
            cancel,
        }
    }

    pub(crate) async fn run(mut self) {
        let name = self.source.name().to_string();
        tracing::info!(source = %name, "Polling task started");

        loop {
            // Parameters may change under us; a poll with stale ones is fine
            let params = self.shared.poll_params();

            let polled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                polled = tokio::time::timeout(params.timeout, self.source.next_event(params)) => polled,
            };

            let event = match polled {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    tracing::warn!(source = %name, error = %e, "Acquisition source fault");
                    if pause(&self.cancel).await {
                        break;
                    }
                    continue;
                }
                Err(_) => RawEvent::Fix(Location::invalid()),
            };

            let fresh = match &event {
                RawEvent::Fix(fix) if fix.is_valid() => Some(fix.clone()),
                _ => None,
            };
            let step = self.shared.apply(event, Instant::now());
            if let Some(fix) = fresh {
                self.fixes.send_replace(Some(fix));
            }
            if step == Step::Stop || pause(&self.cancel).await {
                break;
            }
        }

        self.shared.mark_shut_down();
        self.source.stop().await;
        tracing::info!(source = %name, "Polling task stopped");
    }
}

/// Yield between events. Returns true when cancelled meanwhile.
async fn pause(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(POLL_YIELD) => false,
    }
}
