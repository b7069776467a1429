// src/provider/mod.rs
//! Location provider handle
//!
//! [`LocationProvider::start`] brings up an acquisition source and spawns
//! the polling task. The handle owns that task: dropping it or calling
//! [`LocationProvider::shutdown`] stops acquisition.

mod engine;
pub mod registration;
pub mod state;
#[cfg(test)]
mod testing;

pub use registration::{
    Cadence, LocationListener, Registration, DEFAULT_INTERVAL, DEFAULT_MAX_AGE, DEFAULT_TIMEOUT,
    USE_DEFAULT,
};
pub use state::ProviderState;

use crate::{
    error::{LocationError, Result},
    location::Location,
    source::AcquisitionSource,
};
use engine::{Engine, Shared};
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub struct LocationProvider {
    name: String,
    shared: Arc<Shared>,
    fixes: watch::Receiver<Option<Location>>,
    resets: watch::Sender<u64>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl LocationProvider {
    /// Start `source` and spawn the polling task.
    ///
    /// Fails with [`LocationError::Unavailable`] when the source cannot be
    /// brought up. Must be called from within a tokio runtime.
    pub async fn start<S>(mut source: S) -> Result<Self>
    where
        S: AcquisitionSource + 'static,
    {
        let name = source.name().to_string();
        source.start().await.map_err(|e| match e {
            LocationError::Unavailable(_) => e,
            other => LocationError::Unavailable(format!("{}: {}", name, other)),
        })?;

        let shared = Arc::new(Shared::new());
        let (fixes_tx, fixes) = watch::channel(None);
        let (resets, _) = watch::channel(0u64);
        let cancel = CancellationToken::new();

        let engine = Engine::new(source, Arc::clone(&shared), fixes_tx, cancel.clone());
        let worker = tokio::spawn(engine.run());

        Ok(Self {
            name,
            shared,
            fixes,
            resets,
            cancel,
            worker: Some(worker),
        })
    }

    /// Name of the underlying acquisition source
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the listener registration.
    ///
    /// All times are milliseconds, [`USE_DEFAULT`] selects the provider
    /// default. `interval` 0 delivers state changes only. On error the
    /// current registration is left untouched. Waits for a callback in
    /// progress to return.
    pub fn register(
        &self,
        listener: Option<Arc<dyn LocationListener>>,
        interval: i64,
        timeout: i64,
        max_age: i64,
    ) -> Result<()> {
        let registration = Registration::new(listener, interval, timeout, max_age)?;
        self.shared.replace_registration(registration);
        Ok(())
    }

    /// Fetch one location, waiting at most `timeout` milliseconds.
    ///
    /// A cached fix younger than [`DEFAULT_MAX_AGE`] is returned at once.
    /// Otherwise waits for the next valid fix. [`reset`](Self::reset) makes a
    /// pending call return [`LocationError::Cancelled`].
    pub async fn get_location(&self, timeout: i64) -> Result<Location> {
        let timeout = registration::fetch_timeout(timeout)?;

        // Subscribe before looking at the cache so nothing slips in between
        let mut resets = self.resets.subscribe();
        let mut fixes = self.fixes.clone();
        fixes.borrow_and_update();

        let cached = self.shared.status().immediate_fix()?;
        if let Some(fix) = cached {
            return Ok(fix);
        }

        tokio::select! {
            _ = resets.changed() => Err(LocationError::Cancelled),
            outcome = tokio::time::timeout(timeout, next_fix(&mut fixes)) => {
                outcome.unwrap_or_else(|_| Err(LocationError::Timeout(timeout)))
            }
        }
    }

    /// Clear the registration and cancel pending [`get_location`](Self::get_location) calls.
    pub fn reset(&self) {
        self.shared.replace_registration(Registration::cleared());
        self.resets.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        tracing::debug!(provider = %self.name, "Provider reset");
    }

    pub fn state(&self) -> ProviderState {
        self.shared.status().state()
    }

    /// Most recent valid fix, if one was ever seen
    pub fn last_known_location(&self) -> Option<Location> {
        self.shared.status().last_known()
    }

    /// Number of listener callbacks that returned an error or panicked
    pub fn listener_faults(&self) -> u64 {
        self.shared.status().listener_faults()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.status().is_shut_down()
    }

    /// Stop the polling task and wait for the source to be released.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::warn!(provider = %self.name, error = %e, "Polling task ended abnormally");
            }
        }
    }
}

impl Drop for LocationProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn next_fix(fixes: &mut watch::Receiver<Option<Location>>) -> Result<Location> {
    loop {
        fixes
            .changed()
            .await
            .map_err(|_| LocationError::Unavailable("location provider shut down".to_string()))?;
        if let Some(fix) = fixes.borrow_and_update().clone() {
            return Ok(fix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ChannelSource, PollParams, RawEvent};
    use async_trait::async_trait;
    use std::time::{Duration, Instant};
    use super::testing::{valid_fix, Faulty, Note, Recorder};
    use std::{
        collections::VecDeque,
        sync::{Mutex, OnceLock, Weak},
    };
    use tokio::sync::mpsc;

    async fn channel_provider() -> (mpsc::Sender<RawEvent>, LocationProvider) {
        let (tx, source) = ChannelSource::new(16);
        let provider = LocationProvider::start(source).await.unwrap();
        (tx, provider)
    }

    /// Poll `check` until it holds, failing after two seconds.
    async fn eventually(check: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl AcquisitionSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn start(&mut self) -> Result<()> {
            Err(LocationError::Connection("no receiver attached".to_string()))
        }

        async fn next_event(&mut self, _params: PollParams) -> Result<RawEvent> {
            Ok(RawEvent::Shutdown)
        }
    }

    /// Plays back a fixed list of poll outcomes, then goes quiet.
    struct ScriptedSource {
        script: VecDeque<Result<RawEvent>>,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = Result<RawEvent>>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    #[async_trait]
    impl AcquisitionSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&mut self) -> Result<()> {
            Ok(())
        }

        async fn next_event(&mut self, _params: PollParams) -> Result<RawEvent> {
            match self.script.pop_front() {
                Some(outcome) => outcome,
                None => std::future::pending().await,
            }
        }
    }

    /// Reads the provider's state from inside its own callbacks.
    #[derive(Default)]
    struct StateReader {
        provider: OnceLock<Weak<LocationProvider>>,
        seen: Mutex<Vec<(ProviderState, bool)>>,
    }

    impl StateReader {
        fn seen(&self) -> Vec<(ProviderState, bool)> {
            self.seen.lock().unwrap().clone()
        }

        fn look(&self) -> anyhow::Result<()> {
            let provider = self
                .provider
                .get()
                .and_then(Weak::upgrade)
                .ok_or_else(|| anyhow::anyhow!("provider gone"))?;
            let entry = (provider.state(), provider.last_known_location().is_some());
            self.seen.lock().unwrap().push(entry);
            Ok(())
        }
    }

    impl LocationListener for StateReader {
        fn location_updated(&self, _location: &Location) -> anyhow::Result<()> {
            self.look()
        }

        fn provider_state_changed(&self, _state: ProviderState) -> anyhow::Result<()> {
            self.look()
        }
    }

    #[tokio::test]
    async fn test_start_failure_is_unavailable() {
        let err = LocationProvider::start(BrokenSource).await.err().unwrap();
        assert!(matches!(err, LocationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_status_only_never_sees_locations() {
        let (tx, provider) = channel_provider().await;
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 0, -1, -1).unwrap();

        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        tx.send(RawEvent::StateChange(ProviderState::OutOfService)).await.unwrap();
        tx.send(RawEvent::Fix(Location::invalid())).await.unwrap();
        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();

        eventually(|| recorder.notes().len() >= 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            recorder.notes(),
            vec![
                Note::State(ProviderState::Available),
                Note::State(ProviderState::OutOfService),
                Note::State(ProviderState::Available),
            ]
        );
    }

    #[tokio::test]
    async fn test_interval_throttles_burst() {
        let (tx, provider) = channel_provider().await;
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 1_000, -1, -1).unwrap();

        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();

        eventually(|| recorder.fixes() >= 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(recorder.fixes(), 1);
        assert_eq!(provider.state(), ProviderState::Available);
    }

    #[tokio::test]
    async fn test_explicit_available_suppressed() {
        let (tx, provider) = channel_provider().await;
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 0, -1, -1).unwrap();

        tx.send(RawEvent::StateChange(ProviderState::Available)).await.unwrap();
        tx.send(RawEvent::StateChange(ProviderState::TemporarilyUnavailable)).await.unwrap();

        eventually(|| !recorder.notes().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            recorder.notes(),
            vec![Note::State(ProviderState::TemporarilyUnavailable)]
        );
        assert_eq!(provider.state(), ProviderState::TemporarilyUnavailable);
    }

    #[tokio::test]
    async fn test_faulty_listener_keeps_receiving() {
        let (tx, provider) = channel_provider().await;
        let faulty = Arc::new(Faulty::default());
        provider.register(Some(faulty.clone()), 1, -1, -1).unwrap();

        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        tx.send(RawEvent::StateChange(ProviderState::TemporarilyUnavailable)).await.unwrap();
        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        tx.send(RawEvent::StateChange(ProviderState::OutOfService)).await.unwrap();

        eventually(|| faulty.attempts() >= 6).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(faulty.attempts(), 6);
        assert_eq!(provider.listener_faults(), 6);
        assert!(!provider.is_shut_down());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_listener_may_read_provider_state() {
        let (tx, provider) = channel_provider().await;
        let provider = Arc::new(provider);
        let reader = Arc::new(StateReader::default());
        reader.provider.set(Arc::downgrade(&provider)).unwrap();
        provider.register(Some(reader.clone()), 1, -1, -1).unwrap();

        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        eventually(|| reader.seen().len() >= 2).await;
        assert_eq!(
            reader.seen(),
            vec![(ProviderState::Available, true), (ProviderState::Available, true)]
        );

        // The foreground API stays responsive afterwards
        let handle = Arc::clone(&provider);
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            tokio::task::spawn_blocking(move || {
                handle.reset();
                handle.state()
            }),
        )
        .await
        .expect("provider lock still held")
        .unwrap();
        assert_eq!(state, ProviderState::Available);
        assert_eq!(provider.listener_faults(), 0);
    }

    #[tokio::test]
    async fn test_source_fault_is_absorbed() {
        let source = ScriptedSource::new([
            Err(LocationError::Parse("garbled sentence".to_string())),
            Ok(RawEvent::Fix(valid_fix())),
        ]);
        let provider = LocationProvider::start(source).await.unwrap();
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 1, -1, -1).unwrap();

        eventually(|| recorder.fixes() >= 1).await;
        assert_eq!(
            recorder.notes(),
            vec![Note::State(ProviderState::Available), Note::Fix { valid: true }]
        );
        assert!(!provider.is_shut_down());
        assert_eq!(provider.listener_faults(), 0);
    }

    #[tokio::test]
    async fn test_poll_timeout_delivers_invalid_locations() {
        let provider = LocationProvider::start(ScriptedSource::new([])).await.unwrap();
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 20, 20, 20).unwrap();

        eventually(|| recorder.fixes() >= 2).await;
        assert!(recorder
            .notes()
            .iter()
            .all(|note| *note == Note::Fix { valid: false }));
        assert_eq!(provider.state(), ProviderState::TemporarilyUnavailable);
        assert!(provider.last_known_location().is_none());
        assert!(!provider.is_shut_down());
    }

    #[tokio::test]
    async fn test_reset_cancels_pending_fetch() {
        let (_tx, provider) = channel_provider().await;
        let started = Instant::now();

        let (outcome, _) = tokio::join!(provider.get_location(30_000), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            provider.reset();
        });

        assert!(matches!(outcome, Err(LocationError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_reset_clears_listener() {
        let (tx, provider) = channel_provider().await;
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 1, -1, -1).unwrap();
        provider.reset();

        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        eventually(|| provider.last_known_location().is_some()).await;
        assert!(recorder.notes().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_waits_for_next_fix_then_uses_cache() {
        let (tx, provider) = channel_provider().await;

        let (outcome, _) = tokio::join!(provider.get_location(5_000), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(RawEvent::Fix(Location::invalid())).await.unwrap();
            tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        });
        assert!(outcome.unwrap().is_valid());

        // Nothing new arrives, the fresh cached fix answers at once
        let cached = provider.get_location(100).await.unwrap();
        assert!(cached.is_valid());
    }

    #[tokio::test]
    async fn test_fetch_timeout_validation() {
        let (_tx, provider) = channel_provider().await;
        assert!(provider.get_location(0).await.unwrap_err().is_invalid_argument());
        assert!(provider.get_location(-2).await.unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let (_tx, provider) = channel_provider().await;
        let err = provider.get_location(100).await.unwrap_err();
        assert!(matches!(err, LocationError::Timeout(t) if t == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_out_of_service_fetch_is_unavailable() {
        let (tx, provider) = channel_provider().await;
        tx.send(RawEvent::StateChange(ProviderState::OutOfService)).await.unwrap();
        eventually(|| provider.state() == ProviderState::OutOfService).await;

        let err = provider.get_location(100).await.unwrap_err();
        assert!(matches!(err, LocationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_last_known_ignores_invalid_fixes() {
        let (tx, provider) = channel_provider().await;
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 1, -1, -1).unwrap();
        assert!(provider.last_known_location().is_none());

        tx.send(RawEvent::Fix(valid_fix())).await.unwrap();
        tx.send(RawEvent::Fix(Location::invalid())).await.unwrap();

        eventually(|| recorder.fixes() >= 2).await;
        assert!(provider.last_known_location().unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_source_shutdown_is_terminal() {
        let (tx, provider) = channel_provider().await;
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 1, -1, -1).unwrap();

        tx.send(RawEvent::Shutdown).await.unwrap();
        eventually(|| provider.is_shut_down()).await;

        // The source was stopped, later events go nowhere
        let _ = tx.send(RawEvent::Fix(valid_fix())).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.notes().is_empty());
        assert!(provider.last_known_location().is_none());
        assert_eq!(provider.state(), ProviderState::TemporarilyUnavailable);

        let err = provider.get_location(1_000).await.unwrap_err();
        assert!(matches!(err, LocationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_register_validation_keeps_registration() {
        let (tx, provider) = channel_provider().await;
        let recorder = Arc::new(Recorder::default());
        provider.register(Some(recorder.clone()), 0, -1, -1).unwrap();

        let rejected: Arc<dyn LocationListener> = Arc::new(Recorder::default());
        assert!(provider
            .register(Some(rejected.clone()), -2, -1, -1)
            .unwrap_err()
            .is_invalid_argument());
        assert!(provider
            .register(Some(rejected), 100, 200, -1)
            .unwrap_err()
            .is_invalid_argument());

        tx.send(RawEvent::StateChange(ProviderState::OutOfService)).await.unwrap();
        eventually(|| !recorder.notes().is_empty()).await;
        assert_eq!(recorder.notes(), vec![Note::State(ProviderState::OutOfService)]);
    }

    #[tokio::test]
    async fn test_explicit_shutdown() {
        let (tx, provider) = channel_provider().await;
        assert_eq!(provider.name(), "channel");
        provider.shutdown().await;
        // stop() closed the receiving side
        assert!(tx.send(RawEvent::Shutdown).await.is_err());
    }
}
