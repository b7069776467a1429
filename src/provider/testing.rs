// src/provider/testing.rs
//! Listeners and fixes shared by the provider tests

use super::{LocationListener, ProviderState};
use crate::{
    geo::{Coordinates, QualifiedCoordinates},
    location::Location,
};
use chrono::Utc;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Note {
    State(ProviderState),
    Fix { valid: bool },
}

/// Records every callback in arrival order.
#[derive(Default)]
pub(crate) struct Recorder {
    notes: Mutex<Vec<Note>>,
}

impl Recorder {
    pub(crate) fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub(crate) fn fixes(&self) -> usize {
        self.notes()
            .iter()
            .filter(|n| matches!(n, Note::Fix { .. }))
            .count()
    }
}

impl LocationListener for Recorder {
    fn location_updated(&self, location: &Location) -> anyhow::Result<()> {
        self.notes.lock().unwrap().push(Note::Fix {
            valid: location.is_valid(),
        });
        Ok(())
    }

    fn provider_state_changed(&self, state: ProviderState) -> anyhow::Result<()> {
        self.notes.lock().unwrap().push(Note::State(state));
        Ok(())
    }
}

/// Fails every callback, alternating between panicking and returning `Err`.
#[derive(Default)]
pub(crate) struct Faulty {
    attempts: AtomicUsize,
}

impl Faulty {
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt % 2 == 0 {
            panic!("listener blew up on attempt {}", attempt);
        }
        anyhow::bail!("listener refused attempt {}", attempt)
    }
}

impl LocationListener for Faulty {
    fn location_updated(&self, _location: &Location) -> anyhow::Result<()> {
        self.fail()
    }

    fn provider_state_changed(&self, _state: ProviderState) -> anyhow::Result<()> {
        self.fail()
    }
}

pub(crate) fn valid_fix() -> Location {
    let coordinates = Coordinates::new(48.117, 11.517, Some(545.4)).unwrap();
    Location::new(QualifiedCoordinates::from(coordinates), Some(1.5), Some(90.0), Utc::now()).unwrap()
}
