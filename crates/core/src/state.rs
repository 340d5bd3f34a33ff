// Playback state machine and the status snapshot published to the host

use crate::error::{NarrationError, Result};
use crate::time_ranges::TimeRanges;
use parking_lot::RwLock;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No resource is playing (nothing loaded yet, or the last one ended)
    Idle,
    /// Waiting for the narration service to deliver audio
    Loading,
    /// The media element is rendering audio
    Playing,
    /// Playback was interrupted by the user
    Paused,
    /// The last fetch or playback attempt failed
    Error,
}

impl PlayerState {
    /// Whether the state machine accepts a move from `self` to `to`.
    pub fn can_transition_to(self, to: PlayerState) -> bool {
        use PlayerState::*;

        match (self, to) {
            // Teardown is always allowed
            (_, Idle) => true,

            // Every play/seek goes through Loading, including overlapping ones
            (_, Loading) => true,

            (Loading, Playing) => true,
            (Loading, Paused) => true,
            (Loading, Error) => true,

            (Playing, Paused) => true,
            (Playing, Error) => true,

            (Paused, Playing) => true,
            (Paused, Error) => true,

            (Idle, Paused) => true,
            (Idle, Error) => true,

            (Error, Paused) => true,

            _ => false,
        }
    }
}

/// Read-only view of a playback session
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlayerState,
    /// True only while the media element is actively playing
    pub is_playing: bool,
    /// Play head in seconds, as reported by the media element
    pub current_time: f64,
    /// Known once the current segment loaded its metadata
    pub duration: Option<f64>,
    pub buffered: TimeRanges,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            state: PlayerState::Idle,
            is_playing: false,
            current_time: 0.0,
            duration: None,
            buffered: TimeRanges::empty(),
        }
    }
}

/// Status owned by the controller; listeners receive snapshots.
#[derive(Default)]
pub struct StatusCell {
    status: RwLock<PlaybackStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PlayerState {
        self.status.read().state
    }

    pub fn snapshot(&self) -> PlaybackStatus {
        self.status.read().clone()
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut PlaybackStatus),
    {
        let mut status = self.status.write();
        f(&mut status);
    }

    /// Move to `to`, returning the previous state.
    pub fn transition(&self, to: PlayerState) -> Result<PlayerState> {
        let mut status = self.status.write();
        let from = status.state;
        if from == to {
            return Ok(from);
        }
        if !from.can_transition_to(to) {
            return Err(NarrationError::InvalidState(format!(
                "Invalid state transition from {:?} to {:?}",
                from, to
            )));
        }
        status.state = to;
        log::debug!("Player state changed: {:?} -> {:?}", from, to);
        Ok(from)
    }

    /// Clear everything back to a fresh idle session.
    pub fn reset(&self) {
        *self.status.write() = PlaybackStatus::default();
    }

}
