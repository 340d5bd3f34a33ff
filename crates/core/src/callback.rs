// Controller events and listener dispatch
// Status snapshots are republished on every element tick, so they are throttled

use crate::state::{PlaybackStatus, PlayerState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Failure classes surfaced to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Narration service returned a non-2xx status or was unreachable
    FetchFailed,
    /// The media element could not render the stream
    PlaybackError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PlaybackFailure {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::FetchFailed,
            message: message.into(),
        }
    }

    pub fn playback(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::PlaybackError,
            message: message.into(),
        }
    }
}

/// Controller event types
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
    },

    /// Coalesced status after an element notification
    StatusChanged(PlaybackStatus),

    /// A `play` fetch was installed and rendering started
    PlaybackStarted { at: f64 },

    /// A `seek` fetch was installed at `target`
    SeekCompleted { target: f64, resumed: bool },

    /// The service acknowledged a pause
    InterruptAcknowledged { timestamp: f64 },

    /// The element reached the end of the installed resource
    PlaybackEnded,

    Failed(PlaybackFailure),
}

/// Listener trait. Implementations must return quickly; they run on the
/// controller's thread.
pub trait PlayerCallback: Send + Sync {
    fn on_event(&self, event: ControllerEvent);
}

impl<F> PlayerCallback for F
where
    F: Fn(ControllerEvent) + Send + Sync,
{
    fn on_event(&self, event: ControllerEvent) {
        self(event)
    }
}

/// Adapter that only forwards failures
pub struct ErrorCallback<F> {
    handler: F,
}

impl<F> ErrorCallback<F>
where
    F: Fn(&PlaybackFailure) + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> PlayerCallback for ErrorCallback<F>
where
    F: Fn(&PlaybackFailure) + Send + Sync,
{
    fn on_event(&self, event: ControllerEvent) {
        if let ControllerEvent::Failed(failure) = &event {
            (self.handler)(failure);
        }
    }
}

/// Rate-limits `StatusChanged`; every other event passes straight through.
/// A snapshot whose state or playing flag differs from the last one delivered
/// is never held back. Other snapshots inside the window are kept as pending
/// and delivered by `flush` once the window has passed.
pub struct ThrottledCallback {
    inner: Arc<dyn PlayerCallback>,
    throttle: Mutex<StatusThrottle>,
    status_interval: Duration,
}

#[derive(Default)]
struct StatusThrottle {
    last_sent: Option<Instant>,
    last_key: Option<(PlayerState, bool)>,
    pending: Option<PlaybackStatus>,
}

impl StatusThrottle {
    fn due(&self, interval: Duration) -> bool {
        self.last_sent.map_or(true, |at| at.elapsed() >= interval)
    }

    fn mark_sent(&mut self, status: &PlaybackStatus) {
        self.last_sent = Some(Instant::now());
        self.last_key = Some((status.state, status.is_playing));
        self.pending = None;
    }
}

impl ThrottledCallback {
    pub fn new(callback: Arc<dyn PlayerCallback>, interval_ms: u64) -> Self {
        Self {
            inner: callback,
            throttle: Mutex::new(StatusThrottle::default()),
            status_interval: Duration::from_millis(interval_ms),
        }
    }

    pub fn dispatch(&self, event: ControllerEvent) {
        match event {
            ControllerEvent::StatusChanged(status) => {
                let mut throttle = self.throttle.lock();
                let changed = throttle.last_key != Some((status.state, status.is_playing));
                if changed || throttle.due(self.status_interval) {
                    throttle.mark_sent(&status);
                    drop(throttle);
                    self.inner.on_event(ControllerEvent::StatusChanged(status));
                } else {
                    throttle.pending = Some(status);
                }
            }
            other => self.inner.on_event(other),
        }
    }

    /// Deliver the held-back snapshot if its window has passed. Returns
    /// whether one was delivered.
    pub fn flush(&self) -> bool {
        let mut throttle = self.throttle.lock();
        if !throttle.due(self.status_interval) {
            return false;
        }
        let Some(status) = throttle.pending.take() else {
            return false;
        };
        throttle.mark_sent(&status);
        drop(throttle);
        self.inner.on_event(ControllerEvent::StatusChanged(status));
        true
    }
}

/// Fan-out to every registered listener
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Mutex<Vec<Arc<ThrottledCallback>>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&self, callback: Arc<dyn PlayerCallback>, throttle_ms: u64) {
        let throttled = Arc::new(ThrottledCallback::new(callback, throttle_ms));
        self.callbacks.lock().push(throttled);
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch_event(&self, event: ControllerEvent) {
        // Snapshot the list so a listener may register another one
        let callbacks: Vec<_> = self.callbacks.lock().clone();
        for callback in callbacks.iter() {
            callback.dispatch(event.clone());
        }
    }

    /// Deliver any status snapshots held back by throttling whose window has
    /// passed.
    pub fn flush_pending(&self) {
        let callbacks: Vec<_> = self.callbacks.lock().clone();
        for callback in callbacks.iter() {
            callback.flush();
        }
    }
}

/// Records every event; used by tests across the workspace
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<ControllerEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ControllerEvent> {
        self.events.lock().clone()
    }

    pub fn failures(&self) -> Vec<PlaybackFailure> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::Failed(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PlayerCallback for RecordingCallback {
    fn on_event(&self, event: ControllerEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_status_updates_are_throttled() {
        let recorder = Arc::new(RecordingCallback::new());
        let throttled = ThrottledCallback::new(recorder.clone(), 100);

        for i in 0..10 {
            throttled.dispatch(ControllerEvent::StatusChanged(PlaybackStatus {
                current_time: i as f64,
                ..PlaybackStatus::default()
            }));
            thread::sleep(Duration::from_millis(10));
        }

        let events = recorder.events();
        assert!(!events.is_empty());
        assert!(events.len() < 10);
    }

    #[test]
    fn test_state_change_bypasses_window() {
        let recorder = Arc::new(RecordingCallback::new());
        let throttled = ThrottledCallback::new(recorder.clone(), 10_000);

        let playing = PlaybackStatus {
            state: PlayerState::Playing,
            is_playing: true,
            ..PlaybackStatus::default()
        };
        throttled.dispatch(ControllerEvent::StatusChanged(playing.clone()));
        throttled.dispatch(ControllerEvent::StatusChanged(PlaybackStatus {
            current_time: 1.0,
            ..playing.clone()
        }));
        throttled.dispatch(ControllerEvent::StatusChanged(PlaybackStatus {
            state: PlayerState::Paused,
            is_playing: false,
            current_time: 1.2,
            ..playing
        }));

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        match events.last() {
            Some(ControllerEvent::StatusChanged(status)) => {
                assert_eq!(status.state, PlayerState::Paused);
                assert!(!status.is_playing);
            }
            other => panic!("unexpected event {:?}", other),
        }
        // The held-back tick was superseded by the delivered pause
        assert!(!throttled.flush());
    }

    #[test]
    fn test_flush_delivers_latest_held_snapshot() {
        let recorder = Arc::new(RecordingCallback::new());
        let throttled = ThrottledCallback::new(recorder.clone(), 30);

        for i in 0..3 {
            throttled.dispatch(ControllerEvent::StatusChanged(PlaybackStatus {
                current_time: i as f64,
                ..PlaybackStatus::default()
            }));
        }
        assert_eq!(recorder.events().len(), 1);
        assert!(!throttled.flush());

        thread::sleep(Duration::from_millis(40));
        assert!(throttled.flush());
        assert!(!throttled.flush());
        assert_eq!(
            recorder.events().last(),
            Some(&ControllerEvent::StatusChanged(PlaybackStatus {
                current_time: 2.0,
                ..PlaybackStatus::default()
            }))
        );
    }

    #[test]
    fn test_other_events_are_not_throttled() {
        let recorder = Arc::new(RecordingCallback::new());
        let throttled = ThrottledCallback::new(recorder.clone(), 10_000);

        throttled.dispatch(ControllerEvent::StateChanged {
            old_state: PlayerState::Idle,
            new_state: PlayerState::Loading,
        });
        throttled.dispatch(ControllerEvent::Failed(PlaybackFailure::fetch("503")));
        throttled.dispatch(ControllerEvent::PlaybackEnded);

        assert_eq!(recorder.events().len(), 3);
    }

    #[test]
    fn test_error_callback_filters_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let manager = CallbackManager::new();
        manager.add_callback(
            Arc::new(ErrorCallback::new(move |f: &PlaybackFailure| sink.lock().push(f.kind))),
            0,
        );

        manager.dispatch_event(ControllerEvent::PlaybackEnded);
        manager.dispatch_event(ControllerEvent::Failed(PlaybackFailure::playback("corrupt frame")));

        assert_eq!(*seen.lock(), vec![FailureKind::PlaybackError]);
    }
}
