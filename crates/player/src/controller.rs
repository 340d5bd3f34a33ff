// Streaming audio controller
//
// Bridges play/pause/seek to a local media element and a narration service
// that serves audio by timestamp. The controller lives on one thread; fetches
// run on spawned tasks and report back through the inbox, which the owner
// drains with `process_pending` or `wait_next`.

use crate::session::{PlaybackSession, RequestToken};
use crate::spawner::{TaskSpawner, ThreadSpawner};
use needle_core::{
    AudioPayload, BookId, CallbackManager, ControllerEvent, ErrorCallback, MediaElement,
    MediaEvent, NarrationError, NarrationTransport, PlaybackFailure, PlaybackStatus,
    PlayerCallback, PlayerState, ResourceId, ResourceRegistry, Result, StatusCell,
};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_STATUS_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq)]
enum FetchPurpose {
    Play,
    Seek { resume: bool, restore: PlayerState },
}

enum ControllerMessage {
    Fetched {
        token: RequestToken,
        book_id: BookId,
        timestamp: f64,
        purpose: FetchPurpose,
        result: Result<AudioPayload>,
    },
    Interrupted {
        book_id: BookId,
        timestamp: f64,
        result: Result<()>,
    },
    Media(MediaEvent),
}

pub struct StreamingAudioController<E: MediaElement, T: NarrationTransport> {
    element: E,
    transport: Arc<T>,
    spawner: Arc<dyn TaskSpawner>,
    registry: ResourceRegistry,
    session: Option<PlaybackSession>,
    status: StatusCell,
    callbacks: CallbackManager,
    status_interval_ms: u64,
    next_token: u64,
    inbox_tx: Sender<ControllerMessage>,
    inbox_rx: Receiver<ControllerMessage>,
}

impl<E: MediaElement, T: NarrationTransport> StreamingAudioController<E, T> {
    pub fn new(element: E, transport: Arc<T>) -> Self {
        Self::with_spawner(element, transport, Arc::new(ThreadSpawner))
    }

    pub fn with_spawner(mut element: E, transport: Arc<T>, spawner: Arc<dyn TaskSpawner>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel();

        let media_tx = Mutex::new(inbox_tx.clone());
        element.subscribe(Arc::new(move |event| {
            let _ = media_tx.lock().send(ControllerMessage::Media(event));
        }));

        Self {
            element,
            transport,
            spawner,
            registry: ResourceRegistry::new(),
            session: None,
            status: StatusCell::new(),
            callbacks: CallbackManager::new(),
            status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
            next_token: 0,
            inbox_tx,
            inbox_rx,
        }
    }

    /// Throttle interval for `StatusChanged` on listeners added afterwards
    pub fn set_status_interval(&mut self, interval_ms: u64) {
        self.status_interval_ms = interval_ms;
    }

    pub fn add_callback(&self, callback: Arc<dyn PlayerCallback>) {
        self.callbacks.add_callback(callback, self.status_interval_ms);
    }

    /// Register a handler that only receives failures
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&PlaybackFailure) + Send + Sync + 'static,
    {
        self.add_callback(Arc::new(ErrorCallback::new(handler)));
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.clear_callbacks();
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.snapshot()
    }

    pub fn current_book(&self) -> Option<&BookId> {
        self.session.as_ref().map(|s| s.book_id())
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn installed_resource(&self) -> Option<ResourceId> {
        self.session.as_ref().and_then(|s| s.installed())
    }

    /// Resource handles currently alive
    pub fn live_resources(&self) -> usize {
        self.registry.live_count()
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    /// Open a session for `book_id`, discarding the previous one. A non-zero
    /// `initial_timestamp` is applied with an implicit seek.
    pub fn select_book(&mut self, book_id: BookId, initial_timestamp: f64) {
        self.teardown();
        log::info!(
            "[controller] selected book {} (initial timestamp {:.2}s)",
            book_id,
            initial_timestamp
        );
        self.session = Some(PlaybackSession::new(book_id));
        self.element.set_current_time(0.0);
        self.publish_status();

        if initial_timestamp > 0.0 {
            self.seek(initial_timestamp);
        }
    }

    /// Fetch audio at the play head and start rendering it.
    pub fn play(&mut self) {
        let timestamp = self.element.current_time();
        let Some(token) = self.begin_request("play") else {
            return;
        };
        if let Some(session) = self.session.as_mut() {
            session.pending_resume = true;
        }
        log::info!("[controller] play {} from {:.2}s", token, timestamp);
        self.set_state(PlayerState::Loading);
        self.spawn_fetch(token, timestamp, FetchPurpose::Play);
    }

    /// Stop rendering now and notify the service of the interruption point.
    pub fn pause(&mut self) {
        let Some(token) = self.begin_request("pause") else {
            return;
        };
        self.element.pause();
        let timestamp = self.element.current_time();
        let book_id = match self.session.as_mut() {
            Some(session) => {
                session.pending_resume = false;
                session.book_id().clone()
            }
            None => return,
        };

        log::info!("[controller] pause {} at {:.2}s", token, timestamp);
        self.status.update(|s| {
            s.is_playing = false;
            s.current_time = timestamp;
        });
        self.set_state(PlayerState::Paused);
        self.publish_status();

        let transport = self.transport.clone();
        let tx = self.inbox_tx.clone();
        let task_book = book_id.clone();
        let spawned = self.spawner.spawn(
            "needle-interrupt",
            Box::new(move || {
                let result = transport.notify_interrupt(&task_book, timestamp);
                let _ = tx.send(ControllerMessage::Interrupted {
                    book_id: task_book,
                    timestamp,
                    result,
                });
            }),
        );
        if let Err(e) = spawned {
            self.on_interrupted(book_id, timestamp, Err(e));
        }
    }

    /// Fetch audio from `target` and move the play head there, resuming only
    /// if playback was active.
    pub fn seek(&mut self, target: f64) {
        if self.session.is_none() {
            log::debug!("[controller] seek ignored: no book selected");
            return;
        }
        if !(target >= 0.0) || !target.is_finite() {
            log::warn!("[controller] seek ignored: invalid target {}", target);
            return;
        }

        let state = self.status.state();
        let resume = self.element.is_playing()
            || self.session.as_ref().map_or(false, |s| s.pending_resume);
        let restore = match (state, self.session.as_ref()) {
            (PlayerState::Loading, Some(session)) => session.settled_state,
            _ => state,
        };

        let Some(token) = self.begin_request("seek") else {
            return;
        };
        if let Some(session) = self.session.as_mut() {
            session.pending_resume = resume;
        }
        log::info!("[controller] seek {} to {:.2}s (resume {})", token, target, resume);
        self.set_state(PlayerState::Loading);
        self.spawn_fetch(token, target, FetchPurpose::Seek { resume, restore });
    }

    /// Apply every queued completion and element notification. Returns how
    /// many messages were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        self.callbacks.flush_pending();
        handled
    }

    /// Block up to `timeout` for the next message, then drain the rest.
    pub fn wait_next(&mut self, timeout: Duration) -> usize {
        match self.inbox_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle(message);
                1 + self.process_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.callbacks.flush_pending();
                0
            }
        }
    }

    /// Discard the session: unload the element and release its resource.
    pub fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        log::info!("[controller] tearing down session for {}", session.book_id());
        self.element.unload();
        session.slot.release();
        drop(session);

        let old_state = self.status.state();
        self.status.reset();
        if old_state != PlayerState::Idle {
            self.callbacks.dispatch_event(ControllerEvent::StateChanged {
                old_state,
                new_state: PlayerState::Idle,
            });
        }
        self.publish_status();
    }

    fn begin_request(&mut self, op: &str) -> Option<RequestToken> {
        let Some(session) = self.session.as_mut() else {
            log::debug!("[controller] {} ignored: no book selected", op);
            return None;
        };
        self.next_token += 1;
        let token = RequestToken::new(self.next_token);
        session.latest_token = Some(token);
        Some(token)
    }

    fn spawn_fetch(&mut self, token: RequestToken, timestamp: f64, purpose: FetchPurpose) {
        let Some(book_id) = self.current_book().cloned() else {
            return;
        };
        let transport = self.transport.clone();
        let tx = self.inbox_tx.clone();
        let task_book = book_id.clone();
        let spawned = self.spawner.spawn(
            "needle-fetch",
            Box::new(move || {
                let result = transport.fetch_audio(&task_book, timestamp);
                let _ = tx.send(ControllerMessage::Fetched {
                    token,
                    book_id: task_book,
                    timestamp,
                    purpose,
                    result,
                });
            }),
        );
        if let Err(e) = spawned {
            self.on_fetched(token, book_id, timestamp, purpose, Err(e));
        }
    }

    fn handle(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Fetched {
                token,
                book_id,
                timestamp,
                purpose,
                result,
            } => self.on_fetched(token, book_id, timestamp, purpose, result),
            ControllerMessage::Interrupted {
                book_id,
                timestamp,
                result,
            } => self.on_interrupted(book_id, timestamp, result),
            ControllerMessage::Media(event) => self.on_media_event(event),
        }
    }

    fn on_fetched(
        &mut self,
        token: RequestToken,
        book_id: BookId,
        timestamp: f64,
        purpose: FetchPurpose,
        result: Result<AudioPayload>,
    ) {
        match self.session.as_mut() {
            Some(session) if session.is_current(&book_id, token) => {
                session.pending_resume = false;
            }
            _ => {
                log::debug!(
                    "[controller] discarding stale fetch {} for {} at {:.2}s",
                    token,
                    book_id,
                    timestamp
                );
                return;
            }
        }

        match result {
            Ok(payload) => self.install(payload, timestamp, purpose),
            Err(e) => {
                log::warn!("[controller] fetch at {:.2}s failed: {}", timestamp, e);
                match purpose {
                    FetchPurpose::Play => {
                        self.element.pause();
                        self.element.unload();
                        if let Some(session) = self.session.as_mut() {
                            session.slot.release();
                        }
                        self.status.update(|s| s.is_playing = false);
                        self.set_state(PlayerState::Error);
                    }
                    FetchPurpose::Seek { restore, .. } => {
                        self.set_state(restore);
                    }
                }
                let failure = if e.is_fetch_failure() {
                    PlaybackFailure::fetch(e.to_string())
                } else {
                    PlaybackFailure::playback(e.to_string())
                };
                self.fail(failure);
                self.publish_status();
            }
        }
    }

    fn install(&mut self, payload: AudioPayload, timestamp: f64, purpose: FetchPurpose) {
        let handle = self.registry.create(payload, timestamp);
        let resource = handle.resource().clone();

        if let Err(e) = self.element.load(&resource) {
            drop(handle);
            self.element.unload();
            if let Some(session) = self.session.as_mut() {
                session.slot.release();
            }
            self.playback_failure(e);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.slot.install(handle);
        }
        self.element.set_current_time(timestamp);
        log::debug!("[controller] installed {} at {:.2}s", resource.id, timestamp);

        let resume = match purpose {
            FetchPurpose::Play => true,
            FetchPurpose::Seek { resume, .. } => resume,
        };
        if resume {
            if let Err(e) = self.element.play() {
                self.playback_failure(e);
                return;
            }
            self.refresh_status();
            self.set_state(PlayerState::Playing);
        } else {
            self.refresh_status();
            self.set_state(PlayerState::Paused);
        }

        let event = match purpose {
            FetchPurpose::Play => ControllerEvent::PlaybackStarted { at: timestamp },
            FetchPurpose::Seek { resume, .. } => ControllerEvent::SeekCompleted {
                target: timestamp,
                resumed: resume,
            },
        };
        self.callbacks.dispatch_event(event);
        self.publish_status();
    }

    fn on_interrupted(&mut self, book_id: BookId, timestamp: f64, result: Result<()>) {
        match result {
            Ok(()) => {
                log::debug!("[controller] interrupt for {} at {:.2}s acknowledged", book_id, timestamp);
                self.callbacks
                    .dispatch_event(ControllerEvent::InterruptAcknowledged { timestamp });
            }
            Err(e) => {
                log::warn!("[controller] interrupt notification failed: {}", e);
                self.fail(PlaybackFailure::fetch(e.to_string()));
            }
        }
    }

    fn on_media_event(&mut self, event: MediaEvent) {
        let Some(installed) = self.session.as_ref().map(|s| s.installed()) else {
            return;
        };

        match event {
            MediaEvent::Ended { resource } => {
                if installed != Some(resource) {
                    log::debug!("[controller] ignoring end of superseded {}", resource);
                    return;
                }
                log::info!("[controller] playback of {} ended", resource);
                self.element.unload();
                if let Some(session) = self.session.as_mut() {
                    session.slot.release();
                }
                self.refresh_status();
                self.status.update(|s| s.is_playing = false);
                self.set_state(PlayerState::Idle);
                self.callbacks.dispatch_event(ControllerEvent::PlaybackEnded);
            }
            MediaEvent::Error { resource, message } => {
                if resource.is_some() && resource != installed {
                    log::debug!("[controller] ignoring error from superseded resource: {}", message);
                    return;
                }
                self.playback_failure(NarrationError::MediaPlaybackError(message));
            }
            MediaEvent::LoadedMetadata { resource } => {
                if installed != Some(resource) {
                    return;
                }
                self.refresh_status();
            }
            MediaEvent::Pause => {
                self.refresh_status();
                if self.status.state() == PlayerState::Playing && !self.element.is_playing() {
                    self.set_state(PlayerState::Paused);
                }
            }
            MediaEvent::DurationChange
            | MediaEvent::Progress
            | MediaEvent::TimeUpdate
            | MediaEvent::Playing => self.refresh_status(),
        }
        self.publish_status();
    }

    fn playback_failure(&mut self, error: NarrationError) {
        log::error!("[controller] playback error: {}", error);
        self.element.pause();
        self.status.update(|s| s.is_playing = false);
        self.set_state(PlayerState::Error);
        let message = match error {
            NarrationError::MediaPlaybackError(msg) => msg,
            other => other.to_string(),
        };
        self.fail(PlaybackFailure::playback(message));
        self.publish_status();
    }

    fn fail(&self, failure: PlaybackFailure) {
        self.callbacks.dispatch_event(ControllerEvent::Failed(failure));
    }

    fn refresh_status(&self) {
        let element = &self.element;
        self.status.update(|s| {
            s.is_playing = element.is_playing();
            s.current_time = element.current_time();
            s.duration = element.duration();
            s.buffered = element.buffered();
        });
    }

    fn publish_status(&self) {
        self.callbacks
            .dispatch_event(ControllerEvent::StatusChanged(self.status.snapshot()));
    }

    fn set_state(&mut self, to: PlayerState) {
        match self.status.transition(to) {
            Ok(from) => {
                if to != PlayerState::Loading {
                    if let Some(session) = self.session.as_mut() {
                        session.settled_state = to;
                    }
                }
                if from != to {
                    self.callbacks.dispatch_event(ControllerEvent::StateChanged {
                        old_state: from,
                        new_state: to,
                    });
                }
            }
            Err(e) => log::warn!("[controller] {}", e),
        }
    }
}

impl<E: MediaElement, T: NarrationTransport> Drop for StreamingAudioController<E, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
