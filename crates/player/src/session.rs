// Per-book playback session

use needle_core::{BookId, PlayerState, ResourceId, ResourceSlot};
use std::fmt;

/// Identifies one `play`/`seek`/`pause` call. Tokens come from a single
/// controller-wide counter, so they never repeat across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ephemeral state for the selected book. Dropping the session releases
/// its installed resource.
#[derive(Debug)]
pub struct PlaybackSession {
    book_id: BookId,
    /// Only completions carrying this token are applied
    pub(crate) latest_token: Option<RequestToken>,
    pub(crate) slot: ResourceSlot,
    /// A `play`, or a `seek` that should resume, is waiting for its fetch
    pub(crate) pending_resume: bool,
    /// Last state outside `Loading`, restored when a seek fetch fails
    pub(crate) settled_state: PlayerState,
}

impl PlaybackSession {
    pub fn new(book_id: BookId) -> Self {
        Self {
            book_id,
            latest_token: None,
            slot: ResourceSlot::new(),
            pending_resume: false,
            settled_state: PlayerState::Idle,
        }
    }

    pub fn book_id(&self) -> &BookId {
        &self.book_id
    }

    pub fn installed(&self) -> Option<ResourceId> {
        self.slot.current().map(|handle| handle.id())
    }

    pub(crate) fn is_current(&self, book_id: &BookId, token: RequestToken) -> bool {
        &self.book_id == book_id && self.latest_token == Some(token)
    }
}
