// Narration service contract consumed by the streaming controller

use crate::error::Result;
use crate::model::{AudioPayload, BookId};

/// Remote side of playback: timestamp-addressed audio and interruption
/// notices. Calls block; the controller runs them off its own thread.
pub trait NarrationTransport: Send + Sync + 'static {
    /// Audio for `book_id` starting at (or containing) `timestamp` seconds
    fn fetch_audio(&self, book_id: &BookId, timestamp: f64) -> Result<AudioPayload>;

    /// Tell the service narration was interrupted at `timestamp`
    fn notify_interrupt(&self, book_id: &BookId, timestamp: f64) -> Result<()>;
}
