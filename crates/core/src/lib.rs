// Core types and traits for the Needle narration client

pub mod callback;
pub mod config;
pub mod error;
pub mod media;
pub mod model;
pub mod resource;
pub mod state;
pub mod time_ranges;
pub mod transport;

// Re-export commonly used types
pub use callback::{
    CallbackManager, ControllerEvent, ErrorCallback, FailureKind, PlaybackFailure, PlayerCallback,
    RecordingCallback,
};
pub use config::ClientConfig;
pub use error::{NarrationError, Result};
pub use media::{MediaElement, MediaEvent, MediaEventSink};
pub use model::{AudioPayload, BookId, BookMetadata, ChapterPosition, InterruptRequest, ReadingPosition};
pub use resource::{MediaResource, ResourceHandle, ResourceId, ResourceRegistry, ResourceSlot};
pub use state::{PlaybackStatus, PlayerState, StatusCell};
pub use time_ranges::{TimeRange, TimeRanges};
pub use transport::NarrationTransport;
