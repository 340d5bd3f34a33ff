// Streaming playback controller for timestamp-addressed narration audio

pub mod controller;
pub mod session;
pub mod spawner;

pub use controller::StreamingAudioController;
pub use session::{PlaybackSession, RequestToken};
pub use spawner::{Task, TaskSpawner, ThreadSpawner};
