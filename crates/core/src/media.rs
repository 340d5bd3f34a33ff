// Media element contract
//
// The element is whatever renders audio locally. It owns the play head and
// pushes notifications to its subscriber; the controller never polls it on
// a timer.

use crate::error::Result;
use crate::resource::{MediaResource, ResourceId};
use crate::time_ranges::TimeRanges;
use std::sync::Arc;

/// Notifications raised by a media element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Metadata of the loaded resource is known
    LoadedMetadata { resource: ResourceId },
    /// Duration became known or changed after the metadata stage
    DurationChange,
    /// More data was buffered
    Progress,
    /// Play head moved
    TimeUpdate,
    /// Rendering started
    Playing,
    /// Rendering stopped
    Pause,
    /// Reached the end of the resource
    Ended { resource: ResourceId },
    /// The element could not decode or render the resource
    Error { resource: Option<ResourceId>, message: String },
}

/// Subscriber side of the element's notifications
pub type MediaEventSink = Arc<dyn Fn(MediaEvent) + Send + Sync>;

/// Audio rendering element driven by the streaming controller.
///
/// Times are seconds on the book timeline. A loaded resource covers the span
/// starting at `MediaResource::origin`.
pub trait MediaElement {
    /// Register the receiver of element notifications
    fn subscribe(&mut self, sink: MediaEventSink);

    /// Replace the current source with `resource`; playback is left paused
    fn load(&mut self, resource: &MediaResource) -> Result<()>;

    /// Drop the current source and stop rendering
    fn unload(&mut self);

    /// Start or resume rendering
    fn play(&mut self) -> Result<()>;

    /// Stop rendering, keeping the play head
    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64);

    /// End of the loaded span, once metadata is known
    fn duration(&self) -> Option<f64>;

    fn buffered(&self) -> TimeRanges;
}
