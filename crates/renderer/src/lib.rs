// Native media element for narration playback

pub mod convert;
pub mod element;
pub mod ring;

pub use convert::SampleConverter;
pub use element::{NativeElement, OutputSpec};
pub use ring::SharedSampleRing;
