// cpal-backed media element
//
// Each loaded resource gets its own engine: a decode thread that owns the
// symphonia decoder and the cpal output stream, and a sample ring the output
// callback drains. The element only flips atomics and posts seek requests;
// all notifications except Playing/Pause come from the decode thread.

use crate::convert::SampleConverter;
use crate::ring::SharedSampleRing;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use needle_core::{
    AudioPayload, MediaElement, MediaEvent, MediaEventSink, MediaResource, NarrationError,
    ResourceId, Result, TimeRanges,
};
use needle_decode::PayloadDecoder;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Seconds of output audio the ring holds
const RING_SECONDS: usize = 5;
const IDLE_SLEEP: Duration = Duration::from_millis(10);
const DEFAULT_TIME_UPDATE_MS: u64 = 250;
/// Seeks closer than this to the play head are dropped
const SEEK_TOLERANCE_SECONDS: f64 = 1e-3;

/// Output device format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl OutputSpec {
    /// Format of the default output device
    pub fn default_device() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| NarrationError::DeviceError("No output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| NarrationError::DeviceError(format!("Output config failed: {}", e)))?;
        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(NarrationError::DeviceError(
                "Only f32 sample format supported".to_string(),
            ));
        }
        Ok(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        })
    }

    fn samples_per_second(&self) -> f64 {
        self.sample_rate.max(1) as f64 * self.channels.max(1) as f64
    }
}

#[derive(Clone, Default)]
struct Notifier {
    sink: Arc<Mutex<Option<MediaEventSink>>>,
}

impl Notifier {
    fn emit(&self, event: MediaEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }
}

/// State shared by the element, the decode thread and the output callback.
/// Times are seconds from the start of the resource.
struct EngineShared {
    resource: ResourceId,
    output: OutputSpec,
    playing: AtomicBool,
    stop: AtomicBool,
    seek_request: Mutex<Option<f64>>,
    /// Resource time of the first sample queued after the last seek
    base: Mutex<f64>,
    played_samples: AtomicU64,
    decoded: Mutex<Option<(f64, f64)>>,
    duration: Mutex<Option<f64>>,
    decode_done: AtomicBool,
    ended: AtomicBool,
}

impl EngineShared {
    fn new(resource: ResourceId, output: OutputSpec) -> Self {
        Self {
            resource,
            output,
            playing: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            seek_request: Mutex::new(None),
            base: Mutex::new(0.0),
            played_samples: AtomicU64::new(0),
            decoded: Mutex::new(None),
            duration: Mutex::new(None),
            decode_done: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    fn position(&self) -> f64 {
        let played = self.played_samples.load(Ordering::SeqCst) as f64;
        let position = *self.base.lock() + played / self.output.samples_per_second();
        match *self.duration.lock() {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn clamp(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        match *self.duration.lock() {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }

    fn reposition(&self, seconds: f64) {
        *self.base.lock() = seconds;
        self.played_samples.store(0, Ordering::SeqCst);
        self.ended.store(false, Ordering::SeqCst);
    }

    /// Queue a decoder seek to `seconds` unless the play head is already
    /// there. Returns whether a seek was queued.
    fn request_seek(&self, seconds: f64) -> bool {
        let target = self.clamp(seconds);
        if (target - self.position()).abs() < SEEK_TOLERANCE_SECONDS {
            return false;
        }
        self.reposition(target);
        *self.seek_request.lock() = Some(target);
        true
    }
}

struct Engine {
    origin: f64,
    shared: Arc<EngineShared>,
    ring: SharedSampleRing,
    thread: Option<thread::JoinHandle<()>>,
}

impl Engine {
    fn start(
        resource: &MediaResource,
        output: OutputSpec,
        notifier: Notifier,
        time_update: Duration,
    ) -> Result<Self> {
        let shared = Arc::new(EngineShared::new(resource.id, output));
        let ring = SharedSampleRing::with_capacity(
            output.sample_rate as usize * output.channels.max(1) as usize * RING_SECONDS,
        );

        let thread_shared = shared.clone();
        let thread_ring = ring.clone();
        let payload = resource.payload.clone();
        let handle = thread::Builder::new()
            .name(format!("needle-decode-{}", resource.id))
            .spawn(move || {
                let id = thread_shared.resource;
                if let Err(e) = decode_loop(&thread_shared, &thread_ring, payload, &notifier, time_update)
                {
                    log::error!("[element] decode loop for {} failed: {}", id, e);
                    thread_shared.playing.store(false, Ordering::SeqCst);
                    notifier.emit(MediaEvent::Error {
                        resource: Some(id),
                        message: e.to_string(),
                    });
                }
            })
            .map_err(|e| {
                NarrationError::MediaPlaybackError(format!("Failed to spawn decode thread: {}", e))
            })?;

        Ok(Self {
            origin: resource.origin,
            shared,
            ring,
            thread: Some(handle),
        })
    }

    fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("[element] decode thread for {} panicked", self.shared.resource);
            }
        }
        self.ring.clear();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_stream(shared: &Arc<EngineShared>, ring: &SharedSampleRing) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| NarrationError::DeviceError("No output device available".to_string()))?;
    let config = cpal::StreamConfig {
        channels: shared.output.channels,
        sample_rate: cpal::SampleRate(shared.output.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let cb_shared = shared.clone();
    let cb_ring = ring.clone();
    let mut underflows: u64 = 0;
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !cb_shared.playing.load(Ordering::SeqCst) {
                    data.fill(0.0);
                    return;
                }
                let read = cb_ring.pop(data);
                cb_shared
                    .played_samples
                    .fetch_add(read as u64, Ordering::SeqCst);
                if read < data.len() {
                    data[read..].fill(0.0);
                    if !cb_shared.decode_done.load(Ordering::SeqCst) {
                        underflows += 1;
                        if underflows % 10 == 0 {
                            log::warn!("[element] audio underflow count={}", underflows);
                        }
                    }
                }
            },
            |err| log::error!("[element] output stream error: {}", err),
            None,
        )
        .map_err(|e| NarrationError::DeviceError(format!("Failed to build output stream: {}", e)))?;
    stream
        .play()
        .map_err(|e| NarrationError::DeviceError(format!("Failed to start output stream: {}", e)))?;
    Ok(stream)
}

fn decode_loop(
    shared: &Arc<EngineShared>,
    ring: &SharedSampleRing,
    payload: AudioPayload,
    notifier: &Notifier,
    time_update: Duration,
) -> Result<()> {
    let resource = shared.resource;
    let mut decoder = PayloadDecoder::open(&payload)?;
    let info = decoder.info().clone();
    *shared.duration.lock() = info.duration;
    *shared.decoded.lock() = Some((0.0, 0.0));

    let stream = open_stream(shared, ring)?;
    let mut converter = SampleConverter::new(
        info.sample_rate,
        shared.output.sample_rate,
        info.channels,
        shared.output.channels,
    );
    log::info!(
        "[element] {} ready: {} Hz x{} -> {} Hz x{}, duration {:?}",
        resource,
        info.sample_rate,
        info.channels,
        shared.output.sample_rate,
        shared.output.channels,
        info.duration
    );

    if info.duration.is_some() {
        notifier.emit(MediaEvent::DurationChange);
    }
    notifier.emit(MediaEvent::LoadedMetadata { resource });

    let mut pending: Vec<f32> = Vec::new();
    let mut pending_at = 0;
    let mut last_tick = Instant::now();
    let mut last_progress = Instant::now();
    let mut progress_dirty = false;

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        let seek = shared.seek_request.lock().take();
        if let Some(target) = seek {
            let reached = decoder.seek(target)?;
            converter.reset();
            pending.clear();
            pending_at = 0;
            ring.clear();
            shared.reposition(target);
            shared.decode_done.store(false, Ordering::SeqCst);
            *shared.decoded.lock() = Some((reached, reached));
            log::debug!("[element] {} seek to {:.2}s (reached {:.2}s)", resource, target, reached);
            notifier.emit(MediaEvent::TimeUpdate);
            progress_dirty = true;
        }

        let playing = shared.playing.load(Ordering::SeqCst);
        if playing && last_tick.elapsed() >= time_update {
            last_tick = Instant::now();
            notifier.emit(MediaEvent::TimeUpdate);
        }
        if progress_dirty && last_progress.elapsed() >= time_update {
            last_progress = Instant::now();
            progress_dirty = false;
            notifier.emit(MediaEvent::Progress);
        }

        if pending_at < pending.len() {
            pending_at += ring.push(&pending[pending_at..]);
            if pending_at < pending.len() {
                thread::sleep(IDLE_SLEEP);
                continue;
            }
        }

        if !shared.decode_done.load(Ordering::SeqCst) {
            match decoder.next_chunk()? {
                Some(chunk) => {
                    if let Some((_, end)) = shared.decoded.lock().as_mut() {
                        *end += chunk.seconds();
                    }
                    progress_dirty = true;
                    pending = converter.process(&chunk.samples);
                    pending_at = 0;
                    continue;
                }
                None => {
                    shared.decode_done.store(true, Ordering::SeqCst);
                    progress_dirty = false;
                    log::debug!("[element] {} fully decoded", resource);
                    notifier.emit(MediaEvent::Progress);
                }
            }
        }

        if playing
            && shared.decode_done.load(Ordering::SeqCst)
            && ring.is_empty()
            && !shared.ended.swap(true, Ordering::SeqCst)
        {
            shared.playing.store(false, Ordering::SeqCst);
            log::info!("[element] {} ended", resource);
            notifier.emit(MediaEvent::TimeUpdate);
            notifier.emit(MediaEvent::Pause);
            notifier.emit(MediaEvent::Ended { resource });
        }

        thread::sleep(IDLE_SLEEP);
    }

    let _ = stream.pause();
    drop(stream);
    log::debug!("[element] {} decode loop finished", resource);
    Ok(())
}

/// Media element rendering through the default cpal output device
pub struct NativeElement {
    output: OutputSpec,
    notifier: Notifier,
    time_update: Duration,
    engine: Option<Engine>,
    idle_position: f64,
}

impl NativeElement {
    pub fn new() -> Result<Self> {
        Ok(Self::with_output(OutputSpec::default_device()?))
    }

    pub fn with_output(output: OutputSpec) -> Self {
        Self {
            output,
            notifier: Notifier::default(),
            time_update: Duration::from_millis(DEFAULT_TIME_UPDATE_MS),
            engine: None,
            idle_position: 0.0,
        }
    }

    /// Interval between `TimeUpdate` notifications while playing
    pub fn set_time_update_interval(&mut self, interval_ms: u64) {
        self.time_update = Duration::from_millis(interval_ms.max(1));
    }

    pub fn output(&self) -> OutputSpec {
        self.output
    }

    fn stop_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
    }
}

impl MediaElement for NativeElement {
    fn subscribe(&mut self, sink: MediaEventSink) {
        *self.notifier.sink.lock() = Some(sink);
    }

    fn load(&mut self, resource: &MediaResource) -> Result<()> {
        self.stop_engine();
        self.idle_position = resource.origin;
        log::debug!(
            "[element] loading {} ({} bytes, origin {:.2}s)",
            resource.id,
            resource.payload.len(),
            resource.origin
        );
        let engine = Engine::start(resource, self.output, self.notifier.clone(), self.time_update)?;
        self.engine = Some(engine);
        Ok(())
    }

    fn unload(&mut self) {
        let position = self.current_time();
        self.stop_engine();
        self.idle_position = position;
    }

    fn play(&mut self) -> Result<()> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| NarrationError::InvalidState("No resource loaded".to_string()))?;
        if !engine.shared.playing.swap(true, Ordering::SeqCst) {
            self.notifier.emit(MediaEvent::Playing);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(engine) = &self.engine {
            if engine.shared.playing.swap(false, Ordering::SeqCst) {
                self.notifier.emit(MediaEvent::Pause);
            }
        }
    }

    fn is_playing(&self) -> bool {
        self.engine
            .as_ref()
            .map_or(false, |e| e.shared.playing.load(Ordering::SeqCst))
    }

    fn current_time(&self) -> f64 {
        match &self.engine {
            Some(engine) => engine.origin + engine.shared.position(),
            None => self.idle_position,
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        match &self.engine {
            Some(engine) => {
                if engine.shared.request_seek(seconds - engine.origin) {
                    engine.ring.clear();
                }
            }
            None => self.idle_position = seconds.max(0.0),
        }
    }

    fn duration(&self) -> Option<f64> {
        let engine = self.engine.as_ref()?;
        let duration = *engine.shared.duration.lock();
        duration.map(|d| engine.origin + d)
    }

    fn buffered(&self) -> TimeRanges {
        let Some(engine) = &self.engine else {
            return TimeRanges::empty();
        };
        match *engine.shared.decoded.lock() {
            Some((start, end)) if end > start => {
                TimeRanges::from_pairs([(engine.origin + start, engine.origin + end)])
            }
            _ => TimeRanges::empty(),
        }
    }
}

impl Drop for NativeElement {
    fn drop(&mut self) {
        self.stop_engine();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use needle_core::ResourceRegistry;
    use std::sync::mpsc;

    const SPEC: OutputSpec = OutputSpec {
        sample_rate: 48000,
        channels: 2,
    };

    fn resource_id() -> ResourceId {
        ResourceRegistry::new()
            .create(AudioPayload::new(vec![0u8; 1], None), 0.0)
            .id()
    }

    #[test]
    fn test_position_counts_played_samples() {
        let shared = EngineShared::new(resource_id(), SPEC);
        shared.reposition(10.0);
        shared.played_samples.store(48000 * 2 * 3, Ordering::SeqCst);
        assert!((shared.position() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_position_and_seek_clamp_to_duration() {
        let shared = EngineShared::new(resource_id(), SPEC);
        *shared.duration.lock() = Some(5.0);
        shared.played_samples.store(48000 * 2 * 9, Ordering::SeqCst);
        assert_eq!(shared.position(), 5.0);
        assert_eq!(shared.clamp(7.5), 5.0);
        assert_eq!(shared.clamp(-1.0), 0.0);
    }

    #[test]
    fn test_seek_to_play_head_is_not_queued() {
        let shared = EngineShared::new(resource_id(), SPEC);
        assert!(!shared.request_seek(0.0));
        assert!(shared.seek_request.lock().is_none());

        assert!(shared.request_seek(2.5));
        assert_eq!(*shared.seek_request.lock(), Some(2.5));
        assert!((shared.position() - 2.5).abs() < 1e-9);

        *shared.duration.lock() = Some(4.0);
        assert!(shared.request_seek(9.0));
        assert_eq!(*shared.seek_request.lock(), Some(4.0));
        assert!(!shared.request_seek(4.0));
    }

    #[test]
    fn test_unloaded_element() {
        let mut element = NativeElement::with_output(SPEC);
        assert!(!element.is_playing());
        assert!(element.play().is_err());
        assert_eq!(element.duration(), None);
        assert!(element.buffered().is_empty());

        element.set_current_time(42.0);
        assert_eq!(element.current_time(), 42.0);
    }

    #[test]
    fn test_undecodable_resource_reports_error() {
        let registry = ResourceRegistry::new();
        let handle = registry.create(AudioPayload::new(b"not audio at all".to_vec(), None), 30.0);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let mut element = NativeElement::with_output(SPEC);
        element.subscribe(Arc::new(move |event| {
            let _ = tx.lock().send(event);
        }));
        element.load(handle.resource()).unwrap();
        assert_eq!(element.current_time(), 30.0);

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            MediaEvent::Error { resource, .. } => assert_eq!(resource, Some(handle.id())),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!element.is_playing());
    }
}
