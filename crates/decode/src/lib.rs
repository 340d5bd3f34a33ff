// Decoding narration payloads using Symphonia

use needle_core::{AudioPayload, NarrationError, Result};
use std::io::{Cursor, ErrorKind};
use std::sync::Arc;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

/// Consecutive undecodable packets tolerated before giving up on a payload
const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 8;

/// Track information
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of the payload in seconds, when the container declares it
    pub duration: Option<f64>,
}

/// Interleaved f32 PCM for one decoded packet
#[derive(Debug, Clone)]
pub struct PcmChunk {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmChunk {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Probe a payload without decoding it.
pub fn probe(payload: &AudioPayload) -> Result<TrackInfo> {
    PayloadDecoder::open(payload).map(|decoder| decoder.info().clone())
}

/// Packet-by-packet decoder over an in-memory payload
pub struct PayloadDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    info: TrackInfo,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Timestamp requested by the last seek; earlier frames are dropped
    skip_until: Option<u64>,
}

impl PayloadDecoder {
    pub fn open(payload: &AudioPayload) -> Result<Self> {
        if payload.is_empty() {
            return Err(NarrationError::DecodingError("Empty audio payload".to_string()));
        }

        let source = Cursor::new(Arc::clone(&payload.bytes));
        let stream = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        hint.mime_type(&payload.content_type);
        if let Some(ext) = payload.extension_hint() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions {
                    enable_gapless: true,
                    ..Default::default()
                },
                &MetadataOptions::default(),
            )
            .map_err(|e| NarrationError::DecodingError(format!("Failed to probe payload: {}", e)))?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| NarrationError::DecodingError("No default track found".to_string()))?;
        let params = &track.codec_params;

        let sample_rate = params.sample_rate.ok_or_else(|| {
            NarrationError::DecodingError("Sample rate not specified".to_string())
        })?;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);
        let time_base = params.time_base;
        let duration = match (time_base, params.n_frames) {
            (Some(tb), Some(n)) => Some(time_to_seconds(tb.calc_time(n))),
            _ => None,
        };

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| NarrationError::DecodingError(format!("Failed to create decoder: {}", e)))?;

        let track_id = track.id;
        log::debug!(
            "Probed payload: {} Hz, {} channels, duration {:?}",
            sample_rate,
            channels,
            duration
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base,
            info: TrackInfo {
                sample_rate,
                channels,
                duration,
            },
            sample_buf: None,
            skip_until: None,
        })
    }

    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    /// Decode the next packet of the selected track; `None` at end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<PcmChunk>> {
        let mut decode_errors = 0;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => {
                    return Err(NarrationError::DecodingError(format!(
                        "Failed to read packet: {}",
                        e
                    )))
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    let reuse = self
                        .sample_buf
                        .as_ref()
                        .map_or(false, |buf| buf.capacity() as u64 >= capacity);
                    if !reuse {
                        self.sample_buf = Some(SampleBuffer::<f32>::new(
                            capacity,
                            SignalSpec::new(spec.rate, spec.channels),
                        ));
                    }
                    let skip = frames_to_skip(self.skip_until, self.time_base, packet.ts(), spec.rate);
                    let buf = match self.sample_buf.as_mut() {
                        Some(buf) => buf,
                        None => continue,
                    };
                    buf.copy_interleaved_ref(decoded);

                    let channels = spec.channels.count();
                    let samples = buf.samples();
                    let skip_samples = skip * channels;
                    if skip_samples >= samples.len() {
                        continue;
                    }
                    self.skip_until = None;

                    return Ok(Some(PcmChunk {
                        samples: samples[skip_samples..].to_vec(),
                        channels: channels as u16,
                        sample_rate: spec.rate,
                    }));
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    decode_errors += 1;
                    log::warn!("Skipping undecodable packet: {}", msg);
                    if decode_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        return Err(NarrationError::DecodingError(format!(
                            "Too many undecodable packets: {}",
                            msg
                        )));
                    }
                }
                Err(e) => {
                    return Err(NarrationError::DecodingError(format!("Decoding failed: {}", e)))
                }
            }
        }
    }

    /// Seek inside the payload. Returns the position reached, in seconds from
    /// the start of the payload.
    pub fn seek(&mut self, seconds: f64) -> Result<f64> {
        let seconds = seconds.max(0.0);
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(seconds.trunc() as u64, seconds.fract()),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| NarrationError::MediaPlaybackError(format!("Seek failed: {}", e)))?;
        self.decoder.reset();
        self.skip_until = Some(seeked.required_ts).filter(|ts| *ts > seeked.actual_ts);

        Ok(self
            .time_base
            .map(|tb| time_to_seconds(tb.calc_time(seeked.required_ts)))
            .unwrap_or(seconds))
    }
}

/// Frames at the head of a packet starting at `ts` that precede the seek target
fn frames_to_skip(target: Option<u64>, time_base: Option<TimeBase>, ts: u64, sample_rate: u32) -> usize {
    match (target, time_base) {
        (Some(target), Some(tb)) if ts < target => {
            (time_to_seconds(tb.calc_time(target - ts)) * sample_rate as f64).round() as usize
        }
        _ => 0,
    }
}

fn time_to_seconds(time: Time) -> f64 {
    time.seconds as f64 + time.frac
}


#[cfg(test)]
mod tests {
    use super::testing::wav_bytes;
    use super::*;

    fn wav_payload(sample_rate: u32, channels: u16, frames: u32) -> AudioPayload {
        AudioPayload::new(wav_bytes(sample_rate, channels, frames), Some("audio/wav"))
    }

    #[test]
    fn test_probe_reports_duration() {
        let info = probe(&wav_payload(8000, 1, 16000)).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
        let duration = info.duration.unwrap();
        assert!((duration - 2.0).abs() < 1e-6, "duration was {}", duration);
    }

    #[test]
    fn test_decodes_every_frame() {
        let mut decoder = PayloadDecoder::open(&wav_payload(8000, 2, 4000)).unwrap();
        let mut frames = 0;
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            assert_eq!(chunk.channels, 2);
            frames += chunk.frames();
        }
        assert_eq!(frames, 4000);
    }

    #[test]
    fn test_seek_inside_payload() {
        let mut decoder = PayloadDecoder::open(&wav_payload(8000, 1, 24000)).unwrap();
        let reached = decoder.seek(1.5).unwrap();
        assert!((reached - 1.5).abs() < 1e-6, "reached {}", reached);

        let mut frames = 0;
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            frames += chunk.frames();
        }
        assert!((frames as i64 - 12000).abs() <= 1, "decoded {} frames", frames);
    }

    #[test]
    fn test_garbage_payload_is_decoding_error() {
        let payload = AudioPayload::new(b"<html>Internal Server Error</html>".to_vec(), None);
        let err = PayloadDecoder::open(&payload).err().unwrap();
        assert!(matches!(err, NarrationError::DecodingError(_)));
    }

    #[test]
    fn test_empty_payload_is_decoding_error() {
        assert!(probe(&AudioPayload::new(Vec::new(), None)).is_err());
    }
}
