// Timestamp-addressed narration audio and interruption notices

use crate::client::{map_error, segment, ApiClient};
use needle_core::{AudioPayload, BookId, InterruptRequest, NarrationError, NarrationTransport, Result};
use std::io::Read;

impl ApiClient {
    /// `GET /api/narration/audio/{book_id}?timestamp={t}`
    pub fn fetch_audio_at(&self, book_id: &BookId, timestamp: f64) -> Result<AudioPayload> {
        let url = self.url(&format!("/api/narration/audio/{}", segment(book_id.as_str())));
        log::debug!("Fetching narration audio: book={} timestamp={}", book_id, timestamp);

        let response = self
            .agent
            .get(&url)
            .query("timestamp", &timestamp.to_string())
            .call()
            .map_err(|e| map_error("GET narration audio", e))?;

        let content_type = response.header("Content-Type").map(str::to_string);
        let limit = self.max_audio_bytes;
        let declared = response
            .header("Content-Length")
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(len) = declared {
            if len > limit {
                log::warn!("Refusing {} byte narration payload (limit {})", len, limit);
                return Err(NarrationError::PayloadTooLarge { limit });
            }
        }

        let mut bytes = Vec::with_capacity(declared.unwrap_or(0) as usize);
        response
            .into_reader()
            .take(limit + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| NarrationError::NetworkUnavailable(format!("Audio download failed: {}", e)))?;

        if bytes.len() as u64 > limit {
            return Err(NarrationError::PayloadTooLarge { limit });
        }

        log::info!(
            "Received {} bytes of narration for book {} at {:.2}s",
            bytes.len(),
            book_id,
            timestamp
        );
        Ok(AudioPayload::new(bytes, content_type.as_deref()))
    }

    /// `POST /api/narration/interrupt`
    pub fn interrupt(&self, book_id: &BookId, timestamp: f64) -> Result<()> {
        let body = InterruptRequest {
            book_id: book_id.clone(),
            timestamp,
        };
        self.agent
            .post(&self.url("/api/narration/interrupt"))
            .send_json(&body)
            .map_err(|e| map_error("POST narration interrupt", e))?;
        log::debug!("Interrupt acknowledged: book={} timestamp={}", book_id, timestamp);
        Ok(())
    }
}

impl NarrationTransport for ApiClient {
    fn fetch_audio(&self, book_id: &BookId, timestamp: f64) -> Result<AudioPayload> {
        self.fetch_audio_at(book_id, timestamp)
    }

    fn notify_interrupt(&self, book_id: &BookId, timestamp: f64) -> Result<()> {
        self.interrupt(book_id, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use crate::client::fixture;
    use crate::ApiClient;
    use needle_core::{BookId, ClientConfig, NarrationError, NarrationTransport};

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ClientConfig::default().with_api_url(base).unwrap())
    }

    #[test]
    fn test_fetch_audio_at_zero() {
        let audio = [0xFFu8, 0xFB, 0x90, 0x00];
        let (base, requests) = fixture::serve(vec![fixture::response(
            "200 OK",
            "audio/mpeg",
            &["Accept-Ranges: bytes"],
            &audio,
        )]);

        let payload = client(&base).fetch_audio(&BookId::new("B1"), 0.0).unwrap();

        assert_eq!(&payload.bytes[..], &audio);
        assert_eq!(payload.content_type, "audio/mpeg");
        assert_eq!(
            requests.recv().unwrap().request_line,
            "GET /api/narration/audio/B1?timestamp=0 HTTP/1.1"
        );
    }

    #[test]
    fn test_fetch_audio_fractional_timestamp() {
        let (base, requests) =
            fixture::serve(vec![fixture::response("200 OK", "audio/mpeg", &[], b"abc")]);
        client(&base).fetch_audio(&BookId::new("B1"), 42.3).unwrap();
        assert_eq!(
            requests.recv().unwrap().request_line,
            "GET /api/narration/audio/B1?timestamp=42.3 HTTP/1.1"
        );
    }

    #[test]
    fn test_missing_audio_is_non_success() {
        let (base, _requests) = fixture::serve(vec![fixture::json(
            "404 Not Found",
            r#"{"detail":"No audio data found for this timestamp"}"#,
        )]);
        let err = client(&base).fetch_audio(&BookId::new("B1"), 9999.0).unwrap_err();
        assert!(err.is_fetch_failure());
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_oversized_audio_is_fetch_failure() {
        let (base, _requests) =
            fixture::serve(vec![fixture::response("200 OK", "audio/mpeg", &[], b"abcdef")]);
        let config = ClientConfig {
            max_audio_bytes: 4,
            ..ClientConfig::default().with_api_url(&base).unwrap()
        };

        let err = ApiClient::new(&config)
            .fetch_audio(&BookId::new("B1"), 0.0)
            .unwrap_err();
        assert_eq!(err, NarrationError::PayloadTooLarge { limit: 4 });
        assert!(err.is_fetch_failure());
    }

    #[test]
    fn test_interrupt_sends_book_and_timestamp() {
        let (base, requests) =
            fixture::serve(vec![fixture::json("200 OK", r#"{"status":"success"}"#)]);
        client(&base).notify_interrupt(&BookId::new("B1"), 42.3).unwrap();

        let captured = requests.recv().unwrap();
        assert_eq!(captured.request_line, "POST /api/narration/interrupt HTTP/1.1");
        assert!(captured.header("content-type").unwrap().starts_with("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
        assert_eq!(body, serde_json::json!({"book_id": "B1", "timestamp": 42.3}));
    }

    #[test]
    fn test_interrupt_rejection_surfaces_status() {
        let (base, _requests) = fixture::serve(vec![fixture::json(
            "400 Bad Request",
            r#"{"detail":"Missing book_id or timestamp"}"#,
        )]);
        let err = client(&base).notify_interrupt(&BookId::new("B1"), 1.0).unwrap_err();
        assert_eq!(
            err,
            NarrationError::NonSuccessStatus {
                status: 400,
                detail: "Missing book_id or timestamp".to_string()
            }
        );
    }
}
