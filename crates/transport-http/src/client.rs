// HTTP client configuration and response handling

use needle_core::{ClientConfig, NarrationError, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Create a configured HTTP agent. The cookie store keeps the session cookie
/// set by `/auth/verify-code` and replays it on every later request.
pub fn create_http_agent(config: &ClientConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
        .timeout_read(Duration::from_secs(config.read_timeout_secs))
        .timeout_write(Duration::from_secs(config.read_timeout_secs))
        .user_agent(&config.user_agent)
        .redirects(5)
        .build()
}

/// Client for the Needle REST API
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) agent: ureq::Agent,
    base_url: String,
    pub(crate) max_audio_bytes: u64,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        log::info!("API client targeting {}", config.api_url);
        Self {
            agent: create_http_agent(config),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            max_audio_bytes: config.max_audio_bytes,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /health`
    pub fn health(&self) -> Result<()> {
        let response = self
            .agent
            .get(&self.url("/health"))
            .call()
            .map_err(|e| map_error("GET /health", e))?;
        let body: serde_json::Value = read_json(response)?;
        match body.get("status").and_then(|s| s.as_str()) {
            Some("ok") => Ok(()),
            other => Err(NarrationError::InvalidState(format!(
                "Unexpected health status: {:?}",
                other
            ))),
        }
    }
}

/// Percent-encode one path segment
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Map a ureq failure onto the narration error taxonomy
pub(crate) fn map_error(context: &str, err: ureq::Error) -> NarrationError {
    match err {
        ureq::Error::Status(status, response) => {
            let detail = read_detail(response);
            log::warn!("{} rejected with {}: {}", context, status, detail);
            NarrationError::NonSuccessStatus { status, detail }
        }
        ureq::Error::Transport(transport) => {
            log::warn!("{} failed: {}", context, transport);
            NarrationError::NetworkUnavailable(format!("{}: {}", context, transport))
        }
    }
}

/// Pull the FastAPI `{"detail": ...}` message out of an error body
fn read_detail(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    let body = match response.into_string() {
        Ok(body) => body,
        Err(_) => return status_text,
    };

    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body,
        },
        _ if body.trim().is_empty() => status_text,
        _ => body,
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T> {
    let body = response
        .into_string()
        .map_err(|e| NarrationError::NetworkUnavailable(format!("Failed to read response: {}", e)))?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
pub(crate) mod fixture {
    //! One-shot loopback HTTP server for client tests.

    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// What the fixture saw on the wire
    #[derive(Debug)]
    pub struct Captured {
        pub request_line: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl Captured {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    /// Serve `responses` in order, one per connection. Returns the base URL
    /// and a receiver of the captured requests.
    pub fn serve(responses: Vec<Vec<u8>>) -> (String, mpsc::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();

                let mut headers = Vec::new();
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((k, v)) = line.split_once(':') {
                        headers.push((k.trim().to_string(), v.trim().to_string()));
                    }
                }

                let length = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);
                let mut body = vec![0u8; length];
                reader.read_exact(&mut body).unwrap();

                stream.write_all(&response).unwrap();
                stream.flush().unwrap();

                let _ = tx.send(Captured {
                    request_line: request_line.trim_end().to_string(),
                    headers,
                    body,
                });
            }
        });

        (format!("http://{}", addr), rx)
    }

    pub fn response(status: &str, content_type: &str, extra_headers: &[&str], body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            content_type,
            body.len()
        );
        for header in extra_headers {
            out.push_str(header);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    pub fn json(status: &str, body: &str) -> Vec<u8> {
        response(status, "application/json", &[], body.as_bytes())
    }
}
