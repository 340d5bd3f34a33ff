// Book library, upload and reading position endpoints

use crate::client::{map_error, read_json, segment, ApiClient};
use needle_core::{BookId, BookMetadata, NarrationError, ReadingPosition, Result};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

impl ApiClient {
    /// `GET /api/books/list`
    pub fn list_books(&self) -> Result<Vec<BookMetadata>> {
        let response = self
            .agent
            .get(&self.url("/api/books/list"))
            .call()
            .map_err(|e| map_error("GET books list", e))?;
        read_json(response)
    }

    /// `GET /api/books/{id}`
    pub fn get_book(&self, book_id: &BookId) -> Result<BookMetadata> {
        let response = self
            .agent
            .get(&self.url(&format!("/api/books/{}", segment(book_id.as_str()))))
            .call()
            .map_err(|e| map_error("GET book", e))?;
        read_json(response)
    }

    /// `GET /api/books/{id}/position`
    pub fn reading_position(&self, book_id: &BookId) -> Result<ReadingPosition> {
        let response = self
            .agent
            .get(&self.url(&format!("/api/books/{}/position", segment(book_id.as_str()))))
            .call()
            .map_err(|e| map_error("GET reading position", e))?;
        read_json(response)
    }

    /// `POST /api/books/{id}/position`
    pub fn save_reading_position(&self, book_id: &BookId, position: &ReadingPosition) -> Result<()> {
        self.agent
            .post(&self.url(&format!("/api/books/{}/position", segment(book_id.as_str()))))
            .send_json(position)
            .map_err(|e| map_error("POST reading position", e))?;
        Ok(())
    }

    /// Upload a PDF from disk
    pub fn upload_book(&self, path: impl AsRef<Path>) -> Result<BookMetadata> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                NarrationError::InvalidArgument(format!("No file name in {}", path.display()))
            })?
            .to_string();
        ensure_pdf(&filename)?;
        let content = std::fs::read(path)?;
        self.upload_book_bytes(&filename, &content)
    }

    /// `POST /api/books/upload` with a multipart `file` field
    pub fn upload_book_bytes(&self, filename: &str, content: &[u8]) -> Result<BookMetadata> {
        ensure_pdf(filename)?;
        let form = MultipartForm::single_file("file", filename, "application/pdf", content);

        log::info!("Uploading {} ({} bytes)", filename, content.len());
        let response = self
            .agent
            .post(&self.url("/api/books/upload"))
            .set("Content-Type", &form.content_type())
            .send_bytes(&form.body)
            .map_err(|e| map_error("POST book upload", e))?;
        let book: BookMetadata = read_json(response)?;
        log::info!("Uploaded book {} ({} pages)", book.id, book.total_pages);
        Ok(book)
    }
}

fn ensure_pdf(filename: &str) -> Result<()> {
    if filename.to_lowercase().ends_with(".pdf") {
        Ok(())
    } else {
        Err(NarrationError::InvalidArgument(
            "Only PDF files are allowed".to_string(),
        ))
    }
}

/// Encoded `multipart/form-data` body
struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    fn single_file(field: &str, filename: &str, mime: &str, content: &[u8]) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let boundary = format!("----needle-{:x}", nanos);

        let mut body = Vec::with_capacity(content.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field,
                filename.replace('"', "%22")
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Self { boundary, body }
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}
