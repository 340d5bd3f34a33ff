// Interactive shell driving the API client and the playback controller

use crate::commands::{Command, HELP};
use needle_core::{
    BookId, ControllerEvent, MediaElement, NarrationError, NarrationTransport, PlaybackStatus,
    PlayerState, ReadingPosition, Result,
};
use needle_player::StreamingAudioController;
use needle_transport_http::ApiClient;
use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const BAR_WIDTH: usize = 40;

pub struct Shell<E: MediaElement, T: NarrationTransport> {
    api: ApiClient,
    controller: StreamingAudioController<E, T>,
}

impl<E: MediaElement, T: NarrationTransport> Shell<E, T> {
    pub fn new(api: ApiClient, controller: StreamingAudioController<E, T>) -> Self {
        controller.add_callback(Arc::new(|event: ControllerEvent| match event {
            ControllerEvent::Failed(failure) => {
                println!("! {:?}: {}", failure.kind, failure.message)
            }
            ControllerEvent::PlaybackEnded => println!("* end of narration segment"),
            ControllerEvent::InterruptAcknowledged { timestamp } => {
                println!("* paused at {}", format_time(timestamp))
            }
            _ => {}
        }));
        Self { api, controller }
    }

    /// Read commands from stdin until `quit` or end of input, pumping the
    /// controller inbox in between.
    pub fn run(&mut self) -> Result<()> {
        let lines = spawn_stdin_reader()?;
        println!("{}", HELP);

        loop {
            self.controller.wait_next(POLL_INTERVAL);

            let line = match lines.try_recv() {
                Ok(line) => line,
                Err(TryRecvError::Empty) => continue,
                Err(TryRecvError::Disconnected) => break,
            };

            match Command::parse(&line) {
                Ok(None) => {}
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(e) = self.execute(command) {
                        println!("! {}", e);
                    }
                }
                Err(e) => println!("! {}", e),
            }
        }

        self.save_position();
        self.controller.teardown();
        Ok(())
    }

    pub fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login { email } => {
                let message = self.api.request_code(&email)?;
                println!("{}", message);
            }
            Command::Verify { email, code } => {
                self.api.verify_code(&email, &code)?;
                println!("Signed in as {}", email);
            }
            Command::Logout => {
                self.api.logout()?;
                println!("Signed out");
            }
            Command::Books => {
                let books = self.api.list_books()?;
                if books.is_empty() {
                    println!("No books uploaded yet");
                }
                for book in books {
                    println!("{}  {} ({} pages)", book.id, book.reference_string, book.total_pages);
                }
            }
            Command::Upload { path } => {
                let book = self.api.upload_book(&path)?;
                println!("Uploaded {} as {}", book.reference_string, book.id);
            }
            Command::Open { book_id } => self.open(book_id)?,
            Command::Play => self.controller.play(),
            Command::Pause => self.controller.pause(),
            Command::Seek { seconds } => self.controller.seek(seconds),
            Command::Status => println!("{}", format_status(&self.controller.status())),
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
        Ok(())
    }

    fn open(&mut self, book_id: BookId) -> Result<()> {
        self.save_position();

        let book = self.api.get_book(&book_id)?;
        let position = match self.api.reading_position(&book_id) {
            Ok(position) => position,
            Err(e) => {
                log::warn!("No saved position for {}: {}", book_id, e);
                ReadingPosition::default()
            }
        };
        println!(
            "Opened {} ({} pages), resuming at {}",
            book.reference_string,
            book.total_pages,
            format_time(position.timestamp)
        );
        for chapter in book.table_of_contents.values() {
            match chapter.timestamp {
                Some(t) => println!("  {}  p.{}  {}", chapter.title, chapter.page_number, format_time(t)),
                None => println!("  {}  p.{}", chapter.title, chapter.page_number),
            }
        }

        self.controller.select_book(book_id, position.timestamp);
        Ok(())
    }

    /// Store the play head of the open book, keeping its page information.
    fn save_position(&self) {
        let Some(book_id) = self.controller.current_book() else {
            return;
        };
        let timestamp = self.controller.status().current_time;
        let result = self
            .api
            .reading_position(book_id)
            .or_else(|e| match e {
                NarrationError::NonSuccessStatus { status: 404, .. } => Ok(ReadingPosition::default()),
                other => Err(other),
            })
            .and_then(|position| {
                let position = ReadingPosition {
                    timestamp,
                    ..position
                };
                self.api.save_reading_position(book_id, &position)
            });
        match result {
            Ok(()) => log::debug!("Saved position {:.2}s for {}", timestamp, book_id),
            Err(e) => log::warn!("Could not save position for {}: {}", book_id, e),
        }
    }
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("needle-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (hours, minutes, secs) = (total / 3600, (total / 60) % 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// One-line status with a buffered-ranges bar, e.g.
/// `[Playing] 00:42 / 01:30 [====|===   ==    ] +18s buffered`
pub fn format_status(status: &PlaybackStatus) -> String {
    let state = match status.state {
        PlayerState::Playing if !status.is_playing => "Stalled",
        PlayerState::Idle => "Idle",
        PlayerState::Loading => "Loading",
        PlayerState::Playing => "Playing",
        PlayerState::Paused => "Paused",
        PlayerState::Error => "Error",
    };
    let duration = status
        .duration
        .map(format_time)
        .unwrap_or_else(|| "--:--".to_string());

    let mut line = format!("[{}] {} / {}", state, format_time(status.current_time), duration);
    if let Some(total) = status.duration.filter(|d| *d > 0.0) {
        line.push(' ');
        line.push_str(&buffered_bar(status, total));
    }
    if let Some(range) = status.buffered.range_containing(status.current_time) {
        line.push_str(&format!(" +{:.0}s buffered", range.end - status.current_time));
    }
    line
}

fn buffered_bar(status: &PlaybackStatus, duration: f64) -> String {
    let mut cells = vec![' '; BAR_WIDTH];
    for (start, end) in status.buffered.fractions(duration) {
        let from = (start * BAR_WIDTH as f64).floor() as usize;
        let to = ((end * BAR_WIDTH as f64).ceil() as usize).min(BAR_WIDTH);
        for cell in cells.iter_mut().take(to).skip(from) {
            *cell = '=';
        }
    }
    let head = ((status.current_time / duration).clamp(0.0, 1.0) * (BAR_WIDTH - 1) as f64) as usize;
    cells[head] = '|';
    format!("[{}]", cells.into_iter().collect::<String>())
}
