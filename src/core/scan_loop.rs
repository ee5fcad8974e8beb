//! The interactive scan loop.
//!
//! Reads one line per scan, drops repeats of the previous line, extracts the
//! identifier and publishes it. The scanner behaves like a keyboard, so a
//! badge held in front of it produces the same line several times in a row.
//!
//! ```text
//! stdin ─> read line ─> trim ─> dedup ─> extract ─> publish ─> debounce
//!              ▲                                                  │
//!              └──────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use boothscan_mqtt::Session;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{identifier, publisher::ScanPublisher};
use crate::config::scanner::ScannerConfig;

/// Text printed before each read when the prompt is enabled.
pub const PROMPT: &str = "Scan QR/Barcode: ";

/// Remembers the last accepted input line.
#[derive(Debug, Default)]
pub struct DedupCursor {
    last: Option<String>,
}

impl DedupCursor {
    /// Returns `false` for a repeat of the previous line; otherwise records
    /// `line` and returns `true`.
    pub fn accept(&mut self, line: &str) -> bool {
        if self.last.as_deref() == Some(line) {
            return false;
        }
        self.last = Some(line.to_string());
        true
    }
}

/// Why the loop stopped, plus what it saw on the way.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub published: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub failed: u64,
    pub end: LoopEnd,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// Input reached end of file.
    #[default]
    InputClosed,
    /// The cancellation token fired.
    Cancelled,
    /// Reading input failed.
    InputError,
}

pub struct ScanLoop<R, S: Session + ?Sized> {
    input: R,
    publisher: ScanPublisher<S>,
    dedup: DedupCursor,
    debounce: Duration,
    prompt: bool,
    cancel: CancellationToken,
}

impl<R, S> ScanLoop<R, S>
where
    R: AsyncBufRead + Unpin,
    S: Session + ?Sized,
{
    pub fn new(
        input: R,
        publisher: ScanPublisher<S>,
        config: &ScannerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            input,
            publisher,
            dedup: DedupCursor::default(),
            debounce: config.debounce(),
            prompt: config.prompt,
            cancel,
        }
    }

    /// Runs until input ends or the cancellation token fires.
    pub async fn run(mut self) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut buf = Vec::new();

        let end = loop {
            if !self.publisher.session().state().is_connected() {
                warn!("MQTT disconnected. Reconnecting...");
                let connected = tokio::select! {
                    _ = self.cancel.cancelled() => break LoopEnd::Cancelled,
                    result = self.publisher.session().ensure_connected() => result,
                };
                if connected.is_err() {
                    break LoopEnd::Cancelled;
                }
            }

            if self.prompt {
                self.show_prompt().await;
            }

            buf.clear();
            let read = tokio::select! {
                _ = self.cancel.cancelled() => break LoopEnd::Cancelled,
                read = self.input.read_until(b'\n', &mut buf) => read,
            };
            match read {
                Ok(0) => {
                    info!("Input closed");
                    break LoopEnd::InputClosed;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to read scanner input: {}", e);
                    break LoopEnd::InputError;
                }
            }

            let raw = String::from_utf8_lossy(&buf);
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if !self.dedup.accept(line) {
                warn!("Duplicate scan ignored");
                summary.duplicates += 1;
                continue;
            }

            let identifier = match identifier::extract(line) {
                Ok(identifier) => identifier,
                Err(e) => {
                    warn!("{}", e);
                    summary.rejected += 1;
                    continue;
                }
            };

            match self.publisher.publish(&identifier).await {
                Ok(()) => summary.published += 1,
                Err(e) if e.is_shutdown() => break LoopEnd::Cancelled,
                Err(e) => {
                    debug!("Scan {} not delivered: {}", identifier, e);
                    summary.failed += 1;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break LoopEnd::Cancelled,
                _ = tokio::time::sleep(self.debounce) => {}
            }
        };
        summary.end = end;

        if end == LoopEnd::Cancelled {
            info!("Stopped scanning.");
        }
        summary
    }

    async fn show_prompt(&self) {
        let mut stdout = tokio::io::stdout();
        // Prompt failures only cost the operator a hint.
        let _ = stdout.write_all(PROMPT.as_bytes()).await;
        let _ = stdout.flush().await;
    }
}
