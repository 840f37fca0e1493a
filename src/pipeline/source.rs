//! Sample source abstraction for telemetry ingestion.
//!
//! Provides a unified trait for reading sensor messages from different
//! feeds: stdin (JSON lines), TCP (JSON lines, reconnecting) and an
//! in-process channel.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::types::{SampleRejection, SensorMessage};

/// Events produced by a sample source.
#[derive(Debug)]
pub enum SampleEvent {
    /// A message was read; it is validated by the ingest loop.
    Message(SensorMessage),
    /// A line could not be parsed at all.
    Malformed(SampleRejection),
    /// Source reached end of data (EOF for stdin, closed channel, exhausted
    /// reconnects for TCP).
    Eof,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait abstracting where sensor messages come from.
///
/// Implementations handle framing and reconnection internally. The ingest
/// loop calls [`next_event`](SampleSource::next_event) in a `select!` with
/// cancellation.
#[async_trait]
pub trait SampleSource: Send + 'static {
    async fn next_event(&mut self) -> Result<SampleEvent, SourceError>;

    /// Human-readable name for logging (e.g. "stdin", "tcp").
    fn source_name(&self) -> &str;
}

fn parse_line(line: &str) -> Option<SampleEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(match SensorMessage::from_json(line) {
        Ok(message) => SampleEvent::Message(message),
        Err(rejection) => SampleEvent::Malformed(rejection),
    })
}

// ============================================================================
// Stdin Source (JSON messages, one per line)
// ============================================================================

/// Reads JSON sensor messages from stdin.
///
/// `sensor-generator | forgewatch --stdin`
pub struct StdinSource {
    reader: BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(512),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for StdinSource {
    async fn next_event(&mut self) -> Result<SampleEvent, SourceError> {
        loop {
            self.line_buffer.clear();
            if self.reader.read_line(&mut self.line_buffer).await? == 0 {
                return Ok(SampleEvent::Eof);
            }
            if let Some(event) = parse_line(&self.line_buffer) {
                return Ok(event);
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// TCP Source (JSON messages, one per line)
// ============================================================================

const TCP_MAX_RECONNECTS: u32 = 5;
const TCP_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const TCP_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reads JSON sensor messages from a TCP telemetry feed.
///
/// A dropped connection is re-established with exponential backoff; after
/// `TCP_MAX_RECONNECTS` consecutive failures the source reports EOF.
pub struct TcpSource {
    addr: String,
    reader: Option<BufReader<TcpStream>>,
    line_buffer: String,
    failures: u32,
}

impl TcpSource {
    /// Connect to a feed and return a ready source.
    pub async fn connect(addr: &str) -> Result<Self, SourceError> {
        let stream = TcpStream::connect(addr).await?;
        tracing::info!(addr, "Connected to telemetry feed");
        Ok(Self {
            addr: addr.to_string(),
            reader: Some(BufReader::new(stream)),
            line_buffer: String::with_capacity(512),
            failures: 0,
        })
    }

    async fn reconnect(&mut self) -> bool {
        let mut backoff = TCP_INITIAL_BACKOFF;
        while self.failures < TCP_MAX_RECONNECTS {
            self.failures += 1;
            tokio::time::sleep(backoff).await;
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    tracing::info!(addr = %self.addr, attempt = self.failures, "Reconnected to telemetry feed");
                    self.reader = Some(BufReader::new(stream));
                    return true;
                }
                Err(e) => {
                    tracing::warn!(addr = %self.addr, attempt = self.failures, error = %e, "Reconnect failed");
                    backoff = (backoff * 2).min(TCP_MAX_BACKOFF);
                }
            }
        }
        false
    }
}

#[async_trait]
impl SampleSource for TcpSource {
    async fn next_event(&mut self) -> Result<SampleEvent, SourceError> {
        loop {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(SampleEvent::Eof);
            };
            self.line_buffer.clear();
            let read = reader.read_line(&mut self.line_buffer).await;
            match read {
                Ok(0) | Err(_) => {
                    if let Err(e) = &read {
                        tracing::warn!(addr = %self.addr, error = %e, "Telemetry feed read failed");
                    } else {
                        tracing::warn!(addr = %self.addr, "Telemetry feed closed");
                    }
                    self.reader = None;
                    if !self.reconnect().await {
                        return Ok(SampleEvent::Eof);
                    }
                }
                Ok(_) => {
                    self.failures = 0;
                    if let Some(event) = parse_line(&self.line_buffer) {
                        return Ok(event);
                    }
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "tcp"
    }
}

// ============================================================================
// Channel Source (in-process producers, tests)
// ============================================================================

pub struct ChannelSource {
    rx: mpsc::Receiver<SensorMessage>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<SensorMessage>) -> Self {
        Self { rx }
    }

    /// A bounded channel and the source reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<SensorMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl SampleSource for ChannelSource {
    async fn next_event(&mut self) -> Result<SampleEvent, SourceError> {
        Ok(match self.rx.recv().await {
            Some(message) => SampleEvent::Message(message),
            None => SampleEvent::Eof,
        })
    }

    fn source_name(&self) -> &str {
        "channel"
    }
}
