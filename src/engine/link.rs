//! Line-oriented command/response link to the engine
//!
//! Every command is one line. The engine answers with zero or more lines
//! prefixed by `:` and terminates the answer with a lone `.`.

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{trace, warn};

use super::protocol::Command;

/// Synchronous request/response channel to the engine
#[allow(async_fn_in_trait)]
pub trait EngineLink {
    /// Send one command and wait for its complete response
    async fn send(&mut self, command: &Command) -> Result<Vec<String>, LinkError>;

    /// Block until the engine has a signal for us
    async fn next_signal(&mut self) -> Result<Vec<String>, LinkError> {
        self.send(&Command::NextSignal).await
    }
}

/// Engine link over any async line reader/writer pair
pub struct LineLink<R, W> {
    reader: R,
    writer: W,
    buf: String,
}

/// Engine link on the process stdin/stdout
pub type StdioLink = LineLink<BufReader<io::Stdin>, io::Stdout>;

/// Link the controller to the engine through stdin/stdout
pub fn stdio() -> StdioLink {
    LineLink::new(BufReader::new(io::stdin()), io::stdout())
}

impl<R, W> LineLink<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: String::new(),
        }
    }

    /// Read the next non-empty line
    async fn read_line(&mut self) -> Result<String, LinkError> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf).await? == 0 {
                return Err(LinkError::Closed);
            }
            let line = self.buf.trim();
            if !line.is_empty() {
                return Ok(line.to_string());
            }
        }
    }

    async fn read_response(&mut self) -> Result<Vec<String>, LinkError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "." {
                return Ok(lines);
            }
            match line.strip_prefix(':') {
                Some(payload) => lines.push(payload.to_string()),
                None => warn!(line = %line, "Bad engine response line, skipping"),
            }
        }
    }

    #[cfg(test)]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<R, W> EngineLink for LineLink<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn send(&mut self, command: &Command) -> Result<Vec<String>, LinkError> {
        let line = command.encode();
        trace!(command = %line, "Sending engine command");

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        self.read_response().await
    }
}

/// Link errors
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Engine link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine closed the link")]
    Closed,
}
