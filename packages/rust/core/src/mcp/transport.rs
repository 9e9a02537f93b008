//! Newline-delimited message transport. Stdout carries protocol messages only.

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};

use plone_mcp_shared::{PloneMcpError, Result};

pub struct StdioTransport<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
}

impl StdioTransport<Stdin, Stdout> {
    /// Transport over the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Next non-blank line, or `None` at end of input.
    pub async fn read_message(&mut self) -> Result<Option<String>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| PloneMcpError::io("<stdin>", e))?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return Ok(Some(line)),
                None => return Ok(None),
            }
        }
    }

    /// Write one message followed by a newline and flush.
    pub async fn write_message(&mut self, message: &str) -> Result<()> {
        let io = |e| PloneMcpError::io("<stdout>", e);
        self.writer.write_all(message.as_bytes()).await.map_err(io)?;
        self.writer.write_all(b"\n").await.map_err(io)?;
        self.writer.flush().await.map_err(io)
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}
