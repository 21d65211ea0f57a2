//! Pipeline endpoints: where messages come from and where they end up.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::Message;

/// Produces the messages that enter the first stage.
///
/// The source owns the sender of the first queue; returning closes it.
#[async_trait]
pub trait Source: Send {
    async fn produce(
        &mut self,
        output: mpsc::Sender<Message>,
        cancel: &CancellationToken,
    ) -> std::io::Result<()>;
}

/// Consumes the messages leaving the last stage.
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, message: Message) -> std::io::Result<()>;

    /// Called once after the last message has been written.
    async fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Emits one [`Message::Bytes`] per non-blank input line, without the line
/// terminator.
pub struct ReaderSource<R> {
    reader: R,
}

impl<R> ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl<R> Source for ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn produce(
        &mut self,
        output: mpsc::Sender<Message>,
        cancel: &CancellationToken,
    ) -> std::io::Result<()> {
        let mut line = Vec::new();
        let mut lines = 0u64;
        loop {
            if cancel.is_cancelled() {
                tracing::debug!(lines, "source stopping on cancellation");
                break;
            }

            line.clear();
            if self.reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            lines += 1;
            if output.send(Message::Bytes(line.clone())).await.is_err() {
                tracing::debug!(lines, "source stopping, downstream closed");
                break;
            }
        }
        Ok(())
    }
}

/// Replays a fixed list of messages.
pub struct IterSource {
    messages: std::vec::IntoIter<Message>,
}

impl IterSource {
    pub fn new<I>(messages: I) -> Self
    where
        I: IntoIterator<Item = Message>,
    {
        Self {
            messages: messages.into_iter().collect::<Vec<_>>().into_iter(),
        }
    }
}

#[async_trait]
impl Source for IterSource {
    async fn produce(
        &mut self,
        output: mpsc::Sender<Message>,
        cancel: &CancellationToken,
    ) -> std::io::Result<()> {
        for message in self.messages.by_ref() {
            if cancel.is_cancelled() || output.send(message).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Writes messages to an async writer.
///
/// Byte messages are written verbatim (encoders include their own line
/// terminators); records are written as one compact JSON line.
pub struct WriterSink<W: AsyncWrite> {
    writer: BufWriter<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, message: Message) -> std::io::Result<()> {
        match message {
            Message::Bytes(bytes) => self.writer.write_all(&bytes).await,
            Message::Record(record) => {
                let mut line = serde_json::to_vec(&record)?;
                line.push(b'\n');
                self.writer.write_all(&line).await
            }
        }
    }

    async fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush().await
    }
}
