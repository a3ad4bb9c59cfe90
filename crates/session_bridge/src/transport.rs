//! Newline-delimited JSON framing over any async byte stream.
//!
//! Works the same for process stdio, pipes and in-memory `tokio::io::duplex`
//! pairs. A line that fails to parse is logged and skipped; the stream stays up.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Reads one JSON value per line into a channel. The channel closes at EOF or
/// on the first read error.
pub fn spawn_line_reader<R, T>(reader: R) -> (mpsc::UnboundedReceiver<T>, JoinHandle<()>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut lines = reader.lines();
        let mut line_number = 0usize;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(%error, "bridge read failed; closing inbound stream");
                    break;
                }
            };
            line_number += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(&line) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(line = line_number, %error, "skipping malformed bridge line");
                }
            }
        }
    });

    (rx, handle)
}

/// Writes every value sent on the returned channel as one JSON line.
pub fn spawn_line_writer<W, T>(writer: W) -> (mpsc::UnboundedSender<T>, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
    T: Serialize + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();
    let handle = tokio::spawn(async move {
        let mut writer = writer;

        while let Some(message) = rx.recv().await {
            let mut encoded = match serde_json::to_string(&message) {
                Ok(encoded) => encoded,
                Err(error) => {
                    tracing::error!(%error, "dropping unencodable bridge message");
                    continue;
                }
            };
            encoded.push('\n');

            let written = match writer.write_all(encoded.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(error) => Err(error),
            };
            if let Err(error) = written {
                tracing::warn!(%error, "bridge write failed; closing outbound stream");
                break;
            }
        }
    });

    (tx, handle)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use tokio::io::{AsyncReadExt, BufReader};

    use super::*;

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn reader_skips_blank_and_malformed_lines() {
        let input: &[u8] = b"{\"n\":1}\n\nnot json\n{\"n\":2}\n";
        let (mut rx, handle) = spawn_line_reader::<_, Ping>(BufReader::new(input));

        assert_eq!(rx.recv().await, Some(Ping { n: 1 }));
        assert_eq!(rx.recv().await, Some(Ping { n: 2 }));
        assert_eq!(rx.recv().await, None);
        handle.await.expect("reader task completes");
    }

    #[tokio::test]
    async fn writer_frames_each_message_on_its_own_line() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, handle) = spawn_line_writer::<_, Ping>(client);

        tx.send(Ping { n: 1 }).expect("writer open");
        tx.send(Ping { n: 2 }).expect("writer open");
        drop(tx);
        handle.await.expect("writer task completes");

        let mut written = String::new();
        server
            .read_to_string(&mut written)
            .await
            .expect("duplex readable");
        assert_eq!(written, "{\"n\":1}\n{\"n\":2}\n");
    }
}
