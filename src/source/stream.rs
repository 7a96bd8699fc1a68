//! Stream-based observation source.
//!
//! Receives observation records from an async byte stream such as a TCP
//! connection or standard input.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use opstat_types::Observation;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{parse_line, ObservationSource};

/// A source that receives observations from an async stream.
///
/// This source spawns a background task that reads newline-delimited JSON
/// from the provided async reader and hands parsed observations to
/// `next_observation()`.
///
/// # Example with a byte stream
///
/// ```
/// use std::io::Cursor;
/// use opstat::StreamSource;
///
/// # tokio_test::block_on(async {
/// let data = br#"{"op":"login","delay_ms":3,"source":"10.0.0.1"}"#;
/// let stream = Cursor::new(data.to_vec());
/// let source = StreamSource::spawn(stream, "example");
/// # });
/// ```
#[derive(Debug)]
pub struct StreamSource {
    receiver: mpsc::Receiver<Observation>,
    description: String,
    skipped: Arc<AtomicU64>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl StreamSource {
    /// Spawn a background task that reads from the given async reader.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R>(reader: R, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(256);
        let skipped = Arc::new(AtomicU64::new(0));
        let last_error = Arc::new(Mutex::new(None));
        let skipped_handle = skipped.clone();
        let error_handle = last_error.clone();
        let desc = description.to_string();

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut line_number = 0u64;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        line_number += 1;
                        match parse_line(&line) {
                            Ok(Some(obs)) => {
                                if tx.send(obs).await.is_err() {
                                    // Receiver dropped
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let message = format!("{e:#}");
                                tracing::warn!(
                                    source = %desc,
                                    line = line_number,
                                    error = %message,
                                    "skipping malformed record"
                                );
                                skipped_handle.fetch_add(1, Ordering::Relaxed);
                                *error_handle.lock() = Some(format!("line {}: {}", line_number, message));
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        *error_handle.lock() = Some(format!("Read error: {}", e));
                        break;
                    }
                }
            }
        });

        Self {
            receiver: rx,
            description: format!("stream: {}", description),
            skipped,
            last_error,
        }
    }

    /// Connect to a TCP endpoint and read records from it.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;
        Ok(Self::spawn(stream, &format!("tcp://{}", addr)))
    }

    /// Read records from standard input.
    pub fn stdin() -> Self {
        Self::spawn(tokio::io::stdin(), "stdin")
    }
}

#[async_trait]
impl ObservationSource for StreamSource {
    async fn next_observation(&mut self) -> Option<Observation> {
        self.receiver.recv().await
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn sample_line() -> &'static str {
        r#"{"op":"login","delay_ms":12,"source":"10.0.0.1","payload":100}"#
    }

    #[tokio::test]
    async fn test_stream_source_spawn() {
        let data = format!("{}\n", sample_line());
        let mut source = StreamSource::spawn(Cursor::new(data), "test");

        let obs = source.next_observation().await.unwrap();
        assert_eq!(obs.operation, "login");
        assert_eq!(obs.payload, 100);
        assert!(source.next_observation().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_source_skips_invalid_lines() {
        let data = format!("not valid json\n{}\n{{\"op\":\"x\"}}\n", sample_line());
        let mut source = StreamSource::spawn(Cursor::new(data), "test");

        assert!(source.next_observation().await.is_some());
        assert!(source.next_observation().await.is_none());
        assert_eq!(source.skipped(), 2);
        assert!(source.last_error().unwrap().starts_with("line 3:"));
    }

    #[tokio::test]
    async fn test_stream_source_description() {
        let source = StreamSource::spawn(Cursor::new(""), "tcp://localhost:9090");
        assert_eq!(source.description(), "stream: tcp://localhost:9090");
    }

    #[tokio::test]
    async fn test_stream_source_empty_stream() {
        let mut source = StreamSource::spawn(Cursor::new(""), "test");
        assert!(source.next_observation().await.is_none());
        assert_eq!(source.skipped(), 0);
        assert!(source.last_error().is_none());
    }

    #[tokio::test]
    async fn test_stream_source_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(format!("{}\n{}\n", sample_line(), sample_line()).as_bytes())
                .await
                .unwrap();
        });

        let mut source = StreamSource::connect(&addr).await.unwrap();
        assert_eq!(source.description(), format!("stream: tcp://{}", addr));
        assert!(source.next_observation().await.is_some());
        assert!(source.next_observation().await.is_some());
        assert!(source.next_observation().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_source_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(StreamSource::connect(&addr).await.is_err());
    }
}
