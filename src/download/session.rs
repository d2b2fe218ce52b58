//! Bookkeeping for one in-progress binary transfer.

use crate::error::Result;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// State of one download call, owned by that call alone
#[derive(Debug)]
pub struct TransferSession {
    url: String,
    declared_total: u64,
    received: u64,
    chunks: Vec<Bytes>,
    filename: String,
}

impl TransferSession {
    /// Start a session. `declared_total` is 0 when the length is unknown.
    pub fn new(url: impl Into<String>, declared_total: u64, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            declared_total,
            received: 0,
            chunks: Vec::new(),
            filename: filename.into(),
        }
    }

    /// Resolved URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Declared length, 0 while unknown
    pub fn declared_total(&self) -> u64 {
        self.declared_total
    }

    /// Bytes received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Filename the artifact will be delivered under
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Append a chunk and return the new percentage if the total is known.
    ///
    /// A body longer than its declared length makes the declared length
    /// meaningless; it is dropped and no further percentages are reported.
    pub fn record_chunk(&mut self, chunk: Bytes) -> Option<u8> {
        self.received += chunk.len() as u64;
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }

        if self.declared_total > 0 && self.received > self.declared_total {
            tracing::warn!(
                url = %self.url,
                declared = self.declared_total,
                received = self.received,
                "body exceeds declared length, treating size as unknown"
            );
            self.declared_total = 0;
        }

        self.percent()
    }

    /// `round(received / total * 100)`, or `None` while the total is unknown
    pub fn percent(&self) -> Option<u8> {
        if self.declared_total == 0 {
            return None;
        }
        let received = u128::from(self.received);
        let total = u128::from(self.declared_total);
        let rounded = (received * 200 + total) / (total * 2);
        Some(rounded.min(100) as u8)
    }

    /// Read every chunk of `body`, calling `on_progress` after each one while
    /// the total is known.
    pub async fn read_from<S>(&mut self, body: S, mut on_progress: impl FnMut(u8)) -> Result<()>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            if let Some(percent) = self.record_chunk(chunk?) {
                on_progress(percent);
            }
        }
        Ok(())
    }

    /// Concatenate all chunks into one buffer of exactly `received` bytes
    pub fn assemble(mut self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks.remove(0);
        }

        let mut buffer = BytesMut::with_capacity(self.received as usize);
        for chunk in &self.chunks {
            buffer.extend_from_slice(chunk);
        }
        buffer.freeze()
    }
}
