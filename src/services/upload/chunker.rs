use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One numbered slice of the source stream, ready for upload.
#[derive(Debug, Clone)]
pub struct Part {
    /// 1-based, contiguous, assigned in read order
    pub part_number: i32,
    pub payload: Bytes,
}

impl Part {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Splits a source stream into fixed-size parts, sequentially and
/// exactly once. Every part except the last is exactly `part_size`
/// bytes; the last may be shorter but never empty. The sequence is not
/// restartable: once the reader is drained or fails, the chunker is
/// finished.
pub struct Chunker<R> {
    reader: R,
    part_size: usize,
    next_number: i32,
    done: bool,
}

impl<R: AsyncRead + Unpin + Send> Chunker<R> {
    pub fn new(reader: R, part_size: usize) -> Self {
        Self {
            reader,
            part_size: part_size.max(1),
            next_number: 1,
            done: false,
        }
    }

    /// Read the next part. `Ok(None)` once the source is exhausted. A
    /// read failure mid-stream poisons the chunker; callers must treat
    /// it as fatal for the whole upload.
    pub async fn next_part(&mut self) -> std::io::Result<Option<Part>> {
        if self.done {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.part_size];
        let mut filled = 0;
        while filled < self.part_size {
            let read = match self.reader.read(&mut buffer[filled..]).await {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            };
            if read == 0 {
                self.done = true;
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(None);
        }

        buffer.truncate(filled);
        let part = Part {
            part_number: self.next_number,
            payload: Bytes::from(buffer),
        };
        self.next_number += 1;
        Ok(Some(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    async fn collect(source: &[u8], part_size: usize) -> Vec<Part> {
        let mut chunker = Chunker::new(source, part_size);
        let mut parts = Vec::new();
        while let Some(part) = chunker.next_part().await.unwrap() {
            parts.push(part);
        }
        parts
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_short_part() {
        let source = vec![7u8; 4096];
        let parts = collect(&source, 1024).await;
        assert_eq!(parts.len(), 4);
        assert!(parts.iter().all(|p| p.len() == 1024));
    }

    #[tokio::test]
    async fn test_remainder_lands_in_last_part() {
        let source = vec![7u8; 2500];
        let parts = collect(&source, 1024).await;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 1024);
        assert_eq!(parts[1].len(), 1024);
        assert_eq!(parts[2].len(), 452);
        assert_eq!(parts.iter().map(Part::len).sum::<usize>(), 2500);
    }

    #[tokio::test]
    async fn test_part_numbers_start_at_one_and_are_contiguous() {
        let source = vec![0u8; 10];
        let parts = collect(&source, 3).await;
        let numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_empty_source_yields_no_parts() {
        let parts = collect(&[], 1024).await;
        assert!(parts.is_empty());
    }

    #[tokio::test]
    async fn test_source_smaller_than_part_size() {
        let source = b"hello".to_vec();
        let parts = collect(&source, 1024).await;
        assert_eq!(parts.len(), 1);
        assert_eq!(&parts[0].payload[..], b"hello");
    }

    /// Reader that produces `good` bytes, then fails.
    struct FailingReader {
        remaining: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.remaining == 0 {
                return Poll::Ready(Err(Error::new(ErrorKind::ConnectionReset, "reset")));
            }
            let n = self.remaining.min(buf.remaining());
            buf.put_slice(&vec![1u8; n]);
            self.remaining -= n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_failure_poisons_the_chunker() {
        let mut chunker = Chunker::new(FailingReader { remaining: 4 }, 4);
        let first = chunker.next_part().await.unwrap().unwrap();
        assert_eq!(first.len(), 4);

        assert!(chunker.next_part().await.is_err());
        // Poisoned: no more parts, even though the error was consumed
        assert!(chunker.next_part().await.unwrap().is_none());
    }
}
