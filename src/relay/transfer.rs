//! Moving one chunk from a source to a destination.
//!
//! A read may return less than the chunk capacity and a write may accept
//! less than it was offered. The chunk is written out completely before
//! `transfer` returns, so per-direction byte order is preserved.

use super::endpoint::{ReadOutcome, Sink, Source, WriteOutcome};
use super::error::RelayError;
use tracing::trace;

/// Capacity of the chunk moved per transfer.
pub const CHUNK_SIZE: usize = 4096;

/// How a transfer ended when nothing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// This many bytes were read and fully written.
    Forwarded(usize),
    /// The source had nothing to read after all.
    Idle,
    /// The source reached end of stream.
    Closed,
}

/// Read one chunk from `source` and write all of it to `destination`.
pub fn transfer<S, D>(
    source: &S,
    destination: &D,
    chunk: &mut [u8],
) -> Result<Transfer, RelayError>
where
    S: Source + ?Sized,
    D: Sink + ?Sized,
{
    let nread = match source.read_available(chunk) {
        Ok(ReadOutcome::Data(n)) => n,
        Ok(ReadOutcome::WouldBlock) => return Ok(Transfer::Idle),
        Ok(ReadOutcome::Closed) => return Ok(Transfer::Closed),
        Err(e) => {
            return Err(RelayError::Read {
                endpoint: source.name().to_string(),
                source: e,
            })
        }
    };

    write_all(destination, &chunk[..nread])?;

    trace!(
        from = source.name(),
        to = destination.name(),
        bytes = nread,
        "Forwarded chunk"
    );
    Ok(Transfer::Forwarded(nread))
}

/// Write `data` to `destination`, waiting for writability between attempts.
fn write_all<D: Sink + ?Sized>(destination: &D, data: &[u8]) -> Result<(), RelayError> {
    let mut sent = 0;

    while sent < data.len() {
        let written = match destination.write_once(&data[sent..]) {
            Ok(WriteOutcome::Written(0)) => {
                return Err(RelayError::WriteZero {
                    endpoint: destination.name().to_string(),
                })
            }
            Ok(WriteOutcome::Written(n)) => n,
            Ok(WriteOutcome::WouldBlock) => 0,
            Err(e) => {
                return Err(RelayError::Write {
                    endpoint: destination.name().to_string(),
                    source: e,
                })
            }
        };
        sent += written;

        if sent < data.len() {
            trace!(
                to = destination.name(),
                remaining = data.len() - sent,
                "Waiting for writer"
            );
            destination.wait_writable().map_err(|e| RelayError::Wait {
                endpoint: destination.name().to_string(),
                source: e,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::endpoint::Stream;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Write(usize),
        WouldBlock,
        Wait,
    }

    /// Source that hands out scripted read results.
    struct ScriptedSource {
        reads: RefCell<VecDeque<io::Result<Vec<u8>>>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: RefCell::new(reads.into()),
            }
        }
    }

    impl Stream for ScriptedSource {
        fn name(&self) -> &str {
            "source"
        }
    }

    impl Source for ScriptedSource {
        fn read_available(&self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
            match self.reads.borrow_mut().pop_front() {
                None => Ok(ReadOutcome::Closed),
                Some(Ok(data)) if data.is_empty() => Ok(ReadOutcome::WouldBlock),
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(ReadOutcome::Data(data.len()))
                }
                Some(Err(e)) => Err(e),
            }
        }
    }

    /// Sink that accepts at most `limit` bytes per write and refuses the
    /// first `blocked` attempts.
    struct ThrottledSink {
        limit: usize,
        blocked: RefCell<usize>,
        received: RefCell<Vec<u8>>,
        calls: RefCell<Vec<Call>>,
        fail_with: Option<io::ErrorKind>,
        zero_writes: bool,
    }

    impl ThrottledSink {
        fn new(limit: usize) -> Self {
            Self {
                limit,
                blocked: RefCell::new(0),
                received: RefCell::new(Vec::new()),
                calls: RefCell::new(Vec::new()),
                fail_with: None,
                zero_writes: false,
            }
        }

        fn write_attempts(&self) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| !matches!(c, Call::Wait))
                .count()
        }
    }

    impl Stream for ThrottledSink {
        fn name(&self) -> &str {
            "sink"
        }
    }

    impl Sink for ThrottledSink {
        fn write_once(&self, buf: &[u8]) -> io::Result<WriteOutcome> {
            if let Some(kind) = self.fail_with {
                return Err(io::Error::from(kind));
            }
            if self.zero_writes {
                self.calls.borrow_mut().push(Call::Write(0));
                return Ok(WriteOutcome::Written(0));
            }
            let mut blocked = self.blocked.borrow_mut();
            if *blocked > 0 {
                *blocked -= 1;
                self.calls.borrow_mut().push(Call::WouldBlock);
                return Ok(WriteOutcome::WouldBlock);
            }
            let n = buf.len().min(self.limit);
            self.received.borrow_mut().extend_from_slice(&buf[..n]);
            self.calls.borrow_mut().push(Call::Write(n));
            Ok(WriteOutcome::Written(n))
        }

        fn wait_writable(&self) -> io::Result<()> {
            self.calls.borrow_mut().push(Call::Wait);
            Ok(())
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_full_chunk_single_write() {
        let data = pattern(CHUNK_SIZE);
        let source = ScriptedSource::new(vec![Ok(data.clone())]);
        let sink = ThrottledSink::new(usize::MAX);
        let mut chunk = [0u8; CHUNK_SIZE];

        let result = transfer(&source, &sink, &mut chunk).unwrap();
        assert_eq!(result, Transfer::Forwarded(CHUNK_SIZE));
        assert_eq!(*sink.received.borrow(), data);
        assert_eq!(*sink.calls.borrow(), vec![Call::Write(CHUNK_SIZE)]);
    }

    #[test]
    fn test_partial_writes_converge() {
        for (m, n) in [(4096, 1000), (4096, 4095), (1000, 7), (10, 3), (9, 3)] {
            let data = pattern(m);
            let source = ScriptedSource::new(vec![Ok(data.clone())]);
            let sink = ThrottledSink::new(n);
            let mut chunk = [0u8; CHUNK_SIZE];

            let result = transfer(&source, &sink, &mut chunk).unwrap();
            assert_eq!(result, Transfer::Forwarded(m));
            assert_eq!(*sink.received.borrow(), data, "m={m} n={n}");
            assert_eq!(sink.write_attempts(), m.div_ceil(n), "m={m} n={n}");
        }
    }

    #[test]
    fn test_would_block_waits_before_retry() {
        let source = ScriptedSource::new(vec![Ok(b"PING".to_vec())]);
        let sink = ThrottledSink::new(usize::MAX);
        *sink.blocked.borrow_mut() = 2;
        let mut chunk = [0u8; CHUNK_SIZE];

        let result = transfer(&source, &sink, &mut chunk).unwrap();
        assert_eq!(result, Transfer::Forwarded(4));
        assert_eq!(
            *sink.calls.borrow(),
            vec![
                Call::WouldBlock,
                Call::Wait,
                Call::WouldBlock,
                Call::Wait,
                Call::Write(4)
            ]
        );
        assert_eq!(*sink.received.borrow(), b"PING");
    }

    #[test]
    fn test_no_wait_after_final_write() {
        let source = ScriptedSource::new(vec![Ok(pattern(10))]);
        let sink = ThrottledSink::new(5);
        let mut chunk = [0u8; CHUNK_SIZE];

        transfer(&source, &sink, &mut chunk).unwrap();
        assert_eq!(
            *sink.calls.borrow(),
            vec![Call::Write(5), Call::Wait, Call::Write(5)]
        );
    }

    #[test]
    fn test_closed_source() {
        let source = ScriptedSource::new(vec![]);
        let sink = ThrottledSink::new(usize::MAX);
        let mut chunk = [0u8; CHUNK_SIZE];

        assert_eq!(
            transfer(&source, &sink, &mut chunk).unwrap(),
            Transfer::Closed
        );
        assert!(sink.calls.borrow().is_empty());
    }

    #[test]
    fn test_spurious_readiness_is_idle() {
        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let sink = ThrottledSink::new(usize::MAX);
        let mut chunk = [0u8; CHUNK_SIZE];

        assert_eq!(transfer(&source, &sink, &mut chunk).unwrap(), Transfer::Idle);
        assert!(sink.calls.borrow().is_empty());
    }

    #[test]
    fn test_read_error_is_fatal() {
        let source = ScriptedSource::new(vec![Err(io::Error::from(
            io::ErrorKind::ConnectionReset,
        ))]);
        let sink = ThrottledSink::new(usize::MAX);
        let mut chunk = [0u8; CHUNK_SIZE];

        let err = transfer(&source, &sink, &mut chunk).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Read { ref endpoint, ref source }
                if endpoint == "source" && source.kind() == io::ErrorKind::ConnectionReset
        ));
    }

    #[test]
    fn test_write_error_is_fatal() {
        let source = ScriptedSource::new(vec![Ok(b"data".to_vec())]);
        let mut sink = ThrottledSink::new(usize::MAX);
        sink.fail_with = Some(io::ErrorKind::BrokenPipe);
        let mut chunk = [0u8; CHUNK_SIZE];

        let err = transfer(&source, &sink, &mut chunk).unwrap_err();
        assert!(matches!(err, RelayError::Write { ref endpoint, .. } if endpoint == "sink"));
    }

    #[test]
    fn test_zero_write_is_fatal() {
        let source = ScriptedSource::new(vec![Ok(b"data".to_vec())]);
        let mut sink = ThrottledSink::new(usize::MAX);
        sink.zero_writes = true;
        let mut chunk = [0u8; CHUNK_SIZE];

        let err = transfer(&source, &sink, &mut chunk).unwrap_err();
        assert!(matches!(err, RelayError::WriteZero { .. }));
        assert_eq!(*sink.calls.borrow(), vec![Call::Write(0)]);
    }
}
