//! The streaming response pump.
//!
//! Once the static handler has written the response head, the open file is
//! handed to a [`FilePump`]. The transport's event loop re-enters
//! [`FilePump::on_writable`] whenever it reports spare send capacity; each
//! entry drains bounded chunks from the file into the output buffer until
//! the low-water mark is reached, end of file, or a fatal read error.

use std::fs::File;
use std::io::{self, Read};

use tracing::warn;

use crate::transport::Transport;

/// Bytes read from the file per output segment.
const CHUNK_SIZE: usize = 4096;

/// Refill the output buffer only while fewer than this many bytes are
/// unsent.
const LOW_WATER: usize = 256;

/// What the pump did on this write-readiness signal.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpState {
    /// The transport is full; re-enter on the next write-readiness signal.
    Blocked,
    /// End of file reached; the response has been finalized.
    Complete,
    /// Unrecoverable read error; the response has been finalized and the
    /// connection should be torn down.
    Failed,
}

/// Owns the file descriptor from the moment static serving begins.
///
/// Dropping the pump closes the file, so abnormal connection teardown
/// releases it without any extra hook. The response is finalized exactly
/// once regardless of how many times the pump is re-entered.
pub struct FilePump {
    file: File,
    finished: bool,
}

impl FilePump {
    pub fn new(file: File) -> Self {
        Self { file, finished: false }
    }

    /// Drain the file into the transport while it reports spare capacity.
    pub fn on_writable(&mut self, transport: &mut dyn Transport) -> PumpState {
        if self.finished {
            return PumpState::Complete;
        }

        let state = pump(&mut self.file, transport);
        match state {
            PumpState::Blocked => {}
            PumpState::Complete | PumpState::Failed => {
                self.finished = true;
                transport.request_done();
            }
        }
        state
    }
}

fn pump(reader: &mut impl Read, transport: &mut dyn Transport) -> PumpState {
    let mut buf = [0u8; CHUNK_SIZE];

    while transport.pending_bytes() < LOW_WATER {
        match reader.read(&mut buf) {
            Ok(0) => return PumpState::Complete,
            Ok(n) => transport.send_chunk(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // A failed read must never reach the output path as if it
                // were a valid byte count.
                warn!(cause = %e, "file read failed, aborting response");
                return PumpState::Failed;
            }
        }
    }

    PumpState::Blocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use std::collections::VecDeque;

    /// Scripted reader: pops one result per read call.
    struct Script(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn drains_until_eof() {
        let mut reader = Script(VecDeque::from([Ok(vec![1; 100]), Ok(vec![2; 50])]));
        let mut transport = MemoryTransport::new();
        assert_eq!(pump(&mut reader, &mut transport), PumpState::Complete);
        assert_eq!(transport.body().len(), 150);
    }

    #[test]
    fn stops_at_low_water_mark() {
        let mut reader = Script(VecDeque::from([Ok(vec![0; 4096]), Ok(vec![0; 4096])]));
        let mut transport = MemoryTransport::new();
        assert_eq!(pump(&mut reader, &mut transport), PumpState::Blocked);
        // one chunk pushed pending past the mark, the second stays queued
        assert_eq!(transport.body().len(), 4096);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut reader = Script(VecDeque::from([
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(vec![7; 10]),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
        ]));
        let mut transport = MemoryTransport::new();
        assert_eq!(pump(&mut reader, &mut transport), PumpState::Complete);
        assert_eq!(transport.body(), &[7; 10]);
    }

    #[test]
    fn other_read_errors_are_fatal() {
        let mut reader = Script(VecDeque::from([Ok(vec![1; 10]), Err(io::Error::from(io::ErrorKind::Other))]));
        let mut transport = MemoryTransport::new();
        assert_eq!(pump(&mut reader, &mut transport), PumpState::Failed);
        // the partial chunk is all that ever reached the transport
        assert_eq!(transport.body().len(), 10);
    }

    #[test]
    fn finalizes_exactly_once() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"tiny").unwrap();

        let mut transport = MemoryTransport::new();
        let mut pump = FilePump::new(File::open(file.path()).unwrap());
        assert_eq!(pump.on_writable(&mut transport), PumpState::Complete);
        assert!(transport.is_done());

        // a spurious extra write-readiness signal is harmless
        assert_eq!(pump.on_writable(&mut transport), PumpState::Complete);
        assert_eq!(transport.body(), b"tiny");
    }

    #[test]
    fn resumes_across_write_readiness_signals() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(file.path(), &payload).unwrap();

        let mut transport = MemoryTransport::new();
        let mut pump = FilePump::new(File::open(file.path()).unwrap());

        let mut rounds = 0;
        loop {
            match pump.on_writable(&mut transport) {
                PumpState::Blocked => {
                    transport.drain();
                    rounds += 1;
                }
                PumpState::Complete => break,
                PumpState::Failed => panic!("unexpected failure"),
            }
            assert!(rounds < 100, "pump made no progress");
        }

        assert!(rounds > 1, "payload should span several invocations");
        assert_eq!(transport.body(), payload.as_slice());
        assert!(transport.is_done());
    }
}
