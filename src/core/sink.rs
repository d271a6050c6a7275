// Byte sinks: an in-memory buffer or an owned stream, with bounded retry
// on zero-progress writes.

use std::io::{self, Write};

use log::warn;

use crate::error::WriteError;

/// How many consecutive zero-progress writes are retried before the sink
/// is declared failed.
pub const MAX_ZERO_WRITES: usize = 5;

pub enum ByteSink {
    Buffer(Vec<u8>),
    Stream(Box<dyn Write>),
}

impl ByteSink {
    pub fn buffer() -> Self {
        ByteSink::Buffer(Vec::new())
    }

    pub fn from_writer(writer: Box<dyn Write>) -> Self {
        ByteSink::Stream(writer)
    }

    /// Write every byte. A write that makes no progress is retried a
    /// bounded number of times; a true error is immediately fatal.
    pub fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), WriteError> {
        match self {
            ByteSink::Buffer(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            ByteSink::Stream(writer) => {
                let mut stalls = 0;
                while !bytes.is_empty() {
                    match writer.write(bytes) {
                        Ok(0) => {
                            stalls += 1;
                            warn!("byte sink made no progress (attempt {stalls})");
                            if stalls >= MAX_ZERO_WRITES {
                                return Err(WriteError::Stream(io::Error::new(
                                    io::ErrorKind::WriteZero,
                                    "sink accepted no bytes",
                                )));
                            }
                        }
                        Ok(n) => {
                            stalls = 0;
                            bytes = &bytes[n..];
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(WriteError::Stream(e)),
                    }
                }
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> Result<(), WriteError> {
        match self {
            ByteSink::Buffer(_) => Ok(()),
            ByteSink::Stream(writer) => writer.flush().map_err(WriteError::Stream),
        }
    }

    /// The accumulated bytes of a buffer sink. None for stream sinks.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            ByteSink::Buffer(buf) => Some(buf),
            ByteSink::Stream(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_accumulates() {
        let mut sink = ByteSink::buffer();
        sink.write_all(b"ab").unwrap();
        sink.write_all(b"cd").unwrap();
        assert_eq!(sink.into_bytes().unwrap(), b"abcd");
    }

    struct StallingWriter {
        stalls_left: usize,
        written: Vec<u8>,
    }

    impl Write for StallingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.stalls_left > 0 {
                self.stalls_left -= 1;
                Ok(0)
            } else {
                // One byte at a time to exercise the resume path.
                self.written.push(buf[0]);
                Ok(1)
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_sink_retries_zero_progress() {
        let mut sink = ByteSink::from_writer(Box::new(StallingWriter {
            stalls_left: 3,
            written: Vec::new(),
        }));
        sink.write_all(b"xyz").unwrap();
    }

    struct DeadWriter;

    impl Write for DeadWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_sink_gives_up_after_bound() {
        let mut sink = ByteSink::from_writer(Box::new(DeadWriter));
        assert!(matches!(
            sink.write_all(b"x"),
            Err(WriteError::Stream(_))
        ));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_sink_true_error_is_fatal() {
        let mut sink = ByteSink::from_writer(Box::new(FailingWriter));
        assert!(matches!(sink.write_all(b"x"), Err(WriteError::Stream(_))));
    }
}
