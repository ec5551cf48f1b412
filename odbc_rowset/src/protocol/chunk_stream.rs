use crate::error::{OdbcError, Result};
use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Mutex};

/// Outcome of pulling one chunk of a long value from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// `n` bytes were written to the front of the buffer.
    Data(usize),
    /// Every byte of the value has already been delivered.
    End,
    /// The value is NULL.
    Null,
}

/// Lazily pulls successive chunks of a long column value.
pub trait ChunkSource: Send {
    fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Chunk>;
}

/// Reader handed in by a caller and shared with it.
pub type SharedReader = Arc<Mutex<dyn Read + Send>>;

enum Source {
    Bytes(Cursor<Vec<u8>>),
    Reader(Box<dyn Read + Send>),
    Shared(SharedReader),
    Fetch {
        source: Box<dyn ChunkSource>,
        chunk: Vec<u8>,
        start: usize,
        end: usize,
    },
}

/// Forward-only byte sequence backing a long column or parameter.
///
/// Once a read returns 0 the stream stays exhausted; a NULL fetched value
/// never yields any bytes.
pub struct ChunkStream {
    source: Source,
    exhausted: bool,
    null: bool,
    delivered: u64,
}

impl ChunkStream {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_source(Source::Bytes(Cursor::new(bytes.into())))
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self::with_source(Source::Reader(Box::new(reader)))
    }

    /// Stream over a reader the caller keeps a handle to. The column buffer
    /// holding it does not own the underlying reader.
    pub fn shared(reader: SharedReader) -> Self {
        Self::with_source(Source::Shared(reader))
    }

    /// Stream over a driver-side value. The first chunk is pulled right away
    /// so that NULL is known before any read.
    pub fn fetch(mut source: Box<dyn ChunkSource>, chunk_size: usize) -> Result<Self> {
        let mut chunk = vec![0u8; chunk_size.max(1)];
        let first = source.next_chunk(&mut chunk)?;
        let (end, exhausted, null) = match first {
            Chunk::Data(0) | Chunk::End => (0, true, false),
            Chunk::Data(n) => (n.min(chunk.len()), false, false),
            Chunk::Null => (0, true, true),
        };
        Ok(Self {
            source: Source::Fetch {
                source,
                chunk,
                start: 0,
                end,
            },
            exhausted,
            null,
            delivered: 0,
        })
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            exhausted: false,
            null: false,
            delivered: 0,
        }
    }

    pub fn is_owned(&self) -> bool {
        !matches!(self.source, Source::Shared(_))
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    /// True when nothing more can be read. A fetch stream is exhausted as
    /// soon as its last chunk has been consumed.
    pub fn is_exhausted(&self) -> bool {
        match &self.source {
            Source::Fetch { start, end, .. } => self.exhausted && start >= end,
            _ => self.exhausted,
        }
    }

    /// Bytes handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Reads up to `buf.len()` bytes; 0 means end of data.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match &mut self.source {
            Source::Fetch {
                source,
                chunk,
                start,
                end,
            } => {
                if *start >= *end {
                    if self.exhausted {
                        return Ok(0);
                    }
                    match source.next_chunk(chunk)? {
                        Chunk::Data(n) if n > 0 => {
                            *start = 0;
                            *end = n.min(chunk.len());
                        }
                        _ => {
                            self.exhausted = true;
                            return Ok(0);
                        }
                    }
                }
                let n = (*end - *start).min(buf.len());
                buf[..n].copy_from_slice(&chunk[*start..*start + n]);
                *start += n;
                n
            }
            _ if self.exhausted => return Ok(0),
            Source::Bytes(cursor) => cursor.read(buf).map_err(stream_error)?,
            Source::Reader(reader) => reader.read(buf).map_err(stream_error)?,
            Source::Shared(reader) => {
                let mut guard = reader
                    .lock()
                    .map_err(|_| OdbcError::StreamError("shared reader lock poisoned".into()))?;
                guard.read(buf).map_err(stream_error)?
            }
        };
        if n == 0 {
            self.exhausted = true;
        }
        self.delivered += n as u64;
        Ok(n)
    }

    /// Drains the remaining bytes.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = self.read_chunk(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

fn stream_error(err: io::Error) -> OdbcError {
    OdbcError::StreamError(err.to_string())
}

impl Read for ChunkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(io::Error::other)
    }
}

impl fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.source {
            Source::Bytes(_) => "bytes",
            Source::Reader(_) => "reader",
            Source::Shared(_) => "shared",
            Source::Fetch { .. } => "fetch",
        };
        f.debug_struct("ChunkStream")
            .field("source", &kind)
            .field("exhausted", &self.exhausted)
            .field("null", &self.null)
            .field("delivered", &self.delivered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        chunks: Vec<Chunk>,
        payload: Vec<u8>,
        calls: usize,
    }

    impl ChunkSource for Scripted {
        fn next_chunk(&mut self, buf: &mut [u8]) -> Result<Chunk> {
            let step = self.chunks.get(self.calls).copied().unwrap_or(Chunk::End);
            self.calls += 1;
            if let Chunk::Data(n) = step {
                buf[..n].copy_from_slice(&self.payload[..n]);
            }
            Ok(step)
        }
    }

    #[test]
    fn test_bytes_stream_exhausts_once() {
        let mut s = ChunkStream::from_bytes(b"hello".to_vec());
        assert!(s.is_owned());
        assert_eq!(s.read_to_vec().unwrap(), b"hello");
        assert!(s.is_exhausted());
        let mut buf = [0u8; 4];
        assert_eq!(s.read_chunk(&mut buf).unwrap(), 0);
        assert_eq!(s.delivered(), 5);
    }

    #[test]
    fn test_shared_stream_is_borrowed() {
        let reader: SharedReader = Arc::new(Mutex::new(Cursor::new(b"abc".to_vec())));
        let mut s = ChunkStream::shared(Arc::clone(&reader));
        assert!(!s.is_owned());
        let mut out = String::new();
        s.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn test_fetch_stream_null_yields_nothing() {
        let src = Scripted {
            chunks: vec![Chunk::Null],
            payload: vec![],
            calls: 0,
        };
        let mut s = ChunkStream::fetch(Box::new(src), 8).unwrap();
        assert!(s.is_null());
        assert!(s.is_exhausted());
        assert!(s.read_to_vec().unwrap().is_empty());
    }

    #[test]
    fn test_fetch_stream_pulls_chunks_until_end() {
        let src = Scripted {
            chunks: vec![Chunk::Data(3), Chunk::Data(2), Chunk::End, Chunk::Data(3)],
            payload: b"xyz".to_vec(),
            calls: 0,
        };
        let mut s = ChunkStream::fetch(Box::new(src), 4).unwrap();
        assert!(!s.is_null());
        assert!(!s.is_exhausted());
        assert_eq!(s.read_to_vec().unwrap(), b"xyzxy");
        // a later Data chunk is never requested
        assert_eq!(s.read_to_vec().unwrap(), b"");
    }

    #[test]
    fn test_fetch_stream_empty_value() {
        let src = Scripted {
            chunks: vec![Chunk::End],
            payload: vec![],
            calls: 0,
        };
        let s = ChunkStream::fetch(Box::new(src), 4).unwrap();
        assert!(!s.is_null());
        assert!(s.is_exhausted());
    }
}
