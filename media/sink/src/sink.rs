/*!
    Byte destinations for finished containers.
*/

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use media_types::{Error, Result};

/**
    Where container bytes go.

    The muxer only ever appends. `finalize` is called exactly once, after the
    trailer has been written, and must make every byte durable.
*/
pub trait ContainerSink {
    /**
        Append `data` to the container.
    */
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /**
        Flush and release the destination.
    */
    fn finalize(&mut self) -> Result<()>;

    /**
        Number of bytes written so far.
    */
    fn position(&self) -> u64;
}

impl<S: ContainerSink + ?Sized> ContainerSink for Box<S> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn finalize(&mut self) -> Result<()> {
        (**self).finalize()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

/**
    Writes to a file through a buffer.
*/
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    position: u64,
}

impl FileSink {
    /**
        Create (or truncate) the file at `path`.
    */
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            position: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContainerSink for FileSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

/**
    Collects the container in memory.

    Clones share one buffer, so a caller can keep a handle and inspect the
    bytes while (or after) a muxer owns the sink.
*/
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
    finalized: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /**
        Copy of everything written so far.
    */
    pub fn bytes(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        *self.finalized.lock()
    }
}

impl ContainerSink for MemorySink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::invalid_data("write after finalize"));
        }
        self.buffer.lock().extend_from_slice(data);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        *self.finalized.lock() = true;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.len() as u64
    }
}

/**
    Adapts any [`Write`] implementation.
*/
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    position: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            position: 0,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ContainerSink for WriterSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_shares_buffer() {
        let handle = MemorySink::new();
        let mut sink = handle.clone();
        sink.write(b"abc").unwrap();
        sink.write(b"de").unwrap();
        assert_eq!(handle.bytes(), b"abcde");
        assert_eq!(sink.position(), 5);

        sink.finalize().unwrap();
        assert!(handle.is_finalized());
        assert!(sink.write(b"x").is_err());
        assert_eq!(handle.len(), 5);
    }

    #[test]
    fn writer_sink_counts_bytes() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write(&[1, 2, 3]).unwrap();
        sink.finalize().unwrap();
        assert_eq!(sink.position(), 3);
        assert_eq!(sink.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn file_sink_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mxc");
        let mut sink = FileSink::create(&path).unwrap();
        sink.write(b"hello").unwrap();
        sink.finalize().unwrap();
        assert_eq!(sink.position(), 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }
}
