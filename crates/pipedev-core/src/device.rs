//! Virtual pipe sources and sinks.
//!
//! A device pairs the index of the server module backing it with the open
//! named pipe the module reads from or writes to. Devices are only handed out
//! once both halves exist, and are returned through
//! [`PipeProvisioner::release`](crate::PipeProvisioner::release).

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::control::ModuleIndex;
use crate::props::BYTES_PER_SAMPLE;

const SAMPLE_BYTES: usize = BYTES_PER_SAMPLE as usize;

/// A loaded pipe module together with its open pipe file.
#[derive(Debug)]
pub struct PipeHandle {
    module: ModuleIndex,
    path: PathBuf,
    file: Option<File>,
    armed: bool,
}

impl PipeHandle {
    pub(crate) fn new(module: ModuleIndex, path: PathBuf, file: File) -> Self {
        Self { module, path, file: Some(file), armed: true }
    }

    /// Index of the backing server module.
    #[must_use]
    pub fn module(&self) -> ModuleIndex {
        self.module
    }

    /// Path of the named pipe.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The open pipe, unless it was taken.
    #[must_use]
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    /// Move the pipe file out of the handle.
    ///
    /// The module stays loaded until the device is released.
    pub fn take_file(&mut self) -> Option<File> {
        self.file.take()
    }

    /// Give up the file and the module index for release.
    pub(crate) fn disarm(mut self) -> (ModuleIndex, Option<File>) {
        self.armed = false;
        (self.module, self.file.take())
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "pipe file was taken"))
    }
}

impl Drop for PipeHandle {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                module = %self.module,
                path = %self.path.display(),
                "Pipe device dropped without release, module left loaded"
            );
        }
    }
}

/// Virtual source: samples written to the pipe come out of the server as a
/// capture device.
#[derive(Debug)]
pub struct VirtualSource(PipeHandle);

/// Virtual sink: audio the server plays to the sink can be read from the pipe.
#[derive(Debug)]
pub struct VirtualSink(PipeHandle);

impl VirtualSource {
    pub(crate) fn new(handle: PipeHandle) -> Self {
        Self(handle)
    }

    /// Write mono samples in the pipe's `float32be` format.
    ///
    /// # Errors
    /// Returns an error if the pipe was taken or the write fails.
    pub fn write_samples(&mut self, samples: &[f32]) -> io::Result<()> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
        self.write_all(&bytes)
    }
}

impl VirtualSink {
    pub(crate) fn new(handle: PipeHandle) -> Self {
        Self(handle)
    }

    /// Read whole `float32be` samples into `out`.
    ///
    /// Blocks until at least one full sample is available. Returns the number
    /// of samples stored, or 0 at end of stream.
    ///
    /// # Errors
    /// Returns an error if the pipe was taken, the read fails, or the stream
    /// ends in the middle of a sample.
    pub fn read_samples(&mut self, out: &mut [f32]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut buf = vec![0u8; out.len() * SAMPLE_BYTES];
        let mut filled = 0;
        while filled < SAMPLE_BYTES || filled % SAMPLE_BYTES != 0 {
            match self.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(0),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "pipe closed mid-sample",
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        let count = filled / SAMPLE_BYTES;
        for (slot, chunk) in out.iter_mut().zip(buf[..filled].chunks_exact(SAMPLE_BYTES)) {
            *slot = f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(count)
    }
}

macro_rules! handle_access {
    ($ty:ty) => {
        impl std::ops::Deref for $ty {
            type Target = PipeHandle;

            fn deref(&self) -> &PipeHandle {
                &self.0
            }
        }

        impl std::ops::DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut PipeHandle {
                &mut self.0
            }
        }

        impl From<$ty> for PipeHandle {
            fn from(device: $ty) -> Self {
                device.0
            }
        }

        impl Read for $ty {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.0.file_mut()?.read(buf)
            }
        }
    };
}

handle_access!(VirtualSource);
handle_access!(VirtualSink);

impl Write for VirtualSource {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.file_mut()?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Seek;

    fn scratch_handle(dir: &Path) -> PipeHandle {
        let path = dir.join("pipedev-test.pipe");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        PipeHandle::new(ModuleIndex(1), path, file)
    }

    #[test]
    fn test_source_writes_big_endian_floats() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = VirtualSource::new(scratch_handle(dir.path()));

        source.write_samples(&[1.0, -0.5]).unwrap();
        source.flush().unwrap();

        let bytes = std::fs::read(source.path()).unwrap();
        assert_eq!(bytes, [0x3f, 0x80, 0x00, 0x00, 0xbf, 0x00, 0x00, 0x00]);
        let _ = source.0.disarm();
    }

    #[test]
    fn test_sink_reads_whole_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = scratch_handle(dir.path());
        {
            let file = handle.file.as_mut().unwrap();
            file.write_all(&0.25f32.to_be_bytes()).unwrap();
            file.write_all(&2.0f32.to_be_bytes()).unwrap();
            file.rewind().unwrap();
        }
        let mut sink = VirtualSink::new(handle);

        let mut out = [0.0f32; 4];
        assert_eq!(sink.read_samples(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], &[0.25, 2.0]);
        assert_eq!(sink.read_samples(&mut out).unwrap(), 0);
        let _ = sink.0.disarm();
    }

    #[test]
    fn test_sink_partial_sample_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = scratch_handle(dir.path());
        {
            let file = handle.file.as_mut().unwrap();
            file.write_all(&[0x3f, 0x80]).unwrap();
            file.rewind().unwrap();
        }
        let mut sink = VirtualSink::new(handle);

        let mut out = [0.0f32; 1];
        let err = sink.read_samples(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        let _ = sink.0.disarm();
    }

    #[test]
    fn test_io_after_take_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = VirtualSource::new(scratch_handle(dir.path()));

        assert!(source.take_file().is_some());
        assert!(source.file().is_none());
        let err = source.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let (module, file) = PipeHandle::from(source).disarm();
        assert_eq!(module, ModuleIndex(1));
        assert!(file.is_none());
    }
}
