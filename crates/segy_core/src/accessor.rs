//! Guarded random-access session over one data file.
//!
//! One `Mutex` per file is the only synchronization token. Compound
//! operations (seek + read, seek + write) take `lock()` once and run against
//! the guarded `FileSession`.

use crate::errors::{Result, SegyError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Closed,
    Read,
    Write,
}

#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    file: Option<File>,
    mode: AccessMode,
    reads: u64,
}

impl FileSession {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None, mode: AccessMode::Closed, reads: 0 }
    }

    pub fn mode(&self) -> AccessMode { self.mode }
    pub fn path(&self) -> &Path { &self.path }

    /// Number of sample/header reads since the session was created.
    pub fn read_count(&self) -> u64 { self.reads }

    pub fn open_for_read(&mut self) -> Result<()> {
        if self.mode == AccessMode::Read {
            return Ok(());
        }
        self.close()?;
        self.file = Some(File::open(&self.path)?);
        self.mode = AccessMode::Read;
        tracing::debug!(path = %self.path.display(), "opened for read");
        Ok(())
    }

    pub fn open_for_write(&mut self) -> Result<()> {
        if self.mode == AccessMode::Write {
            return Ok(());
        }
        self.close()?;
        self.file = Some(OpenOptions::new().read(true).write(true).open(&self.path)?);
        self.mode = AccessMode::Write;
        tracing::debug!(path = %self.path.display(), "opened for write");
        Ok(())
    }

    /// Safe to call in any state.
    pub fn close(&mut self) -> Result<()> {
        let mode = std::mem::replace(&mut self.mode, AccessMode::Closed);
        if let Some(f) = self.file.take() {
            if mode == AccessMode::Write {
                f.sync_data()?;
            }
        }
        Ok(())
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(SegyError::NotOpen)
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.file()?.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.file()?.stream_position()?)
    }

    /// Fills `buf` from the current position; a short file is an error.
    pub fn read_buffer(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file()?.read_exact(buf)?;
        self.reads += 1;
        Ok(())
    }

    pub fn read_buffer_at(&mut self, buf: &mut [u8], pos: u64) -> Result<()> {
        self.seek(pos)?;
        self.read_buffer(buf)
    }

    pub fn write_buffer(&mut self, buf: &[u8]) -> Result<()> {
        if self.mode != AccessMode::Write {
            return Err(SegyError::InvalidInput(format!(
                "{} is not open for write",
                self.path.display()
            )));
        }
        self.file()?.write_all(buf)?;
        Ok(())
    }

    pub fn write_buffer_at(&mut self, buf: &[u8], pos: u64) -> Result<()> {
        self.seek(pos)?;
        self.write_buffer(buf)
    }

    pub fn file_size(&mut self) -> Result<u64> {
        Ok(self.file()?.metadata()?.len())
    }

    /// Position one past the last byte; where appended traces go.
    pub fn eof_position(&mut self) -> Result<u64> {
        Ok(self.file()?.seek(SeekFrom::End(0))?)
    }
}

#[derive(Debug)]
pub struct FileAccessor {
    path: PathBuf,
    session: Mutex<FileSession>,
}

impl FileAccessor {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self { session: Mutex::new(FileSession::new(path.clone())), path }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Holds the token until the guard is dropped.
    pub fn lock(&self) -> MutexGuard<'_, FileSession> {
        // every session method leaves the state consistent, so a panic
        // elsewhere does not invalidate it
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> AccessMode { self.lock().mode() }
    pub fn open_for_read(&self) -> Result<()> { self.lock().open_for_read() }
    pub fn open_for_write(&self) -> Result<()> { self.lock().open_for_write() }
    pub fn close(&self) -> Result<()> { self.lock().close() }
    pub fn seek(&self, pos: u64) -> Result<()> { self.lock().seek(pos) }
    pub fn read_buffer(&self, buf: &mut [u8], pos: Option<u64>) -> Result<()> {
        let mut s = self.lock();
        match pos {
            Some(p) => s.read_buffer_at(buf, p),
            None => s.read_buffer(buf),
        }
    }
    pub fn write_buffer(&self, buf: &[u8]) -> Result<()> { self.lock().write_buffer(buf) }
    pub fn file_size(&self) -> Result<u64> { self.lock().file_size() }
    pub fn eof_position(&self) -> Result<u64> { self.lock().eof_position() }
}
