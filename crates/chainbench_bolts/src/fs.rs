//! `ChainBench` functionality for filesystem interaction

#[cfg(unix)]
use std::os::unix::prelude::{AsRawFd, RawFd};
use std::{
    fs::{self, remove_file, File, OpenOptions},
    io::{Read, Seek, Write},
    path::{Path, PathBuf},
};

use crate::Error;

/// The default filename used to hand the payload to the routine's stdin
pub const INPUTFILE_STD: &str = ".cb_stdin";

#[must_use]
/// Derives a filename from [`INPUTFILE_STD`] that is unique to this process.
pub fn get_unique_std_input_file() -> String {
    format!("{}_{}", INPUTFILE_STD, std::process::id())
}

/// Write a file atomically
///
/// Creates a `.{file_name}.tmp` file, and writes all bytes to it.
/// After all bytes have been written, the tmp-file is moved to it's original `path`.
/// This way, the routine under test never observes a half-written side-channel file.
/// It will overwrite existing files with the same filename.
///
/// # Errors
/// Can error if the path has no file name, or if the `.{file-name}.tmp` file already exists.
pub fn write_file_atomic<P>(path: P, bytes: &[u8]) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    fn inner(path: &Path, bytes: &[u8]) -> Result<(), Error> {
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::illegal_argument(format!("{} has no file name", path.display())))?;
        let mut tmpfile_name = path.to_path_buf();
        tmpfile_name.set_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

        let mut tmpfile = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmpfile_name)?;

        tmpfile.write_all(bytes)?;
        fs::rename(&tmpfile_name, path)?;
        Ok(())
    }
    inner(path.as_ref(), bytes)
}

/// An [`InputFile`] holding bytes the routine under test will read.
/// Once dropped, the file is removed from disk; descriptors duplicated from it stay valid.
#[derive(Debug)]
pub struct InputFile {
    /// The filename/path to this [`InputFile`]
    pub path: PathBuf,
    /// The underlying file that got created
    pub file: File,
    unlinked: bool,
}

impl InputFile {
    /// Creates a new [`InputFile`], or truncates if it already exists
    pub fn create<P>(filename: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let f = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&filename)?;
        Ok(Self {
            path: filename.as_ref().to_owned(),
            file: f,
            unlinked: false,
        })
    }

    /// Gets the file as raw file descriptor
    #[must_use]
    #[cfg(unix)]
    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Writes the given buffer to the file
    pub fn write_buf(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.rewind()?;
        self.file.write_all(buf)?;
        self.file.set_len(buf.len() as u64)?;
        self.file.flush()?;
        // Rewind again otherwise the target will not read stdin from the beginning
        self.rewind()
    }

    /// Reads the whole content, leaving the cursor at the beginning again
    pub fn read_all(&mut self) -> Result<Vec<u8>, Error> {
        self.rewind()?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        self.rewind()?;
        Ok(buf)
    }

    /// Removes the file from disk, keeping the open descriptor.
    ///
    /// The content stays readable through [`InputFile::file`] and is gone with the last
    /// descriptor, even if the process dies without running destructors.
    #[cfg(unix)]
    pub fn unlink(&mut self) -> Result<(), Error> {
        remove_file(&self.path)
            .map_err(|err| Error::os_error(err, format!("unlinking {}", self.path.display())))?;
        self.unlinked = true;
        Ok(())
    }

    /// Returns `true` if the file was already removed from disk
    #[must_use]
    pub fn is_unlinked(&self) -> bool {
        self.unlinked
    }

    /// Rewinds the file to the beginning
    #[inline]
    pub fn rewind(&mut self) -> Result<(), Error> {
        self.file.rewind().map_err(Error::from)
    }
}

impl Drop for InputFile {
    fn drop(&mut self) {
        if self.unlinked {
            return;
        }
        // try to remove the file, but ignore errors
        drop(remove_file(&self.path));
    }
}
