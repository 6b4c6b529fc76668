//! The attacker-controlled payload, held in a buffer of fixed capacity.
//!
//! At most `capacity - 1` bytes are kept, the last byte is reserved for the terminator
//! so the buffer can always be handed out as a C string.

use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

use chainbench_bolts::Error;

/// The default capacity of the payload buffer, terminator included
pub const DEFAULT_PAYLOAD_CAPACITY: usize = 4096;

/// The default payload file, looked up next to the harness
pub const PAYLOAD_FILE_STD: &str = "payload.bin";

/// A fixed capacity payload buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    buf: Box<[u8]>,
    len: usize,
    truncated: bool,
}

impl Payload {
    /// Creates a zeroed payload buffer of `capacity` bytes, terminator included.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::illegal_argument(
                "payload capacity must leave room for the terminator",
            ));
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).map_err(|err| {
            Error::illegal_argument(format!("payload capacity {capacity} is not allocatable: {err}"))
        })?;
        buf.resize(capacity, 0);
        Ok(Self {
            buf: buf.into_boxed_slice(),
            len: 0,
            truncated: false,
        })
    }

    /// The fixed capacity, terminator included
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The maximum number of payload bytes this buffer keeps
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.buf.len() - 1
    }

    /// Number of payload bytes currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no payload bytes are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the last load dropped bytes beyond [`Payload::max_len`]
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The payload bytes
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The payload seen as a C string: everything up to the first NUL byte
    #[must_use]
    pub fn c_str_bytes(&self) -> &[u8] {
        let bytes = self.as_slice();
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        &bytes[..end]
    }

    /// Zeroes the whole buffer
    pub fn zero(&mut self) {
        self.buf.fill(0);
        self.len = 0;
        self.truncated = false;
    }

    /// Replaces the payload with the bytes produced by `reader`, truncating to [`Payload::max_len`].
    pub fn load_from<R>(&mut self, mut reader: R) -> Result<(), Error>
    where
        R: Read,
    {
        self.zero();
        let max_len = self.max_len();

        let mut filled = 0;
        while filled < max_len {
            match reader.read(&mut self.buf[filled..max_len]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(Error::os_error(err, "reading payload")),
            }
        }
        self.len = filled;

        if filled == max_len {
            let mut probe = [0_u8; 1];
            self.truncated = loop {
                match reader.read(&mut probe) {
                    Ok(n) => break n > 0,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => return Err(Error::os_error(err, "reading payload")),
                }
            };
        }
        Ok(())
    }

    /// Replaces the payload with `bytes`, truncating to [`Payload::max_len`].
    pub fn set(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(self.max_len());
        self.zero();
        self.buf[..len].copy_from_slice(&bytes[..len]);
        self.len = len;
        self.truncated = bytes.len() > len;
    }

    /// Loads the payload from the file at `path`.
    ///
    /// Returns `Ok(false)` and leaves the buffer zeroed if the file does not exist.
    pub fn load_file<P>(&mut self, path: P) -> Result<bool, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.zero();
                log::debug!("no payload at {}", path.display());
                return Ok(false);
            }
            Err(err) => {
                self.zero();
                return Err(Error::os_error(
                    err,
                    format!("opening payload {}", path.display()),
                ));
            }
        };

        self.load_from(file)?;
        if self.truncated {
            log::warn!(
                "payload {} exceeds the buffer, kept the first {} bytes",
                path.display(),
                self.len
            );
        }
        Ok(true)
    }
}
