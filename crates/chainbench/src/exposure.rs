//! Exposure channels publish the payload to the routine under test.
//!
//! Exactly one channel is chosen per harness, when the harness is built.

use core::fmt::Debug;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use chainbench_bolts::{
    fs::{get_unique_std_input_file, write_file_atomic, InputFile},
    Error,
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::payload::Payload;

/// The default environment variable for [`EnvExposure`]
pub const DEFAULT_ENV_VAR: &str = "ADD";

/// The default side-channel file for [`FileExposure`]
pub const DEFAULT_INPUT_FILE: &str = "input.bin";

/// The ways a payload reaches the routine
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Channel {
    /// The payload is the routine's standard input
    #[default]
    Stdin,
    /// The payload is the value of an environment variable
    Env,
    /// The payload is written to a side-channel file
    File,
}

/// The input as seen by the routine, after exposure
#[derive(Debug)]
pub enum ExposedInput {
    /// The payload backs stdin
    Stdin {
        /// The file holding the payload, positioned at its start
        file: InputFile,
        /// Whether the process-wide stdin was redirected to `file`
        redirected: bool,
    },
    /// The payload was stored in an environment variable
    Env {
        /// The variable name
        var: String,
        /// The stored value
        value: Vec<u8>,
    },
    /// The payload was written to a file
    File {
        /// Path of the side-channel file
        path: PathBuf,
    },
    /// Nothing was exposed
    None,
}

impl ExposedInput {
    /// The bytes the routine will read from its standard input, if stdin is the channel
    pub fn stdin_bytes(&mut self) -> Result<Option<Vec<u8>>, Error> {
        match self {
            Self::Stdin { file, .. } => file.read_all().map(Some),
            _ => Ok(None),
        }
    }
}

/// A channel strategy
pub trait Exposure: Debug {
    /// The channel this exposure implements
    fn channel(&self) -> Channel;

    /// Publishes `payload`. `found` tells whether the payload source existed.
    fn expose(&mut self, payload: &Payload, found: bool) -> Result<ExposedInput, Error>;
}

/// Exposes the payload as the routine's stdin
#[derive(Debug, Clone)]
pub struct StdinExposure {
    dir: PathBuf,
    redirect: bool,
}

impl StdinExposure {
    /// Creates a new stdin exposure. With `redirect`, the process-wide stdin is replaced
    /// by the payload, otherwise the payload is only reachable through [`ExposedInput`].
    #[must_use]
    pub fn new(redirect: bool) -> Self {
        Self {
            dir: env::temp_dir(),
            redirect,
        }
    }

    /// Places the backing file in `dir` instead of the temp dir
    #[must_use]
    pub fn in_dir<P>(mut self, dir: P) -> Self
    where
        P: AsRef<Path>,
    {
        self.dir = dir.as_ref().to_path_buf();
        self
    }
}

impl Exposure for StdinExposure {
    fn channel(&self) -> Channel {
        Channel::Stdin
    }

    fn expose(&mut self, payload: &Payload, found: bool) -> Result<ExposedInput, Error> {
        if !found {
            return Err(Error::missing_payload(
                "the stdin channel requires a payload",
            ));
        }

        let mut file = InputFile::create(self.dir.join(get_unique_std_input_file()))?;
        file.write_buf(payload.as_slice())?;
        // an aborting routine never runs destructors, only the descriptor may outlive the run
        #[cfg(unix)]
        file.unlink()?;
        if self.redirect {
            redirect_stdin(&file)?;
        }
        log::debug!(
            "exposed {} payload bytes via stdin (redirected: {})",
            payload.len(),
            self.redirect
        );
        Ok(ExposedInput::Stdin {
            file,
            redirected: self.redirect,
        })
    }
}

#[cfg(unix)]
fn redirect_stdin(file: &InputFile) -> Result<(), Error> {
    nix::unistd::dup2(file.as_raw_fd(), libc::STDIN_FILENO)
        .map_err(|errno| Error::os_error(errno.into(), "redirecting stdin"))?;
    Ok(())
}

#[cfg(not(unix))]
fn redirect_stdin(_file: &InputFile) -> Result<(), Error> {
    Err(Error::unsupported("stdin redirection needs a unix system"))
}

/// Exposes the payload as an environment variable
#[derive(Debug, Clone)]
pub struct EnvExposure {
    var: String,
}

impl EnvExposure {
    /// Creates a new environment exposure for `var`
    pub fn new<S>(var: S) -> Result<Self, Error>
    where
        S: Into<String>,
    {
        let var = var.into();
        if var.is_empty() || var.contains('=') || var.contains('\0') {
            return Err(Error::illegal_argument(format!(
                "`{var}` is not a valid environment variable name"
            )));
        }
        Ok(Self { var })
    }

    /// The variable name
    #[must_use]
    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvExposure {
    fn default() -> Self {
        Self {
            var: DEFAULT_ENV_VAR.to_string(),
        }
    }
}

impl Exposure for EnvExposure {
    fn channel(&self) -> Channel {
        Channel::Env
    }

    fn expose(&mut self, payload: &Payload, found: bool) -> Result<ExposedInput, Error> {
        if !found {
            log::info!("no payload, exposing an empty ${}", self.var);
        }
        // the variable holds a C string, so everything after the first NUL is dropped
        let value = payload.c_str_bytes().to_vec();
        set_env_bytes(&self.var, &value)?;
        log::debug!("exposed {} payload bytes via ${}", value.len(), self.var);
        Ok(ExposedInput::Env {
            var: self.var.clone(),
            value,
        })
    }
}

#[cfg(unix)]
fn set_env_bytes(var: &str, value: &[u8]) -> Result<(), Error> {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    env::set_var(var, OsStr::from_bytes(value));
    Ok(())
}

#[cfg(not(unix))]
fn set_env_bytes(var: &str, value: &[u8]) -> Result<(), Error> {
    let value = core::str::from_utf8(value)
        .map_err(|_| Error::unsupported("non UTF-8 environment values need a unix system"))?;
    env::set_var(var, value);
    Ok(())
}

/// Exposes the payload as a side-channel file
#[derive(Debug, Clone)]
pub struct FileExposure {
    path: PathBuf,
}

impl FileExposure {
    /// Creates a new file exposure writing to `path`
    #[must_use]
    pub fn new<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The side-channel file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileExposure {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_FILE)
    }
}

impl Exposure for FileExposure {
    fn channel(&self) -> Channel {
        Channel::File
    }

    fn expose(&mut self, payload: &Payload, found: bool) -> Result<ExposedInput, Error> {
        if !found {
            log::info!("no payload, creating an empty {}", self.path.display());
        }
        // a stale tmp file from an interrupted run would block the atomic write
        if let Some(name) = self.path.file_name() {
            let tmp = self
                .path
                .with_file_name(format!(".{}.tmp", name.to_string_lossy()));
            drop(fs::remove_file(tmp));
        }
        write_file_atomic(&self.path, payload.as_slice())?;
        log::debug!(
            "exposed {} payload bytes via {}",
            payload.len(),
            self.path.display()
        );
        Ok(ExposedInput::File {
            path: self.path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use chainbench_bolts::Error;
    use serial_test::serial;

    use super::{Channel, EnvExposure, ExposedInput, Exposure, FileExposure, StdinExposure};
    use crate::payload::Payload;

    fn payload(bytes: &[u8]) -> Payload {
        let mut payload = Payload::new(64).unwrap();
        payload.set(bytes);
        payload
    }

    #[test]
    fn test_stdin_requires_payload() {
        let mut exposure = StdinExposure::new(false);
        let res = exposure.expose(&Payload::new(64).unwrap(), false);
        assert!(matches!(res, Err(Error::MissingPayload(..))));
    }

    #[test]
    #[serial]
    fn test_stdin_round_trip() {
        let mut exposure = StdinExposure::new(false);
        let mut input = exposure.expose(&payload(b"12\n\0tail"), true).unwrap();
        assert_eq!(
            input.stdin_bytes().unwrap().unwrap(),
            b"12\n\0tail".to_vec()
        );
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_stdin_leaves_no_file_behind() {
        let dir = env::temp_dir().join(format!("cb_stdin_dir_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut exposure = StdinExposure::new(false).in_dir(&dir);
        let mut input = exposure.expose(&payload(b"2000000000\n"), true).unwrap();
        // gone from disk while the run still reads it
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        assert_eq!(input.stdin_bytes().unwrap().unwrap(), b"2000000000\n");

        // a process that aborts never drops the input
        core::mem::forget(input);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        fs::remove_dir(&dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_stdin_redirect() {
        use std::{
            io::{self, Read},
            os::fd::AsRawFd,
        };

        let saved = nix::unistd::dup(libc::STDIN_FILENO).unwrap();

        let mut exposure = StdinExposure::new(true);
        let input = exposure.expose(&payload(b"21\n"), true).unwrap();
        assert!(matches!(input, ExposedInput::Stdin { redirected: true, .. }));

        let mut read = Vec::new();
        io::stdin().lock().read_to_end(&mut read).unwrap();

        nix::unistd::dup2(saved, io::stdin().as_raw_fd()).unwrap();
        nix::unistd::close(saved).unwrap();
        assert_eq!(read, b"21\n");
    }

    #[test]
    #[serial]
    fn test_env_round_trip() {
        let mut exposure = EnvExposure::new("CB_TEST_ENV_ROUND_TRIP").unwrap();
        assert_eq!(exposure.channel(), Channel::Env);
        exposure.expose(&payload(b"hello"), true).unwrap();
        assert_eq!(env::var("CB_TEST_ENV_ROUND_TRIP").unwrap(), "hello");

        // only the C string part is visible
        exposure.expose(&payload(b"ab\0cd"), true).unwrap();
        assert_eq!(env::var("CB_TEST_ENV_ROUND_TRIP").unwrap(), "ab");
        env::remove_var("CB_TEST_ENV_ROUND_TRIP");
    }

    #[test]
    #[serial]
    fn test_env_missing_payload_is_empty() {
        let mut exposure = EnvExposure::new("CB_TEST_ENV_EMPTY").unwrap();
        let input = exposure.expose(&Payload::new(64).unwrap(), false).unwrap();
        assert!(matches!(input, ExposedInput::Env { ref value, .. } if value.is_empty()));
        assert_eq!(env::var("CB_TEST_ENV_EMPTY").unwrap(), "");
        env::remove_var("CB_TEST_ENV_EMPTY");
    }

    #[test]
    fn test_env_name_validated() {
        assert!(EnvExposure::new("").is_err());
        assert!(EnvExposure::new("A=B").is_err());
        assert_eq!(EnvExposure::default().var(), "ADD");
    }

    #[test]
    fn test_file_round_trip() {
        let path = env::temp_dir().join(format!("cb_exposure_{}.bin", std::process::id()));
        let mut exposure = FileExposure::new(&path);
        exposure.expose(&payload(b"\x01\x00\x02"), true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"\x01\x00\x02");

        exposure.expose(&Payload::new(64).unwrap(), false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");
        fs::remove_file(&path).unwrap();
    }
}
