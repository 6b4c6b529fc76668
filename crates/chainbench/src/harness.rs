//! The [`Harness`] runs one case per call: it resets the ledger, loads and exposes the
//! payload, picks the value source and hands everything to the [`CaseAdapter`].

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chainbench_bolts::Error;
use serde::{Deserialize, Serialize};

use crate::{
    adapter::{CaseAdapter, Variant},
    assertion::OnViolation,
    context::CaseContext,
    exposure::{
        Channel, EnvExposure, Exposure, FileExposure, StdinExposure, DEFAULT_ENV_VAR,
        DEFAULT_INPUT_FILE,
    },
    ledger::Ledger,
    payload::{DEFAULT_PAYLOAD_CAPACITY, PAYLOAD_FILE_STD},
    registry::CaseRegistry,
    report::RunReport,
    symbolic::{AssignedSource, BuildMode, Bounds, ConcreteSource, ValueSource},
};

/// Exit status of a harness usage error
pub const EXIT_USAGE: i32 = 1;

/// Exit status when the stdin channel finds no payload
pub const EXIT_MISSING_PAYLOAD: i32 = 2;

/// Where the payload comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// The payload file
    pub path: PathBuf,
    /// Capacity of the payload buffer, terminator included
    pub capacity: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(PAYLOAD_FILE_STD),
            capacity: DEFAULT_PAYLOAD_CAPACITY,
        }
    }
}

/// The configuration of a [`Harness`], fixed for its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// The exposure channel
    pub channel: Channel,
    /// Concrete replay or symbolic values
    pub mode: BuildMode,
    /// What a failed safety check does
    pub on_violation: OnViolation,
    /// The payload source
    pub payload: PayloadConfig,
    /// The variable used by the env channel
    pub env_var: String,
    /// The side-channel file used by the file channel
    pub input_file: PathBuf,
    /// Whether the stdin channel replaces the process-wide stdin
    pub redirect_stdin: bool,
    /// Site values used in symbolic mode
    pub assignments: BTreeMap<String, i64>,
    /// Site bounds replacing the documented ones in symbolic mode
    pub bounds: BTreeMap<String, Bounds>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            channel: Channel::default(),
            mode: BuildMode::default(),
            on_violation: OnViolation::default(),
            payload: PayloadConfig::default(),
            env_var: DEFAULT_ENV_VAR.to_string(),
            input_file: PathBuf::from(DEFAULT_INPUT_FILE),
            redirect_stdin: false,
            assignments: BTreeMap::new(),
            bounds: BTreeMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Loads a config from a toml file. Missing keys keep their defaults.
    pub fn from_file<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| Error::os_error(err, format!("reading config {}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Parses a config from toml
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Builds the exposure strategy for the configured channel
    pub fn exposure(&self) -> Result<Box<dyn Exposure>, Error> {
        Ok(match self.channel {
            Channel::Stdin => Box::new(StdinExposure::new(self.redirect_stdin)),
            Channel::Env => Box::new(EnvExposure::new(self.env_var.clone())?),
            Channel::File => Box::new(FileExposure::new(&self.input_file)),
        })
    }

    /// Builds the value source for the configured mode
    #[must_use]
    pub fn value_source(&self) -> Box<dyn ValueSource> {
        match self.mode {
            BuildMode::Concrete => Box::new(ConcreteSource),
            BuildMode::Symbolic => {
                let mut source: AssignedSource = self
                    .assignments
                    .iter()
                    .map(|(name, value)| (name.clone(), *value))
                    .collect();
                for (name, bounds) in &self.bounds {
                    source.bound(name.clone(), *bounds);
                }
                Box::new(source)
            }
        }
    }
}

/// Runs cases of a [`CaseRegistry`] under one [`HarnessConfig`]
#[derive(Debug)]
pub struct Harness {
    config: HarnessConfig,
    registry: CaseRegistry,
    ledger: Ledger,
    exposure: Box<dyn Exposure>,
}

impl Harness {
    /// Creates a new harness. The channel is fixed from here on.
    pub fn new(config: HarnessConfig, registry: CaseRegistry) -> Result<Self, Error> {
        let ledger = Ledger::new(config.payload.capacity)?;
        let exposure = config.exposure()?;
        log::debug!(
            "harness: channel={} mode={} on_violation={}",
            config.channel,
            config.mode,
            config.on_violation
        );
        Ok(Self {
            config,
            registry,
            ledger,
            exposure,
        })
    }

    /// The configuration of this harness
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The registered cases
    #[must_use]
    pub fn registry(&self) -> &CaseRegistry {
        &self.registry
    }

    /// The ledger of the last run
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Runs `variant` of the case `case_id`.
    ///
    /// A violation only comes back in the report under [`OnViolation::Report`], under
    /// [`OnViolation::Abort`] the process is gone before this returns.
    pub fn run(&mut self, case_id: &str, variant: Variant) -> Result<RunReport, Error> {
        let desc = *self.registry.get(case_id)?;
        // unknown variants are usage errors, reported before anything is touched
        desc.routine(variant)?;

        self.ledger.reset();
        let payload_found = self.ledger.load_payload(&self.config.payload.path)?;
        let mut input = self.exposure.expose(self.ledger.payload(), payload_found)?;

        let mut source = self.config.value_source();
        let mut ctx = CaseContext::new(&mut self.ledger, &mut *source, self.config.on_violation)
            .with_input(&mut input);
        let res = CaseAdapter::run(&desc, variant, &mut ctx);
        let violation = ctx.take_violation();

        match res {
            Ok(()) => {}
            Err(err) if err.is_safety_violation() && violation.is_some() => {}
            Err(err) => return Err(err),
        }

        let report = RunReport {
            case: desc.id.to_string(),
            variant,
            channel: self.exposure.channel(),
            mode: self.config.mode,
            payload_found,
            ledger: self.ledger.report(),
            violation,
        };
        log::info!("{} ({variant}): {}", desc.id, report.ledger);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs, path::PathBuf};

    use chainbench_bolts::Error;
    use serial_test::serial;

    use super::{Harness, HarnessConfig};
    use crate::{
        adapter::{CaseDescriptor, Variant, VulnKind},
        assertion::OnViolation,
        context::CaseContext,
        exposure::Channel,
        ledger::{Action, Segment},
        registry::CaseRegistry,
        safety_assert,
        symbolic::{BuildMode, Bounds, Site},
    };

    const LEN: Site = Site::new("len", Bounds::new_const(0, 64));

    fn read_len(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        let len: usize = ctx.next_value(&LEN, |ctx| Ok(ctx.stdin_bytes()?.len() as i64))?;
        safety_assert!(ctx, len <= 4);
        Ok(())
    }

    fn fixed(_ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn registry() -> CaseRegistry {
        let mut registry = CaseRegistry::new();
        registry
            .register(
                CaseDescriptor::new(
                    "read_len",
                    122,
                    VulnKind::HeapOverflow,
                    Segment::Heap,
                    Action::Write,
                    read_len,
                )
                .with_good(fixed),
            )
            .unwrap();
        registry
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("cb_harness_{name}_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(dir: &PathBuf, channel: Channel) -> HarnessConfig {
        let mut config = HarnessConfig {
            channel,
            on_violation: OnViolation::Report,
            ..HarnessConfig::default()
        };
        config.payload.path = dir.join("payload.bin");
        config.input_file = dir.join("input.bin");
        config
    }

    #[test]
    fn test_stdin_without_payload_fails() {
        let dir = scratch("stdin_missing");
        let mut harness = Harness::new(config(&dir, Channel::Stdin), registry()).unwrap();
        let res = harness.run("read_len", Variant::Bad);
        assert!(matches!(res, Err(Error::MissingPayload(..))));
        // the adapter never ran
        assert!(harness.ledger().regions().is_empty());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_stdin_payload_reaches_routine() {
        let dir = scratch("stdin_payload");
        fs::write(dir.join("payload.bin"), b"123456").unwrap();
        let mut harness = Harness::new(config(&dir, Channel::Stdin), registry()).unwrap();

        let report = harness.run("read_len", Variant::Bad).unwrap();
        let violation = report.violation.unwrap();
        assert_eq!(violation.assignments[0].value, 6);
        assert_eq!(report.ledger.payload_len, 6);
        assert_eq!(report.ledger.regions, 1);
        assert_eq!(report.ledger.effects, 1);

        let report = harness.run("read_len", Variant::Good).unwrap();
        assert!(report.is_clean());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_env_without_payload_is_tolerated() {
        let dir = scratch("env_missing");
        let mut config = config(&dir, Channel::Env);
        config.env_var = "CB_HARNESS_TEST_ENV".to_string();
        let mut harness = Harness::new(config, registry()).unwrap();

        let report = harness.run("read_len", Variant::Bad).unwrap();
        assert!(report.is_clean());
        assert!(!report.payload_found);
        assert_eq!(report.ledger.payload_len, 0);
        assert_eq!(env::var("CB_HARNESS_TEST_ENV").unwrap(), "");
        env::remove_var("CB_HARNESS_TEST_ENV");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_file_channel_writes_side_file() {
        let dir = scratch("file");
        fs::write(dir.join("payload.bin"), b"abc").unwrap();
        let mut harness = Harness::new(config(&dir, Channel::File), registry()).unwrap();
        harness.run("read_len", Variant::Good).unwrap();
        assert_eq!(fs::read(dir.join("input.bin")).unwrap(), b"abc");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_symbolic_assignment() {
        let dir = scratch("symbolic");
        let mut config = config(&dir, Channel::File);
        config.mode = BuildMode::Symbolic;
        config.assignments.insert("len".to_string(), 5);
        let mut harness = Harness::new(config.clone(), registry()).unwrap();
        let report = harness.run("read_len", Variant::Bad).unwrap();
        assert!(report.violation.unwrap().assignments[0].symbolic);

        config.assignments.insert("len".to_string(), 65);
        let mut harness = Harness::new(config, registry()).unwrap();
        assert!(matches!(
            harness.run("read_len", Variant::Bad),
            Err(Error::Infeasible(..))
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_unknown_case() {
        let mut harness = Harness::new(HarnessConfig::default(), registry()).unwrap();
        assert!(matches!(
            harness.run("nope", Variant::Bad),
            Err(Error::KeyNotFound(..))
        ));
    }

    #[test]
    fn test_config_from_toml() {
        let config = HarnessConfig::from_toml(
            r#"
            channel = "env"
            mode = "symbolic"
            env_var = "INPUT"

            [payload]
            capacity = 64

            [assignments]
            copy_len = 51

            [bounds]
            copy_len = "0..=200"
            "#,
        )
        .unwrap();
        assert_eq!(config.channel, Channel::Env);
        assert_eq!(config.mode, BuildMode::Symbolic);
        assert_eq!(config.on_violation, OnViolation::Abort);
        assert_eq!(config.payload.capacity, 64);
        assert_eq!(config.payload.path, PathBuf::from("payload.bin"));
        assert_eq!(config.assignments["copy_len"], 51);
        assert_eq!(config.bounds["copy_len"].hi(), 200);

        assert!(HarnessConfig::from_toml("channel = \"pipe\"").is_err());
    }
}
