//! The `chainbench` command line: runs one case standalone, explores it for
//! counterexamples, or benchmarks every registered case in child processes.

use std::{path::PathBuf, process};

use chainbench::{
    adapter::Variant,
    assertion::OnViolation,
    explore::{Explorer, ExplorerConfig},
    exposure::Channel,
    harness::{Harness, HarnessConfig, EXIT_MISSING_PAYLOAD, EXIT_USAGE},
    report::{write_chain_records, ChainRecord},
    symbolic::{parse_assignment, parse_bound_override, BuildMode, Bounds},
    Error,
};
use chainbench_bolts::{fs::write_file_atomic, SimpleStderrLogger};
use clap::{ArgAction, Args, Parser, Subcommand};
use hashbrown::HashMap;
use log::LevelFilter;

mod bench;

use bench::{BenchExecutor, BenchOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "chainbench",
    version,
    about = "Runs vulnerability cases and reports their memory effects",
    long_about = None
)]
struct Cli {
    /// More log output, repeat for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// A toml file with harness settings, overridden by the flags
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists the registered case ids
    List,
    /// Runs one variant of one case
    Single(SingleArgs),
    /// Searches the symbolic sites of a case for values violating its safety property
    Explore(ExploreArgs),
    /// Runs every variant of every case in a child process and classifies the outcomes
    Bench(BenchArgs),
}

/// Harness settings shared by `single` and `bench`
#[derive(Args, Debug, Default, Clone)]
struct HarnessArgs {
    /// How the payload reaches the case
    #[arg(long)]
    channel: Option<Channel>,
    /// Where site values come from
    #[arg(long)]
    mode: Option<BuildMode>,
    /// Abort on a violated property, or report it
    #[arg(long)]
    on_violation: Option<OnViolation>,
    /// The payload file
    #[arg(long)]
    payload: Option<PathBuf>,
    /// Capacity of the payload buffer in bytes
    #[arg(long)]
    capacity: Option<usize>,
    /// The variable used by the env channel
    #[arg(long)]
    env_var: Option<String>,
    /// The file written by the file channel
    #[arg(long)]
    input_file: Option<PathBuf>,
    /// Also redirect the process stdin to the stdin payload
    #[arg(long)]
    redirect_stdin: bool,
    /// Value of a symbolic site, as `name=value`
    #[arg(long = "assign", value_parser = parse_assignment)]
    assignments: Vec<(String, i64)>,
    /// Bounds of a symbolic site, as `name=lo..=hi`
    #[arg(long = "bound", value_parser = parse_bound_override)]
    bounds: Vec<(String, Bounds)>,
}

impl HarnessArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(on_violation) = self.on_violation {
            config.on_violation = on_violation;
        }
        if let Some(payload) = &self.payload {
            config.payload.path.clone_from(payload);
        }
        if let Some(capacity) = self.capacity {
            config.payload.capacity = capacity;
        }
        if let Some(env_var) = &self.env_var {
            config.env_var.clone_from(env_var);
        }
        if let Some(input_file) = &self.input_file {
            config.input_file.clone_from(input_file);
        }
        config.redirect_stdin |= self.redirect_stdin;
        for (name, value) in &self.assignments {
            config.assignments.insert(name.clone(), *value);
        }
        for (name, bounds) in &self.bounds {
            config.bounds.insert(name.clone(), *bounds);
        }
    }

    /// The flags, as passed to a child `single`
    fn forward(&self) -> Vec<String> {
        let mut args = vec![];
        if let Some(channel) = self.channel {
            args.extend(["--channel".to_string(), channel.to_string()]);
        }
        if let Some(mode) = self.mode {
            args.extend(["--mode".to_string(), mode.to_string()]);
        }
        if let Some(on_violation) = self.on_violation {
            args.extend(["--on-violation".to_string(), on_violation.to_string()]);
        }
        if let Some(payload) = &self.payload {
            args.extend(["--payload".to_string(), payload.display().to_string()]);
        }
        if let Some(capacity) = self.capacity {
            args.extend(["--capacity".to_string(), capacity.to_string()]);
        }
        if let Some(env_var) = &self.env_var {
            args.extend(["--env-var".to_string(), env_var.clone()]);
        }
        if let Some(input_file) = &self.input_file {
            args.extend(["--input-file".to_string(), input_file.display().to_string()]);
        }
        if self.redirect_stdin {
            args.push("--redirect-stdin".to_string());
        }
        for (name, value) in &self.assignments {
            args.extend(["--assign".to_string(), format!("{name}={value}")]);
        }
        for (name, bounds) in &self.bounds {
            args.extend(["--bound".to_string(), format!("{name}={bounds}")]);
        }
        args
    }
}

#[derive(Args, Debug)]
struct SingleArgs {
    /// The case id
    #[arg(long)]
    case: String,
    /// The variant to run
    #[arg(long, default_value_t = Variant::Bad)]
    variant: Variant,
    /// Print the run report as json
    #[arg(long)]
    json: bool,
    /// Write the ledger snapshot as json to this file
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Write the chain record of a reported violation to this file
    #[arg(long)]
    record: Option<PathBuf>,
    #[command(flatten)]
    harness: HarnessArgs,
}

#[derive(Args, Debug)]
struct ExploreArgs {
    /// The case id
    #[arg(long)]
    case: String,
    /// The variant to explore
    #[arg(long, default_value_t = Variant::Bad)]
    variant: Variant,
    /// Bounds of a symbolic site, as `name=lo..=hi`
    #[arg(long = "bound", value_parser = parse_bound_override)]
    bounds: Vec<(String, Bounds)>,
    /// Seed of the sampler, the current time if unset
    #[arg(long)]
    seed: Option<u64>,
    /// Random samples per large domain
    #[arg(long)]
    samples: Option<usize>,
    /// Domains up to this size are enumerated exhaustively
    #[arg(long)]
    max_exhaustive: Option<u64>,
    /// Stop after this many distinct counterexamples
    #[arg(long)]
    max_counterexamples: Option<usize>,
    /// Write the chain records to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BenchArgs {
    /// Print the results as json
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    harness: HarnessArgs,
}

fn level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, Error> {
    match &cli.config {
        Some(path) => HarnessConfig::from_file(path),
        None => Ok(HarnessConfig::default()),
    }
}

fn list() -> Result<i32, Error> {
    let registry = chainbench_cases::registry()?;
    for id in registry.ids() {
        println!("{id}");
    }
    Ok(0)
}

fn single(cli: &Cli, args: &SingleArgs) -> Result<i32, Error> {
    let mut config = load_config(cli)?;
    args.harness.apply(&mut config);
    if config.mode == BuildMode::Symbolic {
        // a symbolic run has to come back with the counterexample
        config.on_violation = OnViolation::Report;
    }

    let mut harness = Harness::new(config, chainbench_cases::registry()?)?;
    let report = harness.run(&args.case, args.variant)?;

    if let Some(path) = &args.snapshot {
        let json = serde_json::to_vec_pretty(&harness.ledger().snapshot())?;
        write_file_atomic(path, &json)?;
    }

    println!("{}", report.ledger);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let Some(violation) = &report.violation else {
        return Ok(0);
    };

    let desc = harness.registry().get(&args.case)?;
    let record = ChainRecord::new(desc, violation);
    if let Some(path) = &args.record {
        write_chain_records(path, core::slice::from_ref(&record))?;
    }

    if report.mode == BuildMode::Symbolic {
        if args.record.is_none() {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Ok(0)
    } else {
        eprintln!("[CB] safety property violated: {}", violation.property);
        Ok(EXIT_USAGE)
    }
}

fn explore(cli: &Cli, args: &ExploreArgs) -> Result<i32, Error> {
    let registry = chainbench_cases::registry()?;
    let desc = registry.get(&args.case)?;

    let mut bounds = HashMap::new();
    if let Some(path) = &cli.config {
        let config = HarnessConfig::from_file(path)?;
        bounds.extend(config.bounds);
    }
    bounds.extend(args.bounds.iter().cloned());

    let mut config = ExplorerConfig::builder().bounds(bounds).build();
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(samples) = args.samples {
        config.samples = samples;
    }
    if let Some(max_exhaustive) = args.max_exhaustive {
        config.max_exhaustive = max_exhaustive;
    }
    if let Some(max_counterexamples) = args.max_counterexamples {
        config.max_counterexamples = max_counterexamples;
    }

    let mut explorer = Explorer::new(config)?;
    let report = explorer.explore(desc, args.variant)?;
    let records: Vec<ChainRecord> = report
        .counterexamples
        .iter()
        .map(|ce| ce.record.clone())
        .collect();

    println!(
        "[CB] explore_done runs={} pruned={} counterexamples={}",
        report.runs,
        report.pruned,
        records.len()
    );
    match &args.out {
        Some(path) => write_chain_records(path, &records)?,
        None => println!("{}", serde_json::to_string_pretty(&records)?),
    }
    Ok(0)
}

fn bench(cli: &Cli, args: &BenchArgs) -> Result<i32, Error> {
    let registry = chainbench_cases::registry()?;

    let mut forwarded = args.harness.forward();
    if let Some(path) = &cli.config {
        forwarded.extend(["--config".to_string(), path.display().to_string()]);
    }
    let executor = BenchExecutor::new(forwarded, cli.verbose > 0)?;

    let mut results = vec![];
    for id in registry.ids() {
        let desc = registry.get(id)?;
        for variant in desc.variants() {
            let result = executor.run(id, variant)?;
            if !args.json {
                println!("[CB] bench {} {} {}", result.case, result.variant, result.outcome);
            }
            results.push(result);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        let crashes = results
            .iter()
            .filter(|result| matches!(result.outcome, BenchOutcome::Crash(_)))
            .count();
        let ok = results
            .iter()
            .filter(|result| result.outcome == BenchOutcome::Ok)
            .count();
        println!(
            "[CB] bench_done runs={} ok={ok} crashes={crashes} other={}",
            results.len(),
            results.len() - ok - crashes
        );
    }
    Ok(0)
}

fn run(cli: &Cli) -> Result<i32, Error> {
    match &cli.command {
        Command::List => list(),
        Command::Single(args) => single(cli, args),
        Command::Explore(args) => explore(cli, args),
        Command::Bench(args) => bench(cli, args),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = SimpleStderrLogger::set_logger(level(cli.verbose)) {
        eprintln!("[CB] WARN: {err}");
    }

    let code = match run(&cli) {
        Ok(code) => code,
        Err(Error::MissingPayload(..)) => {
            eprintln!("[CB] ERROR: STDIN mode requires payload.bin next to the app.");
            EXIT_MISSING_PAYLOAD
        }
        Err(err) => {
            eprintln!("[CB] ERROR: {err}");
            EXIT_USAGE
        }
    };
    process::exit(code);
}
