//! A bounded explorer standing in for the symbolic backend.
//!
//! The explorer re-executes a case, each time with the next candidate value of every
//! symbolic site. Small domains are enumerated exhaustively, large ones are covered with
//! boundary values plus seeded random samples. Candidate lists of different sites are
//! advanced together (zipped), not as a cartesian product.

use chainbench_bolts::{
    current_nanos,
    rands::{Rand, StdRand},
    Error,
};
use hashbrown::{HashMap, HashSet};
use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::{
    adapter::{CaseAdapter, CaseDescriptor, Variant},
    assertion::{OnViolation, Violation},
    context::CaseContext,
    ledger::Ledger,
    payload::DEFAULT_PAYLOAD_CAPACITY,
    report::ChainRecord,
    symbolic::{BuildMode, Bounds, Draw, Site, ValueSource},
};

/// Settings of an [`Explorer`]
#[derive(Debug, Clone, TypedBuilder)]
pub struct ExplorerConfig {
    /// Domains with at most this many values are enumerated exhaustively
    #[builder(default = 4096)]
    pub max_exhaustive: u64,
    /// Number of random samples added to the boundary values of large domains
    #[builder(default = 256)]
    pub samples: usize,
    /// Seed of the sampler
    #[builder(default = current_nanos())]
    pub seed: u64,
    /// Stop after this many distinct counterexamples
    #[builder(default = 1)]
    pub max_counterexamples: usize,
    /// Upper limit on executions
    #[builder(default = 1 << 20)]
    pub max_runs: usize,
    /// Site bounds replacing the documented ones
    #[builder(default)]
    pub bounds: HashMap<String, Bounds>,
    /// Capacity of the payload buffer of the explorer's ledger
    #[builder(default = DEFAULT_PAYLOAD_CAPACITY)]
    pub payload_capacity: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Candidate values of a large domain: its edges, values around zero and around powers of
/// two, the midpoint, then random samples. Everything outside `bounds` is dropped.
fn boundary_candidates(bounds: Bounds, samples: usize, rand: &mut StdRand) -> Vec<i64> {
    let (lo, hi) = (bounds.lo(), bounds.hi());
    let mid = ((i128::from(lo) + i128::from(hi)) / 2) as i64;

    let mut values = vec![
        lo,
        lo.saturating_add(1),
        hi.saturating_sub(1),
        hi,
        0,
        1,
        -1,
        mid,
    ];
    for k in 1..63 {
        let p = 1_i64 << k;
        values.extend([p - 1, p, p + 1, -(p - 1), -p, -(p + 1)]);
    }
    values.extend((0..samples).map(|_| rand.between_i64(lo, hi)));

    let mut seen = HashSet::new();
    values.retain(|v| bounds.contains(*v) && seen.insert(*v));
    values
}

/// A [`ValueSource`] handing out the candidates of the current round
#[derive(Debug)]
pub struct ExploringSource {
    max_exhaustive: u64,
    samples: usize,
    rand: StdRand,
    overrides: HashMap<String, Bounds>,
    sites: HashMap<&'static str, Vec<i64>>,
    round: usize,
}

impl ExploringSource {
    /// Creates a new source for the given settings
    #[must_use]
    pub fn new(config: &ExplorerConfig) -> Self {
        Self {
            max_exhaustive: config.max_exhaustive,
            samples: config.samples,
            rand: StdRand::with_seed(config.seed),
            overrides: config.bounds.clone(),
            sites: HashMap::new(),
            round: 0,
        }
    }

    /// Moves on to the candidates of `round`
    pub fn set_round(&mut self, round: usize) {
        self.round = round;
    }

    /// Returns `true` once `runs` executions covered every candidate of every known site
    #[must_use]
    pub fn is_exhausted(&self, runs: usize) -> bool {
        let longest = self
            .sites
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        runs >= longest
    }

    fn candidates(&mut self, site: &Site) -> &[i64] {
        let Self {
            max_exhaustive,
            samples,
            rand,
            overrides,
            sites,
            ..
        } = self;
        sites.entry(site.name).or_insert_with(|| {
            let bounds = overrides.get(site.name).copied().unwrap_or(site.bounds);
            let values = if bounds.span() <= i128::from(*max_exhaustive) {
                (bounds.lo()..=bounds.hi()).collect()
            } else {
                boundary_candidates(bounds, *samples, rand)
            };
            log::debug!("{}: {} candidates in {bounds}", site.name, values.len());
            values
        })
    }
}

impl ValueSource for ExploringSource {
    fn mode(&self) -> BuildMode {
        BuildMode::Symbolic
    }

    fn draw(&mut self, site: &Site) -> Result<Draw, Error> {
        let round = self.round;
        let candidates = self.candidates(site);
        // shorter lists wrap around while longer ones are still being covered
        let value = candidates
            .get(round % candidates.len().max(1))
            .copied()
            .ok_or_else(|| Error::illegal_state(format!("no candidates for {}", site.name)))?;
        Ok(Draw::Symbolic(value))
    }

    fn bounds_of(&self, site: &Site) -> Bounds {
        self.overrides.get(site.name).copied().unwrap_or(site.bounds)
    }
}

/// An assignment violating a safety property
#[derive(Debug, Clone, Serialize)]
pub struct Counterexample {
    /// The violation, with all site values
    pub violation: Violation,
    /// The chain record of the violation
    pub record: ChainRecord,
}

/// What an exploration found
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExplorationReport {
    /// Number of executions
    pub runs: usize,
    /// Number of executions cut short as infeasible
    pub pruned: usize,
    /// Distinct counterexamples, at most one per assertion location
    pub counterexamples: Vec<Counterexample>,
}

/// Explores cases with an [`ExploringSource`]
#[derive(Debug)]
pub struct Explorer {
    config: ExplorerConfig,
    ledger: Ledger,
}

impl Explorer {
    /// Creates a new explorer
    pub fn new(config: ExplorerConfig) -> Result<Self, Error> {
        let ledger = Ledger::new(config.payload_capacity)?;
        Ok(Self { config, ledger })
    }

    /// The settings of this explorer
    #[must_use]
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Explores `variant` of `desc` until enough counterexamples are found, all candidates
    /// are covered, or the run limit is hit.
    pub fn explore(
        &mut self,
        desc: &CaseDescriptor,
        variant: Variant,
    ) -> Result<ExplorationReport, Error> {
        desc.routine(variant)?;
        log::info!(
            "exploring {} ({variant}) with seed {}",
            desc.id,
            self.config.seed
        );

        let mut source = ExploringSource::new(&self.config);
        let mut report = ExplorationReport::default();
        let mut locations = HashSet::new();

        while report.runs < self.config.max_runs {
            source.set_round(report.runs);
            self.ledger.reset();

            let mut ctx = CaseContext::new(&mut self.ledger, &mut source, OnViolation::Report);
            let res = CaseAdapter::run(desc, variant, &mut ctx);
            let violation = ctx.take_violation();
            report.runs += 1;

            match res {
                Ok(()) => {}
                Err(Error::Infeasible(msg, _)) => {
                    log::trace!("pruned: {msg}");
                    report.pruned += 1;
                }
                Err(err) if err.is_safety_violation() => {
                    let violation = violation.ok_or_else(|| {
                        Error::illegal_state("safety violation without a recorded property")
                    })?;
                    if locations.insert(violation.property.location()) {
                        log::info!(
                            "counterexample after {} runs: {}",
                            report.runs,
                            violation.property
                        );
                        let record = ChainRecord::new(desc, &violation);
                        report.counterexamples.push(Counterexample { violation, record });
                    }
                }
                Err(err) => return Err(err),
            }

            if report.counterexamples.len() >= self.config.max_counterexamples
                || source.is_exhausted(report.runs)
            {
                break;
            }
        }

        log::info!(
            "explored {}: runs={} pruned={} counterexamples={}",
            desc.id,
            report.runs,
            report.pruned,
            report.counterexamples.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chainbench_bolts::{rands::StdRand, Error};

    use super::{boundary_candidates, Explorer, ExplorerConfig};
    use crate::{
        adapter::{CaseDescriptor, Variant, VulnKind},
        context::CaseContext,
        ledger::{Action, Segment},
        safety_assert,
        symbolic::{Bounds, Site},
    };

    const LEN: Site = Site::new("len", Bounds::new_const(0, 120));
    const WIDE: Site = Site::new("wide", Bounds::new_const(i32::MIN as i64, i32::MAX as i64));

    fn bad(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        let len: usize = ctx.next_value(&LEN, |_| Ok(100))?;
        safety_assert!(ctx, len <= 50);
        Ok(())
    }

    fn good(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        let len: usize = ctx.next_value(&LEN, |_| Ok(100))?;
        if len > 50 {
            return Ok(());
        }
        safety_assert!(ctx, len <= 50);
        Ok(())
    }

    fn wide(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        let data: i32 = ctx.next_value(&WIDE, |_| Ok(0))?;
        if data > 0 {
            safety_assert!(ctx, data <= i32::MAX / 2);
        }
        Ok(())
    }

    fn narrow(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
        let len: u8 = ctx.next_value(&LEN, |_| Ok(0))?;
        safety_assert!(ctx, len < 200);
        Ok(())
    }

    fn case(bad: fn(&mut CaseContext<'_>) -> Result<(), Error>) -> CaseDescriptor {
        CaseDescriptor::new("explore_test", 122, VulnKind::HeapOverflow, Segment::Heap, Action::Write, bad)
            .with_good(good)
    }

    #[test]
    fn test_finds_smallest_overflow() {
        let mut explorer = Explorer::new(ExplorerConfig::builder().seed(0).build()).unwrap();
        let report = explorer.explore(&case(bad), Variant::Bad).unwrap();
        assert_eq!(report.counterexamples.len(), 1);
        let ce = &report.counterexamples[0];
        assert_eq!(ce.violation.assignments[0].value, 51);
        assert_eq!(report.runs, 52);
        assert_eq!(ce.record.postcondition, "!(len <= 50)");
        assert_eq!(ce.record.assumptions, vec!["len >= 0", "len <= 120"]);
    }

    #[test]
    fn test_good_variant_is_clean() {
        let mut explorer = Explorer::new(ExplorerConfig::builder().seed(0).build()).unwrap();
        let report = explorer.explore(&case(bad), Variant::Good).unwrap();
        assert!(report.counterexamples.is_empty());
        assert_eq!(report.runs, 121);
    }

    #[test]
    fn test_large_domain_uses_boundaries() {
        let mut explorer = Explorer::new(ExplorerConfig::builder().seed(7).build()).unwrap();
        let report = explorer.explore(&case(wide), Variant::Bad).unwrap();
        assert_eq!(report.counterexamples.len(), 1);
        let value = report.counterexamples[0].violation.assignments[0].value;
        assert!(value > i64::from(i32::MAX / 2));
    }

    #[test]
    fn test_unrepresentable_values_are_pruned() {
        let config = ExplorerConfig::builder()
            .seed(0)
            .bounds([("len".to_string(), Bounds::new(-10, 10).unwrap())].into_iter().collect())
            .build();
        let mut explorer = Explorer::new(config).unwrap();
        let report = explorer.explore(&case(narrow), Variant::Bad).unwrap();
        assert_eq!(report.runs, 21);
        assert_eq!(report.pruned, 10);
        assert!(report.counterexamples.is_empty());
    }

    #[test]
    fn test_boundary_candidates_stay_in_bounds() {
        let bounds = Bounds::new(-1000, 1_000_000).unwrap();
        let mut rand = StdRand::with_seed(1);
        let values = boundary_candidates(bounds, 64, &mut rand);
        assert!(values.iter().all(|v| bounds.contains(*v)));
        assert_eq!(&values[..4], &[-1000, -999, 999_999, 1_000_000]);
        assert!(values.contains(&1024) && values.contains(&-1023));
        let mut dedup = values.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), values.len());
    }
}
