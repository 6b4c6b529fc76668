//! The [`CaseContext`] is everything a routine can reach during one run.

use core::fmt::{self, Debug};

use chainbench_bolts::Error;

use crate::{
    assertion::{Assignment, OnViolation, Property, Violation},
    exposure::ExposedInput,
    ledger::Ledger,
    symbolic::{BuildMode, Draw, Site, ValueSource},
};

/// Ties a routine to the ledger, the value source and the exposed input of a run
pub struct CaseContext<'a> {
    ledger: &'a mut Ledger,
    source: &'a mut dyn ValueSource,
    input: Option<&'a mut ExposedInput>,
    on_violation: OnViolation,
    checks: usize,
    violation: Option<Violation>,
    assignments: Vec<Assignment>,
}

impl Debug for CaseContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseContext")
            .field("ledger", &self.ledger.report())
            .field("source", &self.source)
            .field("on_violation", &self.on_violation)
            .field("checks", &self.checks)
            .field("violation", &self.violation)
            .field("assignments", &self.assignments)
            .finish_non_exhaustive()
    }
}

impl<'a> CaseContext<'a> {
    /// Creates a new context
    pub fn new(
        ledger: &'a mut Ledger,
        source: &'a mut dyn ValueSource,
        on_violation: OnViolation,
    ) -> Self {
        Self {
            ledger,
            source,
            input: None,
            on_violation,
            checks: 0,
            violation: None,
            assignments: Vec::new(),
        }
    }

    /// Makes `input` reachable from the routine
    #[must_use]
    pub fn with_input(mut self, input: &'a mut ExposedInput) -> Self {
        self.input = Some(input);
        self
    }

    /// The ledger of this run
    pub fn ledger(&mut self) -> &mut Ledger {
        self.ledger
    }

    /// The mode of the value source
    #[must_use]
    pub fn mode(&self) -> BuildMode {
        self.source.mode()
    }

    /// Gets the value of `site`.
    ///
    /// `concrete` is only called when the source replays the concrete value; it computes
    /// what the C routine would have used, a literal or a value read from its input.
    pub fn next_value<T, F>(&mut self, site: &Site, concrete: F) -> Result<T, Error>
    where
        T: TryFrom<i64>,
        F: FnOnce(&mut Self) -> Result<i64, Error>,
    {
        let (value, symbolic) = match self.source.draw(site)? {
            Draw::Concrete => (concrete(self)?, false),
            Draw::Symbolic(value) => (value, true),
        };
        log::debug!(
            "{} = {value} ({})",
            site.name,
            if symbolic { "symbolic" } else { "concrete" }
        );
        self.assignments.push(Assignment {
            name: site.name.to_string(),
            value,
            symbolic,
            bounds: self.source.bounds_of(site),
        });
        // a value the routine's type cannot hold puts the run on an infeasible path
        T::try_from(value).map_err(|_| {
            Error::infeasible(format!(
                "{} = {value} does not fit the routine's type",
                site.name
            ))
        })
    }

    /// Evaluates a safety property, see [`crate::safety_assert`].
    pub fn check(&mut self, holds: bool, property: Property) -> Result<(), Error> {
        self.checks += 1;
        if holds {
            log::trace!("{property} holds");
            return Ok(());
        }

        match self.on_violation {
            OnViolation::Abort => {
                log::error!("{property} violated");
                eprintln!("[CB] safety property violated: {property}");
                std::process::abort();
            }
            OnViolation::Report => {
                log::info!("{property} violated");
                self.violation = Some(Violation {
                    property,
                    assignments: self.assignments.clone(),
                });
                Err(Error::safety_violation(property.to_string()))
            }
        }
    }

    /// The bytes the routine reads from its standard input.
    ///
    /// Empty if the payload is not exposed via stdin.
    pub fn stdin_bytes(&mut self) -> Result<Vec<u8>, Error> {
        match self.input.as_deref_mut() {
            Some(input) => Ok(input.stdin_bytes()?.unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    /// Number of evaluated safety checks
    #[must_use]
    pub fn checks(&self) -> usize {
        self.checks
    }

    /// The values drawn so far
    #[must_use]
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// The reported violation, if any
    #[must_use]
    pub fn violation(&self) -> Option<&Violation> {
        self.violation.as_ref()
    }

    /// Takes the reported violation out of this context
    pub fn take_violation(&mut self) -> Option<Violation> {
        self.violation.take()
    }
}

#[cfg(test)]
mod tests {
    use chainbench_bolts::Error;

    use super::CaseContext;
    use crate::{
        assertion::OnViolation,
        ledger::Ledger,
        safety_assert,
        symbolic::{AssignedSource, Bounds, ConcreteSource, Site},
    };

    const LEN: Site = Site::new("len", Bounds::new_const(0, 10));

    fn routine(ctx: &mut CaseContext<'_>) -> Result<u8, Error> {
        let len: u8 = ctx.next_value(&LEN, |_| Ok(9))?;
        safety_assert!(ctx, len < 8);
        Ok(len)
    }

    #[test]
    fn test_concrete_value() {
        let mut ledger = Ledger::new(8).unwrap();
        let mut source = ConcreteSource;
        let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
        assert!(routine(&mut ctx).unwrap_err().is_safety_violation());

        let violation = ctx.violation().unwrap();
        assert_eq!(violation.property.expr, "len < 8");
        assert_eq!(violation.assignments[0].value, 9);
        assert!(!violation.assignments[0].symbolic);
    }

    #[test]
    fn test_symbolic_value() {
        let mut ledger = Ledger::new(8).unwrap();
        let mut source: AssignedSource = [("len", 3)].into_iter().collect();
        let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
        assert_eq!(routine(&mut ctx).unwrap(), 3);
        assert_eq!(ctx.checks(), 1);
        assert!(ctx.violation().is_none());
        assert!(ctx.assignments()[0].symbolic);
    }

    #[test]
    fn test_concrete_literal_agrees_with_symbolic() {
        // the concrete literal, replayed symbolically, must give the same verdict
        let mut ledger = Ledger::new(8).unwrap();
        let mut source: AssignedSource = [("len", 9)].into_iter().collect();
        let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
        assert!(routine(&mut ctx).unwrap_err().is_safety_violation());
    }

    #[test]
    fn test_value_must_fit() {
        let mut ledger = Ledger::new(8).unwrap();
        let mut source = ConcreteSource;
        let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
        let res: Result<u8, Error> = ctx.next_value(&LEN, |_| Ok(-1));
        assert!(matches!(res, Err(Error::Infeasible(..))));
    }

    #[test]
    fn test_no_input_reads_empty_stdin() {
        let mut ledger = Ledger::new(8).unwrap();
        let mut source = ConcreteSource;
        let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
        assert!(ctx.stdin_bytes().unwrap().is_empty());
    }
}
