//! CWE-122 heap based buffer overflow: `memcpy` of 100 bytes into a 50 byte heap buffer.
//!
//! The destination capacity is tracked explicitly and may be replaced by a symbolic value.

use chainbench::{
    adapter::{CaseDescriptor, VulnKind},
    context::CaseContext,
    ledger::{Action, Segment},
    safety_assert,
    symbolic::{Bounds, Site},
    Error,
};

use crate::{alloc_buffer, print_line};

/// The case id
pub const ID: &str = "CWE122_Heap_Based_Buffer_Overflow__c_CWE805_char_memcpy_01";

/// The destination capacity, in bytes
pub const DEST_CAPACITY: Site = Site::new("dest_capacity", Bounds::new_const(1, 256));

/// Number of bytes the sink copies
const SOURCE_LEN: usize = 100;

/// The case descriptor
pub const CASE: CaseDescriptor = CaseDescriptor::new(
    ID,
    122,
    VulnKind::HeapOverflow,
    Segment::Heap,
    Action::Write,
    bad,
)
.with_good(good);

fn source() -> [u8; SOURCE_LEN] {
    let mut source = [b'C'; SOURCE_LEN];
    source[SOURCE_LEN - 1] = 0;
    source
}

fn copy_and_print(ctx: &mut CaseContext<'_>, data_capacity: usize) -> Result<(), Error> {
    let mut data = alloc_buffer(data_capacity, 0_u8);
    let source = source();

    safety_assert!(ctx, data_capacity >= SOURCE_LEN);
    data[..SOURCE_LEN].copy_from_slice(&source);
    data[SOURCE_LEN - 1] = 0;
    print_line(&data);
    Ok(())
}

/// Allocates too small a destination, then copies the full source into it
pub fn bad(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
    let mut data_capacity = 50;
    let maybe_cap: i64 = ctx.next_value(&DEST_CAPACITY, |_| Ok(50))?;
    // keep the allocation sane
    if maybe_cap > 0 && maybe_cap < 1 << 20 {
        data_capacity = usize::try_from(maybe_cap)?;
    }
    copy_and_print(ctx, data_capacity)
}

/// Allocates a destination large enough for the source
pub fn good(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
    copy_and_print(ctx, SOURCE_LEN)
}

#[cfg(test)]
mod tests {
    use chainbench::{
        adapter::{CaseAdapter, Variant},
        assertion::OnViolation,
        context::CaseContext,
        explore::{Explorer, ExplorerConfig},
        ledger::Ledger,
        symbolic::{AssignedSource, ConcreteSource},
    };

    use super::CASE;

    #[test]
    fn test_concrete_bad_violates() {
        let mut ledger = Ledger::new(16).unwrap();
        let mut source = ConcreteSource;
        let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
        let err = CaseAdapter::run(&CASE, Variant::Bad, &mut ctx).unwrap_err();
        assert!(err.is_safety_violation());
        let violation = ctx.take_violation().unwrap();
        assert_eq!(violation.property.expr, "data_capacity >= SOURCE_LEN");
        assert_eq!(violation.assignments[0].value, 50);
    }

    #[test]
    fn test_good_is_clean() {
        let mut ledger = Ledger::new(16).unwrap();
        let mut source = ConcreteSource;
        let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
        CaseAdapter::run(&CASE, Variant::Good, &mut ctx).unwrap();
        assert_eq!(ctx.checks(), 1);
    }

    #[test]
    fn test_symbolic_capacity() {
        for (cap, violates) in [(50, true), (99, true), (100, false), (256, false)] {
            let mut ledger = Ledger::new(16).unwrap();
            let mut source: AssignedSource = [("dest_capacity", cap)].into_iter().collect();
            let mut ctx = CaseContext::new(&mut ledger, &mut source, OnViolation::Report);
            let res = CaseAdapter::run(&CASE, Variant::Bad, &mut ctx);
            assert_eq!(res.is_err(), violates, "dest_capacity = {cap}");
        }
    }

    #[test]
    fn test_explorer_finds_small_capacity() {
        let mut explorer = Explorer::new(ExplorerConfig::builder().seed(0).build()).unwrap();
        let report = explorer.explore(&CASE, Variant::Bad).unwrap();
        let ce = &report.counterexamples[0];
        assert!(ce.violation.assignments[0].value < 100);
        assert_eq!(ce.record.cwe, 122);
    }
}
