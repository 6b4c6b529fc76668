//! CWE-122 heap based buffer overflow: `memmove` of wide chars into a 50 wide char heap buffer.

use chainbench::{
    adapter::{CaseDescriptor, VulnKind},
    context::CaseContext,
    ledger::{Action, Segment},
    safety_assert,
    symbolic::{Bounds, Site},
    Error,
};

use crate::{alloc_buffer, print_wide_line};

/// The case id
pub const ID: &str = "CWE122_Heap_Based_Buffer_Overflow__c_CWE805_wchar_t_memmove_01";

/// Number of wide chars moved by the sink
pub const COPY_LEN: Site = Site::new("copy_len", Bounds::new_const(0, 120));

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

/// A wide char, as `wchar_t` on unix
type WChar = u32;

fn source() -> [WChar; SOURCE_LEN] {
    let mut source = [WChar::from('C'); SOURCE_LEN];
    source[SOURCE_LEN - 1] = 0;
    source
}

/// Allocates 50 wide chars, then moves `copy_len` (100) wide chars into them
pub fn bad(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
    let alloc_wchars: usize = 50;
    let mut data = alloc_buffer(alloc_wchars, WChar::default());
    let source = source();

    let copy_len: usize = ctx.next_value(&COPY_LEN, |_| Ok(100))?;

    safety_assert!(ctx, copy_len <= alloc_wchars);
    data[..copy_len].copy_from_slice(&source[..copy_len]);
    data[alloc_wchars - 1] = 0;
    print_wide_line(&data);
    Ok(())
}

/// Allocates room for the whole source and never moves more than the buffer holds
pub fn good(ctx: &mut CaseContext<'_>) -> Result<(), Error> {
    let alloc_wchars: usize = SOURCE_LEN;
    let mut data = alloc_buffer(alloc_wchars, WChar::default());
    let source = source();

    let copy_len: usize = ctx.next_value(&COPY_LEN, |_| Ok(100))?;
    let copy_len = copy_len.min(alloc_wchars);

    safety_assert!(ctx, copy_len <= alloc_wchars);
    data[..copy_len].copy_from_slice(&source[..copy_len]);
    data[alloc_wchars - 1] = 0;
    print_wide_line(&data);
    Ok(())
}
