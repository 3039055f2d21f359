//! Named cells of the register file (spec.md §3 "Register file").
//!
//! The register file overlaps unswitched erasable bank 0 — there is no
//! separate register struct, just named addresses into the bank-0 word
//! array, mirroring the way the teacher exposes `cpu_memory_map::RAM`/
//! `Cartridge` as named `Range` constants rather than a parsed struct.
//!
//! The exact octal addresses below are an internal convention (the filtered
//! reference source did not carry the historical yaAGC register-address
//! table); see `DESIGN.md` "Open-question decisions". What matters for
//! spec fidelity is that each name resolves to a stable bank-0 cell, that
//! `NEWJOB` (067) is left free for ordinary program use, and that the
//! editing registers apply their transform on write (see `mem::map`).

/// Accumulator. Kept 16-bit sign-extended at all times.
pub const REG_A: u16 = 0o00;
/// Lower word of double-precision results. Kept 16-bit sign-extended.
pub const REG_L: u16 = 0o01;
/// Return-address register, used by TC/return sequences.
pub const REG_Q: u16 = 0o02;
/// Erasable bank select.
pub const REG_EB: u16 = 0o03;
/// Fixed bank select.
pub const REG_FB: u16 = 0o04;
/// Program counter. Only the low 12 bits are addressed; the full word is kept.
pub const REG_Z: u16 = 0o05;
/// Combined bank select, mirrors EB+FB.
pub const REG_BB: u16 = 0o06;
/// Always reads as +0; writes are discarded.
pub const REG_ZERO: u16 = 0o07;

/// Cyclic-right-shift editing register.
pub const REG_CYR: u16 = 0o10;
/// Arithmetic-shift-right editing register.
pub const REG_SR: u16 = 0o11;
/// Cyclic-left-shift editing register.
pub const REG_CYL: u16 = 0o12;
/// Opcode-extraction editing register.
pub const REG_EDOP: u16 = 0o13;

pub const REG_TIME1: u16 = 0o14;
pub const REG_TIME2: u16 = 0o15;
pub const REG_TIME3: u16 = 0o16;
pub const REG_TIME4: u16 = 0o17;
pub const REG_TIME5: u16 = 0o20;
pub const REG_TIME6: u16 = 0o21;

pub const REG_CDUX: u16 = 0o22;
pub const REG_CDUY: u16 = 0o23;
pub const REG_CDUZ: u16 = 0o24;
pub const REG_OPTX: u16 = 0o25;
pub const REG_OPTY: u16 = 0o26;
pub const REG_PIPAX: u16 = 0o27;
pub const REG_PIPAY: u16 = 0o30;
pub const REG_PIPAZ: u16 = 0o31;

pub const REG_INLINK: u16 = 0o32;
pub const REG_RNRAD: u16 = 0o33;
pub const REG_GYROCTR: u16 = 0o34;
pub const REG_CDUXCMD: u16 = 0o35;
pub const REG_CDUYCMD: u16 = 0o36;
pub const REG_CDUZCMD: u16 = 0o37;

/// The erasable address that an executive is expected to touch at least
/// every 0.64s; resolving it clears the Night Watchman latch.
pub const ADDR_NEWJOB: u16 = 0o67;

/// The four registers whose writes go through an editing transform instead
/// of a plain store (spec.md §3 "Editing-register transforms").
pub fn is_editing_register(addr: u16) -> bool {
    matches!(addr, REG_CYR | REG_SR | REG_CYL | REG_EDOP)
}

/// Registers kept in 16-bit sign-extended form rather than masked to 15 bits.
pub fn is_wide_register(addr: u16) -> bool {
    matches!(addr, REG_A | REG_L | REG_Q)
}
