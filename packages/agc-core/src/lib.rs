//! Cycle-accurate Apollo Guidance Computer (Block II) instruction, memory,
//! and timing core (spec.md §1 "Purpose & scope").
//!
//! This crate has no I/O and no file access: rope/dump loading lives here as
//! pure parsers over `&[u8]`, while actual file reads, CLI parsing, and the
//! real-time pacing loop belong to `agc-runner`.

pub mod alu;
pub mod config;
pub mod counters;
pub mod dump;
pub mod engine;
pub mod error;
pub mod mem;
pub mod pacing;
pub mod rom;

/// Machine cycles per simulated second. The real hardware ran at 1,024,000
/// pulses/s with an 11.72µs memory cycle time, giving roughly 85,470 MCTs
/// per second (spec.md §5 "Pacing").
pub const AGC_PER_SECOND: u64 = 85_470;
