//! Process-wide knobs (spec.md §6 "Process-wide knobs").

/// The four configuration flags that affect engine behavior but are not
/// part of the simulated machine state.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Suppress GOJAM on alarm trigger. Alarms still latch their ch 77 bit
    /// and (if `show_alarms`) log, but never reset the machine.
    pub inhibit_alarms: bool,
    /// Log a line whenever an alarm triggers.
    pub show_alarms: bool,
    /// Preload the erasable cells the Sunburst 37 rope expects to find
    /// already initialized at boot.
    pub initialize_sunburst_37: bool,
    /// Verify odd parity on every fixed-memory access. Auto-enabled by the
    /// rope loader when any parity bit in the image is nonzero; can be
    /// forced on or off here before boot.
    pub check_parity: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            inhibit_alarms: false,
            show_alarms: true,
            initialize_sunburst_37: false,
            check_parity: false,
        }
    }
}
