//! Address-space resolution (spec.md §3 "Address spaces", §4.1 `resolve`).

/// Erasable memory: 8 banks of 256 words.
pub const ERASABLE_BANKS: usize = 8;
pub const ERASABLE_BANK_WORDS: usize = 256;

/// Fixed memory: up to 36 banks of 1024 words, reachable via FB + superbank.
pub const FIXED_BANKS: usize = 36;
pub const FIXED_BANK_WORDS: usize = 1024;

/// The result of resolving a 12-bit address against the current bank state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Erasable { bank: usize, offset: usize },
    Fixed { bank: usize, offset: usize },
    /// The superbank-extended common-fixed access named a bank past the end
    /// of installed fixed memory. Triggers Parity Fail (spec.md §4.1 item 5).
    NonexistentSuperbank,
}

/// Resolve a 12-bit address to a bank-qualified word location.
///
/// `eb`/`fb` are the raw bank-select register contents: EB's bank number
/// lives in bits 8-10 and FB's in bits 10-14, not in the low bits, so callers
/// pass the register word as-is and `resolve` does its own shifting.
/// `superbank` is channel 7 bit 7.
pub fn resolve(addr12: u16, eb: u16, fb: u16, superbank: bool) -> Resolution {
    let addr12 = addr12 & 0o7777;
    match addr12 {
        0o0000..=0o0377 => Resolution::Erasable {
            bank: 0,
            offset: (addr12 & 0o377) as usize,
        },
        0o0400..=0o0777 => Resolution::Erasable {
            bank: 1,
            offset: (addr12 & 0o377) as usize,
        },
        0o1000..=0o1377 => Resolution::Erasable {
            bank: 2,
            offset: (addr12 & 0o377) as usize,
        },
        0o1400..=0o1777 => {
            // EB bits 8-10: three bits select one of the 8 erasable banks.
            let bank = ((eb >> 8) & 0o7) as usize;
            Resolution::Erasable {
                bank,
                offset: (addr12 & 0o377) as usize,
            }
        }
        0o2000..=0o3777 => {
            // FB bits 10-14: five bits, doubled in reach by the superbank bit.
            let fb_bank = ((fb >> 10) & 0o37) as usize;
            let bank = fb_bank + if superbank { 32 } else { 0 };
            if bank >= FIXED_BANKS {
                Resolution::NonexistentSuperbank
            } else {
                Resolution::Fixed {
                    bank,
                    offset: (addr12 & 0o1777) as usize,
                }
            }
        }
        0o4000..=0o5777 => Resolution::Fixed {
            bank: 2,
            offset: (addr12 & 0o1777) as usize,
        },
        0o6000..=0o7777 => Resolution::Fixed {
            bank: 3,
            offset: (addr12 & 0o1777) as usize,
        },
        _ => unreachable!("addr12 is masked to 12 bits"),
    }
}
