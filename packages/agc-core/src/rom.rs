//! Rope (fixed-memory) image loading (spec.md §6 "ROM image format"): big-
//! endian 16-bit words, bit 0 the parity bit and bits 1-15 the AGC data,
//! banks on disk in order 2, 3, 0, 1, 4, 5, …, 35.

use crate::error::RomLoadError;
use crate::mem::map::FIXED_BANK_WORDS;
use crate::mem::EngineMemory;

const MAX_BANKS: usize = 36;
const MAX_WORDS: usize = MAX_BANKS * FIXED_BANK_WORDS;

/// The disk-order-to-AGC-bank mapping: disk slot 0 is AGC bank 2, slot 1 is
/// bank 3, slot 2 is bank 0, slot 3 is bank 1, and slots 4.. map directly.
fn disk_bank_order() -> [usize; MAX_BANKS] {
    let mut order = [0usize; MAX_BANKS];
    order[0] = 2;
    order[1] = 3;
    order[2] = 0;
    order[3] = 1;
    for (bank, slot) in order.iter_mut().enumerate().skip(4) {
        *slot = bank;
    }
    order
}

/// Parse a big-endian rope image and load every bank it covers into `mem`.
/// Returns whether any parity bit in the image was nonzero, which callers
/// typically feed into [`crate::config::EngineConfig::check_parity`].
pub fn load_rope(mem: &mut EngineMemory, bytes: &[u8]) -> Result<bool, RomLoadError> {
    if bytes.len() % 2 != 0 {
        return Err(RomLoadError::OddSize(bytes.len()));
    }
    let word_count = bytes.len() / 2;
    if word_count > MAX_WORDS {
        return Err(RomLoadError::TooLarge { words: word_count, max: MAX_WORDS });
    }

    let order = disk_bank_order();
    let mut any_parity = false;

    for (disk_index, bank) in order.iter().enumerate() {
        let start_word = disk_index * FIXED_BANK_WORDS;
        if start_word >= word_count {
            break;
        }
        let mut words = [0u16; FIXED_BANK_WORDS];
        let mut parity_bits = [false; FIXED_BANK_WORDS];
        let bank_word_count = (word_count - start_word).min(FIXED_BANK_WORDS);
        for (offset, word_slot) in words.iter_mut().enumerate().take(bank_word_count) {
            let byte_index = (start_word + offset) * 2;
            let raw = u16::from_be_bytes([bytes[byte_index], bytes[byte_index + 1]]);
            let parity = raw & 0o100000 != 0;
            *word_slot = raw & 0o77777;
            parity_bits[offset] = parity;
            any_parity |= parity;
        }
        mem.load_fixed_bank(*bank, &words, &parity_bits);
    }

    Ok(any_parity)
}
