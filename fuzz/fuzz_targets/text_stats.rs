//! Fuzz target for the stats calculator.
//!
//! Arbitrary bytes (including invalid UTF-8 and unbalanced markup) must
//! never panic, and the basic count relationships must hold.

#![no_main]

use libfuzzer_sys::fuzz_target;
use textpulse::stats::compute_bytes;

fuzz_target!(|data: &[u8]| {
    let wpm = data.first().copied().map_or(200, u32::from);
    let stats = compute_bytes(data, wpm);

    assert!(stats.characters_no_spaces <= stats.characters);
    assert!(stats.lines >= 1);
    assert!(stats.reading_time <= stats.words);
});
