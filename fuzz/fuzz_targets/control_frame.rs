#![no_main]

use frosty_ruleset::protocol::{decode_frame, parse_response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(Some((value, used))) = decode_frame(data) {
        assert!(used > 0 && used <= data.len());
        let _ = parse_response(value);
    }
});
