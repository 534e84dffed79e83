#![no_main]
use libfuzzer_sys::fuzz_target;
use rar_recover::{decode_hash, encode_hash};

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(parsed) = decode_hash(line) {
            let encoded = encode_hash(&parsed.profile, parsed.encoding).unwrap();
            assert_eq!(decode_hash(&encoded).unwrap(), parsed);
        }
    }
});
