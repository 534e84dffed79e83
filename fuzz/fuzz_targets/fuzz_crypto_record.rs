#![no_main]
use libfuzzer_sys::fuzz_target;
use rar_recover::parsing::extra::{ExtraRecord, EXTRA_ENCRYPTION};
use rar_recover::CryptoProfile;

fuzz_target!(|data: &[u8]| {
    let record = ExtraRecord {
        record_type: EXTRA_ENCRYPTION,
        payload: data,
        offset: 0,
    };
    if let Ok(profile) = CryptoProfile::from_encryption_record(&record) {
        // A check value never survives without its salt
        assert!(profile.password_check().is_none() || profile.salt().is_some());
    }
    let _ = CryptoProfile::from_encryption_block(data, 0);
});
