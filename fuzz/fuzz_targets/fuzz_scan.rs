#![no_main]
use libfuzzer_sys::fuzz_target;
use rar_recover::parsing::{BlockFramer, RAR5_SIGNATURE};
use rar_recover::ArchiveScan;

fuzz_target!(|data: &[u8]| {
    // Raw input, then the same bytes behind a valid signature
    let _ = ArchiveScan::scan(data);

    let mut archive = RAR5_SIGNATURE.to_vec();
    archive.extend_from_slice(data);
    if let Ok(scan) = ArchiveScan::scan(&archive) {
        let _ = scan.search_profile();
    }
    for block in BlockFramer::new(&archive, RAR5_SIGNATURE.len()).flatten() {
        let _ = block.extra_records().count();
    }
});
