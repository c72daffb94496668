#![no_main]

use libfuzzer_sys::fuzz_target;

use bugtrail_core::history::Diff;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(diff) = Diff::from_json(text) {
        let reencoded = diff.to_json();
        assert_eq!(Diff::from_json(&reencoded).ok(), Some(diff));
    }
});
