#![no_main]

use libfuzzer_sys::fuzz_target;

use bugtrail_core::history::Payload;

fuzz_target!(|data: (Option<String>, Option<String>)| {
    let (old_values, comment) = data;
    let payload = Payload::from_columns(old_values, comment);
    let _ = payload.to_columns();
});
