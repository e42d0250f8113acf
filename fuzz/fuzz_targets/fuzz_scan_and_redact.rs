#![no_main]

use libfuzzer_sys::fuzz_target;
use redax_core::{ByteStore, MemoryStore, RedactMode, RedactOptions, scan_and_redact};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, image)) = data.split_first() else {
        return;
    };

    let options = RedactOptions {
        mode: if selector & 1 == 0 {
            RedactMode::Fast
        } else {
            RedactMode::Patterned
        },
        chunk_size: 2 + usize::from(selector >> 1),
        ..Default::default()
    };

    let mut store = MemoryStore::new(image.to_vec());
    let report = scan_and_redact(&mut store, &options).expect("in-memory scan cannot fail");

    assert_eq!(store.len(), image.len() as u64);
    assert!(report.bytes_redacted <= image.len() as u64);

    let changed = store
        .as_slice()
        .iter()
        .zip(image)
        .filter(|(a, b)| a != b)
        .count() as u64;
    assert!(changed <= report.bytes_redacted);
});
