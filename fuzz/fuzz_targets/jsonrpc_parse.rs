#![no_main]

use libfuzzer_sys::fuzz_target;
use tidings_wire::{Incoming, Query};

fuzz_target!(|data: &[u8]| {
    let Ok(Incoming::Query(envelope)) = Incoming::parse(data) else {
        return;
    };
    let id = envelope.id;
    if let Ok(method) = envelope.decode() {
        // Whatever decodes must encode again
        let query = Query { id, method };
        assert!(query.to_bytes().is_ok());
    }
});
