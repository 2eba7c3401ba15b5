#![no_main]

use libfuzzer_sys::fuzz_target;
use lorawan_ns::frame::{decode_downlink, decode_uplink};

fuzz_target!(|data: &[u8]| {
    // Decoders must reject malformed input without panicking
    if let Ok((header, payload)) = decode_uplink(data) {
        let mut reencoded = header.encode();
        reencoded.extend_from_slice(payload);
        let _ = decode_uplink(&reencoded);
    }
    let _ = decode_downlink(data);

    // FOptsLen claims more bytes than the frame holds
    if data.len() > 4 {
        let mut mutated = data.to_vec();
        mutated[4] |= 0x0F;
        let _ = decode_uplink(&mutated);
        let _ = decode_downlink(&mutated);
    }
});
