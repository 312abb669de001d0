#![no_main]
use libfuzzer_sys::fuzz_target;
use statechannels::core::protocol::message::{decode_message, encode_message, DEFAULT_MAX_MESSAGE_BYTES};

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = decode_message(data, DEFAULT_MAX_MESSAGE_BYTES) {
        // Anything accepted must re-encode to bytes that decode to the same message.
        let bytes = encode_message(&msg).expect("re-encode");
        let again = decode_message(&bytes, DEFAULT_MAX_MESSAGE_BYTES).expect("re-decode");
        assert_eq!(again, msg);
    }
});
