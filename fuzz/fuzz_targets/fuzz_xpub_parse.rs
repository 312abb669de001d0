#![no_main]
use libfuzzer_sys::fuzz_target;
use statechannels::core::security::xkey::ExtendedPublicKey;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(xpub) = s.parse::<ExtendedPublicKey>() {
            assert_eq!(xpub.to_string().parse::<ExtendedPublicKey>().ok(), Some(xpub));
        }
    }
});
