#![no_main]
use libfuzzer_sys::fuzz_target;
use statechannels::core::abi::{decode_single, parse_param_type};

const TYPES: &[&str] = &[
    "tuple(tuple(address to, uint256 amount)[2] transfers, uint256 counter)",
    "tuple(address to, uint256 amount)[][]",
    "tuple(bytes32 a, bytes b, string c, bool d)",
];

fuzz_target!(|data: &[u8]| {
    let Some((&pick, rest)) = data.split_first() else { return };
    let ty = parse_param_type(TYPES[pick as usize % TYPES.len()]).expect("fixed type");
    let _ = decode_single(&ty, rest);
    if let Ok(s) = std::str::from_utf8(rest) {
        let _ = parse_param_type(s);
    }
});
