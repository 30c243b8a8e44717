#![no_main]

use ase_protocol::PackageParser;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut parser = PackageParser::new(Bytes::copy_from_slice(data));

    // Parse until exhausted or error
    while let Ok(Some(_)) = parser.next_package() {}
});
