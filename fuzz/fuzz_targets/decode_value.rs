#![no_main]

use arbitrary::Arbitrary;
use ase_protocol::{DataFormat, DataType};
use libfuzzer_sys::fuzz_target;

/// Column format paired with a raw value.
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    data_type: u8,
    max_length: u32,
    status: u8,
    value: Option<Vec<u8>>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(data_type) = DataType::from_u8(input.data_type) else {
        return;
    };
    let format = DataFormat::new(data_type)
        .with_max_length(input.max_length)
        .with_status(input.status);
    let _ = ase_types::decode_value(&format, input.value.as_deref());
});
