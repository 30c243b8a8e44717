#![no_main]

use ase_codec::FrameCodec;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(data);

    // Decode frames until more input is needed or the header is rejected
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        let _ = frame.header.body_length();
    }
});
