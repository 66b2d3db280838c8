#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidings_core::{Message, MessageId};
use tidings_crypto::{encode_base64, sign_message, verify_message, Identity};

#[derive(Arbitrary, Debug)]
struct Input {
    payload: Vec<u8>,
    flip_at: usize,
    flip_with: u8,
    raw: (String, String, String, String),
}

fuzz_target!(|input: Input| {
    // Arbitrary strings never panic the verifier
    let (data, sender, signature, id) = input.raw;
    let _ = verify_message(&Message::new(data, sender, signature, MessageId::new(id)));

    if input.payload.is_empty() || input.flip_with == 0 {
        return;
    }
    let identity = Identity::from_bytes(&[11u8; 32]);
    let Ok(message) = sign_message(&identity, &input.payload) else {
        return;
    };
    assert!(verify_message(&message).is_ok());

    let mut mutated = input.payload.clone();
    let i = input.flip_at % mutated.len();
    mutated[i] ^= input.flip_with;
    let mut forged = message;
    forged.data = encode_base64(&mutated);
    assert!(verify_message(&forged).is_err());
});
