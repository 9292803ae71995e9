#![no_main]

use libfuzzer_sys::fuzz_target;
use peerchat_core::membership::MembershipStore;
use peerchat_core::model::Envelope;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes from the wire must never panic the decoder
    let Ok(envelope) = Envelope::decode(data) else {
        return;
    };

    // Whatever decodes must survive a round trip and be applicable
    let encoded = envelope.encode().expect("decoded envelope re-encodes");
    let again = Envelope::decode(&encoded).expect("re-encoded envelope decodes");
    assert_eq!(envelope.kind(), again.kind());

    if let Err(announcement) = envelope.into_payload() {
        let store = MembershipStore::new();
        store.apply(&announcement);
        assert!(!store.apply(&announcement).changed());
    }
});
