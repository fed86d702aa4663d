//! Fuzz target for socket frame decoding
//!
//! Feeds arbitrary text to the inbound and outbound event decoders and the
//! message id parser. None of them may panic; invalid input must come back
//! as an error. Anything that decodes must survive an encode/decode cycle
//! unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use studyroom_proto::{ClientEvent, MessageId, ServerEvent};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = ClientEvent::decode(text) {
        let encoded = event.encode().expect("decoded event must encode");
        assert_eq!(ClientEvent::decode(&encoded).ok(), Some(event));
    }

    if let Ok(event) = ServerEvent::decode(text) {
        let encoded = event.encode().expect("decoded event must encode");
        assert_eq!(ServerEvent::decode(&encoded).ok(), Some(event));
    }

    if let Ok(id) = text.parse::<MessageId>() {
        assert_eq!(id.to_string(), text.to_ascii_lowercase());
    }
});
