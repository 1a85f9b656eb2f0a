//! Fuzz target for signal payload decoding.
//!
//! Feeds every decoder bodies of the wrong and right shapes. Decoders must
//! return errors instead of panicking, and an accepted progress report must
//! never exceed a known total.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use udm_client::events::{decode_failure, decode_flag, decode_path, decode_progress};
use zbus::Message;

#[derive(Arbitrary, Debug)]
enum Payload {
    Flag(bool),
    Text(String),
    Progress(u64, u64),
    Signed(i64, i64),
    Triple(u64, u64, u64),
    Empty,
}

fn build(payload: &Payload) -> Option<Message> {
    let builder = Message::signal("/downloads/1", "com.canonical.applications.Download", "progress").ok()?;
    match payload {
        Payload::Flag(flag) => builder.build(&(*flag,)),
        Payload::Text(text) => builder.build(&(text.as_str(),)),
        Payload::Progress(received, total) => builder.build(&(*received, *total)),
        Payload::Signed(received, total) => builder.build(&(*received, *total)),
        Payload::Triple(a, b, c) => builder.build(&(*a, *b, *c)),
        Payload::Empty => builder.build(&()),
    }
    .ok()
}

fuzz_target!(|payloads: Vec<Payload>| {
    for payload in payloads.iter().take(64) {
        let Some(msg) = build(payload) else {
            continue;
        };

        let _ = decode_flag(&msg);
        let _ = decode_path(&msg);
        let _ = decode_failure(&msg);
        if let Ok(progress) = decode_progress(&msg) {
            assert!(progress.total == 0 || progress.received <= progress.total);
        }
    }
});
