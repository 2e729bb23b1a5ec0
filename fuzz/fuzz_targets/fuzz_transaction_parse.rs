#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = fraudwatch::gateway::api::extract_transaction(data);
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = fraudwatch::ingest::StreamQuery::from_transaction(s);
        let _ = fraudwatch::pubsub::TopicName::parse(s);
    }
});
