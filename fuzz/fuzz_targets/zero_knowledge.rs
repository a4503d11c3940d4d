#![no_main]

use libfuzzer_sys::fuzz_target;

use indexgate::matcher::{CaseSensitivity, IndexRewrite, IndexSet, Matcher, ZeroKnowledgeFilter};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let cluster_aware = data[0] & 1 == 1;
    let payload = &data[1..];
    let split = (data[0] as usize >> 1) % (payload.len() + 1);
    let (pattern_bytes, request_bytes) = payload.split_at(split);
    let patterns = String::from_utf8_lossy(pattern_bytes);
    let requested: IndexSet = String::from_utf8_lossy(request_bytes)
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let matcher = Matcher::new(patterns.split(','), CaseSensitivity::Sensitive);
    let filter = ZeroKnowledgeFilter::new(cluster_aware);
    if let IndexRewrite::Narrowed { indices, .. } = filter.rewrite(&requested, &matcher) {
        assert!(!indices.is_empty(), "a narrowed rewrite is never empty");
    }
    let mut applied = requested.clone();
    if filter.apply(&mut applied, &matcher) {
        assert!(!applied.is_empty());
    }
});
