#![no_main]

use libfuzzer_sys::fuzz_target;

use indexgate::matcher::{CaseSensitivity, Matcher};

/// Plain dynamic-programming glob over chars, `*` matching any run.
fn reference_glob(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    let mut row = vec![false; value.len() + 1];
    row[0] = true;
    for p in &pattern {
        let mut next = vec![false; value.len() + 1];
        if *p == '*' {
            let mut seen = false;
            for (i, cell) in next.iter_mut().enumerate() {
                seen |= row[i];
                *cell = seen;
            }
        } else {
            for i in 0..value.len() {
                next[i + 1] = row[i] && value[i] == *p;
            }
        }
        row = next;
    }
    row[value.len()]
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let case = if data[0] & 1 == 0 {
        CaseSensitivity::Sensitive
    } else {
        CaseSensitivity::Insensitive
    };
    let payload = &data[1..];
    let split = (data[0] as usize >> 1) % (payload.len() + 1);
    let (pattern_bytes, value_bytes) = payload.split_at(split);
    let patterns = String::from_utf8_lossy(pattern_bytes);
    let value = String::from_utf8_lossy(value_bytes);

    let matcher = Matcher::new(patterns.split(','), case);
    let plain = matcher.matches(value.as_ref());
    let normalized = case.normalize(value.as_ref());
    let expected = patterns
        .split(',')
        .any(|p| reference_glob(&case.normalize(p), &normalized));
    assert_eq!(plain, expected, "matcher disagrees with reference glob");
    let aware = matcher.matches_cluster_aware(value.as_ref());
    assert!(!aware || plain, "cluster-aware match must imply a plain match");
    if matcher.contains_pattern("*") {
        assert!(plain, "'*' must match every value");
    }
});
