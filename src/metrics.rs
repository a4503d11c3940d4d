use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("acl_decisions_total", "Access-control decisions by outcome");
    let vec = IntCounterVec::new(opts, &["decision"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register acl_decisions_total");
    vec
});

static BLOCK_MATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("acl_block_matches_total", "Requests decided by each block");
    let vec = IntCounterVec::new(opts, &["block"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register acl_block_matches_total");
    vec
});

static RULE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "acl_rule_failures_total",
        "Rule evaluations that failed and were treated as no match",
    );
    let vec = IntCounterVec::new(opts, &["rule"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register acl_rule_failures_total");
    vec
});

static AUTH_CACHE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("acl_auth_cache_total", "Verdict cache lookups by result");
    let vec = IntCounterVec::new(opts, &["cache", "outcome"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register acl_auth_cache_total");
    vec
});

static DECISION_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "acl_decision_duration_seconds",
        "Time spent evaluating the access control list",
    )
    .buckets(latency_buckets());
    let vec = HistogramVec::new(opts, &["decision"]).expect("create histogram vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register acl_decision_duration_seconds");
    vec
});

fn latency_buckets() -> Vec<f64> {
    // Local rules finish in microseconds; delegated ones wait on the network.
    vec![
        0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0,
    ]
}

pub fn record_decision(decision: &str, elapsed: Duration) {
    DECISIONS_TOTAL.with_label_values(&[decision]).inc();
    DECISION_LATENCY_SECONDS
        .with_label_values(&[decision])
        .observe(elapsed.as_secs_f64());
}

pub fn record_block_match(block: &str) {
    BLOCK_MATCHES_TOTAL.with_label_values(&[block]).inc();
}

pub fn record_rule_failure(rule: &str) {
    RULE_FAILURES_TOTAL.with_label_values(&[rule]).inc();
}

pub fn record_auth_cache(cache: &str, outcome: &str) {
    AUTH_CACHE_TOTAL.with_label_values(&[cache, outcome]).inc();
}

/// Renders every registered metric in the Prometheus text format.
pub fn encode() -> Result<String> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .context("encoding metrics")?;
    String::from_utf8(buffer).context("metrics output is not UTF-8")
}
