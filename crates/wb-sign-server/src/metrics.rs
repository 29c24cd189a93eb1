// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ambient Prometheus metrics, exposed at `/metrics`. Kept deliberately
//! small: request counts and sign-latency, the two numbers an operator
//! actually watches on this service.

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static HTTP_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        prometheus::Opts::new("wb_sign_http_requests_total", "HTTP requests by route and status"),
        &["route", "status"],
    )
    .expect("metric registration");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registration");
    counter
});

pub static SIGN_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        prometheus::HistogramOpts::new("wb_sign_ffi_sign_seconds", "Latency of native sign() calls")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["chain"],
    )
    .expect("metric registration");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("metric registration");
    histogram
});

pub fn render() -> impl warp::Reply {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder
        .encode(&metric_families, &mut buf)
        .expect("metrics encoding never fails for well-formed families");
    warp::reply::with_header(buf, "Content-Type", encoder.format_type())
}
