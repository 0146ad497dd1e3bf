//! Prometheus metrics, served over HTTP the way
//! `examples/barrucadu-resolved/bin-resolved/src/metrics.rs` serves its own
//! (`actix-web` + `prometheus::TextEncoder`). Metric names follow the
//! richer `crates/resolved/src/metrics.rs` snapshot in the same teacher
//! repository, narrowed to what this system's data plane actually measures
//! (spec §2's component table has no zones/hosts/forwarding-resolver
//! concepts to count).

use actix_web::{get, http::header::ContentType, App, HttpResponse, HttpServer, Responder};
use prometheus::{
    opts, register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::net::Ipv4Addr;

const RESOLVE_DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

pub static DNS_REQUESTS_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec!(
            opts!(
                "dns_requests_total",
                "Total number of DNS requests received."
            ),
            &["protocol"]
        )
        .unwrap()
    });

pub static DNS_RESPONSES_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec!(
            opts!("dns_responses_total", "Total number of DNS responses sent."),
            &["qtype"]
        )
        .unwrap()
    });

pub static DNS_CACHE_HIT_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter!(opts!("dns_cache_hit_total", "Total number of cache hits.")).unwrap()
});

pub static DNS_CACHE_MISS_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_cache_miss_total",
        "Total number of cache misses."
    ))
    .unwrap()
});

pub static DNS_DOH_FAILURE_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_doh_failure_total",
        "Total number of queries for which no DoH record could be resolved."
    ))
    .unwrap()
});

/// Distinct from [`DNS_DOH_FAILURE_TOTAL`]: counts queries where DoH *did*
/// produce a cached value, but it came from a non-A resolution path (an
/// AAAA answer, or an un-chased CNAME target, both per spec §9's cache
/// conflation) and so fails to parse as an `Ipv4Addr`. This is the rate
/// DESIGN.md's open-question-1 decision (coerce to empty-answer) actually
/// bites, and is a local cache/type conflation, not an upstream failure.
pub static DNS_CACHE_TYPE_CONFLICT_TOTAL: std::sync::LazyLock<IntCounter> =
    std::sync::LazyLock::new(|| {
        register_int_counter!(opts!(
            "dns_cache_type_conflict_total",
            "Total number of queries whose resolved value could not be parsed as an IPv4 address (AAAA or CNAME-target conflation)."
        ))
        .unwrap()
    });

pub static DNS_ROUTE_INSTALL_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_route_install_total",
        "Total number of host routes successfully installed."
    ))
    .unwrap()
});

pub static DNS_ROUTE_INSTALL_FAILURE_TOTAL: std::sync::LazyLock<IntCounter> =
    std::sync::LazyLock::new(|| {
        register_int_counter!(opts!(
            "dns_route_install_failure_total",
            "Total number of host route installation failures."
        ))
        .unwrap()
    });

pub static DNS_RESOLVE_DURATION_SECONDS: std::sync::LazyLock<HistogramVec> =
    std::sync::LazyLock::new(|| {
        register_histogram_vec!(
            "dns_resolve_duration_seconds",
            "Time spent resolving a single query, including any DoH round trips.",
            &["qtype"],
            RESOLVE_DURATION_BUCKETS.to_vec()
        )
        .unwrap()
    });

#[get("/metrics")]
async fn get_metrics() -> impl Responder {
    match prometheus::TextEncoder::new().encode_to_string(&prometheus::gather()) {
        Ok(body) => HttpResponse::Ok().content_type(ContentType::plaintext()).body(body),
        Err(err) => {
            tracing::error!(error = %err, "could not encode metrics");
            HttpResponse::InternalServerError()
                .content_type(ContentType::plaintext())
                .body(err.to_string())
        }
    }
}

pub async fn serve_prometheus_endpoint_task(address: Ipv4Addr, port: u16) -> std::io::Result<()> {
    HttpServer::new(|| App::new().service(get_metrics))
        .bind((address, port))?
        .run()
        .await
}
