//! The recursive, CNAME-chasing resolution algorithm (spec §4.3).
//!
//! This is the one piece of the pipeline with no direct analogue in the
//! teacher (`barrucadu-resolved` talks classic wire-protocol DNS to
//! upstream nameservers, never DoH) — it is grounded instead on
//! `examples/original_source/dnsmasq/resolver.go`'s `ResolveWithCNAME`,
//! translated from its `for`-loop-with-`visited`-map shape into the same
//! shape in Rust, since that shape was already idiomatic iteration rather
//! than recursion.

use std::collections::HashSet;

use crate::cache::SharedCache;
use crate::doh::{DohClient, DohTransport};

/// Hard recursion depth for the CNAME walk (spec §4.3: "a hard depth of
/// 10"). Named distinctly from the teacher's `RECURSION_LIMIT` (32) since
/// the two bound different things: the teacher's bounds full RFC 1034
/// delegation recursion, this bounds a CNAME chain.
pub const MAX_CNAME_DEPTH: usize = 10;

/// Outcome of a single `resolve()` call (spec's `ResolvedResult`, with the
/// extra `first_cname` diagnostic field grounded on
/// `dnsmasq.ResolveWithCNAME`'s third return value).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolveOutcome {
    pub should_route: bool,
    pub ip: Option<String>,
    pub first_cname: Option<String>,
}

/// Resolve `domain` to an address, following CNAMEs and consulting/
/// populating `cache` along the way, and decide whether the result should
/// be routed through the tunnel by applying `matches` to the *original*
/// queried domain (spec §4.3 step 1: the rule match is never taken against
/// a chased CNAME target).
pub async fn resolve<T, F>(
    doh: &DohClient<T>,
    cache: &SharedCache,
    domain: &str,
    matches: F,
) -> ResolveOutcome
where
    T: DohTransport,
    F: Fn(&str) -> bool,
{
    let mut visited = HashSet::new();
    let mut current = domain.to_string();
    let mut first_cname: Option<String> = None;

    for _ in 0..MAX_CNAME_DEPTH {
        if !visited.insert(current.clone()) {
            tracing::warn!(%domain, %current, "circular CNAME detected, aborting resolution");
            return ResolveOutcome::default();
        }

        // Step 1: cache.
        if let Some(hit) = cache.get(&current) {
            tracing::debug!(%domain, %current, ip = %hit, "cache hit");
            return ResolveOutcome {
                should_route: matches(domain),
                ip: Some(hit),
                first_cname,
            };
        }

        // Step 2: DoH A + inline CNAME.
        let (ip, cname) = doh.query_a_or_cname(&current).await;
        if let Some(ip) = ip {
            tracing::debug!(%domain, %current, %ip, "resolved via A");
            cache.set(&current, &ip);
            cache.set(domain, &ip);
            return ResolveOutcome {
                should_route: matches(domain),
                ip: Some(ip),
                first_cname,
            };
        }

        // Step 3: DoH AAAA on the current name.
        if let Some(ipv6) = doh.query_aaaa(&current).await {
            tracing::debug!(%domain, %current, ip = %ipv6, "resolved via AAAA");
            cache.set(&current, &ipv6);
            cache.set(domain, &ipv6);
            return ResolveOutcome {
                should_route: matches(domain),
                ip: Some(ipv6),
                first_cname,
            };
        }

        if let Some(cname) = cname {
            tracing::debug!(%domain, %current, %cname, "following CNAME");
            cache.set(&current, &cname);
            if first_cname.is_none() {
                first_cname = Some(cname.clone());
            }

            // Step 4: chase the CNAME target directly with A then AAAA.
            if let (Some(ip), _) = doh.query_a_or_cname(&cname).await {
                cache.set(&cname, &ip);
                cache.set(domain, &ip);
                return ResolveOutcome {
                    should_route: matches(domain),
                    ip: Some(ip),
                    first_cname,
                };
            }
            if let Some(ipv6) = doh.query_aaaa(&cname).await {
                cache.set(&cname, &ipv6);
                cache.set(domain, &ipv6);
                return ResolveOutcome {
                    should_route: matches(domain),
                    ip: Some(ipv6),
                    first_cname,
                };
            }

            current = cname;
            continue;
        }

        // Step 5: broad fallback query across every known type.
        if let Some(data) = doh.query_all(&current).await {
            tracing::debug!(%domain, %current, data = %data, "resolved via fallback query");
            cache.set(&current, &data);
            cache.set(domain, &data);
            return ResolveOutcome {
                should_route: matches(domain),
                ip: Some(data),
                first_cname,
            };
        }

        break;
    }

    tracing::warn!(%domain, "resolution failed");
    ResolveOutcome::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doh::{DohAnswer, DohResponse, DohError, TYPE_A, TYPE_CNAME};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubTransport {
        responses: Mutex<HashMap<(String, u16), DohResponse>>,
    }

    impl StubTransport {
        fn with(self, name: &str, qtype: u16, answers: Vec<DohAnswer>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert((name.to_string(), qtype), DohResponse {
                    answer: Some(answers),
                });
            self
        }
    }

    #[async_trait]
    impl DohTransport for StubTransport {
        async fn query(&self, name: &str, qtype: u16) -> Result<DohResponse, DohError> {
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(&(name.to_string(), qtype))
                .cloned()
                .unwrap_or_default())
        }
    }

    fn a_answer(name: &str, ip: &str) -> DohAnswer {
        DohAnswer {
            name: name.to_string(),
            rtype: TYPE_A,
            ttl: 300,
            data: ip.to_string(),
        }
    }

    fn cname_answer(name: &str, target: &str) -> DohAnswer {
        DohAnswer {
            name: name.to_string(),
            rtype: TYPE_CNAME,
            ttl: 300,
            data: target.to_string(),
        }
    }

    #[tokio::test]
    async fn direct_a_record_routes_when_rule_matches() {
        let transport = StubTransport::default().with(
            "example.com",
            TYPE_A,
            vec![a_answer("example.com", "93.184.216.34")],
        );
        let doh = DohClient::new(transport);
        let cache = SharedCache::new();

        let outcome = resolve(&doh, &cache, "example.com", |d| d == "example.com").await;

        assert_eq!(Some("93.184.216.34".to_string()), outcome.ip);
        assert!(outcome.should_route);
        assert_eq!(
            Some("93.184.216.34".to_string()),
            cache.get("example.com")
        );
    }

    #[tokio::test]
    async fn no_matching_rule_does_not_route() {
        let transport = StubTransport::default().with(
            "example.com",
            TYPE_A,
            vec![a_answer("example.com", "93.184.216.34")],
        );
        let doh = DohClient::new(transport);
        let cache = SharedCache::new();

        let outcome = resolve(&doh, &cache, "example.com", |_| false).await;

        assert_eq!(Some("93.184.216.34".to_string()), outcome.ip);
        assert!(!outcome.should_route);
    }

    #[tokio::test]
    async fn circular_cname_aborts() {
        let transport = StubTransport::default()
            .with("a", TYPE_A, vec![cname_answer("a", "b")])
            .with("b", TYPE_A, vec![cname_answer("b", "a")]);
        let doh = DohClient::new(transport);
        let cache = SharedCache::new();

        let outcome = resolve(&doh, &cache, "a", |_| true).await;

        assert_eq!(None, outcome.ip);
        assert!(!outcome.should_route);
    }

    #[tokio::test]
    async fn rule_match_uses_original_domain_not_cname_target() {
        // Rule only matches the alias, not the CNAME target — per spec
        // §4.3 step 1 the match must still be taken against the original
        // queried name.
        let transport = StubTransport::default()
            .with("alias.example.com", TYPE_A, vec![cname_answer("alias.example.com", "cdn.example.net")])
            .with("cdn.example.net", TYPE_A, vec![a_answer("cdn.example.net", "1.2.3.4")]);
        let doh = DohClient::new(transport);
        let cache = SharedCache::new();

        let outcome = resolve(&doh, &cache, "alias.example.com", |d| {
            d == "alias.example.com"
        })
        .await;

        assert_eq!(Some("1.2.3.4".to_string()), outcome.ip);
        assert!(outcome.should_route);
        assert_eq!(Some("cdn.example.net".to_string()), outcome.first_cname);
    }

    #[tokio::test]
    async fn cache_hit_skips_doh_and_still_matches_original_domain() {
        let transport = StubTransport::default();
        let doh = DohClient::new(transport);
        let cache = SharedCache::new();
        cache.set("cached.example.com", "5.6.7.8");

        let outcome = resolve(&doh, &cache, "cached.example.com", |_| true).await;

        assert_eq!(Some("5.6.7.8".to_string()), outcome.ip);
        assert!(outcome.should_route);
    }
}
