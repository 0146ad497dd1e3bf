//! DNS-over-HTTPS client. Speaks the Cloudflare JSON API
//! (`https://cloudflare-dns.com/dns-query`) rather than the wire DoH
//! profile: `GET ?name=<n>&type=<t>` with `Accept: application/dns-json`.
//!
//! Grounded on the DoH JSON schema used throughout the corpus (e.g. a
//! `CloudflareDoHResponse` with a `status` field and an `Answer` array of
//! `{name, type, TTL, data}` objects) and on the upstream this system was
//! distilled from, which hits the same endpoint with the same header.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

pub const CLOUDFLARE_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

/// Well-known DNS record type numbers, the only ones this client needs to
/// name explicitly.
pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_CNAME: u16 = 5;
pub const TYPE_SOA: u16 = 6;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_MX: u16 = 15;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_SRV: u16 = 33;

/// Fixed type-priority order used by the "fallback broad query" step of the
/// resolution algorithm (spec §4.3 step 5).
pub const TYPE_PRIORITY: [u16; 9] = [
    TYPE_A, TYPE_AAAA, TYPE_CNAME, TYPE_MX, TYPE_TXT, TYPE_NS, TYPE_SOA, TYPE_PTR, TYPE_SRV,
];

#[derive(Debug, Clone, Deserialize)]
pub struct DohAnswer {
    #[allow(dead_code)]
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: u16,
    #[serde(rename = "TTL")]
    pub ttl: u32,
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DohResponse {
    #[serde(default)]
    pub answer: Option<Vec<DohAnswer>>,
}

impl DohResponse {
    fn answers(&self) -> &[DohAnswer] {
        self.answer.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug)]
pub enum DohError {
    Http(String),
    Json(String),
}

impl fmt::Display for DohError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DohError::Http(msg) => write!(f, "DoH request failed: {msg}"),
            DohError::Json(msg) => write!(f, "DoH response could not be parsed: {msg}"),
        }
    }
}

impl std::error::Error for DohError {}

/// The network edge of the DoH client, split out so resolver tests can
/// supply canned responses instead of making a live HTTP call (spec §8's
/// boundary scenarios are all expressed in terms of "DoH stub returns ...").
#[async_trait]
pub trait DohTransport: Send + Sync {
    async fn query(&self, name: &str, qtype: u16) -> Result<DohResponse, DohError>;
}

/// `reqwest`-backed transport hitting the real Cloudflare endpoint.
pub struct HttpDohTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDohTransport {
    pub fn new() -> Self {
        Self::with_endpoint(CLOUDFLARE_DOH_ENDPOINT.to_string())
    }

    pub fn with_endpoint(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builder should not fail with only a timeout set");
        Self { client, endpoint }
    }
}

impl Default for HttpDohTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DohTransport for HttpDohTransport {
    async fn query(&self, name: &str, qtype: u16) -> Result<DohResponse, DohError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", &qtype.to_string())])
            .header("Accept", "application/dns-json")
            .send()
            .await
            .map_err(|err| DohError::Http(err.to_string()))?;

        response
            .json::<DohResponse>()
            .await
            .map_err(|err| DohError::Json(err.to_string()))
    }
}

/// Typed convenience wrapper over a [`DohTransport`]. A failed or empty
/// lookup is not an error at this layer: the resolver treats "no record"
/// and "transport failure" identically (spec §4.3: "On network failure the
/// call returns an empty string and the resolver proceeds ... as if the
/// record did not exist").
pub struct DohClient<T: DohTransport> {
    transport: T,
}

impl<T: DohTransport> DohClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Type-A query, returning the first A answer and/or the first CNAME
    /// answer seen — a single DoH request can legitimately carry both
    /// (spec §4.3 step 2).
    pub async fn query_a_or_cname(&self, name: &str) -> (Option<String>, Option<String>) {
        let response = match self.transport.query(name, TYPE_A).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%name, error = %err, "DoH A query failed");
                return (None, None);
            }
        };

        let mut ip = None;
        let mut cname = None;
        for answer in response.answers() {
            if answer.rtype == TYPE_A && ip.is_none() {
                ip = Some(answer.data.clone());
            } else if answer.rtype == TYPE_CNAME && cname.is_none() {
                cname = Some(answer.data.trim_end_matches('.').to_string());
            }
        }
        (ip, cname)
    }

    pub async fn query_aaaa(&self, name: &str) -> Option<String> {
        self.query_single(name, TYPE_AAAA, TYPE_AAAA).await
    }

    async fn query_single(&self, name: &str, qtype: u16, want_rtype: u16) -> Option<String> {
        let response = match self.transport.query(name, qtype).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%name, %qtype, error = %err, "DoH query failed");
                return None;
            }
        };
        response
            .answers()
            .iter()
            .find(|answer| answer.rtype == want_rtype)
            .map(|answer| answer.data.clone())
    }

    /// Broad fallback query (spec §4.3 step 5): queries every known type in
    /// priority order and returns the first non-empty record.
    pub async fn query_all(&self, name: &str) -> Option<String> {
        for &rtype in &TYPE_PRIORITY {
            if let Some(data) = self.query_single(name, rtype, rtype).await {
                return Some(data);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubTransport {
        responses: Mutex<std::collections::HashMap<(String, u16), DohResponse>>,
    }

    impl StubTransport {
        fn with(mut self, name: &str, qtype: u16, response: DohResponse) -> Self {
            self.responses
                .get_mut()
                .unwrap()
                .insert((name.to_string(), qtype), response);
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

    #[tokio::test]
    async fn query_a_or_cname_prefers_a() {
        let transport = StubTransport::default().with(
            "example.com",
            TYPE_A,
            DohResponse {
                answer: Some(vec![DohAnswer {
                    name: "example.com".into(),
                    rtype: TYPE_A,
                    ttl: 300,
                    data: "93.184.216.34".into(),
                }]),
            },
        );
        let client = DohClient::new(transport);
        let (ip, cname) = client.query_a_or_cname("example.com").await;
        assert_eq!(Some("93.184.216.34".to_string()), ip);
        assert_eq!(None, cname);
    }

    #[tokio::test]
    async fn query_a_or_cname_falls_back_to_cname() {
        let transport = StubTransport::default().with(
            "alias.example.com",
            TYPE_A,
            DohResponse {
                answer: Some(vec![DohAnswer {
                    name: "alias.example.com".into(),
                    rtype: TYPE_CNAME,
                    ttl: 300,
                    data: "target.example.com.".into(),
                }]),
            },
        );
        let client = DohClient::new(transport);
        let (ip, cname) = client.query_a_or_cname("alias.example.com").await;
        assert_eq!(None, ip);
        assert_eq!(Some("target.example.com".to_string()), cname);
    }

    #[tokio::test]
    async fn missing_answer_section_is_empty() {
        let transport = StubTransport::default();
        let client = DohClient::new(transport);
        let (ip, cname) = client.query_a_or_cname("nowhere.invalid").await;
        assert_eq!(None, ip);
        assert_eq!(None, cname);
    }
}
