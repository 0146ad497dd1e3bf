//! The DNS listener (spec §4.2): binds UDP and TCP on port 53, parses the
//! first question of every incoming message, and dispatches it through the
//! resolver and routing plane before replying.
//!
//! Task shape — a UDP receive loop feeding per-query `tokio::spawn`ed
//! handlers, a reply channel back to a single owner of the socket, and an
//! analogous TCP accept loop — is lifted directly from
//! `examples/barrucadu-resolved/bin-resolved/src/main.rs`'s
//! `listen_udp_task`/`listen_tcp_task`/`handle_raw_message`, with the zone
//! lookup and forwarding-resolver plumbing replaced by a single call into
//! `dns_resolver::resolve` followed by the routing plane (spec §4.2: the
//! route must be installed *before* the reply is written).

use std::net::Ipv4Addr;
use std::sync::Arc;

use bytes::BytesMut;
use dns_resolver::{resolve, DohClient, DohTransport, SharedCache};
use dns_types::protocol::types::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;

use crate::metrics::*;
use crate::rules::SharedRuleSet;

/// Synthetic TTL stamped on every answer this system produces (spec §4.2).
const ANSWER_TTL: u32 = 300;

/// Response-policy-relevant record types which always get an empty,
/// NOERROR reply regardless of resolver state (spec §4.2): AAAA, HTTPS,
/// SVCB, PTR, SOA are deliberately starved so the OS falls back to IPv4.
fn is_starved(rtype: RecordType) -> bool {
    matches!(
        rtype,
        RecordType::AAAA
            | RecordType::HTTPS
            | RecordType::SVCB
            | RecordType::PTR
            | RecordType::SOA
    )
}

/// Shared, cloneable state every per-query task needs. Cheap to clone
/// (every field is an `Arc` or already `Clone`), mirroring the teacher's
/// own `ListenArgs`.
#[derive(Clone)]
pub struct ListenArgs<T: DohTransport + 'static> {
    pub rules: SharedRuleSet,
    pub cache: SharedCache,
    pub doh: Arc<DohClient<T>>,
    pub vpn_iface: Arc<str>,
}

/// Parse the wire message, dispatch its first question, and build the
/// reply — spec §4.2's "per-query contract." Returns `None` only when the
/// incoming bytes are too short to recover even a header id (no reply is
/// possible at all).
#[tracing::instrument(name = "query", skip(args, octets), fields(id = tracing::field::Empty))]
async fn handle_raw_message<T: DohTransport>(
    args: ListenArgs<T>,
    octets: &[u8],
) -> Option<Message> {
    let query = match Message::from_octets(octets) {
        Ok(query) => query,
        Err(err) => {
            tracing::debug!(error = %err, "could not parse query");
            return err.id().map(Message::make_format_error_response);
        }
    };
    tracing::Span::current().record("id", query.header.id);

    if query.header.is_response {
        return Some(Message::make_format_error_response(query.header.id));
    }

    let mut response = query.make_response();

    let Some(question) = query.questions.first() else {
        return Some(response);
    };

    let name = question.name.to_relative_string();
    let qtype = match question.qtype {
        QueryType::Record(rtype) => rtype,
        QueryType::Wildcard => {
            tracing::info!(%name, "unsupported wildcard query type");
            DNS_RESPONSES_TOTAL.with_label_values(&["*"]).inc();
            return Some(response);
        }
    };

    if is_starved(qtype) {
        tracing::debug!(%name, ?qtype, "starving non-A query type");
        DNS_RESPONSES_TOTAL
            .with_label_values(&[&format!("{qtype:?}")])
            .inc();
        return Some(response);
    }

    if qtype != RecordType::A {
        tracing::info!(%name, ?qtype, "unsupported query type");
        DNS_RESPONSES_TOTAL
            .with_label_values(&[&format!("{qtype:?}")])
            .inc();
        return Some(response);
    }

    let cache_hint = args.cache.get(&name);
    if cache_hint.is_some() {
        DNS_CACHE_HIT_TOTAL.inc();
    } else {
        DNS_CACHE_MISS_TOTAL.inc();
    }

    let timer = DNS_RESOLVE_DURATION_SECONDS
        .with_label_values(&["A"])
        .start_timer();
    let rules = args.rules.current();
    let outcome = resolve(&args.doh, &args.cache, &name, |domain| rules.matches(domain)).await;
    timer.stop_and_record();

    if let Some(cname) = outcome.first_cname.as_deref() {
        tracing::debug!(%name, %cname, "query followed a CNAME chain");
    }

    let ip = match outcome.ip.as_deref() {
        None => {
            DNS_DOH_FAILURE_TOTAL.inc();
            tracing::warn!(%name, "resolution failed, replying with empty answer");
            DNS_RESPONSES_TOTAL.with_label_values(&["A"]).inc();
            return Some(response);
        }
        Some(value) => match value.parse::<Ipv4Addr>() {
            Ok(ip) => ip,
            Err(_) => {
                DNS_CACHE_TYPE_CONFLICT_TOTAL.inc();
                tracing::warn!(
                    %name,
                    %value,
                    "resolved value is not an IPv4 address (AAAA or CNAME-target conflation), replying with empty answer"
                );
                DNS_RESPONSES_TOTAL.with_label_values(&["A"]).inc();
                return Some(response);
            }
        },
    };

    // Spec §4.2: the route must be installed before the reply is written
    // when the result should route through the tunnel.
    if outcome.should_route {
        match crate::routing::add_host_route(&ip.to_string(), &args.vpn_iface).await {
            Ok(()) => {
                DNS_ROUTE_INSTALL_TOTAL.inc();
                tracing::info!(%name, %ip, iface = %args.vpn_iface, "route added");
            }
            Err(err) => {
                DNS_ROUTE_INSTALL_FAILURE_TOTAL.inc();
                tracing::warn!(%name, %ip, iface = %args.vpn_iface, error = %err, "failed to add route");
            }
        }
    }

    response.answers.push(ResourceRecord {
        name: question.name.clone(),
        rtype_with_data: RecordTypeWithData::A { address: ip },
        rclass: RecordClass::IN,
        ttl: ANSWER_TTL,
    });

    DNS_RESPONSES_TOTAL.with_label_values(&["A"]).inc();
    Some(response)
}

pub async fn listen_udp_task<T: DohTransport + 'static>(args: ListenArgs<T>, socket: UdpSocket) {
    let (tx, mut rx) = mpsc::channel(32);
    let mut buf = vec![0u8; 512];

    loop {
        tokio::select! {
            Ok((size, peer)) = socket.recv_from(&mut buf) => {
                DNS_REQUESTS_TOTAL.with_label_values(&["udp"]).inc();
                let bytes = BytesMut::from(&buf[..size]);
                let reply = tx.clone();
                let args = args.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_raw_message(args, bytes.as_ref()).await {
                        if reply.send((response, peer)).await.is_err() {
                            tracing::debug!(?peer, "UDP reply channel closed");
                        }
                    }
                });
            }

            Some((message, peer)) = rx.recv() => {
                let bytes = message.to_octets();
                if let Err(error) = socket.send_to(&bytes, peer).await {
                    tracing::debug!(?peer, ?error, "UDP send error");
                }
            }
        }
    }
}

pub async fn listen_tcp_task<T: DohTransport + 'static>(args: ListenArgs<T>, socket: TcpListener) {
    loop {
        match socket.accept().await {
            Ok((stream, peer)) => {
                DNS_REQUESTS_TOTAL.with_label_values(&["tcp"]).inc();
                let args = args.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_tcp_connection(args, stream).await {
                        tracing::debug!(?peer, ?error, "TCP connection error");
                    }
                });
            }
            Err(error) => tracing::debug!(?error, "TCP accept error"),
        }
    }
}

async fn handle_tcp_connection<T: DohTransport + 'static>(
    args: ListenArgs<T>,
    mut stream: TcpStream,
) -> std::io::Result<()> {
    let size = stream.read_u16().await?;
    let mut bytes = vec![0u8; size as usize];
    stream.read_exact(&mut bytes).await?;

    if let Some(response) = handle_raw_message(args, &bytes).await {
        let serialised = response.to_octets();
        let len = serialised.len().min(u16::MAX as usize) as u16;
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(&serialised[..len as usize]).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::rules::RuleSet;
    use dns_resolver::doh::{DohAnswer, DohError, DohResponse, TYPE_A};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubTransport {
        responses: Mutex<HashMap<(String, u16), DohResponse>>,
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

    fn query_message(id: u16, name: &str, rtype: RecordType) -> Message {
        let domain = DomainName::from_relative_str(name).unwrap();
        let question = Question {
            name: domain,
            qtype: QueryType::Record(rtype),
            qclass: QueryClass::Record(RecordClass::IN),
        };
        Message::from_question(id, question)
    }

    fn args_with_transport(
        transport: StubTransport,
        rules: crate::rules::RuleSet,
    ) -> ListenArgs<StubTransport> {
        ListenArgs {
            rules: SharedRuleSet::new(rules),
            cache: SharedCache::new(),
            doh: Arc::new(DohClient::new(transport)),
            vpn_iface: Arc::from("utun3"),
        }
    }

    #[tokio::test]
    async fn aaaa_query_gets_empty_answer() {
        let args = args_with_transport(StubTransport::default(), RuleSet::default());
        let query = query_message(1, "example.com", RecordType::AAAA);
        let response = handle_raw_message(args, &query.to_octets()).await.unwrap();
        assert!(response.answers.is_empty());
        assert_eq!(Rcode::NoError, response.header.rcode);
    }

    #[tokio::test]
    async fn a_query_resolves_and_synthesises_answer() {
        let mut responses = HashMap::new();
        responses.insert(
            ("example.com".to_string(), TYPE_A),
            DohResponse {
                answer: Some(vec![DohAnswer {
                    name: "example.com".into(),
                    rtype: TYPE_A,
                    ttl: 300,
                    data: "93.184.216.34".into(),
                }]),
            },
        );
        let transport = StubTransport { responses: Mutex::new(responses) };
        let args = args_with_transport(transport, RuleSet::default());

        let query = query_message(2, "example.com", RecordType::A);
        let response = handle_raw_message(args, &query.to_octets()).await.unwrap();

        assert_eq!(1, response.answers.len());
        match &response.answers[0].rtype_with_data {
            RecordTypeWithData::A { address } => {
                assert_eq!(Ipv4Addr::new(93, 184, 216, 34), *address);
            }
            other => panic!("unexpected rdata: {other:?}"),
        }
        assert_eq!(ANSWER_TTL, response.answers[0].ttl);
    }

    #[tokio::test]
    async fn failed_resolution_yields_empty_answer() {
        let args = args_with_transport(StubTransport::default(), RuleSet::default());
        let query = query_message(3, "nowhere.invalid", RecordType::A);
        let response = handle_raw_message(args, &query.to_octets()).await.unwrap();
        assert!(response.answers.is_empty());
    }
}
