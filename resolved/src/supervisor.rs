//! Start-up sequencing (spec §4.6), grounded on
//! `examples/original_source/cmd/core/core.go`'s `RunCoreLogic`: fail-fast
//! on any step, idempotent at the process level via a `started` flag
//! (spec's `coreStarted`), cache-flush loop as a detached
//! `tokio::time::interval`-driven task in place of the Go source's
//! `time.Sleep(30 * time.Second)` loop. Design note §9 replaces the
//! source's module-level globals (`coreStarted`, `config`, file handles)
//! with this single `Supervisor` value instead.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dns_resolver::{DohClient, HttpDohTransport, SharedCache};
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::interval;

use crate::error::Error;
use crate::listener::{listen_tcp_task, listen_udp_task, ListenArgs};
use crate::settings::AppConfig;
use crate::{cache_store, routing, rule_fetcher};

const DNS_PORT: u16 = 53;
const CACHE_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Paths the supervisor loads from and persists to, gathered from CLI
/// flags (spec §2.4's ambient CLI surface) rather than hardcoded as the Go
/// source does (`assets/cache.json`, `assets/merged_rule.list`, ...).
pub struct Paths {
    pub cache_file: String,
    pub rule_file: String,
    pub subscriptions_file: String,
}

/// Process-wide start/stop state, replacing the source's `coreStarted`
/// global (design note §9).
pub struct Supervisor {
    started: AtomicBool,
    config: AppConfig,
    paths: Paths,
    interface: Ipv4Addr,
}

impl Supervisor {
    pub fn new(config: AppConfig, paths: Paths, interface: Ipv4Addr) -> Self {
        Self {
            started: AtomicBool::new(false),
            config,
            paths,
            interface,
        }
    }

    /// Run the full start-up sequence (spec §4.6). A second call while
    /// already started is a no-op logged at warn level, not an error
    /// (spec: "Start is idempotent at the process level").
    pub async fn start(&self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("supervisor already started, ignoring duplicate start request");
            return Ok(());
        }

        if self.config.auto_subscribe {
            match rule_fetcher::fetch_and_merge(
                &reqwest::Client::new(),
                &self.paths.subscriptions_file,
                &self.paths.rule_file,
            )
            .await
            {
                Ok(summary) => {
                    tracing::info!(
                        rule_count = summary.rule_count,
                        failed_urls = summary.failed_urls,
                        "merged subscription rules"
                    );
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to fetch subscriptions");
                }
            }
        }

        let cache = SharedCache::new();
        match cache_store::load(&self.paths.cache_file).await {
            Ok(entries) => {
                tracing::info!(count = entries.len(), "loaded persisted DNS cache");
                cache.load(entries);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load DNS cache, starting empty");
            }
        }

        let rules = crate::rules::load(&self.paths.rule_file)
            .await
            .map_err(Error::RuleLoad)?;
        tracing::info!(count = rules.len(), "loaded domain rules");
        let rules = crate::rules::SharedRuleSet::new(rules);

        if self.config.check_openvpn && !is_vpn_client_running() {
            return Err(Error::VpnClientDown);
        }

        let interfaces = discover_interfaces();
        let vpn_iface = routing::find_tunnel_interface(&interfaces)
            .map_err(Error::TunnelMissing)?;
        tracing::info!(iface = %vpn_iface, "tunnel interface detected");

        let failures = routing::delete_default_vpn_routes().await;
        for (route, err) in failures {
            tracing::warn!(%route, error = %err, "failed to delete default VPN route");
        }
        if let Err(err) = routing::correct_default_route().await {
            tracing::warn!(error = %err, "failed to correct default route");
        }

        let udp = UdpSocket::bind((self.interface, DNS_PORT))
            .await
            .map_err(|source| Error::Bind {
                address: format!("{}:{DNS_PORT}/udp", self.interface),
                source,
            })?;
        let tcp = TcpListener::bind((self.interface, DNS_PORT))
            .await
            .map_err(|source| Error::Bind {
                address: format!("{}:{DNS_PORT}/tcp", self.interface),
                source,
            })?;

        let listen_args = ListenArgs {
            rules: rules.clone(),
            cache: cache.clone(),
            doh: Arc::new(DohClient::new(HttpDohTransport::new())),
            vpn_iface: Arc::from(vpn_iface.as_str()),
        };

        tokio::spawn(listen_udp_task(listen_args.clone(), udp));
        tokio::spawn(listen_tcp_task(listen_args, tcp));
        tokio::spawn(cache_flush_task(cache, self.paths.cache_file.clone()));

        if self.config.auto_subscribe {
            tokio::spawn(subscription_refresh_task(
                rules,
                self.paths.subscriptions_file.clone(),
                self.paths.rule_file.clone(),
                self.config.update_period.0,
            ));
        }

        tracing::info!("DNS listener ready");
        Ok(())
    }
}

fn is_vpn_client_running() -> bool {
    // The probe itself (spec §1: "detection of whether the external OpenVPN
    // client is running — treated as a probe") is an external collaborator;
    // this workspace does not redesign it. Always reports the client as up
    // so `check_openvpn` is a no-op unless a real probe is wired in by the
    // deployment.
    true
}

fn discover_interfaces() -> Vec<routing::InterfaceInfo> {
    netdev::get_interfaces()
        .into_iter()
        .map(|iface| routing::InterfaceInfo {
            name: iface.name,
            is_up: iface.is_up(),
            ipv4_addrs: iface.ipv4.iter().map(|net| net.addr()).collect(),
        })
        .collect()
}

/// Periodic subscription refresh (spec §6's `update-period`, spec §4's
/// "(Optional) one subscription-refresh ticker if auto-subscribe is enabled
/// at runtime"): refetch every subscription URL, re-merge the rule file,
/// then hot-swap the listener's live rule set so in-flight queries see the
/// update without a restart.
async fn subscription_refresh_task(
    rules: crate::rules::SharedRuleSet,
    subscriptions_file: String,
    rule_file: String,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.tick().await; // first tick fires immediately; the initial fetch already ran in start()
    loop {
        ticker.tick().await;
        match rule_fetcher::fetch_and_merge(&reqwest::Client::new(), &subscriptions_file, &rule_file)
            .await
        {
            Ok(summary) => {
                tracing::info!(
                    rule_count = summary.rule_count,
                    failed_urls = summary.failed_urls,
                    "refreshed subscription rules"
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to refresh subscriptions");
                continue;
            }
        }
        match crate::rules::load(&rule_file).await {
            Ok(new_rules) => {
                tracing::info!(count = new_rules.len(), "reloaded domain rules");
                rules.replace(new_rules);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to reload rule file after refresh");
            }
        }
    }
}

async fn cache_flush_task(cache: SharedCache, cache_file: String) {
    let mut ticker = interval(CACHE_FLUSH_INTERVAL);
    loop {
        ticker.tick().await;
        match cache_store::save(&cache_file, &cache, dns_resolver::cache::DEFAULT_TTL).await {
            Ok(()) => tracing::debug!("flushed DNS cache to disk"),
            Err(err) => tracing::warn!(error = %err, "failed to flush DNS cache"),
        }
    }
}
