//! Command-line surface (spec §6/§2.4), `clap`-derived the way
//! `examples/barrucadu-resolved/bin-resolved/src/main.rs`'s `Args` struct
//! is: doc comments on fields become `--help` text. Spec §6's entire
//! required surface is a single `--start` flag (no-op otherwise); the
//! `--config`/`--cache-file`/`--rule-file`/`--subscriptions`/
//! `--metrics-address`/`--metrics-port` flags are the ambient operational
//! plumbing a real deployment needs around that flag, grounded on
//! `original_source/cmd/main.go`'s REPL argument handling and on the
//! teacher's own `--metrics-interface`/`--metrics-port` pair.

use std::net::Ipv4Addr;

use clap::Parser;

/// A selective split-tunnel DNS interceptor.
///
/// Decides, per query, whether a domain's traffic should travel through
/// the VPN tunnel interface (driven by a list of domain-suffix rules) or
/// the physical default gateway, and pins matching hosts to the tunnel
/// with a static route before the DNS reply reaches the client.
#[derive(Debug, Parser)]
pub struct Args {
    /// Start the DNS listener and routing plane. With no flags, prints
    /// usage and exits 0 (spec §6).
    #[clap(long)]
    pub start: bool,

    /// Interface to bind the DNS listener on.
    #[clap(long, value_parser, default_value_t = Ipv4Addr::UNSPECIFIED)]
    pub interface: Ipv4Addr,

    /// Path to the INI configuration file.
    #[clap(long, value_parser, default_value = "config.ini")]
    pub config: String,

    /// Path to the persisted DNS cache file.
    #[clap(long, value_parser, default_value = "assets/cache.json")]
    pub cache_file: String,

    /// Path to the merged domain-suffix rule file.
    #[clap(long, value_parser, default_value = "assets/merged_rule.list")]
    pub rule_file: String,

    /// Path to the subscription URL list.
    #[clap(long, value_parser, default_value = "assets/subscriptions.txt")]
    pub subscriptions: String,

    /// Interface to serve Prometheus metrics on.
    #[clap(long, value_parser, default_value_t = Ipv4Addr::LOCALHOST)]
    pub metrics_address: Ipv4Addr,

    /// Port to serve Prometheus metrics on.
    #[clap(long, value_parser, default_value_t = 9420)]
    pub metrics_port: u16,
}
