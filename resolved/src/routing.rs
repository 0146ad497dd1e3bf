//! Routing plane (spec §4.5): tunnel-interface discovery, host-route
//! installation, and default-route correction. Grounded on
//! `examples/original_source/vpn/openvpn.go`'s `FindVPNInterface` and
//! `vpn/router.go`'s `AddRoute`/`DeleteDefaultVPNRoutes`/`GetRouteInterface`,
//! reworked from one-shot `exec.Command` calls into `tokio::process::Command`
//! invocations the way the teacher shells out to its own platform tools
//! (there is no direct teacher analogue — `barrucadu-resolved` never
//! touches the kernel route table — so this module's shape follows the
//! teacher's error-enum/`Display`/`source` convention from
//! `dns-resolver`'s own error types rather than a specific function).

use std::fmt;
use std::net::Ipv4Addr;

use tokio::process::Command;

/// OS-specific tunnel-interface name prefix (spec §3: "`utun` on the target
/// OS").
pub const TUNNEL_INTERFACE_PREFIX: &str = "utun";

/// The two split-half catch-all routes OpenVPN installs to override the
/// default gateway without replacing it (spec §1 glossary).
const CATCH_ALL_ROUTES: [&str; 2] = ["0.0.0.0/1", "128.0.0.0/1"];

/// Enumerate live network interfaces and return the first that is
/// administratively up, has a name beginning with
/// [`TUNNEL_INTERFACE_PREFIX`], and has at least one bound IPv4 address
/// (spec §4.5). There is no stable tie-breaker: enumeration order is
/// OS-defined, mirrored here by deferring to whatever order `if_addrs`
/// (or the platform) returns.
pub fn find_tunnel_interface(interfaces: &[InterfaceInfo]) -> Result<String, Error> {
    interfaces
        .iter()
        .find(|iface| {
            iface.is_up
                && iface.name.starts_with(TUNNEL_INTERFACE_PREFIX)
                && iface.ipv4_addrs.iter().any(|_| true)
        })
        .map(|iface| iface.name.clone())
        .ok_or(Error::NoTunnelInterface)
}

/// A minimal view of a host network interface, decoupled from whichever
/// platform enumeration crate supplies it so [`find_tunnel_interface`] can
/// be unit tested without touching the real network stack.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub is_up: bool,
    pub ipv4_addrs: Vec<Ipv4Addr>,
}

/// Install a host-scoped route pinning `ip` to `iface` by invoking the
/// platform `route` utility as a privileged child process (spec §4.5:
/// `route -n add <ip> -interface <iface>`, run under `sudo`).
pub async fn add_host_route(ip: &str, iface: &str) -> Result<(), Error> {
    run_route(&["-n", "add", ip, "-interface", iface])
        .await
        .map_err(|source| Error::RouteInstall {
            ip: ip.to_string(),
            iface: iface.to_string(),
            source,
        })
}

/// Remove the two OpenVPN catch-all routes so the system default route
/// reverts to whatever the physical gateway installed (spec §4.5). Best
/// effort: per-route delete failures are logged by the caller, not
/// propagated — this function always returns `Ok`.
pub async fn delete_default_vpn_routes() -> Vec<(String, RouteError)> {
    let mut failures = Vec::new();
    for route in CATCH_ALL_ROUTES {
        if let Err(source) = run_route(&["-n", "delete", route]).await {
            failures.push((route.to_string(), source));
        }
    }
    failures
}

/// Query the kernel for the current default gateway, remove up to three
/// stacked default routes, then install a single default pointing at the
/// discovered gateway (spec §4.5). Fails loudly only if no gateway can be
/// parsed from the route-inspector output.
pub async fn correct_default_route() -> Result<Ipv4Addr, Error> {
    let output = run_route_for_output(&["get", "default"])
        .await
        .map_err(Error::RouteCorrect)?;
    let gateway = parse_gateway(&output).ok_or(Error::NoGateway)?;

    for _ in 0..3 {
        let _ = run_route(&["-n", "delete", "default"]).await;
    }

    run_route(&["-n", "add", "default", &gateway.to_string()])
        .await
        .map_err(Error::RouteCorrect)?;

    Ok(gateway)
}

/// Parse a `gateway: A.B.C.D` line out of the platform route-inspector's
/// output (spec §4.5).
fn parse_gateway(output: &str) -> Option<Ipv4Addr> {
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("gateway:") {
            if let Ok(addr) = rest.trim().parse() {
                return Some(addr);
            }
        }
    }
    None
}

/// Query the kernel for which interface currently carries traffic to `ip`
/// (spec §4.5), by parsing `interface: <name>` out of `route get <ip>`'s
/// output, matching `vpn.GetRouteInterface` in the original source.
pub async fn get_route_interface(ip: &str) -> Result<String, Error> {
    let output = run_route_for_output(&["get", ip])
        .await
        .map_err(Error::RouteCorrect)?;

    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("interface:") {
            let iface = rest.trim();
            if !iface.is_empty() {
                return Ok(iface.to_string());
            }
        }
    }
    Err(Error::NoGateway)
}

async fn run_route(args: &[&str]) -> Result<(), RouteError> {
    let status = Command::new("sudo")
        .arg("route")
        .args(args)
        .status()
        .await
        .map_err(RouteError::Spawn)?;
    if status.success() {
        Ok(())
    } else {
        Err(RouteError::NonZeroExit(status.code()))
    }
}

async fn run_route_for_output(args: &[&str]) -> Result<String, RouteError> {
    let output = Command::new("route")
        .args(args)
        .output()
        .await
        .map_err(RouteError::Spawn)?;
    if !output.status.success() {
        return Err(RouteError::NonZeroExit(output.status.code()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug)]
pub enum RouteError {
    Spawn(std::io::Error),
    NonZeroExit(Option<i32>),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Spawn(err) => write!(f, "could not spawn route utility: {err}"),
            RouteError::NonZeroExit(code) => write!(f, "route utility exited with {code:?}"),
        }
    }
}

impl std::error::Error for RouteError {}

#[derive(Debug)]
pub enum Error {
    NoTunnelInterface,
    RouteInstall {
        ip: String,
        iface: String,
        source: RouteError,
    },
    RouteCorrect(RouteError),
    NoGateway,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoTunnelInterface => {
                write!(f, "no active tunnel interface with an IPv4 address found")
            }
            Error::RouteInstall { ip, iface, source } => {
                write!(f, "failed to add route {ip} -> {iface}: {source}")
            }
            Error::RouteCorrect(source) => write!(f, "failed to correct default route: {source}"),
            Error::NoGateway => write!(f, "could not parse default gateway from route output"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NoTunnelInterface | Error::NoGateway => None,
            Error::RouteInstall { source, .. } => Some(source),
            Error::RouteCorrect(source) => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, is_up: bool, ipv4: &[&str]) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            is_up,
            ipv4_addrs: ipv4.iter().map(|s| s.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn finds_first_up_utun_with_ipv4() {
        let interfaces = vec![
            iface("lo0", true, &["127.0.0.1"]),
            iface("utun0", false, &[]),
            iface("utun3", true, &["10.8.0.2"]),
        ];
        assert_eq!("utun3", find_tunnel_interface(&interfaces).unwrap());
    }

    #[test]
    fn no_tunnel_interface_is_an_error() {
        let interfaces = vec![iface("en0", true, &["192.168.1.5"])];
        assert!(find_tunnel_interface(&interfaces).is_err());
    }

    #[test]
    fn down_tunnel_interface_is_skipped() {
        let interfaces = vec![iface("utun0", false, &["10.8.0.2"])];
        assert!(find_tunnel_interface(&interfaces).is_err());
    }

    #[test]
    fn parses_gateway_line() {
        let output = "   route to: default\ndestination: default\n   gateway: 192.168.1.1\n    flags: <UP,GATEWAY>\n";
        assert_eq!(
            Some(Ipv4Addr::new(192, 168, 1, 1)),
            parse_gateway(output)
        );
    }

    #[test]
    fn missing_gateway_line_is_none() {
        let output = "destination: default\nflags: <UP,GATEWAY>\n";
        assert_eq!(None, parse_gateway(output));
    }
}
