//! Top-level error type, aggregating the fatal causes a [`crate::supervisor::Supervisor`]
//! can fail to start with (spec §7's error table — only the `Fatal` rows
//! surface here; `Degrade`/`Log` rows are handled at their call site and
//! never propagate past it).

use std::fmt;

#[derive(Debug)]
pub enum Error {
    ConfigLoad(crate::settings::Error),
    RuleLoad(crate::rules::Error),
    TunnelMissing(crate::routing::Error),
    VpnClientDown,
    Bind { address: String, source: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigLoad(err) => write!(f, "failed to load configuration: {err}"),
            Error::RuleLoad(err) => write!(f, "failed to load rule list: {err}"),
            Error::TunnelMissing(err) => write!(f, "no tunnel interface found: {err}"),
            Error::VpnClientDown => {
                write!(f, "OpenVPN is not running; start your VPN profile first")
            }
            Error::Bind { address, source } => {
                write!(f, "failed to bind {address}: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConfigLoad(err) => Some(err),
            Error::RuleLoad(err) => Some(err),
            Error::TunnelMissing(err) => Some(err),
            Error::VpnClientDown => None,
            Error::Bind { source, .. } => Some(source),
        }
    }
}

impl From<crate::settings::Error> for Error {
    fn from(err: crate::settings::Error) -> Self {
        Error::ConfigLoad(err)
    }
}

impl From<crate::rules::Error> for Error {
    fn from(err: crate::rules::Error) -> Self {
        Error::RuleLoad(err)
    }
}
