//! Trust-proxy directive.
//!
//! [`TrustProxySetting`] is the raw value from options (a boolean, a hop
//! count, or address strings). [`TrustProxy::parse`] compiles it and may
//! fail on malformed addresses; the composer treats that failure as
//! recoverable. [`TrustProxy::client_addr`] walks the `X-Forwarded-For`
//! chain right-to-left from the socket peer while each hop is trusted.

use std::convert::Infallible;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ProxyError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TrustProxySetting {
    Flag(bool),
    Hops(u32),
    /// Comma-separated addresses, CIDRs, or named ranges.
    Addresses(String),
    List(Vec<String>),
}

impl Default for TrustProxySetting {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl fmt::Display for TrustProxySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Hops(n) => write!(f, "{n}"),
            Self::Addresses(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl FromStr for TrustProxySetting {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "true" => Self::Flag(true),
            "false" => Self::Flag(false),
            _ => s
                .parse::<u32>()
                .map_or_else(|_| Self::Addresses(s.to_string()), Self::Hops),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustProxy {
    Nothing,
    Everything,
    Hops(u32),
    Ranges(Vec<IpRange>),
}

impl Default for TrustProxy {
    fn default() -> Self {
        Self::Nothing
    }
}

impl TrustProxy {
    pub fn parse(setting: &TrustProxySetting) -> Result<Self, ProxyError> {
        match setting {
            TrustProxySetting::Flag(false) => Ok(Self::Nothing),
            TrustProxySetting::Flag(true) => Ok(Self::Everything),
            TrustProxySetting::Hops(n) => Ok(Self::Hops(*n)),
            TrustProxySetting::Addresses(s) => {
                let items: Vec<&str> = s.split(',').collect();
                Self::from_items(&items, setting)
            }
            TrustProxySetting::List(list) => {
                let items: Vec<&str> = list.iter().map(String::as_str).collect();
                Self::from_items(&items, setting)
            }
        }
    }

    fn from_items(items: &[&str], setting: &TrustProxySetting) -> Result<Self, ProxyError> {
        let mut ranges = Vec::new();
        for item in items.iter().map(|i| i.trim()) {
            if item.is_empty() {
                continue;
            }
            let expanded = named_ranges(item).map_or_else(|| vec![item], |r| r.to_vec());
            for entry in expanded {
                let range = IpRange::parse(entry).map_err(|reason| ProxyError::InvalidTrustProxy {
                    value: setting.to_string(),
                    reason,
                })?;
                ranges.push(range);
            }
        }
        Ok(Self::Ranges(ranges))
    }

    fn trusts(&self, addr: IpAddr, hop: usize) -> bool {
        match self {
            Self::Nothing => false,
            Self::Everything => true,
            Self::Hops(n) => hop < *n as usize,
            Self::Ranges(ranges) => ranges.iter().any(|r| r.contains(addr)),
        }
    }

    /// Resolve the client address from the socket peer and an optional
    /// `X-Forwarded-For` value. An unparseable forwarded entry ends the walk.
    #[must_use]
    pub fn client_addr(&self, peer: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
        let mut current = peer;
        let Some(forwarded_for) = forwarded_for else {
            return current;
        };

        let hops = forwarded_for
            .split(',')
            .rev()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        for (i, hop) in hops.enumerate() {
            if !self.trusts(current, i) {
                return current;
            }
            match hop.parse::<IpAddr>() {
                Ok(ip) => current = ip,
                Err(_) => return current,
            }
        }
        current
    }
}

fn named_ranges(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "loopback" => Some(&["127.0.0.1/8", "::1/128"]),
        "linklocal" => Some(&["169.254.0.0/16", "fe80::/10"]),
        "uniquelocal" => Some(&["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "fc00::/7"]),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    pub fn parse(s: &str) -> Result<Self, String> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let network = addr
            .parse::<IpAddr>()
            .map_err(|_| format!("'{addr}' is not an IP address"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };

        let prefix = match prefix {
            None => max,
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("'{p}' is not a valid prefix length for {addr}"))?,
        };

        Ok(Self { network, prefix })
    }

    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            }
            _ => false,
        }
    }
}
