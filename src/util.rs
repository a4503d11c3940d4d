use std::{future::Future, net::IpAddr, time::Duration};

use anyhow::{Context, Result, anyhow};
use ipnet::IpNet;
use tokio::time::timeout;

/// Represents either a single IP address or a CIDR network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpOrCidr {
    Ip(IpAddr),
    Cidr(IpNet),
}

impl IpOrCidr {
    /// IPv4-mapped IPv6 addresses are compared in their IPv4 form.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = canonical_ip(addr);
        match self {
            IpOrCidr::Ip(ip) => canonical_ip(*ip) == addr,
            IpOrCidr::Cidr(net) => net.contains(&addr),
        }
    }
}

/// Parses a string into either an IP address or a CIDR block.
pub fn parse_ip_or_cidr(value: &str) -> Result<IpOrCidr> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("value must not be empty"));
    }

    if trimmed.contains('/') {
        let net = trimmed
            .parse::<IpNet>()
            .with_context(|| format!("invalid CIDR '{trimmed}'"))?;
        Ok(IpOrCidr::Cidr(net))
    } else {
        let ip = trimmed
            .parse::<IpAddr>()
            .with_context(|| format!("invalid IP address '{trimmed}'"))?;
        Ok(IpOrCidr::Ip(ip))
    }
}

pub fn canonical_ip(addr: IpAddr) -> IpAddr {
    if let IpAddr::V6(v6) = addr
        && let Some(mapped) = v6.to_ipv4_mapped()
    {
        return IpAddr::V4(mapped);
    }
    addr
}

/// First hop of an `X-Forwarded-For` value.
pub fn first_forwarded_for(value: &str) -> Option<IpAddr> {
    value.split(',').next()?.trim().parse().ok()
}

/// Wraps `tokio::time::timeout`, converting elapsed deadlines and inner errors into contextual
/// `anyhow::Error` values for consistent diagnostics.
pub async fn timeout_with_context<F, T>(
    duration: Duration,
    future: F,
    context: impl Into<String>,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let context = context.into();
    timeout(duration, future)
        .await
        .map_err(|_| anyhow!("timed out {context}"))?
        .with_context(|| format!("failed while {context}"))
}
