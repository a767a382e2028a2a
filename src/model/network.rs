use crate::error::{LbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in prefix notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(LbError::validation(format!("invalid prefix length /{prefix}")));
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask_bits(prefix));
        Ok(Self { network, prefix })
    }

    /// Builds a network from an address and a dotted netmask, as route tables report them.
    pub fn from_netmask(addr: &str, netmask: &str) -> Result<Self> {
        let addr = parse_ipv4(addr)?;
        let mask = u32::from(parse_ipv4(netmask)?);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(LbError::validation(format!("non-contiguous netmask {netmask}")));
        }
        Self::new(addr, mask.leading_ones() as u8)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(Self::mask_bits(self.prefix))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & Self::mask_bits(self.prefix) == u32::from(self.network)
    }

    /// Like [`Cidr::contains`], but for textual addresses. Unparsable input is never contained.
    pub fn contains_str(&self, ip: &str) -> bool {
        ip.parse::<Ipv4Addr>().map(|ip| self.contains(ip)).unwrap_or(false)
    }

    /// Usable host addresses, skipping network and broadcast for prefixes below /31.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let base = u32::from(self.network);
        let size = 1u64 << (32 - self.prefix as u32);
        let (first, last) = if size <= 2 {
            (0, size - 1)
        } else {
            (1, size - 2)
        };
        (first..=last).map(move |offset| Ipv4Addr::from(base.wrapping_add(offset as u32)))
    }

    fn mask_bits(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix as u32)
        }
    }
}

impl FromStr for Cidr {
    type Err = LbError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| LbError::validation(format!("'{s}' is not in CIDR notation")))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| LbError::validation(format!("invalid prefix in '{s}'")))?;
        Self::new(parse_ipv4(addr)?, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = LbError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(value: Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    s.trim()
        .parse()
        .map_err(|_| LbError::validation(format!("'{s}' is not an IPv4 address")))
}

/// A set of networks reachable from one routing domain of an appliance
/// (an Avi network object, a Netscaler traffic domain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingContext {
    pub name: String,
    pub source_uuid: String,
    pub networks: Vec<Cidr>,
}

impl RoutingContext {
    pub fn contains(&self, ip: &str) -> bool {
        self.networks.iter().any(|net| net.contains_str(ip))
    }
}

/// First routing context that contains `ip`.
pub fn find_routing_context<'a>(
    contexts: &'a [RoutingContext],
    ip: &str,
) -> Option<&'a RoutingContext> {
    contexts.iter().find(|ctx| ctx.contains(ip))
}
