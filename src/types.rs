//! Core types used throughout splitpath.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ipnet::Ipv4Net;

use crate::error::{Error, Result};

/// Number of egress interfaces a router exposes.
pub const INTERFACE_COUNT: usize = 4;

/// Destination key: an IPv4 prefix address and its mask.
///
/// Lookups are asymmetric: an entry stored as `(addr, mask)` matches a query
/// `(q_addr, q_mask)` when `addr & mask == q_addr & q_mask`. The stored mask
/// applies to the stored address and the query mask to the query address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    /// Prefix address as configured (host bits are kept, not zeroed).
    pub addr: Ipv4Addr,
    /// Prefix mask.
    pub mask: Ipv4Addr,
}

impl Prefix {
    /// Create a prefix from an address and a dotted mask.
    pub const fn new(addr: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { addr, mask }
    }

    /// Create a prefix from an address and a prefix length.
    pub fn with_len(addr: Ipv4Addr, len: u8) -> Result<Self> {
        let net = Ipv4Net::new(addr, len)
            .map_err(|_| Error::InvalidPrefix(format!("{addr}/{len}")))?;
        Ok(Self::from(net))
    }

    /// The stored address with the stored mask applied.
    pub fn network(&self) -> u32 {
        u32::from(self.addr) & u32::from(self.mask)
    }

    /// Whether two prefixes name the same route: same network, same mask.
    pub fn same_key(&self, other: &Prefix) -> bool {
        self.mask == other.mask && self.network() == other.network()
    }

    /// Whether a query `(addr, mask)` selects this prefix.
    pub fn matches(&self, addr: Ipv4Addr, mask: Ipv4Addr) -> bool {
        self.network() == u32::from(addr) & u32::from(mask)
    }

    /// Prefix length if the mask is contiguous.
    pub fn prefix_len(&self) -> Option<u8> {
        ipnet::ipv4_mask_to_prefix(self.mask).ok()
    }
}

impl From<Ipv4Net> for Prefix {
    /// Keeps the host bits of the network's address.
    fn from(net: Ipv4Net) -> Self {
        Self::new(net.addr(), net.netmask())
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix_len() {
            Some(len) => write!(f, "{}/{}", self.addr, len),
            None => write!(f, "{}/{}", self.addr, self.mask),
        }
    }
}

impl FromStr for Prefix {
    type Err = Error;

    /// Parses `a.b.c.d/len` or `a.b.c.d/m.m.m.m`. A bare address is a /32.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPrefix(s.to_string());
        let s = s.trim();

        match s.split_once('/') {
            Some((addr, mask)) if mask.contains('.') => {
                let addr: Ipv4Addr = addr.trim().parse().map_err(|_| invalid())?;
                let mask: Ipv4Addr = mask.trim().parse().map_err(|_| invalid())?;
                Ok(Self::new(addr, mask))
            }
            Some(_) => s.parse::<Ipv4Net>().map(Self::from).map_err(|_| invalid()),
            None => s
                .parse::<Ipv4Addr>()
                .map(|addr| Self::from(Ipv4Net::from(addr)))
                .map_err(|_| invalid()),
        }
    }
}

/// Egress interface of the router.
///
/// The set is closed: names outside it are rejected rather than mapped onto
/// an arbitrary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interface {
    Eth0,
    Eth1,
    Eth2,
    Eth3,
}

impl Interface {
    /// Every interface, in slot order.
    pub const ALL: [Interface; INTERFACE_COUNT] =
        [Interface::Eth0, Interface::Eth1, Interface::Eth2, Interface::Eth3];

    /// Slot index of this interface in per-interface arrays.
    pub const fn index(self) -> usize {
        match self {
            Interface::Eth0 => 0,
            Interface::Eth1 => 1,
            Interface::Eth2 => 2,
            Interface::Eth3 => 3,
        }
    }

    /// Interface name as the system knows it.
    pub const fn name(self) -> &'static str {
        match self {
            Interface::Eth0 => "eth0",
            Interface::Eth1 => "eth1",
            Interface::Eth2 => "eth2",
            Interface::Eth3 => "eth3",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Interface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Interface::ALL
            .into_iter()
            .find(|iface| iface.name() == s)
            .ok_or_else(|| Error::UnknownInterface(s.to_string()))
    }
}

/// Wall-clock reading with second and microsecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch.
    pub secs: u64,
    /// Sub-second part, always below 1_000_000.
    pub micros: u32,
}

impl Timestamp {
    pub const ZERO: Self = Self { secs: 0, micros: 0 };

    /// Create a timestamp, carrying excess microseconds into seconds.
    pub fn new(secs: u64, micros: u32) -> Self {
        Self {
            secs: secs + u64::from(micros / 1_000_000),
            micros: micros % 1_000_000,
        }
    }

    /// Read the system clock.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: since_epoch.as_secs(),
            micros: since_epoch.subsec_micros(),
        }
    }

    /// This timestamp moved forward by `d`.
    pub fn after(self, d: Duration) -> Self {
        let micros = u64::from(self.micros) + u64::from(d.subsec_micros());
        Self {
            secs: self.secs + d.as_secs() + micros / 1_000_000,
            micros: (micros % 1_000_000) as u32,
        }
    }

    /// Seconds elapsed from `earlier` to `self`.
    ///
    /// Negative when the clock went backwards between the two readings.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        if self.secs == earlier.secs {
            (i64::from(self.micros) - i64::from(earlier.micros)) as f64 / 1_000_000.0
        } else {
            let whole = self.secs as i64 - earlier.secs as i64 - 1;
            let frac = (1_000_000 - i64::from(earlier.micros)) + i64::from(self.micros);
            whole as f64 + frac as f64 / 1_000_000.0
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}
