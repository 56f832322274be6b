//! IP address pools and derivation rules.
//!
//! Two families of addressing coexist. Pool-driven addressing hands out
//! subnets from a cursor (loopbacks, point-to-point /30s, management
//! hosts) and is stateful within a run. Flat derivation computes an
//! address purely from a router number and a /16 base, so the same
//! router always gets the same address no matter which backend realizes
//! the topology.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

use crate::error::{Result, TopoError};

/// Order-preserving cursor over equal-size subnets of a CIDR block.
///
/// Subnets are handed out in ascending order and never repeat within a
/// run. Exhaustion is a hard error.
#[derive(Debug)]
pub struct AddressPool {
    base: Ipv4Network,
    prefixlen: u8,
    cursor: u64,
    total: u64,
}

impl AddressPool {
    /// Create a pool carving `base` into /`prefixlen` subnets.
    pub fn new(base: Ipv4Network, prefixlen: u8) -> Result<AddressPool> {
        if prefixlen < base.prefix() || prefixlen > 32 {
            return Err(TopoError::Configuration(format!(
                "cannot carve /{} subnets out of {}",
                prefixlen, base
            )));
        }
        let total = 1u64 << (prefixlen - base.prefix());
        Ok(AddressPool { base, prefixlen, cursor: 0, total })
    }

    /// Number of subnets still available.
    pub fn remaining(&self) -> u64 {
        self.total - self.cursor
    }

    /// Hand out the next subnet.
    pub fn next(&mut self) -> Result<Ipv4Network> {
        if self.cursor >= self.total {
            return Err(TopoError::AddressExhausted(format!(
                "pool {} has no /{} subnets left",
                self.base, self.prefixlen
            )));
        }
        let step = 1u64 << (32 - self.prefixlen);
        let addr = u32::from(self.base.network()) as u64 + self.cursor * step;
        self.cursor += 1;
        let net = Ipv4Network::new(Ipv4Addr::from(addr as u32), self.prefixlen)
            .map_err(|e| TopoError::Configuration(e.to_string()))?;
        Ok(net)
    }

    /// Skip the next subnet without handing it out.
    pub fn skip(&mut self) -> Result<()> {
        self.next().map(|_| ())
    }
}

/// Stateful allocator owning the loopback and point-to-point pools.
///
/// The first subnet of each pool is reserved and never handed out, so
/// generated addresses never collide with the pool's own network
/// infrastructure conventions.
#[derive(Debug)]
pub struct AddressAllocator {
    loopbacks: AddressPool,
    p2p: AddressPool,
}

impl AddressAllocator {
    pub fn new(loopback_cidr: Ipv4Network, p2p_cidr: Ipv4Network) -> Result<AddressAllocator> {
        let mut loopbacks = AddressPool::new(loopback_cidr, 32)?;
        let mut p2p = AddressPool::new(p2p_cidr, 30)?;
        loopbacks.skip()?;
        p2p.skip()?;
        Ok(AddressAllocator { loopbacks, p2p })
    }

    /// Next /32 loopback interface.
    pub fn next_loopback(&mut self) -> Result<Ipv4Network> {
        self.loopbacks.next()
    }

    /// The two host addresses of the next /30, carrying the /30 mask.
    pub fn next_p2p_pair(&mut self) -> Result<(Ipv4Network, Ipv4Network)> {
        let net = self.p2p.next()?;
        let first = nth_host(net, 1)?;
        let second = nth_host(net, 2)?;
        Ok((first, second))
    }

    pub fn loopbacks_remaining(&self) -> u64 {
        self.loopbacks.remaining()
    }

    pub fn p2p_remaining(&self) -> u64 {
        self.p2p.remaining()
    }
}

/// Derive the flat-fabric address for a router number.
///
/// The last two octets of the /16 base become `(index / 256) & 0xff`
/// and `index % 256`. For indices 1..=65535 this mapping is a
/// bijection, so every router gets a distinct, stable address.
pub fn derive_flat_address(index: u32, base: Ipv4Network) -> Ipv4Network {
    let octets = base.network().octets();
    let hi = ((index / 256) & 0xff) as u8;
    let lo = (index % 256) as u8;
    let addr = Ipv4Addr::new(octets[0], octets[1], hi, lo);
    // Prefix came from a valid network, so the rebuild cannot fail.
    Ipv4Network::new(addr, base.prefix()).unwrap_or(base)
}

/// Flat-derived /32 loopback for a router number.
pub fn derive_flat_loopback(index: u32, base: Ipv4Network) -> Ipv4Network {
    let derived = derive_flat_address(index, base);
    Ipv4Network::new(derived.ip(), 32).unwrap_or(derived)
}

/// Host `n` of a network: network address + n, keeping the prefix.
pub fn nth_host(net: Ipv4Network, n: u32) -> Result<Ipv4Network> {
    let base = u32::from(net.network()) as u64;
    let span = 1u64 << (32 - net.prefix());
    if (n as u64) >= span {
        return Err(TopoError::AddressExhausted(format!(
            "host offset {} does not fit in {}",
            n, net
        )));
    }
    let addr = Ipv4Addr::from((base + n as u64) as u32);
    Ipv4Network::new(addr, net.prefix()).map_err(|e| TopoError::Configuration(e.to_string()))
}
