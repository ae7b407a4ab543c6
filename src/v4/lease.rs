//! v4 lease table & address pool.
//!
//! Keyed by client identity (option 61 if present, else `chaddr[0..hlen]`).
//! The pool is materialised eagerly as a `HashSet`; v4 ranges are small
//! enough that an eager free-set is cheaper than tracking one lazily.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use crate::addr::v4_range_inclusive;
use crate::error::CoreError;
use crate::v4::options::DhcpOption;

pub type ClientKey = Vec<u8>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ip: Ipv4Addr,
    pub client_key: ClientKey,
    pub expires_at: u64,
    pub hostname: Option<String>,
    pub extra_options: Vec<DhcpOption>,
}

#[derive(Debug, Clone)]
pub struct Pool {
    free: HashSet<Ipv4Addr>,
    /// Addresses withheld after DECLINE until an operator clears them,
    /// per RFC 2131: a declined address must not be handed out again
    /// until manually cleared, unlike a released one.
    declined: HashSet<Ipv4Addr>,
    leases: HashMap<ClientKey, Lease>,
    used_ips: HashSet<Ipv4Addr>,
}

impl Pool {
    pub fn new(range_start: Ipv4Addr, range_end: Ipv4Addr) -> Self {
        Self {
            free: v4_range_inclusive(range_start, range_end).collect(),
            declined: HashSet::new(),
            leases: HashMap::new(),
            used_ips: HashSet::new(),
        }
    }

    pub fn leases(&self) -> impl Iterator<Item = &Lease> {
        self.leases.values()
    }

    /// Swap in a new address range without touching existing leases, active
    /// or expired; addresses that fall outside the new range are simply
    /// never reoffered, and leases holding them expire via `sweep` as usual.
    pub fn resize(&mut self, range_start: Ipv4Addr, range_end: Ipv4Addr) {
        self.free = v4_range_inclusive(range_start, range_end)
            .filter(|ip| !self.used_ips.contains(ip))
            .collect();
    }

    pub fn used_ips(&self) -> &HashSet<Ipv4Addr> {
        &self.used_ips
    }

    pub fn lease_for(&self, client_key: &[u8]) -> Option<&Lease> {
        self.leases.get(client_key)
    }

    fn is_available(&self, ip: Ipv4Addr) -> bool {
        self.free.contains(&ip) && !self.used_ips.contains(&ip) && !self.declined.contains(&ip)
    }

    /// If `client_key` already holds a non-expired lease, return it.
    /// Otherwise allocate `requested_ip` if free, else the numerically
    /// lowest free address.
    pub fn allocate(
        &mut self,
        client_key: &[u8],
        requested_ip: Option<Ipv4Addr>,
        now: u64,
        lease_time: u32,
    ) -> Result<Lease, CoreError> {
        if let Some(existing) = self.leases.get(client_key) {
            if existing.expires_at > now {
                return Ok(existing.clone());
            }
        }

        let ip = match requested_ip {
            Some(ip) if self.is_available(ip) => ip,
            _ => {
                let mut candidates: Vec<Ipv4Addr> =
                    self.free.iter().filter(|ip| self.is_available(**ip)).copied().collect();
                candidates.sort();
                *candidates.first().ok_or(CoreError::NoAddressesAvailable)?
            }
        };

        let lease = Lease {
            ip,
            client_key: client_key.to_vec(),
            expires_at: now + lease_time as u64,
            hostname: None,
            extra_options: vec![],
        };
        self.commit(lease.clone());
        Ok(lease)
    }

    fn commit(&mut self, lease: Lease) {
        if let Some(old) = self.leases.insert(lease.client_key.clone(), lease.clone()) {
            self.used_ips.remove(&old.ip);
        }
        self.used_ips.insert(lease.ip);
    }

    /// Record that `requested_ip` is assigned to `client_key`, with the
    /// caller-chosen `hostname`/`extra_options`, advancing `expires_at`.
    pub fn confirm(
        &mut self,
        client_key: &[u8],
        ip: Ipv4Addr,
        now: u64,
        lease_time: u32,
        hostname: Option<String>,
    ) -> Lease {
        let lease = Lease {
            ip,
            client_key: client_key.to_vec(),
            expires_at: now + lease_time as u64,
            hostname,
            extra_options: vec![],
        };
        self.commit(lease.clone());
        lease
    }

    pub fn renew(&mut self, client_key: &[u8], now: u64, lease_time: u32) -> Option<Lease> {
        let lease = self.leases.get_mut(client_key)?;
        lease.expires_at = now + lease_time as u64;
        Some(lease.clone())
    }

    /// Removes the lease only if `client_key` currently holds `ip`.
    pub fn release(&mut self, client_key: &[u8], ip: Ipv4Addr) -> bool {
        if let Some(lease) = self.leases.get(client_key) {
            if lease.ip == ip {
                self.leases.remove(client_key);
                self.used_ips.remove(&ip);
                return true;
            }
        }
        false
    }

    /// Like `release`, but withholds `ip` from future allocation until
    /// `clear_declined` is called.
    pub fn decline(&mut self, client_key: &[u8], ip: Ipv4Addr) -> bool {
        let released = self.release(client_key, ip);
        if released {
            self.declined.insert(ip);
        }
        released
    }

    pub fn clear_declined(&mut self, ip: Ipv4Addr) -> bool {
        self.declined.remove(&ip)
    }

    /// Drop every lease with `expires_at <= now`, returning freed addresses.
    pub fn sweep(&mut self, now: u64) -> Vec<Ipv4Addr> {
        let expired: Vec<ClientKey> = self
            .leases
            .iter()
            .filter(|(_, l)| l.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();

        let mut freed = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(lease) = self.leases.remove(&key) {
                self.used_ips.remove(&lease.ip);
                freed.push(lease.ip);
            }
        }
        freed
    }
}
