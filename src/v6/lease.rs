//! v6 lease table & address pool.
//!
//! A client (DUID) may own leases under multiple IAIDs, so the table is a
//! two-level map `duid -> iaid -> Lease`.

use std::collections::{HashMap, HashSet};
use std::net::Ipv6Addr;

use crate::addr::v6_range_inclusive;
use crate::error::CoreError;
use crate::v6::options::RawOption;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ip: Ipv6Addr,
    pub duid: Vec<u8>,
    pub iaid: u32,
    pub expires_at: u64,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    /// MAC extracted from a DUID-LLT/DUID-LL or an EUI-64 link-local source
    /// address, carried as a display hint only; the DUID remains the key.
    pub mac_hint: Option<[u8; 6]>,
    pub extra_options: Vec<RawOption>,
}

/// How long a SOLICIT-time reservation holds an address before it lapses,
/// in seconds. Short enough that a client that never sends REQUEST (e.g.
/// because another server won the multi-server SOLICIT race) doesn't tie
/// the address up for anywhere near a full lease.
const RESERVATION_TTL: u64 = 60;

#[derive(Debug, Clone)]
pub struct Pool {
    free: HashSet<Ipv6Addr>,
    leases: HashMap<Vec<u8>, HashMap<u32, Lease>>,
    used_ips: HashSet<Ipv6Addr>,
    /// Tentative holds from an ADVERTISE that hasn't been confirmed by a
    /// matching REQUEST yet. Keyed like `leases` but never promoted into
    /// `used_ips`, so a losing server in a multi-server SOLICIT doesn't
    /// leak the address it offered.
    reservations: HashMap<(Vec<u8>, u32), (Ipv6Addr, u64)>,
}

impl Pool {
    pub fn new(range_start: Ipv6Addr, range_end: Ipv6Addr) -> Self {
        Self {
            free: v6_range_inclusive(range_start, range_end).collect(),
            leases: HashMap::new(),
            used_ips: HashSet::new(),
            reservations: HashMap::new(),
        }
    }

    pub fn leases(&self) -> impl Iterator<Item = &Lease> {
        self.leases.values().flat_map(|by_iaid| by_iaid.values())
    }

    /// Swap in a new address range without touching existing leases, active
    /// or expired; addresses that fall outside the new range are simply
    /// never reoffered, and leases holding them expire via `sweep` as usual.
    pub fn resize(&mut self, range_start: Ipv6Addr, range_end: Ipv6Addr) {
        self.free = v6_range_inclusive(range_start, range_end)
            .filter(|ip| !self.used_ips.contains(ip))
            .collect();
    }

    pub fn used_ips(&self) -> &HashSet<Ipv6Addr> {
        &self.used_ips
    }

    pub fn lease_for(&self, duid: &[u8], iaid: u32) -> Option<&Lease> {
        self.leases.get(duid)?.get(&iaid)
    }

    pub fn leases_for_duid(&self, duid: &[u8]) -> Vec<&Lease> {
        self.leases.get(duid).map(|m| m.values().collect()).unwrap_or_default()
    }

    fn is_available(&self, ip: Ipv6Addr) -> bool {
        self.free.contains(&ip) && !self.used_ips.contains(&ip)
    }

    fn is_reservable(&self, ip: Ipv6Addr) -> bool {
        self.is_available(ip) && !self.reservations.values().any(|(held, _)| *held == ip)
    }

    fn expire_reservations(&mut self, now: u64) {
        self.reservations.retain(|_, (_, expires_at)| *expires_at > now);
    }

    /// Tentatively hold an address for `(duid, iaid)` without committing it:
    /// no entry is added to `leases` or `used_ips`, so the address can still
    /// be offered elsewhere if this hold lapses. Meant for ADVERTISE; use
    /// `allocate` when the commitment is real (REQUEST, or a rapid-commit
    /// SOLICIT).
    pub fn reserve(
        &mut self,
        duid: &[u8],
        iaid: u32,
        requested_ip: Option<Ipv6Addr>,
        now: u64,
        lease_time: u32,
    ) -> Result<Lease, CoreError> {
        self.expire_reservations(now);

        if let Some(existing) = self.lease_for(duid, iaid) {
            if existing.expires_at > now {
                return Ok(existing.clone());
            }
        }

        let key = (duid.to_vec(), iaid);
        let ip = match self.reservations.get(&key) {
            Some((ip, _)) => *ip,
            None => {
                let ip = match requested_ip {
                    Some(ip) if self.is_reservable(ip) => ip,
                    _ => {
                        let mut candidates: Vec<Ipv6Addr> =
                            self.free.iter().filter(|ip| self.is_reservable(**ip)).copied().collect();
                        candidates.sort();
                        *candidates.first().ok_or(CoreError::NoAddressesAvailable)?
                    }
                };
                self.reservations.insert(key, (ip, now + RESERVATION_TTL));
                ip
            }
        };

        Ok(Lease {
            ip,
            duid: duid.to_vec(),
            iaid,
            expires_at: now + RESERVATION_TTL,
            preferred_lifetime: lease_time / 2,
            valid_lifetime: lease_time,
            mac_hint: None,
            extra_options: vec![],
        })
    }

    /// Allocate (or return the existing) lease for `(duid, iaid)`, committing
    /// it into `leases`/`used_ips` immediately. Any outstanding reservation
    /// for the same `(duid, iaid)` is superseded, not added to.
    pub fn allocate(
        &mut self,
        duid: &[u8],
        iaid: u32,
        requested_ip: Option<Ipv6Addr>,
        mac_hint: Option<[u8; 6]>,
        now: u64,
        lease_time: u32,
    ) -> Result<Lease, CoreError> {
        if let Some(existing) = self.lease_for(duid, iaid) {
            if existing.expires_at > now {
                let mut lease = existing.clone();
                if lease.mac_hint.is_none() && mac_hint.is_some() {
                    lease.mac_hint = mac_hint;
                    self.commit(lease.clone());
                }
                return Ok(lease);
            }
        }

        let ip = match requested_ip {
            Some(ip) if self.is_available(ip) => ip,
            _ => {
                let mut candidates: Vec<Ipv6Addr> =
                    self.free.iter().filter(|ip| self.is_available(**ip)).copied().collect();
                candidates.sort();
                *candidates.first().ok_or(CoreError::NoAddressesAvailable)?
            }
        };

        let preferred_lifetime = lease_time / 2;
        let lease = Lease {
            ip,
            duid: duid.to_vec(),
            iaid,
            expires_at: now + lease_time as u64,
            preferred_lifetime,
            valid_lifetime: lease_time,
            mac_hint,
            extra_options: vec![],
        };
        self.commit(lease.clone());
        Ok(lease)
    }

    fn commit(&mut self, lease: Lease) {
        self.reservations.remove(&(lease.duid.clone(), lease.iaid));
        let by_iaid = self.leases.entry(lease.duid.clone()).or_default();
        if let Some(old) = by_iaid.insert(lease.iaid, lease.clone()) {
            self.used_ips.remove(&old.ip);
        }
        self.used_ips.insert(lease.ip);
    }

    pub fn renew(&mut self, duid: &[u8], iaid: u32, now: u64, lease_time: u32) -> Option<Lease> {
        let lease = self.leases.get_mut(duid)?.get_mut(&iaid)?;
        lease.expires_at = now + lease_time as u64;
        lease.valid_lifetime = lease_time;
        lease.preferred_lifetime = lease_time / 2;
        Some(lease.clone())
    }

    pub fn release(&mut self, duid: &[u8], iaid: u32) -> bool {
        if let Some(by_iaid) = self.leases.get_mut(duid) {
            if let Some(lease) = by_iaid.remove(&iaid) {
                self.used_ips.remove(&lease.ip);
                if by_iaid.is_empty() {
                    self.leases.remove(duid);
                }
                return true;
            }
        }
        false
    }

    pub fn release_all(&mut self, duid: &[u8]) -> usize {
        match self.leases.remove(duid) {
            Some(by_iaid) => {
                let n = by_iaid.len();
                for lease in by_iaid.values() {
                    self.used_ips.remove(&lease.ip);
                }
                n
            }
            None => 0,
        }
    }

    pub fn sweep(&mut self, now: u64) -> Vec<Ipv6Addr> {
        self.expire_reservations(now);

        let mut freed = Vec::new();
        let mut empty_duids = Vec::new();

        for (duid, by_iaid) in self.leases.iter_mut() {
            let expired: Vec<u32> = by_iaid
                .iter()
                .filter(|(_, l)| l.expires_at <= now)
                .map(|(iaid, _)| *iaid)
                .collect();
            for iaid in expired {
                if let Some(lease) = by_iaid.remove(&iaid) {
                    self.used_ips.remove(&lease.ip);
                    freed.push(lease.ip);
                }
            }
            if by_iaid.is_empty() {
                empty_duids.push(duid.clone());
            }
        }

        for duid in empty_duids {
            self.leases.remove(&duid);
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> (Ipv6Addr, Ipv6Addr) {
        ("2001:db8::1000".parse().unwrap(), "2001:db8::1002".parse().unwrap())
    }

    #[test]
    fn allocate_picks_lowest_free_address() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        let lease = pool.allocate(b"duid-a", 1, None, None, 0, 3600).unwrap();
        assert_eq!(lease.ip, "2001:db8::1000".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn same_duid_different_iaid_gets_distinct_addresses() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        let a = pool.allocate(b"duid-a", 1, None, None, 0, 3600).unwrap();
        let b = pool.allocate(b"duid-a", 2, None, None, 0, 3600).unwrap();
        assert_ne!(a.ip, b.ip);
        assert_eq!(pool.leases_for_duid(b"duid-a").len(), 2);
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        pool.allocate(b"a", 1, None, None, 0, 3600).unwrap();
        pool.allocate(b"b", 1, None, None, 0, 3600).unwrap();
        pool.allocate(b"c", 1, None, None, 0, 3600).unwrap();
        assert_eq!(pool.allocate(b"d", 1, None, None, 0, 3600), Err(CoreError::NoAddressesAvailable));
    }

    #[test]
    fn release_all_removes_every_iaid_for_duid() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        pool.allocate(b"a", 1, None, None, 0, 3600).unwrap();
        pool.allocate(b"a", 2, None, None, 0, 3600).unwrap();
        assert_eq!(pool.release_all(b"a"), 2);
        assert!(pool.leases_for_duid(b"a").is_empty());
        assert!(pool.used_ips().is_empty());
    }

    #[test]
    fn sweep_drops_only_expired_leases() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        let a = pool.allocate(b"a", 1, None, None, 0, 100).unwrap();
        let _b = pool.allocate(b"b", 1, None, None, 0, 1000).unwrap();
        let freed = pool.sweep(150);
        assert_eq!(freed, vec![a.ip]);
        assert!(pool.lease_for(b"a", 1).is_none());
        assert!(pool.lease_for(b"b", 1).is_some());
    }

    #[test]
    fn reserve_does_not_commit_the_address() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        let lease = pool.reserve(b"a", 1, None, 0, 3600).unwrap();

        assert!(!pool.used_ips().contains(&lease.ip));
        assert!(pool.lease_for(b"a", 1).is_none());

        // A second reservation for the same IA sees the same address held.
        let again = pool.reserve(b"a", 1, None, 0, 3600).unwrap();
        assert_eq!(again.ip, lease.ip);

        // A different client can't be handed the same reserved address.
        let other = pool.reserve(b"b", 1, None, 0, 3600).unwrap();
        assert_ne!(other.ip, lease.ip);
    }

    #[test]
    fn reservation_lapses_and_frees_the_address_for_reuse() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        let lease = pool.reserve(b"a", 1, None, 0, 3600).unwrap();
        let reclaimed = pool.reserve(b"b", 1, None, 100, 3600).unwrap();
        assert_eq!(reclaimed.ip, lease.ip);
    }

    #[test]
    fn allocate_after_reserve_commits_the_same_address() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        let reserved = pool.reserve(b"a", 1, None, 0, 3600).unwrap();
        let committed = pool.allocate(b"a", 1, Some(reserved.ip), None, 0, 3600).unwrap();

        assert_eq!(committed.ip, reserved.ip);
        assert!(pool.used_ips().contains(&committed.ip));
        assert!(pool.lease_for(b"a", 1).is_some());

        // The now-redundant reservation shouldn't keep blocking other clients.
        let other = pool.reserve(b"b", 1, None, 0, 3600).unwrap();
        assert_ne!(other.ip, committed.ip);
    }

    #[test]
    fn resize_keeps_existing_leases_but_stops_reoffering_out_of_range_addresses() {
        let (s, e) = range();
        let mut pool = Pool::new(s, e);
        let lease = pool.allocate(b"a", 1, None, None, 0, 3600).unwrap();

        let new_start: Ipv6Addr = "2001:db8::2000".parse().unwrap();
        let new_end: Ipv6Addr = "2001:db8::2002".parse().unwrap();
        pool.resize(new_start, new_end);

        assert!(pool.lease_for(b"a", 1).is_some());
        assert!(pool.used_ips().contains(&lease.ip));
        let new_lease = pool.allocate(b"b", 1, None, None, 0, 3600).unwrap();
        assert_eq!(new_lease.ip, new_start);
    }
}
