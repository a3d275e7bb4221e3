//! Host port allocation for docker deployments (spec.md §3 "PortAllocator",
//! §4.8 step 4). A port is reserved iff a container currently maps to it,
//! modulo an OS-level bind probe at allocation time.

use std::collections::HashSet;
use std::net::TcpListener;
use std::ops::RangeInclusive;

use anyhow::{bail, Result};
use parking_lot::Mutex;

pub struct PortAllocator {
    range: RangeInclusive<u16>,
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Walks the configured range, probing OS availability with a
    /// bind-then-close test, and reserves the first free port found.
    pub fn allocate(&self) -> Result<u16> {
        let mut reserved = self.reserved.lock();
        for port in self.range.clone() {
            if reserved.contains(&port) {
                continue;
            }
            if TcpListener::bind(("127.0.0.1", port)).is_ok() {
                reserved.insert(port);
                return Ok(port);
            }
        }
        bail!("no available port in range {:?}", self.range);
    }

    /// Marks `port` reserved without probing — used when a port is already
    /// in use by a container a worker reported rather than one this
    /// allocator itself chose.
    pub fn reserve(&self, port: u16) {
        self.reserved.lock().insert(port);
    }

    pub fn release(&self, port: u16) {
        self.reserved.lock().remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_hands_out_the_same_port_twice_concurrently() {
        let allocator = PortAllocator::new(9000..=9002);
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        let c = allocator.allocate().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
        assert!(allocator.allocate().is_err());
    }

    #[test]
    fn released_ports_become_reusable() {
        let allocator = PortAllocator::new(9100..=9100);
        let a = allocator.allocate().unwrap();
        assert!(allocator.allocate().is_err());
        allocator.release(a);
        let b = allocator.allocate().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reserved_ports_are_not_handed_out() {
        let allocator = PortAllocator::new(9200..=9201);
        allocator.reserve(9200);
        assert_eq!(allocator.allocate().unwrap(), 9201);
        assert!(allocator.allocate().is_err());
    }
}
