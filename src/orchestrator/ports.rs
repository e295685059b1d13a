use std::collections::HashSet;
use std::net::TcpListener;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::PortOffset;
use crate::error::{ContainerError, Result};

#[derive(Debug)]
pub struct PortConflict {
    pub container: String,
    pub label: &'static str,
    pub port: u16,
    pub owner: Option<String>,
}

impl std::fmt::Display for PortConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.owner {
            Some(owner) => write!(
                f,
                "Port {} ({}) required by '{}' is already in use by {}",
                self.port, self.label, self.container, owner
            ),
            None => write!(
                f,
                "Port {} ({}) required by '{}' is already in use",
                self.port, self.label, self.container
            ),
        }
    }
}

/// Outcome of [`PortAllocator::find_available_port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAssignment {
    pub port: u16,
    /// `true` when `port` differs from the preferred port.
    pub reassigned: bool,
}

/// Bind-and-release probe. A failed bind on either loopback or the wildcard
/// address means the port is in use.
pub fn check_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok() && TcpListener::bind(("0.0.0.0", port)).is_ok()
}

/// Secondary ports derived from `primary` by fixed engine offsets. Pure.
pub fn derive_secondary_ports(primary: u16, offsets: &[PortOffset]) -> Result<Vec<u16>> {
    offsets
        .iter()
        .map(|o| {
            i32::from(primary)
                .checked_add(o.offset)
                .and_then(|p| u16::try_from(p).ok())
                .filter(|p| *p != 0)
                .ok_or(ContainerError::PortUnavailable {
                    port: primary,
                    owner: Some(format!("{} offset {} out of range", o.label, o.offset)),
                })
        })
        .collect()
}

/// Poll until every port in `ports` can be bound again. Returns `false` on
/// timeout; the caller decides whether that matters.
pub async fn wait_for_release(ports: &[u16], timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        let busy: Vec<u16> = ports
            .iter()
            .copied()
            .filter(|p| !check_port_available(*p))
            .collect();
        if busy.is_empty() {
            return true;
        }
        if start.elapsed() >= timeout {
            debug!(?busy, "ports still bound after {:?}", timeout);
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Finds free primary ports whose derived secondaries are free as well.
/// Ports claimed by other containers are treated as taken even when nothing
/// is listening on them right now.
pub struct PortAllocator {
    reserved: HashSet<u16>,
    scan_limit: u16,
}

impl PortAllocator {
    pub fn new(reserved: HashSet<u16>, scan_limit: u16) -> Self {
        Self {
            reserved,
            scan_limit: scan_limit.max(1),
        }
    }

    pub fn is_available(&self, port: u16) -> bool {
        port != 0 && !self.reserved.contains(&port) && check_port_available(port)
    }

    /// Whether `primary` and every derived secondary port are free.
    pub fn is_set_available(&self, primary: u16, offsets: &[PortOffset]) -> bool {
        let Ok(secondaries) = derive_secondary_ports(primary, offsets) else {
            return false;
        };
        self.is_available(primary) && secondaries.iter().all(|p| self.is_available(*p))
    }

    /// `preferred` if it (and its secondaries) are free, otherwise the next
    /// free port scanning upward.
    pub fn find_available_port(
        &self,
        preferred: u16,
        offsets: &[PortOffset],
    ) -> Result<PortAssignment> {
        if self.is_set_available(preferred, offsets) {
            return Ok(PortAssignment {
                port: preferred,
                reassigned: false,
            });
        }
        for step in 1..=self.scan_limit {
            let Some(candidate) = preferred.checked_add(step) else {
                break;
            };
            if self.is_set_available(candidate, offsets) {
                debug!(preferred, port = candidate, "preferred port taken, reassigned");
                return Ok(PortAssignment {
                    port: candidate,
                    reassigned: true,
                });
            }
        }
        Err(ContainerError::PortUnavailable {
            port: preferred,
            owner: identify_port_owner(preferred),
        })
    }

    /// Every port in the set that is currently unavailable.
    pub fn conflicts(
        &self,
        container: &str,
        primary: u16,
        offsets: &[PortOffset],
    ) -> Vec<PortConflict> {
        let mut conflicts = Vec::new();
        if !self.is_available(primary) {
            conflicts.push(PortConflict {
                container: container.to_string(),
                label: "primary",
                port: primary,
                owner: identify_port_owner(primary),
            });
        }
        if let Ok(secondaries) = derive_secondary_ports(primary, offsets) {
            for (offset, port) in offsets.iter().zip(secondaries) {
                if !self.is_available(port) {
                    conflicts.push(PortConflict {
                        container: container.to_string(),
                        label: offset.label,
                        port,
                        owner: identify_port_owner(port),
                    });
                }
            }
        }
        conflicts
    }
}

/// Identify which process owns a given port.
pub fn identify_port_owner(port: u16) -> Option<String> {
    crate::platform::identify_port_owner(port)
}

pub fn format_port_conflicts(conflicts: &[PortConflict]) -> String {
    let mut msg = String::from("Port conflicts detected:\n");
    for conflict in conflicts {
        msg.push_str(&format!("  - {}\n", conflict));
    }
    msg
}
