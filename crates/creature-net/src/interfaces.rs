// ── Network interface catalog ──
//
// Enumerates host interfaces and their IPv4 addresses so a multicast
// receiver can be bound to a specific NIC. The platform query sits behind
// `InterfaceCatalog` so hosts without sysfs (or sandboxed targets) can
// substitute their own source.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

/// Broad classification of an interface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InterfaceKind {
    Wifi,
    Ethernet,
    Cellular,
    Loopback,
    Other,
    Unknown,
}

impl InterfaceKind {
    /// Classify by conventional interface naming.
    pub fn from_name(name: &str) -> Self {
        const RULES: &[(&str, InterfaceKind)] = &[
            ("lo", InterfaceKind::Loopback),
            ("wl", InterfaceKind::Wifi),
            ("wifi", InterfaceKind::Wifi),
            ("ww", InterfaceKind::Cellular),
            ("rmnet", InterfaceKind::Cellular),
            ("pdp_ip", InterfaceKind::Cellular),
            ("en", InterfaceKind::Ethernet),
            ("eth", InterfaceKind::Ethernet),
        ];

        if name.is_empty() {
            return Self::Unknown;
        }
        RULES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map_or(Self::Other, |(_, kind)| *kind)
    }
}

/// One merged interface entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceDescriptor {
    /// Stable identifier, `"<name>/<kind>"`.
    pub id: String,
    pub name: String,
    pub kind: InterfaceKind,
    pub addresses: BTreeSet<Ipv4Addr>,
}

impl NetworkInterfaceDescriptor {
    /// First IPv4 address, used as the multicast join interface.
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.addresses.iter().next().copied()
    }
}

/// A raw, unmerged record from one of the OS queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    pub name: String,
    pub kind: InterfaceKind,
    pub addresses: Vec<Ipv4Addr>,
}

// ── Capability ───────────────────────────────────────────────────────

/// Source of interface descriptors.
pub trait InterfaceCatalog: Send + Sync {
    /// List interfaces, sorted by name. Never fails as a whole.
    fn list_interfaces(&self) -> Vec<NetworkInterfaceDescriptor>;

    /// Find an interface by name.
    fn find(&self, name: &str) -> Option<NetworkInterfaceDescriptor> {
        self.list_interfaces().into_iter().find(|i| i.name == name)
    }

    /// Resolve an interface name to the IPv4 address to join on.
    fn resolve_address(&self, name: &str) -> Result<Ipv4Addr, Error> {
        self.find(name)
            .and_then(|i| i.primary_address())
            .ok_or_else(|| Error::InterfaceNotFound(name.to_owned()))
    }
}

/// Interface catalog backed by the host OS.
///
/// The interface list comes from `/sys/class/net` where available; bound
/// IPv4 addresses come from a separate `getifaddrs` pass. Either pass may
/// fail independently -- the other still contributes its records.
#[derive(Debug, Clone, Default)]
pub struct SystemInterfaces;

const SYSFS_NET: &str = "/sys/class/net";

impl SystemInterfaces {
    fn sysfs_records(root: &Path) -> Vec<InterfaceRecord> {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(error = %e, path = %root.display(), "interface list unavailable");
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let kind = if entry.path().join("wireless").exists() {
                    InterfaceKind::Wifi
                } else {
                    InterfaceKind::from_name(&name)
                };
                Some(InterfaceRecord {
                    name,
                    kind,
                    addresses: Vec::new(),
                })
            })
            .collect()
    }

    fn address_records(sysfs: &[InterfaceRecord]) -> Vec<InterfaceRecord> {
        let addrs = match if_addrs::get_if_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!(error = %e, "interface address resolution failed");
                return Vec::new();
            }
        };

        addrs
            .into_iter()
            .filter_map(|iface| {
                let IpAddr::V4(addr) = iface.ip() else {
                    return None;
                };
                // Reuse the sysfs classification so both passes merge on the same key.
                let kind = sysfs
                    .iter()
                    .find(|r| r.name == iface.name)
                    .map_or_else(
                        || {
                            if iface.is_loopback() {
                                InterfaceKind::Loopback
                            } else {
                                InterfaceKind::from_name(&iface.name)
                            }
                        },
                        |r| r.kind,
                    );
                Some(InterfaceRecord {
                    name: iface.name,
                    kind,
                    addresses: vec![addr],
                })
            })
            .collect()
    }
}

impl InterfaceCatalog for SystemInterfaces {
    fn list_interfaces(&self) -> Vec<NetworkInterfaceDescriptor> {
        let listed = Self::sysfs_records(Path::new(SYSFS_NET));
        let resolved = Self::address_records(&listed);
        let merged = merge_interfaces(listed.into_iter().chain(resolved));
        tracing::trace!(count = merged.len(), "enumerated interfaces");
        merged
    }
}

// ── Merging ──────────────────────────────────────────────────────────

/// Merge raw records keyed by `(name, kind)`, unioning their addresses.
///
/// The result is sorted by name (then kind) for deterministic output.
pub fn merge_interfaces(
    records: impl IntoIterator<Item = InterfaceRecord>,
) -> Vec<NetworkInterfaceDescriptor> {
    let mut merged: BTreeMap<(String, InterfaceKind), BTreeSet<Ipv4Addr>> = BTreeMap::new();

    for record in records {
        merged
            .entry((record.name, record.kind))
            .or_default()
            .extend(record.addresses);
    }

    merged
        .into_iter()
        .map(|((name, kind), addresses)| NetworkInterfaceDescriptor {
            id: format!("{name}/{kind}"),
            name,
            kind,
            addresses,
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, kind: InterfaceKind, addrs: &[[u8; 4]]) -> InterfaceRecord {
        InterfaceRecord {
            name: name.into(),
            kind,
            addresses: addrs.iter().map(|a| Ipv4Addr::from(*a)).collect(),
        }
    }

    #[test]
    fn classifies_by_name() {
        assert_eq!(InterfaceKind::from_name("lo"), InterfaceKind::Loopback);
        assert_eq!(InterfaceKind::from_name("wlan0"), InterfaceKind::Wifi);
        assert_eq!(InterfaceKind::from_name("eth0"), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::from_name("enp3s0"), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::from_name("wwan0"), InterfaceKind::Cellular);
        assert_eq!(InterfaceKind::from_name("docker0"), InterfaceKind::Other);
        assert_eq!(InterfaceKind::from_name(""), InterfaceKind::Unknown);
    }

    #[test]
    fn merges_by_name_and_kind() {
        let merged = merge_interfaces(vec![
            record("eth0", InterfaceKind::Ethernet, &[]),
            record("eth0", InterfaceKind::Ethernet, &[[10, 0, 0, 5]]),
            record("eth0", InterfaceKind::Ethernet, &[[10, 0, 0, 6], [10, 0, 0, 5]]),
            record("lo", InterfaceKind::Loopback, &[[127, 0, 0, 1]]),
        ]);

        assert_eq!(merged.len(), 2);
        let eth = &merged[0];
        assert_eq!(eth.id, "eth0/ethernet");
        assert_eq!(
            eth.addresses.iter().copied().collect::<Vec<_>>(),
            vec![Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 6)]
        );
        assert_eq!(eth.primary_address(), Some(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn interfaces_without_addresses_survive() {
        let merged = merge_interfaces(vec![
            record("wlan0", InterfaceKind::Wifi, &[]),
            record("eth1", InterfaceKind::Ethernet, &[[192, 168, 1, 2]]),
        ]);

        let names: Vec<_> = merged.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["eth1", "wlan0"]);
        assert!(merged[1].addresses.is_empty());
        assert_eq!(merged[1].primary_address(), None);
    }

    struct Fixed(Vec<NetworkInterfaceDescriptor>);

    impl InterfaceCatalog for Fixed {
        fn list_interfaces(&self) -> Vec<NetworkInterfaceDescriptor> {
            self.0.clone()
        }
    }

    #[test]
    fn resolve_address_requires_ipv4() {
        let catalog = Fixed(merge_interfaces(vec![
            record("wlan0", InterfaceKind::Wifi, &[]),
            record("eth0", InterfaceKind::Ethernet, &[[10, 1, 1, 1]]),
        ]));

        assert_eq!(
            catalog.resolve_address("eth0").unwrap(),
            Ipv4Addr::new(10, 1, 1, 1)
        );
        assert!(matches!(
            catalog.resolve_address("wlan0"),
            Err(Error::InterfaceNotFound(name)) if name == "wlan0"
        ));
        assert!(catalog.resolve_address("nope0").is_err());
    }

    #[test]
    fn system_catalog_is_sorted() {
        let list = SystemInterfaces.list_interfaces();
        let names: Vec<_> = list.iter().map(|i| i.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
