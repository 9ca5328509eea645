//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use derive_new::new;
use ovx_utils::mac_addr::MacAddr;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug_span, warn};

use crate::config::Config;
use crate::debug::Debug;
use crate::discovery::SwitchDiscovery;
use crate::error::Error;
use crate::mapping::Mapping;
use crate::packet::Probe;
use crate::resilience::ResilienceCoordinator;
use crate::southbound::{ProbeTx, ProbeTxMsg};
use crate::tasks;

pub type Dpid = u64;
pub type PortNo = u16;

// Physical port address.
#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct PortKey {
    pub dpid: Dpid,
    pub port: PortNo,
}

// Directed endpoint pair identifying a physical link.
#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LinkEndpoints {
    pub src: PortKey,
    pub dst: PortKey,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PhysicalLink {
    pub id: u32,
    pub src: PortKey,
    pub dst: PortKey,
    pub metric: u32,
}

#[derive(Clone, Debug)]
pub struct PhysicalSwitch {
    pub dpid: Dpid,
    pub ports: BTreeMap<PortNo, PhysicalPort>,
}

#[derive(Clone, Debug)]
pub struct PhysicalPort {
    pub port: PortNo,
    pub mac: MacAddr,
    // No discovered neighbor.
    pub edge: bool,
    pub up: bool,
}

//
// Physical topology as learned from switch events and link discovery.
//
// Topology changes are applied under the topology lock. Virtual elements are
// notified afterwards, with the lock released.
//
#[derive(Debug)]
pub struct PhysicalNetwork {
    config: Config,
    mapping: Arc<Mapping>,
    resilience: ResilienceCoordinator,
    probe_tx: ProbeTx,
    topology: RwLock<Topology>,
    discovery: RwLock<BTreeMap<Dpid, Arc<SwitchDiscovery>>>,
    next_link_id: AtomicU32,
}

#[derive(Debug, Default)]
struct Topology {
    switches: BTreeMap<Dpid, PhysicalSwitch>,
    links: BTreeMap<LinkEndpoints, PhysicalLink>,
    // Source port -> destination port.
    neighbors: HashMap<PortKey, PortKey>,
}

// ===== impl PortKey =====

impl std::fmt::Display for PortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}/{}", self.dpid, self.port)
    }
}

// ===== impl LinkEndpoints =====

impl LinkEndpoints {
    pub fn reverse(&self) -> LinkEndpoints {
        LinkEndpoints::new(self.dst, self.src)
    }
}

impl std::fmt::Display for LinkEndpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

// ===== impl PhysicalLink =====

impl PhysicalLink {
    pub fn endpoints(&self) -> LinkEndpoints {
        LinkEndpoints::new(self.src, self.dst)
    }
}

// ===== impl PhysicalNetwork =====

impl PhysicalNetwork {
    pub fn new(
        config: Config,
        mapping: Arc<Mapping>,
        probe_tx: ProbeTx,
    ) -> PhysicalNetwork {
        let resilience = ResilienceCoordinator::new(mapping.clone());
        PhysicalNetwork {
            config,
            mapping,
            resilience,
            probe_tx,
            topology: Default::default(),
            discovery: Default::default(),
            next_link_id: AtomicU32::new(1),
        }
    }

    // Forgets every switch and link and stops all discovery engines.
    pub fn reset(&self) {
        self.discovery.write().clear();
        *self.topology.write() = Topology::default();
        self.next_link_id.store(1, Ordering::Relaxed);
    }

    // ----- switch and port events -----

    /// Registers a newly connected switch and starts its discovery engine.
    pub fn add_switch(self: &Arc<Self>, dpid: Dpid) -> bool {
        {
            let mut topology = self.topology.write();
            if topology.switches.contains_key(&dpid) {
                return false;
            }
            topology.switches.insert(
                dpid,
                PhysicalSwitch {
                    dpid,
                    ports: Default::default(),
                },
            );
        }

        let discovery =
            Arc::new(SwitchDiscovery::new(dpid, self.config.discovery.clone()));
        discovery.start(tasks::probe_interval(
            Arc::downgrade(self),
            dpid,
            self.config.discovery.probe_interval(),
        ));
        self.discovery.write().insert(dpid, discovery);

        Debug::SwitchAdd(dpid).log();
        true
    }

    /// Removes a switch permanently.
    ///
    /// Its links go down, virtual ports mapped onto it are unregistered and
    /// the switch is stripped from every virtual switch it backs.
    pub fn remove_switch(&self, dpid: Dpid) -> bool {
        let (ports, links) = {
            let mut topology = self.topology.write();
            let Some(switch) = topology.switches.remove(&dpid) else {
                return false;
            };
            let links = topology.detach_switch(dpid);
            let ports = switch
                .ports
                .keys()
                .map(|port| PortKey::new(dpid, *port))
                .collect::<Vec<_>>();
            (ports, links)
        };
        self.discovery.write().remove(&dpid);

        for link in &links {
            Debug::LinkRemove(link).log();
            self.resilience.deactivate_vlinks(self, link, true);
            self.mapping.remove_physical_link(&link.endpoints());
        }
        for port in &ports {
            self.resilience.deactivate_ovx_ports(port, true);
        }
        self.mapping.remove_physical_switch(dpid);

        Debug::SwitchRemove(dpid).log();
        true
    }

    /// Registers a port and starts probing it.
    pub fn add_port(
        &self,
        dpid: Dpid,
        port: PortNo,
        mac: MacAddr,
    ) -> Result<(), Error> {
        let key = PortKey::new(dpid, port);
        {
            let mut topology = self.topology.write();
            let switch = topology
                .switches
                .get_mut(&dpid)
                .ok_or(Error::PhysicalSwitchNotFound(dpid))?;
            switch.ports.insert(
                port,
                PhysicalPort {
                    port,
                    mac,
                    edge: true,
                    up: true,
                },
            );
        }
        Debug::PortAdd(&key).log();

        if let Some(discovery) = self.switch_discovery(dpid) {
            let probes = discovery.add_port(port, mac);
            self.send_probes(probes);
        }
        self.resilience.activate_ovx_ports(self, &key);
        Ok(())
    }

    /// Removes a port permanently.
    pub fn remove_port(&self, dpid: Dpid, port: PortNo) -> Result<(), Error> {
        let key = PortKey::new(dpid, port);
        let links = {
            let mut topology = self.topology.write();
            let switch = topology
                .switches
                .get_mut(&dpid)
                .ok_or(Error::PhysicalSwitchNotFound(dpid))?;
            if switch.ports.remove(&port).is_none() {
                return Err(Error::PhysicalPortNotFound(key));
            }
            topology.detach_port(&key)
        };
        Debug::PortRemove(&key).log();

        if let Some(discovery) = self.switch_discovery(dpid) {
            discovery.remove_port(port);
        }
        for link in &links {
            Debug::LinkRemove(link).log();
            self.resilience.deactivate_vlinks(self, link, false);
        }
        self.resilience.deactivate_ovx_ports(&key, true);
        Ok(())
    }

    /// Operational port up.
    pub fn port_up(&self, dpid: Dpid, port: PortNo) -> Result<(), Error> {
        let key = PortKey::new(dpid, port);
        let mac = {
            let mut topology = self.topology.write();
            let entry = topology
                .port_mut(&key)
                .ok_or(Error::PhysicalPortNotFound(key))?;
            if entry.up {
                return Ok(());
            }
            entry.up = true;
            entry.mac
        };
        Debug::PortUp(&key).log();

        if let Some(discovery) = self.switch_discovery(dpid) {
            let probes = discovery.add_port(port, mac);
            self.send_probes(probes);
        }
        self.resilience.activate_ovx_ports(self, &key);
        Ok(())
    }

    /// Operational port down. The port stays registered.
    pub fn port_down(&self, dpid: Dpid, port: PortNo) -> Result<(), Error> {
        let key = PortKey::new(dpid, port);
        let links = {
            let mut topology = self.topology.write();
            let entry = topology
                .port_mut(&key)
                .ok_or(Error::PhysicalPortNotFound(key))?;
            if !entry.up {
                return Ok(());
            }
            entry.up = false;
            topology.detach_port(&key)
        };
        Debug::PortDown(&key).log();

        if let Some(discovery) = self.switch_discovery(dpid) {
            discovery.remove_port(port);
        }
        for link in &links {
            Debug::LinkRemove(link).log();
            self.resilience.deactivate_vlinks(self, link, false);
        }
        self.resilience.deactivate_ovx_ports(&key, false);
        Ok(())
    }

    // ----- links -----

    /// Records a discovered link.
    ///
    /// Returns false if `dst` already is the neighbor of `src`. A link that
    /// reappears after a flap keeps its previous identifier.
    pub fn create_link(&self, src: PortKey, dst: PortKey) -> bool {
        let (link, stale) = {
            let mut topology = self.topology.write();
            if topology.port(&src).is_none() || topology.port(&dst).is_none() {
                warn!(%src, %dst, "ignoring link between unknown ports");
                return false;
            }
            let stale = match topology.neighbors.get(&src).copied() {
                Some(neighbor) if neighbor == dst => return false,
                Some(neighbor) => {
                    topology.unlink(&LinkEndpoints::new(src, neighbor))
                }
                None => None,
            };

            let mut link =
                PhysicalLink::new(0, src, dst, self.config.routing.default_metric);
            if !self.mapping.known_link(&mut link) {
                link.id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
                self.mapping.record_link_id(&link);
            }
            topology.insert_link(link.clone());
            (link, stale)
        };

        if let Some(stale) = stale {
            Debug::LinkRemove(&stale).log();
            self.resilience.deactivate_vlinks(self, &stale, false);
        }
        Debug::LinkAdd(&link).log();
        self.resilience.activate_vlinks(self, &link);
        true
    }

    /// Removes a link, provided `dst` still is the neighbor of `src`.
    pub fn remove_link(&self, src: PortKey, dst: PortKey) -> bool {
        let link = {
            let mut topology = self.topology.write();
            if topology.neighbors.get(&src) != Some(&dst) {
                return false;
            }
            topology.unlink(&LinkEndpoints::new(src, dst))
        };
        let Some(link) = link else {
            return false;
        };

        Debug::LinkRemove(&link).log();
        self.resilience.deactivate_vlinks(self, &link, false);
        true
    }

    // ----- discovery -----

    /// Processes a probe received on `(dpid, port)`.
    ///
    /// The probe proves the link from its sender to the receiving port, and
    /// acknowledges the sender's probe.
    pub fn handle_probe(
        &self,
        frame: &[u8],
        dpid: Dpid,
        port: PortNo,
    ) -> Result<(), Error> {
        let dst = PortKey::new(dpid, port);
        let probe =
            Probe::decode(frame).map_err(|error| Error::ProbeDecode(dst, error))?;
        debug_span!("discovery", %dpid).in_scope(|| {
            Debug::ProbeRx(&dst, &probe).log();
        });

        let src = PortKey::new(probe.dpid, probe.port);
        self.create_link(src, dst);
        if let Some(discovery) = self.switch_discovery(probe.dpid) {
            discovery.ack_probe(probe.port);
        }
        Ok(())
    }

    /// Runs one probe cycle of a switch's discovery engine.
    ///
    /// Links of ports whose probes expired are removed in both directions.
    pub fn probe_cycle(&self, dpid: Dpid) {
        let Some(discovery) = self.switch_discovery(dpid) else {
            return;
        };
        let cycle = discovery.run_cycle();
        self.send_probes(cycle.probes);

        for port in cycle.expired {
            let src = PortKey::new(dpid, port);
            let Some(dst) = self.neighbor(&src) else {
                continue;
            };
            self.remove_link(src, dst);
            self.remove_link(dst, src);
        }
    }

    pub fn switch_discovery(&self, dpid: Dpid) -> Option<Arc<SwitchDiscovery>> {
        self.discovery.read().get(&dpid).cloned()
    }

    fn send_probes(&self, probes: Vec<Probe>) {
        for probe in probes {
            let msg = ProbeTxMsg::new(probe.dpid, probe.port, probe.encode());
            if self.probe_tx.send(msg).is_err() {
                warn!(dpid = %probe.dpid, port = %probe.port, "failed to send probe");
            }
        }
    }

    // ----- snapshots -----

    pub fn links(&self) -> Vec<PhysicalLink> {
        self.topology.read().links.values().cloned().collect()
    }

    pub fn get_link(&self, src: PortKey, dst: PortKey) -> Option<PhysicalLink> {
        self.topology
            .read()
            .links
            .get(&LinkEndpoints::new(src, dst))
            .cloned()
    }

    /// Returns the link between two ports, discovered or not.
    ///
    /// A link that isn't part of the topology gets its previous identifier,
    /// or a newly assigned one that discovery will reuse once the link shows
    /// up.
    pub fn resolve_link(&self, endpoints: &LinkEndpoints) -> PhysicalLink {
        if let Some(link) = self.get_link(endpoints.src, endpoints.dst) {
            return link;
        }
        let mut link = PhysicalLink::new(
            0,
            endpoints.src,
            endpoints.dst,
            self.config.routing.default_metric,
        );
        if !self.mapping.known_link(&mut link) {
            link.id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
            self.mapping.record_link_id(&link);
        }
        link
    }

    pub fn neighbor(&self, port: &PortKey) -> Option<PortKey> {
        self.topology.read().neighbors.get(port).copied()
    }

    pub fn switches(&self) -> Vec<Dpid> {
        self.topology.read().switches.keys().copied().collect()
    }

    pub fn has_switch(&self, dpid: Dpid) -> bool {
        self.topology.read().switches.contains_key(&dpid)
    }

    pub fn port(&self, key: &PortKey) -> Option<PhysicalPort> {
        self.topology.read().port(key).cloned()
    }

    pub fn ports(&self, dpid: Dpid) -> Vec<PhysicalPort> {
        self.topology
            .read()
            .switches
            .get(&dpid)
            .map(|switch| switch.ports.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn mapping(&self) -> &Arc<Mapping> {
        &self.mapping
    }
}

// ===== impl Topology =====

impl Topology {
    fn port(&self, key: &PortKey) -> Option<&PhysicalPort> {
        self.switches
            .get(&key.dpid)
            .and_then(|switch| switch.ports.get(&key.port))
    }

    fn port_mut(&mut self, key: &PortKey) -> Option<&mut PhysicalPort> {
        self.switches
            .get_mut(&key.dpid)
            .and_then(|switch| switch.ports.get_mut(&key.port))
    }

    fn insert_link(&mut self, link: PhysicalLink) {
        self.neighbors.insert(link.src, link.dst);
        for key in [link.src, link.dst] {
            if let Some(port) = self.port_mut(&key) {
                port.edge = false;
            }
        }
        self.links.insert(link.endpoints(), link);
    }

    fn unlink(&mut self, endpoints: &LinkEndpoints) -> Option<PhysicalLink> {
        let link = self.links.remove(endpoints)?;
        if self.neighbors.get(&link.src) == Some(&link.dst) {
            self.neighbors.remove(&link.src);
        }
        // A port stays non-edge while the reverse direction is still known.
        for key in [link.src, link.dst] {
            let linked = self
                .links
                .keys()
                .any(|link| link.src == key || link.dst == key);
            if let Some(port) = self.port_mut(&key) {
                port.edge = !linked;
            }
        }
        Some(link)
    }

    // Removes every link touching a port, in either direction.
    fn detach_port(&mut self, key: &PortKey) -> Vec<PhysicalLink> {
        let endpoints = self
            .links
            .keys()
            .filter(|link| link.src == *key || link.dst == *key)
            .copied()
            .collect::<Vec<_>>();
        endpoints
            .iter()
            .filter_map(|endpoints| self.unlink(endpoints))
            .collect()
    }

    // Removes every link touching a switch, in either direction.
    fn detach_switch(&mut self, dpid: Dpid) -> Vec<PhysicalLink> {
        let endpoints = self
            .links
            .keys()
            .filter(|link| link.src.dpid == dpid || link.dst.dpid == dpid)
            .copied()
            .collect::<Vec<_>>();
        endpoints
            .iter()
            .filter_map(|endpoints| self.unlink(endpoints))
            .collect()
    }
}
