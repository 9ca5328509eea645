//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use derive_new::new;
use ovx_utils::index::{IndexAllocator, IndexType};
use ovx_utils::mac_addr::MacAddr;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{Config, RoutingConfig};
use crate::debug::Debug;
use crate::error::{Error, MappingError};
use crate::mapping::Mapping;
use crate::physical::{
    Dpid, LinkEndpoints, PhysicalLink, PhysicalNetwork, PortKey, PortNo,
};
use crate::routing::{self, RoutingAlgorithm};
use crate::southbound::{EmbeddedPath, EmbeddingRecord, EmbeddingStore};

pub type TenantId = u32;

// Virtual datapath IDs carry the hypervisor OUI in their upper half.
pub const VDPID_PREFIX: u64 = 0x00a4_2305 << 32;

#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct VirtualSwitchKey {
    pub tenant_id: TenantId,
    pub vdpid: u64,
}

#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct VirtualPortKey {
    pub tenant_id: TenantId,
    pub vdpid: u64,
    pub port: PortNo,
}

#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct VirtualLinkKey {
    pub tenant_id: TenantId,
    pub link_id: u32,
}

#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct SwitchRouteKey {
    pub tenant_id: TenantId,
    pub vdpid: u64,
    pub route_id: u32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ElementState {
    #[default]
    Inactive,
    Active,
}

// Virtual element backed by a physical path and able to fail over.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum VirtualLinkLike {
    Link(VirtualLinkKey),
    Route(SwitchRouteKey),
}

#[derive(Clone, Debug)]
pub struct VirtualSwitch {
    pub key: VirtualSwitchKey,
    pub dpids: Vec<Dpid>,
    pub kind: SwitchKind,
    pub ports: BTreeMap<PortNo, VirtualPort>,
    port_ids: IndexAllocator,
}

#[derive(Clone, Debug)]
pub enum SwitchKind {
    Single,
    Big(BigSwitch),
}

// Virtual switch spanning several physical switches.
#[derive(Clone, Debug)]
pub struct BigSwitch {
    pub algorithm: RoutingAlgorithm,
    pub backups: u8,
    // Route cache: (ingress, egress) -> route ID.
    pub routes: BTreeMap<(PortNo, PortNo), u32>,
    route_ids: IndexAllocator,
}

#[derive(Clone, Debug)]
pub struct VirtualPort {
    pub key: VirtualPortKey,
    pub physical: PortKey,
    pub state: ElementState,
    // Disabled by the tenant. Overrides automatic recovery.
    pub admin_down: bool,
    pub link_id: Option<u32>,
    pub host: Option<Host>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Host {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub physical_ip: Ipv4Addr,
}

// Priority-ordered physical paths of a virtual link or switch route.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathSet {
    // Active path.
    pub path: Vec<PhysicalLink>,
    pub priority: u8,
    pub backups: BTreeMap<u8, Vec<PhysicalLink>>,
    // Paths crossing a failed link.
    pub unusable: BTreeMap<u8, Vec<PhysicalLink>>,
}

// Unidirectional virtual link between two virtual ports.
#[derive(Clone, Debug)]
pub struct VirtualLink {
    pub key: VirtualLinkKey,
    pub src: VirtualPortKey,
    pub dst: VirtualPortKey,
    pub paths: PathSet,
    pub state: ElementState,
}

// Internal route of a big switch.
#[derive(Clone, Debug)]
pub struct SwitchRoute {
    pub key: SwitchRouteKey,
    pub in_port: PortNo,
    pub out_port: PortNo,
    pub paths: PathSet,
    pub state: ElementState,
}

//
// Virtual network of a single tenant.
//
// Operations that consult the physical topology or the Mapping Store take
// them as arguments. Locks are always acquired in the order network, then
// topology, then mapping.
//
#[derive(Debug)]
pub struct VirtualNetwork {
    pub tenant_id: TenantId,
    tenant_bits: u8,
    routing: RoutingConfig,
    store: Option<Arc<dyn EmbeddingStore>>,
    inner: Mutex<NetworkInner>,
}

#[derive(Debug)]
struct NetworkInner {
    switches: BTreeMap<u64, VirtualSwitch>,
    links: BTreeMap<u32, VirtualLink>,
    routes: BTreeMap<SwitchRouteKey, SwitchRoute>,
    switch_ids: IndexAllocator,
    link_ids: IndexAllocator,
    ip_ids: IndexAllocator,
}

// ===== impl VirtualSwitchKey =====

impl std::fmt::Display for VirtualSwitchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:#x}", self.tenant_id, self.vdpid)
    }
}

// ===== impl VirtualPortKey =====

impl VirtualPortKey {
    pub fn switch(&self) -> VirtualSwitchKey {
        VirtualSwitchKey::new(self.tenant_id, self.vdpid)
    }
}

impl std::fmt::Display for VirtualPortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:#x}/{}", self.tenant_id, self.vdpid, self.port)
    }
}

// ===== impl VirtualLinkKey =====

impl std::fmt::Display for VirtualLinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.link_id)
    }
}

// ===== impl SwitchRouteKey =====

impl std::fmt::Display for SwitchRouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:#x}/{}", self.tenant_id, self.vdpid, self.route_id)
    }
}

// ===== impl VirtualLinkLike =====

impl VirtualLinkLike {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            VirtualLinkLike::Link(key) => key.tenant_id,
            VirtualLinkLike::Route(key) => key.tenant_id,
        }
    }
}

impl std::fmt::Display for VirtualLinkLike {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VirtualLinkLike::Link(key) => write!(f, "link {key}"),
            VirtualLinkLike::Route(key) => write!(f, "route {key}"),
        }
    }
}

// ===== impl VirtualSwitch =====

impl VirtualSwitch {
    pub fn is_big(&self) -> bool {
        matches!(self.kind, SwitchKind::Big(_))
    }

    fn big_mut(&mut self) -> Result<&mut BigSwitch, Error> {
        match &mut self.kind {
            SwitchKind::Big(big) => Ok(big),
            SwitchKind::Single => Err(Error::NotBigSwitch(self.key)),
        }
    }
}

// ===== impl VirtualPort =====

impl VirtualPort {
    // Port without a virtual link.
    pub fn is_edge(&self) -> bool {
        self.link_id.is_none()
    }
}

// ===== impl PathSet =====

impl PathSet {
    /// Builds a path set from a primary path followed by its backups.
    ///
    /// The primary gets `base` priority and each backup one less than the
    /// previous path.
    pub fn new(paths: Vec<Vec<PhysicalLink>>, base: u8) -> Option<PathSet> {
        PathSet::with_priorities(
            paths
                .into_iter()
                .enumerate()
                .map(|(i, path)| (base.saturating_sub(i as u8), path))
                .collect(),
        )
    }

    /// Builds a path set from explicitly prioritized paths.
    ///
    /// The highest priority path becomes the active one.
    pub fn with_priorities(
        mut paths: Vec<(u8, Vec<PhysicalLink>)>,
    ) -> Option<PathSet> {
        paths.sort_by(|(a, _), (b, _)| b.cmp(a));
        let mut paths = paths.into_iter();
        let (priority, path) = paths.next()?;
        Some(PathSet {
            path,
            priority,
            backups: paths.collect(),
            unusable: Default::default(),
        })
    }

    // Checks whether the active path crosses a physical link.
    pub fn uses(&self, link: &LinkEndpoints) -> bool {
        crosses(&self.path, link)
    }

    // Checks whether any path, usable or not, crosses a physical link.
    pub fn contains(&self, link: &LinkEndpoints) -> bool {
        self.uses(link)
            || self.backups.values().any(|path| crosses(path, link))
            || self.unusable.values().any(|path| crosses(path, link))
    }

    /// Switches to the best live backup after `failed` went down.
    ///
    /// Backups crossing the failed link are set aside as unusable. Returns
    /// false, leaving the active path in place, when no live backup remains.
    pub fn try_recovery(
        &mut self,
        failed: &LinkEndpoints,
        is_live: impl Fn(&PhysicalLink) -> bool,
    ) -> bool {
        if !self.uses(failed) {
            return true;
        }

        let crossing = self
            .backups
            .iter()
            .filter(|(_, path)| crosses(path, failed))
            .map(|(priority, _)| *priority)
            .collect::<Vec<_>>();
        for priority in crossing {
            if let Some(path) = self.backups.remove(&priority) {
                self.unusable.insert(priority, path);
            }
        }

        let Some(priority) = self
            .backups
            .iter()
            .rev()
            .find(|(_, path)| path.iter().all(&is_live))
            .map(|(priority, _)| *priority)
        else {
            return false;
        };
        let Some(backup) = self.backups.remove(&priority) else {
            return false;
        };
        let failed_path = std::mem::replace(&mut self.path, backup);
        self.unusable.insert(self.priority, failed_path);
        self.priority = priority;
        true
    }

    /// Reconsiders the unusable paths crossing a recovered link.
    ///
    /// Live paths become backups again, unless one of them outranks the
    /// active path (or the active path is itself down), in which case it is
    /// reinstated. Returns true only when the active path changed.
    pub fn try_revert(
        &mut self,
        recovered: &LinkEndpoints,
        is_live: impl Fn(&PhysicalLink) -> bool,
    ) -> bool {
        let mut active_live = self.path.iter().all(&is_live);
        let candidates = self
            .unusable
            .iter()
            .rev()
            .filter(|(_, path)| crosses(path, recovered))
            .map(|(priority, _)| *priority)
            .collect::<Vec<_>>();

        let mut switched = false;
        for priority in candidates {
            let Some(path) = self.unusable.remove(&priority) else {
                continue;
            };
            if !path.iter().all(&is_live) {
                self.unusable.insert(priority, path);
                continue;
            }

            if priority > self.priority || !active_live {
                let previous = std::mem::replace(&mut self.path, path);
                let previous_priority =
                    std::mem::replace(&mut self.priority, priority);
                if active_live {
                    self.backups.insert(previous_priority, previous);
                } else {
                    self.unusable.insert(previous_priority, previous);
                }
                active_live = true;
                switched = true;
            } else {
                self.backups.insert(priority, path);
            }
        }
        switched
    }

    // Every path, highest priority first.
    pub fn embedded_paths(&self) -> Vec<EmbeddedPath> {
        let mut paths = std::iter::once((self.priority, &self.path))
            .chain(self.backups.iter().map(|(priority, path)| (*priority, path)))
            .chain(self.unusable.iter().map(|(priority, path)| (*priority, path)))
            .map(|(priority, path)| {
                EmbeddedPath::new(
                    priority,
                    path.iter().map(PhysicalLink::endpoints).collect(),
                )
            })
            .collect::<Vec<_>>();
        paths.sort_by(|a, b| b.priority.cmp(&a.priority));
        paths
    }
}

// ===== impl VirtualLink =====

impl VirtualLink {
    pub fn record(&self) -> EmbeddingRecord {
        EmbeddingRecord::new(
            VirtualLinkLike::Link(self.key),
            self.src,
            self.dst,
            self.paths.embedded_paths(),
        )
    }

    // Returns the opposite end of the link.
    fn peer(&self, port: &VirtualPortKey) -> Option<VirtualPortKey> {
        if self.src == *port {
            Some(self.dst)
        } else if self.dst == *port {
            Some(self.src)
        } else {
            None
        }
    }
}

// ===== impl SwitchRoute =====

impl SwitchRoute {
    pub fn record(&self) -> EmbeddingRecord {
        let key = self.key;
        EmbeddingRecord::new(
            VirtualLinkLike::Route(key),
            VirtualPortKey::new(key.tenant_id, key.vdpid, self.in_port),
            VirtualPortKey::new(key.tenant_id, key.vdpid, self.out_port),
            self.paths.embedded_paths(),
        )
    }
}

// ===== impl VirtualNetwork =====

impl VirtualNetwork {
    pub fn new(
        tenant_id: TenantId,
        config: &Config,
        store: Option<Arc<dyn EmbeddingStore>>,
    ) -> VirtualNetwork {
        let tenant_bits = config.tenant_bits;
        let inner = NetworkInner {
            switches: Default::default(),
            links: Default::default(),
            routes: Default::default(),
            switch_ids: IndexAllocator::new(IndexType::Switch, tenant_bits),
            link_ids: IndexAllocator::new(IndexType::Link, tenant_bits),
            ip_ids: IndexAllocator::new(IndexType::Ip, tenant_bits),
        };
        VirtualNetwork {
            tenant_id,
            tenant_bits,
            routing: config.routing.clone(),
            store,
            inner: Mutex::new(inner),
        }
    }

    // ----- switches and ports -----

    /// Creates a virtual switch on top of one or more physical switches.
    ///
    /// More than one physical switch makes it a big switch, whose internal
    /// routes follow `algorithm`.
    pub fn create_switch(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        dpids: &[Dpid],
        algorithm: RoutingAlgorithm,
        backups: Option<u8>,
    ) -> Result<VirtualSwitchKey, Error> {
        if dpids.is_empty() {
            return Err(Error::InvalidRequest(
                "virtual switch without physical switches".to_owned(),
            ));
        }
        if dpids.iter().collect::<BTreeSet<_>>().len() != dpids.len() {
            return Err(Error::InvalidRequest(
                "duplicate physical switch".to_owned(),
            ));
        }
        let backups = backups.unwrap_or(self.routing.default_backups);
        self.check_backups(usize::from(backups))?;

        let mut inner = self.inner.lock();
        for dpid in dpids {
            if !physical.has_switch(*dpid) {
                return Err(Error::PhysicalSwitchNotFound(*dpid));
            }
            if mapping.has_virtual_switch(*dpid, self.tenant_id) {
                return Err(Error::InvalidRequest(format!(
                    "physical switch {dpid:#x} already virtualized"
                )));
            }
        }

        let vdpid = VDPID_PREFIX | inner.switch_ids.next_index()?;
        let key = VirtualSwitchKey::new(self.tenant_id, vdpid);
        let kind = if dpids.len() == 1 {
            SwitchKind::Single
        } else {
            SwitchKind::Big(BigSwitch {
                algorithm,
                backups,
                routes: Default::default(),
                route_ids: IndexAllocator::new(IndexType::Route, self.tenant_bits),
            })
        };
        inner.switches.insert(
            vdpid,
            VirtualSwitch {
                key,
                dpids: dpids.to_vec(),
                kind,
                ports: Default::default(),
                port_ids: IndexAllocator::new(IndexType::Port, self.tenant_bits),
            },
        );
        mapping.add_switch_mapping(dpids, key);

        Debug::SwitchCreate(&key).log();
        Ok(key)
    }

    /// Creates a virtual port on top of a physical port.
    ///
    /// The port starts active when its physical port is up.
    pub fn create_port(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        vdpid: u64,
        port: PortKey,
    ) -> Result<VirtualPortKey, Error> {
        let physical_port =
            physical.port(&port).ok_or(Error::PhysicalPortNotFound(port))?;

        let mut inner = self.inner.lock();
        let switch = inner.switch_mut(&VirtualSwitchKey::new(self.tenant_id, vdpid))?;
        if !switch.dpids.contains(&port.dpid) {
            return Err(Error::InvalidRequest(format!(
                "physical port {port} is outside the virtual switch"
            )));
        }

        let number = switch.port_ids.next_index()? as PortNo;
        let key = VirtualPortKey::new(self.tenant_id, vdpid, number);
        let state = if physical_port.up {
            ElementState::Active
        } else {
            ElementState::Inactive
        };
        switch.ports.insert(
            number,
            VirtualPort {
                key,
                physical: port,
                state,
                admin_down: false,
                link_id: None,
                host: None,
            },
        );
        mapping.add_port_mapping(port, key);

        Debug::PortCreate(&key).log();
        Ok(key)
    }

    /// Administratively enables or disables a virtual port.
    pub fn set_port_admin(
        &self,
        physical: &PhysicalNetwork,
        key: &VirtualPortKey,
        up: bool,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.port_mut(key)?.admin_down = !up;
        if up {
            inner.boot_port(physical, key);
        } else {
            inner.tear_down_port(key);
        }
        Ok(())
    }

    /// Attaches a host to an edge port.
    ///
    /// Returns the physical IP address the host's virtual address translates
    /// to.
    pub fn add_host(
        &self,
        mapping: &Mapping,
        key: &VirtualPortKey,
        mac: MacAddr,
        ip: Ipv4Addr,
    ) -> Result<Ipv4Addr, Error> {
        let mut inner = self.inner.lock();
        let port = inner.port(key)?;
        if !port.is_edge() || port.host.is_some() {
            return Err(Error::PortInUse(*key));
        }
        if mapping.has_virtual_ip(self.tenant_id, ip) {
            return Err(Error::InvalidRequest(format!(
                "address {ip} already in use"
            )));
        }

        let index = inner.ip_ids.next_index()? as u32;
        let physical_ip = Ipv4Addr::from(
            (self.tenant_id << (32 - u32::from(self.tenant_bits))) | index,
        );
        inner.port_mut(key)?.host = Some(Host {
            mac,
            ip,
            physical_ip,
        });
        mapping.add_ip_mapping(self.tenant_id, ip, physical_ip);
        mapping.add_mac(mac, self.tenant_id);

        Debug::HostAdd(key, &mac).log();
        Ok(physical_ip)
    }

    pub fn remove_port(
        &self,
        mapping: &Mapping,
        key: &VirtualPortKey,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.unregister_port(&mut inner, mapping, key)
    }

    pub fn remove_switch(&self, mapping: &Mapping, vdpid: u64) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.unregister_switch(&mut inner, mapping, vdpid)
    }

    // Unregisters every virtual element of the network.
    pub fn remove_all(&self, mapping: &Mapping) {
        let mut inner = self.inner.lock();
        let vdpids = inner.switches.keys().copied().collect::<Vec<_>>();
        for vdpid in vdpids {
            if let Err(error) = self.unregister_switch(&mut inner, mapping, vdpid)
            {
                error.log();
            }
        }
    }

    // Forgets every virtual element without unregistering it anywhere.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.switches.clear();
        inner.links.clear();
        inner.routes.clear();
        inner.switch_ids.reset();
        inner.link_ids.reset();
        inner.ip_ids.reset();
    }

    // ----- virtual links -----

    /// Creates a virtual link embedded over the current physical topology.
    ///
    /// The embedding gets up to `backups` alternative paths, or the
    /// configured default.
    pub fn create_link(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        src: &VirtualPortKey,
        dst: &VirtualPortKey,
        backups: Option<u8>,
    ) -> Result<VirtualLinkKey, Error> {
        let backups = backups.unwrap_or(self.routing.default_backups);
        self.check_backups(usize::from(backups))?;

        let mut inner = self.inner.lock();
        let (src_port, dst_port) = inner.link_endpoints(src, dst)?;

        let paths =
            routing::embed_link(&physical.links(), src_port, dst_port, backups);
        let paths = PathSet::new(paths, self.routing.base_priority)
            .ok_or(Error::NoPath(src_port, dst_port))?;

        let link_id = inner.link_ids.next_index()? as u32;
        let key = VirtualLinkKey::new(self.tenant_id, link_id);
        self.install_link(&mut inner, mapping, physical, key, *src, *dst, paths);
        Ok(key)
    }

    /// Creates a virtual link over explicitly given physical paths.
    ///
    /// Paths are listed by decreasing priority. Hops may refer to links not
    /// discovered yet, in which case the link stays inactive until they are.
    pub fn set_link_path(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        src: &VirtualPortKey,
        dst: &VirtualPortKey,
        paths: &[Vec<LinkEndpoints>],
    ) -> Result<VirtualLinkKey, Error> {
        self.check_backups(paths.len().saturating_sub(1))?;

        let mut inner = self.inner.lock();
        let (src_port, dst_port) = inner.link_endpoints(src, dst)?;

        let paths = paths
            .iter()
            .map(|hops| resolve_link_path(physical, hops, src_port, dst_port))
            .collect::<Result<Vec<_>, _>>()?;
        let paths = PathSet::new(paths, self.routing.base_priority)
            .ok_or_else(|| Error::InvalidPath("no path given".to_owned()))?;

        let link_id = inner.link_ids.next_index()? as u32;
        let key = VirtualLinkKey::new(self.tenant_id, link_id);
        self.install_link(&mut inner, mapping, physical, key, *src, *dst, paths);
        Ok(key)
    }

    pub fn remove_link(
        &self,
        mapping: &Mapping,
        key: &VirtualLinkKey,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.unregister_link(&mut inner, mapping, key)
    }

    // ----- switch routes -----

    /// Installs a big switch route over explicitly given physical paths.
    ///
    /// Paths are listed by decreasing priority and must stay within the
    /// physical switches composing the big switch. An existing route between
    /// the same ports is replaced.
    pub fn create_route(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        vdpid: u64,
        in_port: PortNo,
        out_port: PortNo,
        paths: &[Vec<LinkEndpoints>],
    ) -> Result<SwitchRouteKey, Error> {
        self.check_backups(paths.len().saturating_sub(1))?;

        let mut inner = self.inner.lock();
        let (src, dst, members) =
            inner.route_endpoints(mapping, self.tenant_id, vdpid, in_port, out_port)?;

        let paths = paths
            .iter()
            .map(|hops| resolve_route_path(physical, hops, src, dst, &members))
            .collect::<Result<Vec<_>, _>>()?;
        let paths = PathSet::new(paths, self.routing.base_priority)
            .ok_or_else(|| Error::InvalidPath("no path given".to_owned()))?;

        let switch_key = VirtualSwitchKey::new(self.tenant_id, vdpid);
        let big = inner.switch_mut(&switch_key)?.big_mut()?;
        let route_id = match big.routes.get(&(in_port, out_port)) {
            Some(route_id) => *route_id,
            None => big.route_ids.next_index()? as u32,
        };
        let key = SwitchRouteKey::new(self.tenant_id, vdpid, route_id);
        self.install_route(&mut inner, mapping, physical, key, in_port, out_port, paths)?;
        Ok(key)
    }

    /// Returns the active physical path between two ports of a big switch.
    ///
    /// A cached route is returned as is. Otherwise, shortest-path switches
    /// compute and cache a new route over their internal links, while manual
    /// switches return nothing. A missing physical path is not an error.
    pub fn get_route(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        vdpid: u64,
        in_port: PortNo,
        out_port: PortNo,
    ) -> Result<Option<Vec<PhysicalLink>>, Error> {
        let mut inner = self.inner.lock();
        let (src, dst, members) =
            inner.route_endpoints(mapping, self.tenant_id, vdpid, in_port, out_port)?;

        let switch_key = VirtualSwitchKey::new(self.tenant_id, vdpid);
        let big = inner.switch_mut(&switch_key)?.big_mut()?;
        if let Some(route_id) = big.routes.get(&(in_port, out_port)) {
            let key = SwitchRouteKey::new(self.tenant_id, vdpid, *route_id);
            return Ok(inner.routes.get(&key).map(|route| route.paths.path.clone()));
        }
        if big.algorithm == RoutingAlgorithm::Manual {
            return Ok(None);
        }

        let edges = routing::scope_edges(&physical.links(), &members);
        let paths = routing::compute_paths(&edges, src, dst, big.backups);
        let Some(paths) = PathSet::new(paths, self.routing.base_priority) else {
            Debug::RouteUnavailable(&switch_key, in_port, out_port).log();
            return Ok(None);
        };
        let route_id = big.route_ids.next_index()? as u32;
        let key = SwitchRouteKey::new(self.tenant_id, vdpid, route_id);
        self.install_route(&mut inner, mapping, physical, key, in_port, out_port, paths)?;
        Ok(inner.routes.get(&key).map(|route| route.paths.path.clone()))
    }

    pub fn remove_route(
        &self,
        mapping: &Mapping,
        key: &SwitchRouteKey,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.unregister_route(&mut inner, mapping, key)
    }

    // ----- replay -----

    /// Reinstalls a persisted embedding.
    ///
    /// The element keeps its persisted identifier. Replaying the same record
    /// twice leaves the network unchanged.
    pub fn restore(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        record: &EmbeddingRecord,
    ) -> Result<VirtualLinkLike, Error> {
        if record.tenant_id() != self.tenant_id {
            return Err(Error::InvalidRequest(format!(
                "record of tenant {} replayed on tenant {}",
                record.tenant_id(),
                self.tenant_id
            )));
        }
        let paths = record
            .paths
            .iter()
            .map(|path| {
                let hops = path
                    .hops
                    .iter()
                    .map(|hop| physical.resolve_link(hop))
                    .collect::<Vec<_>>();
                (path.priority, hops)
            })
            .collect::<Vec<_>>();
        let paths = PathSet::with_priorities(paths)
            .ok_or_else(|| Error::InvalidPath("no path given".to_owned()))?;

        let mut inner = self.inner.lock();
        match record.element {
            VirtualLinkLike::Link(key) => {
                let existing = inner
                    .links
                    .get(&key.link_id)
                    .map(|link| (link.src, link.dst));
                if existing != Some((record.src, record.dst)) {
                    if existing.is_none() {
                        inner.link_endpoints(&record.src, &record.dst)?;
                    }
                    // Fails when the ID belongs to another link.
                    inner.link_ids.reserve_index(u64::from(key.link_id))?;
                }
                self.install_link(
                    &mut inner, mapping, physical, key, record.src, record.dst,
                    paths,
                );
            }
            VirtualLinkLike::Route(key) => {
                let (in_port, out_port) = (record.src.port, record.dst.port);
                inner.route_endpoints(
                    mapping, self.tenant_id, key.vdpid, in_port, out_port,
                )?;
                let switch_key = VirtualSwitchKey::new(key.tenant_id, key.vdpid);
                let cached = inner
                    .switch_mut(&switch_key)?
                    .big_mut()?
                    .routes
                    .get(&(in_port, out_port))
                    .copied();
                if cached != Some(key.route_id) {
                    // The replayed route supersedes whatever was computed
                    // in the meantime.
                    if let Some(route_id) = cached {
                        let stale =
                            SwitchRouteKey::new(key.tenant_id, key.vdpid, route_id);
                        self.unregister_route(&mut inner, mapping, &stale)?;
                    }
                    inner
                        .switch_mut(&switch_key)?
                        .big_mut()?
                        .route_ids
                        .reserve_index(u64::from(key.route_id))?;
                }
                self.install_route(
                    &mut inner, mapping, physical, key, in_port, out_port, paths,
                )?;
            }
        }
        Ok(record.element)
    }

    // ----- resilience -----

    /// Asks a virtual link or switch route to survive a physical link
    /// failure by switching to a backup path.
    pub fn try_recovery(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        element: &VirtualLinkLike,
        failed: &PhysicalLink,
    ) -> Result<bool, Error> {
        let failed = failed.endpoints();

        let mut inner = self.inner.lock();
        let record = match element {
            VirtualLinkLike::Link(key) => {
                let link = inner
                    .links
                    .get_mut(&key.link_id)
                    .ok_or(MappingError::VirtualLinkNotFound(*key))?;
                // Either direction of a hop failing takes the hop down.
                let directions = [failed, failed.reverse()];
                if !directions.iter().any(|hop| link.paths.uses(hop)) {
                    return Ok(true);
                }
                let is_live = |hop: &PhysicalLink| hop_is_live(physical, hop, true);
                if !directions
                    .iter()
                    .all(|hop| link.paths.try_recovery(hop, is_live))
                {
                    return Ok(false);
                }
                mapping.add_link_mapping(&link.paths.path, *key);
                Debug::RecoverySuccess(element, link.paths.priority).log();
                link.record()
            }
            VirtualLinkLike::Route(key) => {
                let route = inner
                    .routes
                    .get_mut(key)
                    .ok_or(MappingError::RouteNotFound(*key))?;
                if !route.paths.uses(&failed) {
                    return Ok(true);
                }
                let is_live = |hop: &PhysicalLink| hop_is_live(physical, hop, false);
                if !route.paths.try_recovery(&failed, is_live) {
                    return Ok(false);
                }
                mapping.add_route_mapping(*key, &route.paths.path);
                Debug::RecoverySuccess(element, route.paths.priority).log();
                route.record()
            }
        };
        self.save(&record);
        Ok(true)
    }

    /// Asks a virtual link or switch route to move back onto paths that
    /// crossed a recovered physical link.
    ///
    /// Returns true when the element is up on a reinstated path. Otherwise
    /// the caller decides whether to boot it.
    pub fn try_revert(
        &self,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        element: &VirtualLinkLike,
        recovered: &PhysicalLink,
    ) -> Result<bool, Error> {
        let recovered = recovered.endpoints();

        let mut inner = self.inner.lock();
        let (record, active) = match element {
            VirtualLinkLike::Link(key) => {
                let link = inner
                    .links
                    .get_mut(&key.link_id)
                    .ok_or(MappingError::VirtualLinkNotFound(*key))?;
                let is_live = |hop: &PhysicalLink| hop_is_live(physical, hop, true);
                let mut switched = false;
                for hop in [recovered, recovered.reverse()] {
                    switched |= link.paths.try_revert(&hop, is_live);
                }
                if !switched {
                    return Ok(false);
                }
                mapping.add_link_mapping(&link.paths.path, *key);
                Debug::RevertSuccess(element, link.paths.priority).log();
                (link.record(), link.state == ElementState::Active)
            }
            VirtualLinkLike::Route(key) => {
                let route = inner
                    .routes
                    .get_mut(key)
                    .ok_or(MappingError::RouteNotFound(*key))?;
                let is_live = |hop: &PhysicalLink| hop_is_live(physical, hop, false);
                if !route.paths.try_revert(&recovered, is_live) {
                    return Ok(false);
                }
                mapping.add_route_mapping(*key, &route.paths.path);
                Debug::RevertSuccess(element, route.paths.priority).log();
                (route.record(), route.state == ElementState::Active)
            }
        };
        self.save(&record);
        Ok(active)
    }

    // Elements holding an unusable path across a physical link.
    pub fn elements_with_unusable(&self, link: &LinkEndpoints) -> Vec<VirtualLinkLike> {
        let inner = self.inner.lock();
        let links = inner
            .links
            .values()
            .filter(|vlink| {
                vlink.paths.unusable.values().any(|path| {
                    crosses(path, link) || crosses(path, &link.reverse())
                })
            })
            .map(|vlink| VirtualLinkLike::Link(vlink.key));
        let routes = inner
            .routes
            .values()
            .filter(|route| route.paths.unusable.values().any(|path| crosses(path, link)))
            .map(|route| VirtualLinkLike::Route(route.key));
        links.chain(routes).collect()
    }

    // Boots a virtual port, and the port at the other end of its link.
    pub fn boot_port(
        &self,
        physical: &PhysicalNetwork,
        key: &VirtualPortKey,
    ) -> Result<bool, Error> {
        let mut inner = self.inner.lock();
        inner.port(key)?;
        Ok(inner.boot_port(physical, key))
    }

    // Tears down a virtual port, and the port at the other end of its link.
    pub fn tear_down_port(&self, key: &VirtualPortKey) -> Result<bool, Error> {
        let mut inner = self.inner.lock();
        inner.port(key)?;
        Ok(inner.tear_down_port(key))
    }

    pub fn boot_element(
        &self,
        physical: &PhysicalNetwork,
        element: &VirtualLinkLike,
    ) -> Result<bool, Error> {
        let both_ways = matches!(element, VirtualLinkLike::Link(_));
        let mut inner = self.inner.lock();
        let (state, path) = inner.element_mut(element)?;
        if *state == ElementState::Active {
            return Ok(false);
        }
        if !path_is_live(physical, path, both_ways) {
            return Ok(false);
        }
        *state = ElementState::Active;
        Debug::ElementBoot(element).log();
        Ok(true)
    }

    pub fn tear_down_element(&self, element: &VirtualLinkLike) -> Result<bool, Error> {
        let mut inner = self.inner.lock();
        let (state, _) = inner.element_mut(element)?;
        if *state == ElementState::Inactive {
            return Ok(false);
        }
        *state = ElementState::Inactive;
        Debug::ElementTearDown(element).log();
        Ok(true)
    }

    pub fn unregister_element(
        &self,
        mapping: &Mapping,
        element: &VirtualLinkLike,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        match element {
            VirtualLinkLike::Link(key) => self.unregister_link(&mut inner, mapping, key),
            VirtualLinkLike::Route(key) => {
                self.unregister_route(&mut inner, mapping, key)
            }
        }
    }

    // ----- snapshots -----

    pub fn switch(&self, vdpid: u64) -> Option<VirtualSwitch> {
        self.inner.lock().switches.get(&vdpid).cloned()
    }

    pub fn switches(&self) -> Vec<VirtualSwitchKey> {
        self.inner
            .lock()
            .switches
            .values()
            .map(|switch| switch.key)
            .collect()
    }

    pub fn port(&self, key: &VirtualPortKey) -> Option<VirtualPort> {
        self.inner.lock().port(key).ok().cloned()
    }

    pub fn link(&self, key: &VirtualLinkKey) -> Option<VirtualLink> {
        self.inner.lock().links.get(&key.link_id).cloned()
    }

    pub fn links(&self) -> Vec<VirtualLink> {
        self.inner.lock().links.values().cloned().collect()
    }

    pub fn route(&self, key: &SwitchRouteKey) -> Option<SwitchRoute> {
        self.inner.lock().routes.get(key).cloned()
    }

    // ----- helpers -----

    // Every backup path needs a priority of its own below the primary one.
    fn check_backups(&self, backups: usize) -> Result<(), Error> {
        let base = self.routing.base_priority;
        if backups >= usize::from(base) {
            return Err(Error::InvalidRequest(format!(
                "{backups} backup paths don't fit below priority {base}"
            )));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn install_link(
        &self,
        inner: &mut NetworkInner,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        key: VirtualLinkKey,
        src: VirtualPortKey,
        dst: VirtualPortKey,
        paths: PathSet,
    ) {
        for port in [src, dst] {
            if let Ok(port) = inner.port_mut(&port) {
                port.link_id = Some(key.link_id);
            }
        }
        let state = if path_is_live(physical, &paths.path, true) {
            ElementState::Active
        } else {
            ElementState::Inactive
        };
        mapping.add_link_mapping(&paths.path, key);

        let link = VirtualLink {
            key,
            src,
            dst,
            paths,
            state,
        };
        self.save(&link.record());
        inner.links.insert(key.link_id, link);
        Debug::LinkCreate(&key).log();
    }

    #[allow(clippy::too_many_arguments)]
    fn install_route(
        &self,
        inner: &mut NetworkInner,
        mapping: &Mapping,
        physical: &PhysicalNetwork,
        key: SwitchRouteKey,
        in_port: PortNo,
        out_port: PortNo,
        paths: PathSet,
    ) -> Result<(), Error> {
        let switch_key = VirtualSwitchKey::new(key.tenant_id, key.vdpid);
        let big = inner.switch_mut(&switch_key)?.big_mut()?;
        big.routes.insert((in_port, out_port), key.route_id);

        let state = if path_is_live(physical, &paths.path, false) {
            ElementState::Active
        } else {
            ElementState::Inactive
        };
        mapping.add_route_mapping(key, &paths.path);

        let route = SwitchRoute {
            key,
            in_port,
            out_port,
            paths,
            state,
        };
        self.save(&route.record());
        inner.routes.insert(key, route);
        Debug::RouteCreate(&key).log();
        Ok(())
    }

    fn unregister_link(
        &self,
        inner: &mut NetworkInner,
        mapping: &Mapping,
        key: &VirtualLinkKey,
    ) -> Result<(), Error> {
        let link = inner
            .links
            .remove(&key.link_id)
            .ok_or(MappingError::VirtualLinkNotFound(*key))?;
        for port in [link.src, link.dst] {
            if let Ok(port) = inner.port_mut(&port) {
                if port.link_id == Some(key.link_id) {
                    port.link_id = None;
                }
            }
        }
        inner.link_ids.release_index(u64::from(key.link_id));
        mapping.remove_virtual_link(key);
        if let Some(store) = &self.store {
            store.remove(&VirtualLinkLike::Link(*key));
        }

        Debug::LinkDelete(key).log();
        Ok(())
    }

    fn unregister_route(
        &self,
        inner: &mut NetworkInner,
        mapping: &Mapping,
        key: &SwitchRouteKey,
    ) -> Result<(), Error> {
        let route = inner
            .routes
            .remove(key)
            .ok_or(MappingError::RouteNotFound(*key))?;
        let switch_key = VirtualSwitchKey::new(key.tenant_id, key.vdpid);
        if let Ok(big) = inner.switch_mut(&switch_key).and_then(|switch| switch.big_mut()) {
            big.routes.remove(&(route.in_port, route.out_port));
            big.route_ids.release_index(u64::from(key.route_id));
        }
        mapping.remove_route(key);
        if let Some(store) = &self.store {
            store.remove(&VirtualLinkLike::Route(*key));
        }

        Debug::RouteDelete(key).log();
        Ok(())
    }

    fn unregister_port(
        &self,
        inner: &mut NetworkInner,
        mapping: &Mapping,
        key: &VirtualPortKey,
    ) -> Result<(), Error> {
        let port = inner.port(key)?.clone();

        // Elements attached to the port go first.
        if let Some(link_id) = port.link_id {
            let link_key = VirtualLinkKey::new(key.tenant_id, link_id);
            self.unregister_link(inner, mapping, &link_key)?;
        }
        let routes = inner
            .routes
            .values()
            .filter(|route| {
                route.key.vdpid == key.vdpid
                    && (route.in_port == key.port || route.out_port == key.port)
            })
            .map(|route| route.key)
            .collect::<Vec<_>>();
        for route in routes {
            self.unregister_route(inner, mapping, &route)?;
        }
        if let Some(host) = &port.host {
            mapping.remove_mac(&host.mac);
            mapping.remove_ip_mapping(key.tenant_id, host.ip);
            let mask = u32::MAX >> self.tenant_bits;
            inner
                .ip_ids
                .release_index(u64::from(u32::from(host.physical_ip) & mask));
        }

        let switch = inner.switch_mut(&key.switch())?;
        switch.ports.remove(&key.port);
        switch.port_ids.release_index(u64::from(key.port));
        mapping.remove_virtual_port(key);

        Debug::PortDelete(key).log();
        Ok(())
    }

    fn unregister_switch(
        &self,
        inner: &mut NetworkInner,
        mapping: &Mapping,
        vdpid: u64,
    ) -> Result<(), Error> {
        let key = VirtualSwitchKey::new(self.tenant_id, vdpid);
        let ports = inner
            .switch(&key)?
            .ports
            .values()
            .map(|port| port.key)
            .collect::<Vec<_>>();
        for port in ports {
            self.unregister_port(inner, mapping, &port)?;
        }

        inner.switches.remove(&vdpid);
        inner.switch_ids.release_index(vdpid & !VDPID_PREFIX);
        mapping.remove_virtual_switch(&key);

        Debug::SwitchDelete(&key).log();
        Ok(())
    }

    fn save(&self, record: &EmbeddingRecord) {
        if let Some(store) = &self.store {
            store.save(record);
        }
    }
}

// ===== impl NetworkInner =====

impl NetworkInner {
    fn switch(&self, key: &VirtualSwitchKey) -> Result<&VirtualSwitch, Error> {
        self.switches
            .get(&key.vdpid)
            .ok_or(Error::VirtualSwitchNotFound(*key))
    }

    fn switch_mut(
        &mut self,
        key: &VirtualSwitchKey,
    ) -> Result<&mut VirtualSwitch, Error> {
        self.switches
            .get_mut(&key.vdpid)
            .ok_or(Error::VirtualSwitchNotFound(*key))
    }

    fn port(&self, key: &VirtualPortKey) -> Result<&VirtualPort, Error> {
        self.switches
            .get(&key.vdpid)
            .and_then(|switch| switch.ports.get(&key.port))
            .ok_or(Error::VirtualPortNotFound(*key))
    }

    fn port_mut(&mut self, key: &VirtualPortKey) -> Result<&mut VirtualPort, Error> {
        self.switches
            .get_mut(&key.vdpid)
            .and_then(|switch| switch.ports.get_mut(&key.port))
            .ok_or(Error::VirtualPortNotFound(*key))
    }

    fn element_mut(
        &mut self,
        element: &VirtualLinkLike,
    ) -> Result<(&mut ElementState, &[PhysicalLink]), Error> {
        match element {
            VirtualLinkLike::Link(key) => {
                let link = self
                    .links
                    .get_mut(&key.link_id)
                    .ok_or(MappingError::VirtualLinkNotFound(*key))?;
                Ok((&mut link.state, link.paths.path.as_slice()))
            }
            VirtualLinkLike::Route(key) => {
                let route = self
                    .routes
                    .get_mut(key)
                    .ok_or(MappingError::RouteNotFound(*key))?;
                Ok((&mut route.state, route.paths.path.as_slice()))
            }
        }
    }

    // Validates the endpoints of a new virtual link.
    fn link_endpoints(
        &self,
        src: &VirtualPortKey,
        dst: &VirtualPortKey,
    ) -> Result<(PortKey, PortKey), Error> {
        if src == dst {
            return Err(Error::InvalidRequest(
                "virtual link looping on a single port".to_owned(),
            ));
        }
        let mut physical = vec![];
        for key in [src, dst] {
            let port = self.port(key)?;
            if !port.is_edge() || port.host.is_some() {
                return Err(Error::PortInUse(*key));
            }
            physical.push(port.physical);
        }
        Ok((physical[0], physical[1]))
    }

    // Validates the endpoints of a big switch route, returning the physical
    // switches to route between and the switches composing the big switch.
    fn route_endpoints(
        &self,
        mapping: &Mapping,
        tenant_id: TenantId,
        vdpid: u64,
        in_port: PortNo,
        out_port: PortNo,
    ) -> Result<(Dpid, Dpid, Vec<Dpid>), Error> {
        let key = VirtualSwitchKey::new(tenant_id, vdpid);
        let switch = self.switch(&key)?;
        if !switch.is_big() {
            return Err(Error::NotBigSwitch(key));
        }
        if in_port == out_port {
            return Err(Error::InvalidRequest(
                "route looping on a single port".to_owned(),
            ));
        }
        let src = self.port(&VirtualPortKey::new(tenant_id, vdpid, in_port))?;
        let dst = self.port(&VirtualPortKey::new(tenant_id, vdpid, out_port))?;
        let members = mapping.get_physical_switches(&key)?;
        Ok((src.physical.dpid, dst.physical.dpid, members))
    }

    fn boot_port(&mut self, physical: &PhysicalNetwork, key: &VirtualPortKey) -> bool {
        let Ok(port) = self.port_mut(key) else {
            return false;
        };
        if port.state == ElementState::Active {
            return false;
        }
        if port.admin_down {
            Debug::PortBootWithheld(key).log();
            return false;
        }
        if !physical.port(&port.physical).is_some_and(|port| port.up) {
            return false;
        }
        port.state = ElementState::Active;
        let link_id = port.link_id;
        Debug::PortBoot(key).log();

        if let Some(peer) = link_id.and_then(|id| self.links.get(&id)?.peer(key)) {
            self.boot_port(physical, &peer);
        }
        true
    }

    fn tear_down_port(&mut self, key: &VirtualPortKey) -> bool {
        let Ok(port) = self.port_mut(key) else {
            return false;
        };
        if port.state == ElementState::Inactive {
            return false;
        }
        port.state = ElementState::Inactive;
        let link_id = port.link_id;
        Debug::PortTearDown(key).log();

        if let Some(peer) = link_id.and_then(|id| self.links.get(&id)?.peer(key)) {
            self.tear_down_port(&peer);
        }
        true
    }
}

// ===== helper functions =====

fn crosses(path: &[PhysicalLink], link: &LinkEndpoints) -> bool {
    path.iter().any(|hop| hop.endpoints() == *link)
}

// Virtual links carry traffic both ways and need each hop up in both
// directions. Switch routes only need the direction they cross.
fn hop_is_live(physical: &PhysicalNetwork, hop: &PhysicalLink, both_ways: bool) -> bool {
    physical.get_link(hop.src, hop.dst).is_some()
        && (!both_ways || physical.get_link(hop.dst, hop.src).is_some())
}

fn path_is_live(
    physical: &PhysicalNetwork,
    path: &[PhysicalLink],
    both_ways: bool,
) -> bool {
    path.iter().all(|hop| hop_is_live(physical, hop, both_ways))
}

// Resolves an explicit virtual link path, which must lead from one access
// port to the other.
fn resolve_link_path(
    physical: &PhysicalNetwork,
    hops: &[LinkEndpoints],
    src: PortKey,
    dst: PortKey,
) -> Result<Vec<PhysicalLink>, Error> {
    let (Some(first), Some(last)) = (hops.first(), hops.last()) else {
        return Err(Error::InvalidPath("empty path".to_owned()));
    };
    if first.src != src || last.dst != dst {
        return Err(Error::InvalidPath(format!(
            "path doesn't connect {src} to {dst}"
        )));
    }
    check_continuity(hops)?;
    Ok(hops.iter().map(|hop| physical.resolve_link(hop)).collect())
}

// Resolves an explicit route path, which must stay within the big switch.
fn resolve_route_path(
    physical: &PhysicalNetwork,
    hops: &[LinkEndpoints],
    src: Dpid,
    dst: Dpid,
    members: &[Dpid],
) -> Result<Vec<PhysicalLink>, Error> {
    if let Some(hop) = hops.iter().find(|hop| {
        !members.contains(&hop.src.dpid) || !members.contains(&hop.dst.dpid)
    }) {
        return Err(Error::InvalidPath(format!(
            "hop {hop} leaves the big switch"
        )));
    }
    let connected = match (hops.first(), hops.last()) {
        (Some(first), Some(last)) => first.src.dpid == src && last.dst.dpid == dst,
        _ => src == dst,
    };
    if !connected {
        return Err(Error::InvalidPath(format!(
            "path doesn't connect {src:#x} to {dst:#x}"
        )));
    }
    check_continuity(hops)?;
    Ok(hops.iter().map(|hop| physical.resolve_link(hop)).collect())
}

fn check_continuity(hops: &[LinkEndpoints]) -> Result<(), Error> {
    match hops
        .windows(2)
        .find(|pair| pair[0].dst.dpid != pair[1].src.dpid)
    {
        Some(pair) => Err(Error::InvalidPath(format!(
            "hops {} and {} aren't adjacent",
            pair[0], pair[1]
        ))),
        None => Ok(()),
    }
}
