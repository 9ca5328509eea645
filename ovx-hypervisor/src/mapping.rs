//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use ovx_utils::mac_addr::MacAddr;
use parking_lot::RwLock;

use crate::error::MappingError;
use crate::network::{
    SwitchRouteKey, TenantId, VirtualLinkKey, VirtualNetwork, VirtualPortKey,
    VirtualSwitchKey,
};
use crate::physical::{Dpid, LinkEndpoints, PhysicalLink, PortKey};

//
// Bidirectional registry between physical and virtual network elements.
//
// Every mutating operation updates both directions under the same write lock,
// so a reader never observes a physical-to-virtual entry without its reverse.
// No operation performs I/O or waits on anything but the lock itself.
//
// Physical-side indexes are tenant-scoped. Tenant sub-maps that become empty
// are pruned by the same operation that empties them.
//
#[derive(Debug, Default)]
pub struct Mapping {
    inner: RwLock<MappingInner>,
}

// Tenant-scoped reverse index: physical key -> tenant -> virtual keys.
type TenantIndex<P, V> = HashMap<P, BTreeMap<TenantId, BTreeSet<V>>>;

#[derive(Debug, Default)]
struct MappingInner {
    // Switches.
    virtual_switches: HashMap<VirtualSwitchKey, Vec<Dpid>>,
    physical_switches: HashMap<Dpid, BTreeMap<TenantId, VirtualSwitchKey>>,
    // Ports.
    virtual_ports: HashMap<VirtualPortKey, PortKey>,
    physical_ports: TenantIndex<PortKey, VirtualPortKey>,
    // Links.
    virtual_links: HashMap<VirtualLinkKey, Vec<PhysicalLink>>,
    physical_links: TenantIndex<LinkEndpoints, VirtualLinkKey>,
    // Big switch internal routes.
    routes: HashMap<SwitchRouteKey, Vec<PhysicalLink>>,
    physical_routes: TenantIndex<LinkEndpoints, SwitchRouteKey>,
    // Physical link identity, kept across flaps.
    link_ids: HashMap<LinkEndpoints, u32>,
    // Addresses.
    physical_ips: HashMap<Ipv4Addr, (TenantId, Ipv4Addr)>,
    virtual_ips: HashMap<Ipv4Addr, BTreeMap<TenantId, Ipv4Addr>>,
    macs: HashMap<MacAddr, TenantId>,
    // Virtual networks.
    networks: BTreeMap<TenantId, Arc<VirtualNetwork>>,
}

// ===== impl Mapping =====

impl Mapping {
    pub fn new() -> Mapping {
        Mapping::default()
    }

    // Drops every mapping.
    pub fn reset(&self) {
        *self.inner.write() = MappingInner::default();
    }

    // ----- switches -----

    /// Maps a virtual switch onto its physical switches.
    ///
    /// A single switch has one entry, a big switch has one per member. An
    /// existing mapping for the same virtual switch is replaced.
    pub fn add_switch_mapping(&self, dpids: &[Dpid], vswitch: VirtualSwitchKey) {
        let mut inner = self.inner.write();
        inner.unlink_virtual_switch(&vswitch);
        for dpid in dpids {
            inner
                .physical_switches
                .entry(*dpid)
                .or_default()
                .insert(vswitch.tenant_id, vswitch);
        }
        inner.virtual_switches.insert(vswitch, dpids.to_vec());
    }

    pub fn get_virtual_switch(
        &self,
        dpid: Dpid,
        tenant_id: TenantId,
    ) -> Result<VirtualSwitchKey, MappingError> {
        let inner = self.inner.read();
        let tenants = inner
            .physical_switches
            .get(&dpid)
            .ok_or(MappingError::PhysicalSwitchNotFound(dpid))?;
        tenants
            .get(&tenant_id)
            .copied()
            .ok_or(MappingError::TenantSwitchNotFound(dpid, tenant_id))
    }

    pub fn get_physical_switches(
        &self,
        vswitch: &VirtualSwitchKey,
    ) -> Result<Vec<Dpid>, MappingError> {
        self.inner
            .read()
            .virtual_switches
            .get(vswitch)
            .cloned()
            .ok_or(MappingError::VirtualSwitchNotFound(*vswitch))
    }

    pub fn has_virtual_switch(&self, dpid: Dpid, tenant_id: TenantId) -> bool {
        self.inner
            .read()
            .physical_switches
            .get(&dpid)
            .is_some_and(|tenants| tenants.contains_key(&tenant_id))
    }

    pub fn remove_virtual_switch(&self, vswitch: &VirtualSwitchKey) {
        self.inner.write().unlink_virtual_switch(vswitch);
    }

    /// Removes a physical switch from every virtual switch it backs.
    ///
    /// Virtual switches left without any physical member are dropped.
    pub fn remove_physical_switch(&self, dpid: Dpid) {
        let mut inner = self.inner.write();
        let Some(tenants) = inner.physical_switches.remove(&dpid) else {
            return;
        };
        for vswitch in tenants.values() {
            if let Some(dpids) = inner.virtual_switches.get_mut(vswitch) {
                dpids.retain(|member| *member != dpid);
                if dpids.is_empty() {
                    inner.virtual_switches.remove(vswitch);
                }
            }
        }
    }

    // ----- ports -----

    pub fn add_port_mapping(&self, port: PortKey, vport: VirtualPortKey) {
        let mut inner = self.inner.write();
        inner.unlink_virtual_port(&vport);
        inner
            .physical_ports
            .entry(port)
            .or_default()
            .entry(vport.tenant_id)
            .or_default()
            .insert(vport);
        inner.virtual_ports.insert(vport, port);
    }

    pub fn get_physical_port(
        &self,
        vport: &VirtualPortKey,
    ) -> Result<PortKey, MappingError> {
        self.inner
            .read()
            .virtual_ports
            .get(vport)
            .copied()
            .ok_or(MappingError::VirtualPortNotFound(*vport))
    }

    // Returns the virtual ports of all tenants mapped onto a physical port.
    pub fn get_virtual_ports(&self, port: &PortKey) -> Vec<VirtualPortKey> {
        self.inner
            .read()
            .physical_ports
            .get(port)
            .map(|tenants| tenants.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn remove_virtual_port(&self, vport: &VirtualPortKey) {
        self.inner.write().unlink_virtual_port(vport);
    }

    // ----- links -----

    /// Records the ordered physical path of a virtual link.
    ///
    /// Virtual links carry traffic both ways, so each hop is indexed in both
    /// directions and the virtual link is found from either of them.
    /// Re-adding the same virtual link replaces its previous path.
    pub fn add_link_mapping(&self, links: &[PhysicalLink], vlink: VirtualLinkKey) {
        let mut inner = self.inner.write();
        inner.unlink_virtual_link(&vlink);
        for link in links {
            inner.link_ids.insert(link.endpoints(), link.id);
            for endpoints in [link.endpoints(), link.endpoints().reverse()] {
                inner
                    .physical_links
                    .entry(endpoints)
                    .or_default()
                    .entry(vlink.tenant_id)
                    .or_default()
                    .insert(vlink);
            }
        }
        inner.virtual_links.insert(vlink, links.to_vec());
    }

    pub fn get_virtual_links(
        &self,
        link: &LinkEndpoints,
        tenant_id: TenantId,
    ) -> Result<Vec<VirtualLinkKey>, MappingError> {
        let inner = self.inner.read();
        let tenants = inner
            .physical_links
            .get(link)
            .ok_or(MappingError::PhysicalLinkNotFound(*link))?;
        tenants
            .get(&tenant_id)
            .map(|vlinks| vlinks.iter().copied().collect())
            .ok_or(MappingError::TenantLinkNotFound(*link, tenant_id))
    }

    pub fn get_physical_links(
        &self,
        vlink: &VirtualLinkKey,
    ) -> Result<Vec<PhysicalLink>, MappingError> {
        self.inner
            .read()
            .virtual_links
            .get(vlink)
            .cloned()
            .ok_or(MappingError::VirtualLinkNotFound(*vlink))
    }

    pub fn has_virtual_links(
        &self,
        link: &LinkEndpoints,
        tenant_id: TenantId,
    ) -> bool {
        self.inner
            .read()
            .physical_links
            .get(link)
            .is_some_and(|tenants| tenants.contains_key(&tenant_id))
    }

    pub fn remove_virtual_link(&self, vlink: &VirtualLinkKey) {
        self.inner.write().unlink_virtual_link(vlink);
    }

    /// Removes a physical link from both directions of every mapping.
    ///
    /// The link is stripped from the recorded path of each virtual link and
    /// switch route that used it, and its identity is forgotten. A virtual
    /// link loses the hop whichever direction its path crosses it in.
    pub fn remove_physical_link(&self, link: &LinkEndpoints) {
        let mut inner = self.inner.write();
        let reverse = link.reverse();
        if let Some(tenants) = inner.physical_links.remove(link) {
            for vlink in tenants.into_values().flatten() {
                if let Some(path) = inner.virtual_links.get_mut(&vlink) {
                    path.retain(|hop| {
                        hop.endpoints() != *link && hop.endpoints() != reverse
                    });
                }
                unlink(&mut inner.physical_links, &reverse, vlink.tenant_id, &vlink);
            }
        }
        if let Some(tenants) = inner.physical_routes.remove(link) {
            for route in tenants.values().flatten() {
                if let Some(path) = inner.routes.get_mut(route) {
                    path.retain(|hop| hop.endpoints() != *link);
                }
            }
        }
        inner.link_ids.remove(link);
    }

    /// Remembers the identifier assigned to a physical link.
    pub fn record_link_id(&self, link: &PhysicalLink) {
        self.inner.write().link_ids.insert(link.endpoints(), link.id);
    }

    /// Restores the identifier previously assigned to the same endpoints.
    ///
    /// Returns false, leaving the link untouched, when the endpoints were
    /// never seen.
    pub fn known_link(&self, link: &mut PhysicalLink) -> bool {
        match self.inner.read().link_ids.get(&link.endpoints()) {
            Some(id) => {
                link.id = *id;
                true
            }
            None => false,
        }
    }

    // ----- switch routes -----

    pub fn add_route_mapping(&self, route: SwitchRouteKey, links: &[PhysicalLink]) {
        let mut inner = self.inner.write();
        inner.unlink_route(&route);
        for link in links {
            inner.link_ids.insert(link.endpoints(), link.id);
            inner
                .physical_routes
                .entry(link.endpoints())
                .or_default()
                .entry(route.tenant_id)
                .or_default()
                .insert(route);
        }
        inner.routes.insert(route, links.to_vec());
    }

    pub fn get_route(
        &self,
        route: &SwitchRouteKey,
    ) -> Result<Vec<PhysicalLink>, MappingError> {
        self.inner
            .read()
            .routes
            .get(route)
            .cloned()
            .ok_or(MappingError::RouteNotFound(*route))
    }

    pub fn get_switch_routes(
        &self,
        link: &LinkEndpoints,
        tenant_id: TenantId,
    ) -> Result<Vec<SwitchRouteKey>, MappingError> {
        let inner = self.inner.read();
        let tenants = inner
            .physical_routes
            .get(link)
            .ok_or(MappingError::PhysicalLinkNotFound(*link))?;
        tenants
            .get(&tenant_id)
            .map(|routes| routes.iter().copied().collect())
            .ok_or(MappingError::TenantRouteNotFound(*link, tenant_id))
    }

    pub fn has_switch_routes(
        &self,
        link: &LinkEndpoints,
        tenant_id: TenantId,
    ) -> bool {
        self.inner
            .read()
            .physical_routes
            .get(link)
            .is_some_and(|tenants| tenants.contains_key(&tenant_id))
    }

    pub fn remove_route(&self, route: &SwitchRouteKey) {
        self.inner.write().unlink_route(route);
    }

    // ----- addresses -----

    pub fn add_ip_mapping(
        &self,
        tenant_id: TenantId,
        virtual_ip: Ipv4Addr,
        physical_ip: Ipv4Addr,
    ) {
        let mut inner = self.inner.write();
        inner
            .physical_ips
            .insert(physical_ip, (tenant_id, virtual_ip));
        inner
            .virtual_ips
            .entry(virtual_ip)
            .or_default()
            .insert(tenant_id, physical_ip);
    }

    pub fn get_virtual_ip(
        &self,
        physical_ip: Ipv4Addr,
    ) -> Result<(TenantId, Ipv4Addr), MappingError> {
        self.inner
            .read()
            .physical_ips
            .get(&physical_ip)
            .copied()
            .ok_or(MappingError::PhysicalIpNotFound(physical_ip))
    }

    pub fn get_physical_ip(
        &self,
        tenant_id: TenantId,
        virtual_ip: Ipv4Addr,
    ) -> Result<Ipv4Addr, MappingError> {
        self.inner
            .read()
            .virtual_ips
            .get(&virtual_ip)
            .and_then(|tenants| tenants.get(&tenant_id))
            .copied()
            .ok_or(MappingError::VirtualIpNotFound(tenant_id, virtual_ip))
    }

    pub fn has_physical_ip(&self, physical_ip: Ipv4Addr) -> bool {
        self.inner.read().physical_ips.contains_key(&physical_ip)
    }

    pub fn has_virtual_ip(
        &self,
        tenant_id: TenantId,
        virtual_ip: Ipv4Addr,
    ) -> bool {
        self.inner
            .read()
            .virtual_ips
            .get(&virtual_ip)
            .is_some_and(|tenants| tenants.contains_key(&tenant_id))
    }

    pub fn remove_ip_mapping(&self, tenant_id: TenantId, virtual_ip: Ipv4Addr) {
        let mut inner = self.inner.write();
        let Some(tenants) = inner.virtual_ips.get_mut(&virtual_ip) else {
            return;
        };
        let physical_ip = tenants.remove(&tenant_id);
        if tenants.is_empty() {
            inner.virtual_ips.remove(&virtual_ip);
        }
        if let Some(physical_ip) = physical_ip {
            inner.physical_ips.remove(&physical_ip);
        }
    }

    // Removes every address translation of a tenant.
    pub fn remove_virtual_ips(&self, tenant_id: TenantId) {
        self.inner.write().unlink_tenant_ips(tenant_id);
    }

    pub fn add_mac(&self, mac: MacAddr, tenant_id: TenantId) {
        self.inner.write().macs.insert(mac, tenant_id);
    }

    pub fn get_mac(&self, mac: &MacAddr) -> Result<TenantId, MappingError> {
        self.inner
            .read()
            .macs
            .get(mac)
            .copied()
            .ok_or(MappingError::MacNotFound(*mac))
    }

    pub fn has_mac(&self, mac: &MacAddr) -> bool {
        self.inner.read().macs.contains_key(mac)
    }

    pub fn remove_mac(&self, mac: &MacAddr) {
        self.inner.write().macs.remove(mac);
    }

    // ----- virtual networks -----

    pub fn add_network(&self, network: Arc<VirtualNetwork>) {
        self.inner
            .write()
            .networks
            .insert(network.tenant_id, network);
    }

    pub fn get_network(
        &self,
        tenant_id: TenantId,
    ) -> Result<Arc<VirtualNetwork>, MappingError> {
        self.inner
            .read()
            .networks
            .get(&tenant_id)
            .cloned()
            .ok_or(MappingError::NetworkNotFound(tenant_id))
    }

    pub fn list_tenant_ids(&self) -> Vec<TenantId> {
        self.inner.read().networks.keys().copied().collect()
    }

    // Unregisters a virtual network and drops its address entries.
    pub fn remove_network(&self, tenant_id: TenantId) {
        let mut inner = self.inner.write();
        inner.networks.remove(&tenant_id);
        inner.unlink_tenant_ips(tenant_id);
        inner.macs.retain(|_, owner| *owner != tenant_id);
    }
}

// ===== impl MappingInner =====

impl MappingInner {
    fn unlink_virtual_switch(&mut self, vswitch: &VirtualSwitchKey) {
        let Some(dpids) = self.virtual_switches.remove(vswitch) else {
            return;
        };
        for dpid in dpids {
            if let Some(tenants) = self.physical_switches.get_mut(&dpid) {
                if tenants.get(&vswitch.tenant_id) == Some(vswitch) {
                    tenants.remove(&vswitch.tenant_id);
                }
                if tenants.is_empty() {
                    self.physical_switches.remove(&dpid);
                }
            }
        }
    }

    fn unlink_virtual_port(&mut self, vport: &VirtualPortKey) {
        if let Some(port) = self.virtual_ports.remove(vport) {
            unlink(&mut self.physical_ports, &port, vport.tenant_id, vport);
        }
    }

    fn unlink_virtual_link(&mut self, vlink: &VirtualLinkKey) {
        if let Some(path) = self.virtual_links.remove(vlink) {
            for link in path {
                for endpoints in [link.endpoints(), link.endpoints().reverse()] {
                    unlink(&mut self.physical_links, &endpoints, vlink.tenant_id, vlink);
                }
            }
        }
    }

    fn unlink_route(&mut self, route: &SwitchRouteKey) {
        if let Some(path) = self.routes.remove(route) {
            for link in path {
                unlink(
                    &mut self.physical_routes,
                    &link.endpoints(),
                    route.tenant_id,
                    route,
                );
            }
        }
    }

    fn unlink_tenant_ips(&mut self, tenant_id: TenantId) {
        self.physical_ips.retain(|_, (owner, _)| *owner != tenant_id);
        self.virtual_ips.retain(|_, tenants| {
            tenants.remove(&tenant_id);
            !tenants.is_empty()
        });
    }
}

// ===== helper functions =====

// Removes one virtual key from a tenant-scoped reverse index, pruning the
// tenant set and the physical entry once they become empty.
fn unlink<P, V>(
    index: &mut TenantIndex<P, V>,
    key: &P,
    tenant_id: TenantId,
    value: &V,
) where
    P: std::hash::Hash + Eq,
    V: Ord,
{
    let Some(tenants) = index.get_mut(key) else {
        return;
    };
    if let Some(values) = tenants.get_mut(&tenant_id) {
        values.remove(value);
        if values.is_empty() {
            tenants.remove(&tenant_id);
        }
    }
    if tenants.is_empty() {
        index.remove(key);
    }
}
