//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug_span;

use crate::debug::Debug;
use crate::error::Error;
use crate::mapping::Mapping;
use crate::network::{
    TenantId, VirtualLinkLike, VirtualNetwork, VirtualPortKey,
};
use crate::physical::{PhysicalLink, PhysicalNetwork, PortKey};

//
// Propagates physical failures and recoveries to the virtual elements built
// on top of them.
//
// Each sweep works on snapshots taken from the Mapping Store, since tearing
// elements down mutates the very indexes being swept. Failures are isolated
// per element: they're logged and the sweep goes on.
//
// Repeated signals are harmless. Every boot and teardown is a no-op on an
// element already in the target state.
//
#[derive(Debug)]
pub struct ResilienceCoordinator {
    mapping: Arc<Mapping>,
}

// ===== impl ResilienceCoordinator =====

impl ResilienceCoordinator {
    pub fn new(mapping: Arc<Mapping>) -> ResilienceCoordinator {
        ResilienceCoordinator { mapping }
    }

    /// Tears down the virtual ports mapped onto a physical port that went
    /// down. With `stop` they are unregistered as well.
    pub fn deactivate_ovx_ports(&self, port: &PortKey, stop: bool) {
        for vport in self.mapping.get_virtual_ports(port) {
            let Some(network) = self.network(vport.tenant_id) else {
                continue;
            };
            debug_span!("resilience", tenant_id = %vport.tenant_id).in_scope(|| {
                log_error(network.tear_down_port(&vport));
                if stop {
                    log_error(network.remove_port(&self.mapping, &vport));
                }
            });
        }
    }

    /// Boots the virtual ports mapped onto a physical port that came up.
    ///
    /// Administratively disabled ports stay down.
    pub fn activate_ovx_ports(&self, physical: &PhysicalNetwork, port: &PortKey) {
        for vport in self.mapping.get_virtual_ports(port) {
            let Some(network) = self.network(vport.tenant_id) else {
                continue;
            };
            debug_span!("resilience", tenant_id = %vport.tenant_id).in_scope(|| {
                log_error(network.boot_port(physical, &vport));
            });
        }
    }

    /// Handles the failure of a physical link.
    ///
    /// Every virtual link and switch route crossing it first tries to switch
    /// to a backup path. Elements that can't are torn down, a virtual link
    /// along with both of its endpoints. With `stop` they are unregistered as
    /// well.
    pub fn deactivate_vlinks(
        &self,
        physical: &PhysicalNetwork,
        link: &PhysicalLink,
        stop: bool,
    ) {
        let endpoints = link.endpoints();
        for tenant_id in self.mapping.list_tenant_ids() {
            let Some(network) = self.network(tenant_id) else {
                continue;
            };

            let mut elements = vec![];
            if let Ok(vlinks) = self.mapping.get_virtual_links(&endpoints, tenant_id) {
                elements.extend(vlinks.into_iter().map(VirtualLinkLike::Link));
            }
            if let Ok(routes) = self.mapping.get_switch_routes(&endpoints, tenant_id) {
                elements.extend(routes.into_iter().map(VirtualLinkLike::Route));
            }

            debug_span!("resilience", %tenant_id).in_scope(|| {
                for element in elements {
                    match network.try_recovery(&self.mapping, physical, &element, link)
                    {
                        Ok(true) => (),
                        Ok(false) => self.tear_down(&network, &element, stop),
                        Err(error) => error.log(),
                    }
                }
            });
        }
    }

    /// Handles the recovery of a physical link.
    ///
    /// Elements crossing it, or holding unusable paths across it, first try
    /// to revert to their preferred path. Otherwise a switch route is booted
    /// again, and a virtual link too unless one of its endpoints is
    /// administratively down.
    pub fn activate_vlinks(&self, physical: &PhysicalNetwork, link: &PhysicalLink) {
        let endpoints = link.endpoints();
        for tenant_id in self.mapping.list_tenant_ids() {
            let Some(network) = self.network(tenant_id) else {
                continue;
            };

            let mut elements = BTreeSet::new();
            if let Ok(vlinks) = self.mapping.get_virtual_links(&endpoints, tenant_id) {
                elements.extend(vlinks.into_iter().map(VirtualLinkLike::Link));
            }
            if let Ok(routes) = self.mapping.get_switch_routes(&endpoints, tenant_id) {
                elements.extend(routes.into_iter().map(VirtualLinkLike::Route));
            }
            elements.extend(network.elements_with_unusable(&endpoints));

            debug_span!("resilience", %tenant_id).in_scope(|| {
                for element in elements {
                    match network.try_revert(&self.mapping, physical, &element, link) {
                        Ok(true) => (),
                        Ok(false) => self.boot(physical, &network, &element),
                        Err(error) => error.log(),
                    }
                }
            });
        }
    }

    fn tear_down(
        &self,
        network: &VirtualNetwork,
        element: &VirtualLinkLike,
        stop: bool,
    ) {
        let mut ports: Vec<VirtualPortKey> = vec![];
        if let VirtualLinkLike::Link(key) = element {
            let Some(vlink) = network.link(key) else {
                return;
            };
            ports.extend([vlink.src, vlink.dst]);
        }

        for port in &ports {
            log_error(network.tear_down_port(port));
        }
        log_error(network.tear_down_element(element));

        if stop {
            log_error(network.unregister_element(&self.mapping, element));
            for port in &ports {
                log_error(network.remove_port(&self.mapping, port));
            }
        }
    }

    fn boot(
        &self,
        physical: &PhysicalNetwork,
        network: &VirtualNetwork,
        element: &VirtualLinkLike,
    ) {
        let VirtualLinkLike::Link(key) = element else {
            log_error(network.boot_element(physical, element));
            return;
        };
        let Some(vlink) = network.link(key) else {
            return;
        };

        // Administrative state always wins over automatic recovery.
        let admin_down = [vlink.src, vlink.dst].iter().any(|port| {
            network.port(port).is_some_and(|port| port.admin_down)
        });
        if admin_down {
            Debug::RecoveryWithheld(key).log();
            return;
        }

        for port in [vlink.src, vlink.dst] {
            log_error(network.boot_port(physical, &port));
        }
        log_error(network.boot_element(physical, element));
    }

    fn network(&self, tenant_id: TenantId) -> Option<Arc<VirtualNetwork>> {
        match self.mapping.get_network(tenant_id) {
            Ok(network) => Some(network),
            Err(error) => {
                error.log();
                None
            }
        }
    }
}

// ===== helper functions =====

fn log_error<T>(result: Result<T, Error>) {
    if let Err(error) = result {
        error.log();
    }
}
