//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ovx_utils::mac_addr::MacAddr;
use tracing::{debug, debug_span};

use crate::network::{
    SwitchRouteKey, TenantId, VirtualLinkKey, VirtualLinkLike, VirtualPortKey,
    VirtualSwitchKey,
};
use crate::packet::Probe;
use crate::physical::{Dpid, PhysicalLink, PortKey, PortNo};

// Hypervisor debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Physical topology
    SwitchAdd(Dpid),
    SwitchRemove(Dpid),
    PortAdd(&'a PortKey),
    PortRemove(&'a PortKey),
    PortUp(&'a PortKey),
    PortDown(&'a PortKey),
    LinkAdd(&'a PhysicalLink),
    LinkRemove(&'a PhysicalLink),
    // Discovery
    ProbeRx(&'a PortKey, &'a Probe),
    ProbePortPromoted(Dpid, PortNo),
    ProbePortDemoted(Dpid, PortNo),
    // Routing
    PartialEmbedding(Dpid, Dpid, u8, usize),
    RouteUnavailable(&'a VirtualSwitchKey, PortNo, PortNo),
    // Virtual networks
    NetworkCreate(TenantId),
    NetworkDelete(TenantId),
    SwitchCreate(&'a VirtualSwitchKey),
    SwitchDelete(&'a VirtualSwitchKey),
    PortCreate(&'a VirtualPortKey),
    PortDelete(&'a VirtualPortKey),
    PortBoot(&'a VirtualPortKey),
    PortTearDown(&'a VirtualPortKey),
    HostAdd(&'a VirtualPortKey, &'a MacAddr),
    LinkCreate(&'a VirtualLinkKey),
    LinkDelete(&'a VirtualLinkKey),
    RouteCreate(&'a SwitchRouteKey),
    RouteDelete(&'a SwitchRouteKey),
    ElementBoot(&'a VirtualLinkLike),
    ElementTearDown(&'a VirtualLinkLike),
    // Resilience
    RecoverySuccess(&'a VirtualLinkLike, u8),
    RevertSuccess(&'a VirtualLinkLike, u8),
    RecoveryWithheld(&'a VirtualLinkKey),
    PortBootWithheld(&'a VirtualPortKey),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::SwitchAdd(dpid) | Debug::SwitchRemove(dpid) => {
                debug_span!("physical").in_scope(|| {
                    debug!(%dpid, "{}", self);
                });
            }
            Debug::PortAdd(port)
            | Debug::PortRemove(port)
            | Debug::PortUp(port)
            | Debug::PortDown(port) => {
                debug_span!("physical").in_scope(|| {
                    debug!(%port, "{}", self);
                });
            }
            Debug::LinkAdd(link) | Debug::LinkRemove(link) => {
                debug_span!("physical").in_scope(|| {
                    debug!(id = %link.id, src = %link.src, dst = %link.dst, "{}", self);
                });
            }
            Debug::ProbeRx(port, probe) => {
                debug!(%port, ?probe, "{}", self);
            }
            Debug::ProbePortPromoted(dpid, port)
            | Debug::ProbePortDemoted(dpid, port) => {
                debug_span!("discovery", %dpid).in_scope(|| {
                    debug!(%port, "{}", self);
                });
            }
            Debug::PartialEmbedding(src, dst, backups, found) => {
                debug_span!("routing").in_scope(|| {
                    debug!(
                        %src,
                        %dst,
                        %backups,
                        %found,
                        "{}", self
                    );
                });
            }
            Debug::RouteUnavailable(switch, in_port, out_port) => {
                debug_span!("routing").in_scope(|| {
                    debug!(%switch, %in_port, %out_port, "{}", self);
                });
            }
            Debug::NetworkCreate(tenant_id) | Debug::NetworkDelete(tenant_id) => {
                debug_span!("network", %tenant_id).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::SwitchCreate(switch) | Debug::SwitchDelete(switch) => {
                debug_span!("network", tenant_id = %switch.tenant_id).in_scope(|| {
                    debug!(%switch, "{}", self);
                });
            }
            Debug::PortCreate(port)
            | Debug::PortDelete(port)
            | Debug::PortBoot(port)
            | Debug::PortTearDown(port)
            | Debug::PortBootWithheld(port) => {
                debug_span!("network", tenant_id = %port.tenant_id).in_scope(|| {
                    debug!(%port, "{}", self);
                });
            }
            Debug::HostAdd(port, mac) => {
                debug_span!("network", tenant_id = %port.tenant_id).in_scope(|| {
                    debug!(%port, %mac, "{}", self);
                });
            }
            Debug::LinkCreate(link)
            | Debug::LinkDelete(link)
            | Debug::RecoveryWithheld(link) => {
                debug_span!("network", tenant_id = %link.tenant_id).in_scope(|| {
                    debug!(link_id = %link.link_id, "{}", self);
                });
            }
            Debug::RouteCreate(route) | Debug::RouteDelete(route) => {
                debug_span!("network", tenant_id = %route.tenant_id).in_scope(|| {
                    debug!(%route, "{}", self);
                });
            }
            Debug::ElementBoot(element) | Debug::ElementTearDown(element) => {
                debug_span!("network", tenant_id = %element.tenant_id()).in_scope(|| {
                    debug!(%element, "{}", self);
                });
            }
            Debug::RecoverySuccess(element, priority)
            | Debug::RevertSuccess(element, priority) => {
                debug_span!("resilience", tenant_id = %element.tenant_id()).in_scope(|| {
                    debug!(%element, %priority, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::SwitchAdd(..) => {
                write!(f, "switch added")
            }
            Debug::SwitchRemove(..) => {
                write!(f, "switch removed")
            }
            Debug::PortAdd(..) => {
                write!(f, "port added")
            }
            Debug::PortRemove(..) => {
                write!(f, "port removed")
            }
            Debug::PortUp(..) => {
                write!(f, "port up")
            }
            Debug::PortDown(..) => {
                write!(f, "port down")
            }
            Debug::LinkAdd(..) => {
                write!(f, "link added")
            }
            Debug::LinkRemove(..) => {
                write!(f, "link removed")
            }
            Debug::ProbeRx(..) => {
                write!(f, "probe received")
            }
            Debug::ProbePortPromoted(..) => {
                write!(f, "port promoted to fast probing")
            }
            Debug::ProbePortDemoted(..) => {
                write!(f, "port demoted to slow probing")
            }
            Debug::PartialEmbedding(..) => {
                write!(f, "fewer backup paths than requested")
            }
            Debug::RouteUnavailable(..) => {
                write!(f, "no internal path between ports")
            }
            Debug::NetworkCreate(..) => {
                write!(f, "virtual network created")
            }
            Debug::NetworkDelete(..) => {
                write!(f, "virtual network deleted")
            }
            Debug::SwitchCreate(..) => {
                write!(f, "virtual switch created")
            }
            Debug::SwitchDelete(..) => {
                write!(f, "virtual switch deleted")
            }
            Debug::PortCreate(..) => {
                write!(f, "virtual port created")
            }
            Debug::PortDelete(..) => {
                write!(f, "virtual port deleted")
            }
            Debug::PortBoot(..) => {
                write!(f, "virtual port booted")
            }
            Debug::PortTearDown(..) => {
                write!(f, "virtual port torn down")
            }
            Debug::HostAdd(..) => {
                write!(f, "host attached")
            }
            Debug::LinkCreate(..) => {
                write!(f, "virtual link created")
            }
            Debug::LinkDelete(..) => {
                write!(f, "virtual link deleted")
            }
            Debug::RouteCreate(..) => {
                write!(f, "switch route created")
            }
            Debug::RouteDelete(..) => {
                write!(f, "switch route deleted")
            }
            Debug::ElementBoot(..) => {
                write!(f, "booted")
            }
            Debug::ElementTearDown(..) => {
                write!(f, "torn down")
            }
            Debug::RecoverySuccess(..) => {
                write!(f, "switched to backup path")
            }
            Debug::RevertSuccess(..) => {
                write!(f, "reverted to recovered path")
            }
            Debug::RecoveryWithheld(..) => {
                write!(f, "recovery withheld, endpoint administratively down")
            }
            Debug::PortBootWithheld(..) => {
                write!(f, "boot withheld, port administratively down")
            }
        }
    }
}
