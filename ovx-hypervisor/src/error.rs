//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ovx_utils::index::IndexError;
use ovx_utils::mac_addr::MacAddr;
use tracing::{error, warn};

use crate::network::{
    SwitchRouteKey, TenantId, VirtualLinkKey, VirtualPortKey, VirtualSwitchKey,
};
use crate::packet::DecodeError;
use crate::physical::{Dpid, LinkEndpoints, PortKey};

// Hypervisor errors.
#[derive(Debug)]
pub enum Error {
    // Lookups
    Mapping(MappingError),
    PhysicalSwitchNotFound(Dpid),
    PhysicalPortNotFound(PortKey),
    VirtualSwitchNotFound(VirtualSwitchKey),
    VirtualPortNotFound(VirtualPortKey),
    // Identifier allocation
    Index(IndexError),
    // Requests
    InvalidRequest(String),
    PortInUse(VirtualPortKey),
    NotBigSwitch(VirtualSwitchKey),
    InvalidPath(String),
    NoPath(PortKey, PortKey),
    // Probe input
    ProbeDecode(PortKey, DecodeError),
    // Other
    Config(String),
}

// Mapping Store lookup failures, one per entity kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MappingError {
    PhysicalIpNotFound(Ipv4Addr),
    VirtualIpNotFound(TenantId, Ipv4Addr),
    MacNotFound(MacAddr),
    PhysicalSwitchNotFound(Dpid),
    VirtualSwitchNotFound(VirtualSwitchKey),
    TenantSwitchNotFound(Dpid, TenantId),
    VirtualPortNotFound(VirtualPortKey),
    PhysicalLinkNotFound(LinkEndpoints),
    VirtualLinkNotFound(VirtualLinkKey),
    TenantLinkNotFound(LinkEndpoints, TenantId),
    NetworkNotFound(TenantId),
    RouteNotFound(SwitchRouteKey),
    TenantRouteNotFound(LinkEndpoints, TenantId),
}

// Entity kind of a mapping lookup failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MappingKind {
    Address,
    Switch,
    Port,
    Link,
    Network,
    Route,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::Mapping(error) => {
                error.log();
            }
            Error::PhysicalSwitchNotFound(dpid) => {
                warn!(%dpid, "{}", self);
            }
            Error::PhysicalPortNotFound(port) => {
                warn!(%port, "{}", self);
            }
            Error::VirtualSwitchNotFound(vswitch) => {
                warn!(tenant_id = %vswitch.tenant_id, vdpid = %vswitch.vdpid, "{}", self);
            }
            Error::VirtualPortNotFound(vport) | Error::PortInUse(vport) => {
                warn!(tenant_id = %vport.tenant_id, vdpid = %vport.vdpid, port = %vport.port, "{}", self);
            }
            Error::Index(error) => {
                error!(%error, "{}", self);
            }
            Error::NotBigSwitch(vswitch) => {
                warn!(tenant_id = %vswitch.tenant_id, vdpid = %vswitch.vdpid, "{}", self);
            }
            Error::InvalidRequest(reason) | Error::InvalidPath(reason) => {
                warn!(%reason, "{}", self);
            }
            Error::NoPath(src, dst) => {
                warn!(%src, %dst, "{}", self);
            }
            Error::ProbeDecode(port, error) => {
                warn!(%port, %error, "{}", self);
            }
            Error::Config(reason) => {
                error!(%reason, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Mapping(error) => error.fmt(f),
            Error::PhysicalSwitchNotFound(..) => {
                write!(f, "physical switch not found")
            }
            Error::PhysicalPortNotFound(..) => {
                write!(f, "physical port not found")
            }
            Error::VirtualSwitchNotFound(..) => {
                write!(f, "virtual switch not found")
            }
            Error::VirtualPortNotFound(..) => {
                write!(f, "virtual port not found")
            }
            Error::Index(..) => {
                write!(f, "failed to allocate identifier")
            }
            Error::InvalidRequest(..) => {
                write!(f, "invalid request")
            }
            Error::PortInUse(..) => {
                write!(f, "virtual port already in use")
            }
            Error::NotBigSwitch(..) => {
                write!(f, "virtual switch isn't a big switch")
            }
            Error::InvalidPath(..) => {
                write!(f, "invalid physical path")
            }
            Error::NoPath(..) => {
                write!(f, "no physical path available")
            }
            Error::ProbeDecode(..) => {
                write!(f, "failed to decode discovery probe")
            }
            Error::Config(..) => {
                write!(f, "invalid configuration")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Mapping(error) => Some(error),
            Error::Index(error) => Some(error),
            Error::ProbeDecode(_, error) => Some(error),
            _ => None,
        }
    }
}

impl From<MappingError> for Error {
    fn from(error: MappingError) -> Error {
        Error::Mapping(error)
    }
}

impl From<IndexError> for Error {
    fn from(error: IndexError) -> Error {
        Error::Index(error)
    }
}

// ===== impl MappingError =====

impl MappingError {
    pub fn kind(&self) -> MappingKind {
        match self {
            MappingError::PhysicalIpNotFound(..)
            | MappingError::VirtualIpNotFound(..)
            | MappingError::MacNotFound(..) => MappingKind::Address,
            MappingError::PhysicalSwitchNotFound(..)
            | MappingError::VirtualSwitchNotFound(..)
            | MappingError::TenantSwitchNotFound(..) => MappingKind::Switch,
            MappingError::VirtualPortNotFound(..) => MappingKind::Port,
            MappingError::PhysicalLinkNotFound(..)
            | MappingError::VirtualLinkNotFound(..)
            | MappingError::TenantLinkNotFound(..) => MappingKind::Link,
            MappingError::NetworkNotFound(..) => MappingKind::Network,
            MappingError::RouteNotFound(..)
            | MappingError::TenantRouteNotFound(..) => MappingKind::Route,
        }
    }

    pub fn log(&self) {
        match self {
            MappingError::PhysicalIpNotFound(addr) => {
                warn!(%addr, "{}", self);
            }
            MappingError::VirtualIpNotFound(tenant_id, addr) => {
                warn!(%tenant_id, %addr, "{}", self);
            }
            MappingError::MacNotFound(mac) => {
                warn!(%mac, "{}", self);
            }
            MappingError::PhysicalSwitchNotFound(dpid) => {
                warn!(%dpid, "{}", self);
            }
            MappingError::VirtualSwitchNotFound(vswitch) => {
                warn!(tenant_id = %vswitch.tenant_id, vdpid = %vswitch.vdpid, "{}", self);
            }
            MappingError::TenantSwitchNotFound(dpid, tenant_id) => {
                warn!(%dpid, %tenant_id, "{}", self);
            }
            MappingError::VirtualPortNotFound(vport) => {
                warn!(tenant_id = %vport.tenant_id, vdpid = %vport.vdpid, port = %vport.port, "{}", self);
            }
            MappingError::PhysicalLinkNotFound(link) => {
                warn!(%link, "{}", self);
            }
            MappingError::VirtualLinkNotFound(vlink) => {
                warn!(tenant_id = %vlink.tenant_id, link_id = %vlink.link_id, "{}", self);
            }
            MappingError::TenantLinkNotFound(link, tenant_id)
            | MappingError::TenantRouteNotFound(link, tenant_id) => {
                warn!(%link, %tenant_id, "{}", self);
            }
            MappingError::NetworkNotFound(tenant_id) => {
                warn!(%tenant_id, "{}", self);
            }
            MappingError::RouteNotFound(route) => {
                warn!(tenant_id = %route.tenant_id, vdpid = %route.vdpid, route_id = %route.route_id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for MappingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            MappingKind::Address => write!(f, "address mapping not found"),
            MappingKind::Switch => write!(f, "switch mapping not found"),
            MappingKind::Port => write!(f, "port mapping not found"),
            MappingKind::Link => write!(f, "link mapping not found"),
            MappingKind::Network => write!(f, "network mapping not found"),
            MappingKind::Route => write!(f, "route mapping not found"),
        }
    }
}

impl std::error::Error for MappingError {}
