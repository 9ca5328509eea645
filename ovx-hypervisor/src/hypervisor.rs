//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use ovx_utils::index::{IndexAllocator, IndexType};
use parking_lot::Mutex;

use crate::config::Config;
use crate::debug::Debug;
use crate::error::Error;
use crate::mapping::Mapping;
use crate::network::{
    SwitchRouteKey, TenantId, VirtualLinkKey, VirtualLinkLike, VirtualNetwork,
    VirtualPortKey, VirtualSwitchKey,
};
use crate::physical::{
    Dpid, LinkEndpoints, PhysicalLink, PhysicalNetwork, PortKey, PortNo,
};
use crate::routing::RoutingAlgorithm;
use crate::southbound::{EmbeddingRecord, EmbeddingStore, ProbeTx};

//
// Hypervisor core services.
//
// Owns the Mapping Store and the physical topology, and hands out tenant
// networks. Everything is created here and passed down explicitly. Dropping
// the hypervisor stops every discovery timer.
//
#[derive(Debug)]
pub struct Hypervisor {
    config: Config,
    mapping: Arc<Mapping>,
    physical: Arc<PhysicalNetwork>,
    store: Option<Arc<dyn EmbeddingStore>>,
    tenant_ids: Mutex<IndexAllocator>,
}

// ===== impl Hypervisor =====

impl Hypervisor {
    /// Builds the hypervisor services.
    ///
    /// The configuration is validated first, since tenant address spaces and
    /// path priorities are derived from it.
    pub fn new(
        config: Config,
        probe_tx: ProbeTx,
        store: Option<Arc<dyn EmbeddingStore>>,
    ) -> Result<Hypervisor, Error> {
        config.validate()?;

        let mapping = Arc::new(Mapping::new());
        let physical = Arc::new(PhysicalNetwork::new(
            config.clone(),
            mapping.clone(),
            probe_tx,
        ));
        let tenant_ids = IndexAllocator::new(IndexType::Tenant, config.tenant_bits);
        Ok(Hypervisor {
            config,
            mapping,
            physical,
            store,
            tenant_ids: Mutex::new(tenant_ids),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mapping(&self) -> &Arc<Mapping> {
        &self.mapping
    }

    pub fn physical(&self) -> &Arc<PhysicalNetwork> {
        &self.physical
    }

    // ----- tenant networks -----

    /// Creates a virtual network with the lowest free tenant ID.
    pub fn create_network(&self) -> Result<Arc<VirtualNetwork>, Error> {
        let tenant_id = self.tenant_ids.lock().next_index()? as TenantId;
        Ok(self.install_network(tenant_id))
    }

    /// Creates a virtual network with a given tenant ID.
    pub fn create_network_with_id(
        &self,
        tenant_id: TenantId,
    ) -> Result<Arc<VirtualNetwork>, Error> {
        self.tenant_ids
            .lock()
            .reserve_index(u64::from(tenant_id))?;
        Ok(self.install_network(tenant_id))
    }

    /// Removes a virtual network along with every element it holds.
    pub fn remove_network(&self, tenant_id: TenantId) -> Result<(), Error> {
        let network = self.mapping.get_network(tenant_id)?;
        network.remove_all(&self.mapping);
        self.mapping.remove_network(tenant_id);
        self.tenant_ids.lock().release_index(u64::from(tenant_id));

        Debug::NetworkDelete(tenant_id).log();
        Ok(())
    }

    pub fn network(&self, tenant_id: TenantId) -> Result<Arc<VirtualNetwork>, Error> {
        Ok(self.mapping.get_network(tenant_id)?)
    }

    // ----- virtual elements -----

    pub fn create_switch(
        &self,
        tenant_id: TenantId,
        dpids: &[Dpid],
        algorithm: RoutingAlgorithm,
        backups: Option<u8>,
    ) -> Result<VirtualSwitchKey, Error> {
        self.network(tenant_id)?.create_switch(
            &self.mapping,
            &self.physical,
            dpids,
            algorithm,
            backups,
        )
    }

    pub fn create_port(
        &self,
        tenant_id: TenantId,
        vdpid: u64,
        port: PortKey,
    ) -> Result<VirtualPortKey, Error> {
        self.network(tenant_id)?
            .create_port(&self.mapping, &self.physical, vdpid, port)
    }

    pub fn create_link(
        &self,
        src: &VirtualPortKey,
        dst: &VirtualPortKey,
        backups: Option<u8>,
    ) -> Result<VirtualLinkKey, Error> {
        self.network(src.tenant_id)?.create_link(
            &self.mapping,
            &self.physical,
            src,
            dst,
            backups,
        )
    }

    pub fn create_route(
        &self,
        switch: &VirtualSwitchKey,
        in_port: PortNo,
        out_port: PortNo,
        paths: &[Vec<LinkEndpoints>],
    ) -> Result<SwitchRouteKey, Error> {
        self.network(switch.tenant_id)?.create_route(
            &self.mapping,
            &self.physical,
            switch.vdpid,
            in_port,
            out_port,
            paths,
        )
    }

    pub fn get_route(
        &self,
        switch: &VirtualSwitchKey,
        in_port: PortNo,
        out_port: PortNo,
    ) -> Result<Option<Vec<PhysicalLink>>, Error> {
        self.network(switch.tenant_id)?.get_route(
            &self.mapping,
            &self.physical,
            switch.vdpid,
            in_port,
            out_port,
        )
    }

    /// Reinstalls a persisted embedding into its tenant network.
    pub fn replay(&self, record: &EmbeddingRecord) -> Result<VirtualLinkLike, Error> {
        self.network(record.tenant_id())?
            .restore(&self.mapping, &self.physical, record)
    }

    // ----- queries -----

    // Virtual switch of a tenant built on a physical switch.
    pub fn query_switch(
        &self,
        dpid: Dpid,
        tenant_id: TenantId,
    ) -> Result<VirtualSwitchKey, Error> {
        Ok(self.mapping.get_virtual_switch(dpid, tenant_id)?)
    }

    // Virtual links of a tenant crossing a physical link.
    pub fn query_links(
        &self,
        link: &LinkEndpoints,
        tenant_id: TenantId,
    ) -> Result<Vec<VirtualLinkKey>, Error> {
        Ok(self.mapping.get_virtual_links(link, tenant_id)?)
    }

    /// Drops all physical and virtual state.
    ///
    /// Persisted embeddings are left in the store so they can be replayed
    /// once the tenant networks are recreated. Only removing an element or
    /// its network deletes the record.
    pub fn reset(&self) {
        for tenant_id in self.mapping.list_tenant_ids() {
            if let Ok(network) = self.mapping.get_network(tenant_id) {
                network.clear();
            }
            Debug::NetworkDelete(tenant_id).log();
        }
        self.physical.reset();
        self.mapping.reset();
        self.tenant_ids.lock().reset();
    }

    fn install_network(&self, tenant_id: TenantId) -> Arc<VirtualNetwork> {
        let network = Arc::new(VirtualNetwork::new(
            tenant_id,
            &self.config,
            self.store.clone(),
        ));
        self.mapping.add_network(network.clone());

        Debug::NetworkCreate(tenant_id).log();
        network
    }
}
