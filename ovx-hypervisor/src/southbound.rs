//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::Bytes;
use derive_new::new;
use ovx_utils::UnboundedSender;
use serde::{Deserialize, Serialize};

use crate::network::{TenantId, VirtualLinkLike, VirtualPortKey};
use crate::physical::{Dpid, LinkEndpoints, PortNo};

pub type ProbeTx = UnboundedSender<ProbeTxMsg>;

// Discovery frame to be sent out of a physical switch port.
#[derive(Clone, Debug, new)]
pub struct ProbeTxMsg {
    pub dpid: Dpid,
    pub port: PortNo,
    pub frame: Bytes,
}

// Persistence hook invoked after every successful embedding.
//
// Implementations must not call back into the hypervisor.
pub trait EmbeddingStore: Send + Sync + std::fmt::Debug {
    fn save(&self, record: &EmbeddingRecord);

    fn remove(&self, element: &VirtualLinkLike);
}

// Replayable description of an embedded virtual link or switch route.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct EmbeddingRecord {
    pub element: VirtualLinkLike,
    pub src: VirtualPortKey,
    pub dst: VirtualPortKey,
    // Highest priority first.
    pub paths: Vec<EmbeddedPath>,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct EmbeddedPath {
    pub priority: u8,
    pub hops: Vec<LinkEndpoints>,
}

// ===== impl EmbeddingRecord =====

impl EmbeddingRecord {
    pub fn tenant_id(&self) -> TenantId {
        self.element.tenant_id()
    }

    // Key under which the record is persisted.
    pub fn store_key(&self) -> String {
        self.element.to_string()
    }
}
