//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// Identifier spaces handed out by the hypervisor.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexType {
    Tenant,
    Switch,
    Link,
    Route,
    Port,
    Flow,
    Host,
    Ip,
    Mpls,
    Default,
}

/// Bounded bitset allocator.
///
/// Index zero is never handed out, so the first allocated index is always one.
/// Storage grows on demand, which keeps sparse 32-bit spaces cheap.
#[derive(Clone, Debug)]
pub struct IndexAllocator {
    kind: IndexType,
    bound: u64,
    words: Vec<u64>,
    used: u64,
}

// Index allocation errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum IndexError {
    Exhausted(IndexType),
    Duplicate(IndexType, u64),
    OutOfBound(IndexType, u64),
}

// ===== impl IndexType =====

impl IndexType {
    /// Returns the exclusive upper bound of this identifier space.
    ///
    /// `tenant_bits` is the number of bits reserved for the tenant ID inside
    /// the MAC and IP address spaces.
    pub fn bound(&self, tenant_bits: u8) -> u64 {
        let tenant_bits = u32::from(tenant_bits.min(32));
        match self {
            IndexType::Tenant => 1 << tenant_bits,
            IndexType::Switch | IndexType::Host => 1 << 32,
            // Link and flow IDs share the MAC bits left after the tenant ID.
            IndexType::Link => 1 << ((48 - tenant_bits) / 2),
            IndexType::Route | IndexType::Flow => 1 << 24,
            IndexType::Port => 0xff00,
            IndexType::Ip => 1 << (32 - tenant_bits),
            IndexType::Mpls => 0xfffff,
            IndexType::Default => 1000,
        }
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexType::Tenant => write!(f, "tenant"),
            IndexType::Switch => write!(f, "switch"),
            IndexType::Link => write!(f, "link"),
            IndexType::Route => write!(f, "route"),
            IndexType::Port => write!(f, "port"),
            IndexType::Flow => write!(f, "flow"),
            IndexType::Host => write!(f, "host"),
            IndexType::Ip => write!(f, "ip"),
            IndexType::Mpls => write!(f, "mpls"),
            IndexType::Default => write!(f, "default"),
        }
    }
}

// ===== impl IndexAllocator =====

impl IndexAllocator {
    pub fn new(kind: IndexType, tenant_bits: u8) -> IndexAllocator {
        IndexAllocator::with_bound(kind, kind.bound(tenant_bits))
    }

    pub fn with_bound(kind: IndexType, bound: u64) -> IndexAllocator {
        IndexAllocator {
            kind,
            bound,
            // Index zero is reserved.
            words: vec![1],
            used: 0,
        }
    }

    pub fn kind(&self) -> IndexType {
        self.kind
    }

    pub fn bound(&self) -> u64 {
        self.bound
    }

    // Number of indexes currently handed out.
    pub fn len(&self) -> u64 {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Allocates the lowest free index.
    pub fn next_index(&mut self) -> Result<u64, IndexError> {
        let index = match self.words.iter().position(|word| *word != u64::MAX)
        {
            Some(pos) => {
                (pos as u64) * 64 + u64::from(self.words[pos].trailing_ones())
            }
            None => (self.words.len() as u64) * 64,
        };
        if index >= self.bound {
            return Err(IndexError::Exhausted(self.kind));
        }

        self.set(index);
        Ok(index)
    }

    /// Claims a specific index, typically when restoring persisted state.
    pub fn reserve_index(&mut self, index: u64) -> Result<u64, IndexError> {
        if index == 0 || index >= self.bound {
            return Err(IndexError::OutOfBound(self.kind, index));
        }
        if self.is_used(index) {
            return Err(IndexError::Duplicate(self.kind, index));
        }

        self.set(index);
        Ok(index)
    }

    /// Returns an index to the free pool.
    ///
    /// Returns false if the index wasn't allocated.
    pub fn release_index(&mut self, index: u64) -> bool {
        if index == 0 || !self.is_used(index) {
            return false;
        }

        let (word, bit) = Self::position(index);
        self.words[word] &= !(1 << bit);
        self.used -= 1;
        true
    }

    pub fn is_used(&self, index: u64) -> bool {
        let (word, bit) = Self::position(index);
        self.words
            .get(word)
            .is_some_and(|word| word & (1 << bit) != 0)
    }

    pub fn reset(&mut self) {
        self.words = vec![1];
        self.used = 0;
    }

    fn set(&mut self, index: u64) {
        let (word, bit) = Self::position(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
        self.used += 1;
    }

    fn position(index: u64) -> (usize, u64) {
        ((index / 64) as usize, index % 64)
    }
}

// ===== impl IndexError =====

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Exhausted(kind) => {
                write!(f, "{kind} index space exhausted")
            }
            IndexError::Duplicate(kind, index) => {
                write!(f, "{kind} index {index} already in use")
            }
            IndexError::OutOfBound(kind, index) => {
                write!(f, "{kind} index {index} out of bounds")
            }
        }
    }
}

impl std::error::Error for IndexError {}

// ===== unit tests =====
