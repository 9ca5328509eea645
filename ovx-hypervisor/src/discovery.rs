//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use ovx_utils::mac_addr::MacAddr;
use ovx_utils::task::IntervalTask;
use parking_lot::Mutex;
use tracing::warn;

use crate::config::DiscoveryConfig;
use crate::debug::Debug;
use crate::packet::{Probe, ProbeKind};
use crate::physical::{Dpid, PortNo};

//
// Link discovery engine of a single physical switch.
//
// Every port is either slow or fast. Slow ports are probed one at a time in
// round-robin order, fast ports are probed on every cycle. A fast port whose
// probes go unacknowledged `max_missed_probes` times in a row is demoted back
// to slow and its link is reported as expired.
//
// Probe transmission and acknowledgment handling share one critical section.
//
#[derive(Debug)]
pub struct SwitchDiscovery {
    pub dpid: Dpid,
    config: DiscoveryConfig,
    state: Mutex<DiscoveryState>,
    task: Mutex<Option<IntervalTask>>,
}

#[derive(Debug, Default)]
struct DiscoveryState {
    // Hardware address of every probed port.
    ports: BTreeMap<PortNo, MacAddr>,
    slow: BTreeSet<PortNo>,
    // Fast ports and their missed-probe counters.
    fast: BTreeMap<PortNo, u8>,
    // Last slow port probed.
    slow_cursor: Option<PortNo>,
}

// Discovery state of a single port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortProbeState {
    Slow,
    Fast(u8),
}

// Outcome of one probe cycle.
#[derive(Debug, Default)]
pub struct ProbeCycle {
    pub probes: Vec<Probe>,
    // Ports demoted to slow during this cycle.
    pub expired: Vec<PortNo>,
}

// ===== impl SwitchDiscovery =====

impl SwitchDiscovery {
    pub fn new(dpid: Dpid, config: DiscoveryConfig) -> SwitchDiscovery {
        SwitchDiscovery {
            dpid,
            config,
            state: Default::default(),
            task: Default::default(),
        }
    }

    // Attaches the periodic task driving this engine.
    pub(crate) fn start(&self, task: IntervalTask) {
        *self.task.lock() = Some(task);
    }

    /// Starts probing a port.
    ///
    /// The port begins slow, and the returned probes are meant to be sent
    /// right away.
    pub fn add_port(&self, port: PortNo, mac: MacAddr) -> Vec<Probe> {
        let mut state = self.state.lock();
        if state.ports.contains_key(&port) {
            return vec![];
        }
        state.ports.insert(port, mac);
        state.slow.insert(port);
        self.probes(port, mac)
    }

    /// Stops probing a port, discarding its state.
    ///
    /// Link removal is left to the caller.
    pub fn remove_port(&self, port: PortNo) -> bool {
        let mut state = self.state.lock();
        if state.ports.remove(&port).is_none() {
            warn!(dpid = %self.dpid, %port, "tried to stop probing unknown port");
            return false;
        }
        state.slow.remove(&port);
        state.fast.remove(&port);
        if state.slow_cursor == Some(port) {
            state.slow_cursor = None;
        }
        true
    }

    /// Processes the acknowledgment of a probe sent out of `port`.
    ///
    /// A slow port is promoted to fast. A fast port is forgiven one missed
    /// probe.
    pub fn ack_probe(&self, port: PortNo) -> bool {
        let mut state = self.state.lock();
        if state.slow.remove(&port) {
            state.fast.insert(port, 0);
            Debug::ProbePortPromoted(self.dpid, port).log();
            return true;
        }
        match state.fast.get_mut(&port) {
            Some(missed) => {
                *missed = missed.saturating_sub(1);
                true
            }
            None => {
                warn!(dpid = %self.dpid, %port, "probe acknowledged on unknown port");
                false
            }
        }
    }

    /// Runs one probe cycle.
    pub fn run_cycle(&self) -> ProbeCycle {
        let mut guard = self.state.lock();
        let DiscoveryState {
            ports,
            slow,
            fast,
            slow_cursor,
        } = &mut *guard;
        let mut cycle = ProbeCycle::default();

        // Probe every fast port.
        for (port, missed) in fast.iter_mut() {
            if *missed < self.config.max_missed_probes {
                *missed += 1;
                if let Some(mac) = ports.get(port) {
                    cycle.probes.extend(self.probes(*port, *mac));
                }
            } else {
                cycle.expired.push(*port);
            }
        }
        for port in &cycle.expired {
            fast.remove(port);
            slow.insert(*port);
            Debug::ProbePortDemoted(self.dpid, *port).log();
        }

        // Probe the next slow port.
        let next = match slow_cursor {
            Some(cursor) => slow
                .range((Bound::Excluded(*cursor), Bound::Unbounded))
                .next()
                .or_else(|| slow.first()),
            None => slow.first(),
        }
        .copied();
        if let Some(port) = next {
            *slow_cursor = Some(port);
            if let Some(mac) = ports.get(&port) {
                cycle.probes.extend(self.probes(port, *mac));
            }
        }

        cycle
    }

    pub fn port_state(&self, port: PortNo) -> Option<PortProbeState> {
        let state = self.state.lock();
        if state.slow.contains(&port) {
            return Some(PortProbeState::Slow);
        }
        state.fast.get(&port).map(|missed| PortProbeState::Fast(*missed))
    }

    // Builds the probes sent out of a port.
    fn probes(&self, port: PortNo, mac: MacAddr) -> Vec<Probe> {
        let mut probes = vec![Probe::new(ProbeKind::Lldp, mac, self.dpid, port)];
        if self.config.bddp {
            probes.push(Probe::new(ProbeKind::Bddp, mac, self.dpid, port));
        }
        probes
    }
}
