//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Weak;
use std::time::Duration;

use ovx_utils::task::IntervalTask;
use tracing::debug_span;

use crate::physical::{Dpid, PhysicalNetwork};

//
// Hypervisor tasks diagram:
//
//   switch events (transport) ----+
//                                 V
//                          +--------------+
//   probe_interval (Nx) -> |   physical   | -> (1x) probe_tx
//        probe frames   -> |   network    |
//                          +--------------+
//                                 |
//                                 V
//                    mapping / resilience / networks
//
// Every callback runs to completion synchronously. The only timers are the
// per-switch probe intervals.
//

// ===== hypervisor tasks =====

// Periodic probe cycle of one switch's discovery engine.
//
// The task holds a weak reference so that dropping the physical network
// stops every timer.
pub(crate) fn probe_interval(
    network: Weak<PhysicalNetwork>,
    dpid: Dpid,
    interval: Duration,
) -> IntervalTask {
    #[cfg(not(feature = "testing"))]
    {
        IntervalTask::new(interval, false, move || {
            let Some(network) = network.upgrade() else {
                return;
            };
            debug_span!("discovery", %dpid).in_scope(|| {
                network.probe_cycle(dpid);
            });
        })
    }
    #[cfg(feature = "testing")]
    {
        IntervalTask {}
    }
}
