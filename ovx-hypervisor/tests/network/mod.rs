//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//


use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use maplit::btreemap;
use ovx_hypervisor::config::Config;
use ovx_hypervisor::error::Error;
use ovx_hypervisor::hypervisor::Hypervisor;
use ovx_hypervisor::network::{
    ElementState, PathSet, SwitchKind, SwitchRouteKey, VDPID_PREFIX,
    VirtualLinkKey, VirtualLinkLike, VirtualNetwork, VirtualPortKey,
    VirtualSwitchKey,
};
use ovx_hypervisor::physical::{
    Dpid, LinkEndpoints, PhysicalLink, PortKey, PortNo,
};
use ovx_hypervisor::routing::RoutingAlgorithm;
use ovx_hypervisor::southbound::{
    EmbeddingRecord, EmbeddingStore, ProbeTxMsg,
};
use ovx_utils::UnboundedReceiver;
use ovx_utils::mac_addr::MacAddr;
use parking_lot::Mutex;
use tokio::sync::mpsc;

//
// Diamond topology:
//
//                  +--- 2:2 -- 3:1 ---+
//   1:1 -- 2:1 ---|                    |--- 3:3 -- 5:1
//                  +--- 2:3 -- 4:1    |
//                          4:2 -- 3:2-+
//
// Links are created in both directions, forward first, so the forward
// direction of the links above gets IDs 1, 3, 5, 7 and 9 in order.
//
const DIAMOND_PORTS: [(Dpid, &[PortNo]); 5] = [
    (1, &[1]),
    (2, &[1, 2, 3]),
    (3, &[1, 2, 3]),
    (4, &[1, 2]),
    (5, &[1]),
];
const DIAMOND_LINKS: [((Dpid, PortNo), (Dpid, PortNo)); 5] = [
    ((1, 1), (2, 1)),
    ((2, 2), (3, 1)),
    ((2, 3), (4, 1)),
    ((4, 2), (3, 2)),
    ((3, 3), (5, 1)),
];

struct Fixture {
    hv: Hypervisor,
    _probe_rxc: UnboundedReceiver<ProbeTxMsg>,
    network: Arc<VirtualNetwork>,
    src: VirtualPortKey,
    dst: VirtualPortKey,
}

// Embedding store keeping records in memory.
#[derive(Debug, Default)]
struct MemoryStore {
    records: Mutex<BTreeMap<String, EmbeddingRecord>>,
}

impl EmbeddingStore for MemoryStore {
    fn save(&self, record: &EmbeddingRecord) {
        self.records
            .lock()
            .insert(record.store_key(), record.clone());
    }

    fn remove(&self, element: &VirtualLinkLike) {
        self.records.lock().remove(&element.to_string());
    }
}

//
// Helper functions.
//

fn pk(dpid: Dpid, port: PortNo) -> PortKey {
    PortKey::new(dpid, port)
}

fn hop(src: (Dpid, PortNo), dst: (Dpid, PortNo)) -> LinkEndpoints {
    LinkEndpoints::new(pk(src.0, src.1), pk(dst.0, dst.1))
}

fn ids(path: &[PhysicalLink]) -> Vec<u32> {
    path.iter().map(|link| link.id).collect()
}

fn backup_ids(paths: &PathSet) -> BTreeMap<u8, Vec<u32>> {
    paths
        .backups
        .iter()
        .map(|(priority, path)| (*priority, ids(path)))
        .collect()
}

fn mac(dpid: Dpid, port: PortNo) -> MacAddr {
    MacAddr::from_u64((dpid << 16) | u64::from(port))
}

fn hypervisor(
    store: Option<Arc<dyn EmbeddingStore>>,
) -> (Hypervisor, UnboundedReceiver<ProbeTxMsg>) {
    let (probe_txp, probe_rxc) = mpsc::unbounded_channel();
    let hv = Hypervisor::new(Config::default(), probe_txp, store).unwrap();
    (hv, probe_rxc)
}

fn build_topology(
    hv: &Hypervisor,
    ports: &[(Dpid, &[PortNo])],
    links: &[((Dpid, PortNo), (Dpid, PortNo))],
) {
    let physical = hv.physical();
    for (dpid, ports) in ports {
        physical.add_switch(*dpid);
        for port in *ports {
            physical.add_port(*dpid, *port, mac(*dpid, *port)).unwrap();
        }
    }
    for (a, b) in links {
        physical.create_link(pk(a.0, a.1), pk(b.0, b.1));
        physical.create_link(pk(b.0, b.1), pk(a.0, a.1));
    }
}

// Diamond topology with one tenant owning a virtual switch on each end.
fn diamond(store: Option<Arc<dyn EmbeddingStore>>) -> Fixture {
    let (hv, probe_rxc) = hypervisor(store);
    build_topology(&hv, &DIAMOND_PORTS, &DIAMOND_LINKS);

    let network = hv.create_network_with_id(1).unwrap();
    let sw1 = hv
        .create_switch(1, &[1], RoutingAlgorithm::Manual, None)
        .unwrap();
    let sw5 = hv
        .create_switch(1, &[5], RoutingAlgorithm::Manual, None)
        .unwrap();
    let src = hv.create_port(1, sw1.vdpid, pk(1, 1)).unwrap();
    let dst = hv.create_port(1, sw5.vdpid, pk(5, 1)).unwrap();

    Fixture {
        hv,
        _probe_rxc: probe_rxc,
        network,
        src,
        dst,
    }
}

//
// Tests.
//

#[test]
fn test_create_network() {
    let (hv, _probe_rxc) = hypervisor(None);
    assert_eq!(hv.create_network().unwrap().tenant_id, 1);
    assert_eq!(hv.create_network_with_id(5).unwrap().tenant_id, 5);
    assert_eq!(hv.create_network().unwrap().tenant_id, 2);
    assert!(matches!(hv.create_network_with_id(5), Err(Error::Index(..))));
    assert_eq!(hv.mapping().list_tenant_ids(), vec![1, 2, 5]);

    hv.remove_network(1).unwrap();
    assert!(hv.network(1).is_err());
    assert_eq!(hv.create_network().unwrap().tenant_id, 1);
}

#[test]
fn test_create_switch() {
    let fixture = diamond(None);
    let hv = &fixture.hv;

    let switches = fixture.network.switches();
    assert_eq!(
        switches,
        vec![
            VirtualSwitchKey::new(1, VDPID_PREFIX | 1),
            VirtualSwitchKey::new(1, VDPID_PREFIX | 2),
        ]
    );
    assert_eq!(hv.query_switch(5, 1).unwrap(), switches[1]);

    // A physical switch backs at most one virtual switch per tenant.
    assert!(matches!(
        hv.create_switch(1, &[1], RoutingAlgorithm::Manual, None),
        Err(Error::InvalidRequest(..))
    ));
    assert!(matches!(
        hv.create_switch(1, &[9], RoutingAlgorithm::Manual, None),
        Err(Error::PhysicalSwitchNotFound(9))
    ));
    assert!(matches!(
        hv.create_switch(1, &[], RoutingAlgorithm::Manual, None),
        Err(Error::InvalidRequest(..))
    ));
    assert!(matches!(
        hv.create_switch(1, &[2, 2], RoutingAlgorithm::Manual, None),
        Err(Error::InvalidRequest(..))
    ));

    // Other tenants are unaffected.
    let other = hv.create_network().unwrap();
    let vswitch = hv
        .create_switch(other.tenant_id, &[1, 2], RoutingAlgorithm::Manual, None)
        .unwrap();
    assert!(other.switch(vswitch.vdpid).unwrap().is_big());
}

#[test]
fn test_create_port() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    let vdpid = fixture.src.vdpid;

    assert_eq!(fixture.src.port, 1);
    let port = fixture.network.port(&fixture.src).unwrap();
    assert_eq!(port.physical, pk(1, 1));
    assert_eq!(port.state, ElementState::Active);
    assert!(port.is_edge());
    assert_eq!(hv.mapping().get_virtual_ports(&pk(1, 1)), vec![fixture.src]);

    assert!(matches!(
        hv.create_port(1, vdpid, pk(2, 1)),
        Err(Error::InvalidRequest(..))
    ));
    assert!(matches!(
        hv.create_port(1, vdpid, pk(1, 9)),
        Err(Error::PhysicalPortNotFound(..))
    ));
    assert!(matches!(
        hv.create_port(1, 0x42, pk(1, 1)),
        Err(Error::VirtualSwitchNotFound(..))
    ));
}

#[test]
fn test_add_host() {
    let fixture = diamond(None);
    let mapping = fixture.hv.mapping();
    let network = &fixture.network;
    let vip = Ipv4Addr::new(10, 0, 0, 1);

    let pip = network
        .add_host(mapping, &fixture.src, mac(100, 1), vip)
        .unwrap();
    assert_eq!(pip, Ipv4Addr::new(1, 0, 0, 1));
    assert_eq!(mapping.get_virtual_ip(pip), Ok((1, vip)));
    assert_eq!(mapping.get_mac(&mac(100, 1)), Ok(1));

    assert!(matches!(
        network.add_host(mapping, &fixture.src, mac(100, 2), vip),
        Err(Error::PortInUse(..))
    ));
    assert!(matches!(
        network.add_host(mapping, &fixture.dst, mac(100, 2), vip),
        Err(Error::InvalidRequest(..))
    ));
    // Hosts and virtual links don't share ports.
    assert!(matches!(
        fixture.hv.create_link(&fixture.src, &fixture.dst, None),
        Err(Error::PortInUse(..))
    ));

    network.remove_port(mapping, &fixture.src).unwrap();
    assert!(!mapping.has_physical_ip(pip));
    assert!(!mapping.has_mac(&mac(100, 1)));
    assert!(network.port(&fixture.src).is_none());
}

#[test]
fn test_create_link() {
    let fixture = diamond(None);
    let hv = &fixture.hv;

    let key = hv.create_link(&fixture.src, &fixture.dst, Some(1)).unwrap();
    assert_eq!(key.link_id, 1);

    let vlink = fixture.network.link(&key).unwrap();
    assert_eq!(vlink.state, ElementState::Active);
    assert_eq!(ids(&vlink.paths.path), vec![1, 3, 9]);
    assert_eq!(vlink.paths.priority, 128);
    assert_eq!(
        backup_ids(&vlink.paths),
        btreemap! { 127 => vec![1, 5, 7, 9] }
    );
    assert_eq!(
        fixture.network.port(&fixture.src).unwrap().link_id,
        Some(1)
    );
    assert_eq!(hv.query_links(&hop((2, 2), (3, 1)), 1).unwrap(), vec![key]);
    assert_eq!(hv.query_links(&hop((3, 1), (2, 2)), 1).unwrap(), vec![key]);
    assert!(hv.query_links(&hop((2, 3), (4, 1)), 1).is_err());

    // Ports take a single virtual link.
    assert!(matches!(
        hv.create_link(&fixture.src, &fixture.dst, None),
        Err(Error::PortInUse(..))
    ));

    fixture.network.remove_link(hv.mapping(), &key).unwrap();
    assert!(fixture.network.port(&fixture.src).unwrap().is_edge());
    assert!(hv.query_links(&hop((2, 2), (3, 1)), 1).is_err());
}

#[test]
fn test_create_link_no_path() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    hv.physical().remove_link(pk(1, 1), pk(2, 1));

    assert!(matches!(
        hv.create_link(&fixture.src, &fixture.dst, None),
        Err(Error::NoPath(..))
    ));
    assert!(matches!(
        hv.create_link(&fixture.src, &fixture.src, None),
        Err(Error::InvalidRequest(..))
    ));
}

#[test]
fn test_set_link_path() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    let (mapping, physical) = (hv.mapping(), hv.physical());
    for dpid in [2, 3] {
        physical.add_port(dpid, 4, mac(dpid, 4)).unwrap();
    }

    // Malformed paths.
    let (src, dst) = (&fixture.src, &fixture.dst);
    let detached = [vec![hop((1, 1), (2, 1)), hop((3, 3), (5, 1))]];
    assert!(matches!(
        fixture
            .network
            .set_link_path(mapping, physical, src, dst, &detached),
        Err(Error::InvalidPath(..))
    ));
    let misrouted = [vec![hop((2, 2), (3, 1)), hop((3, 3), (5, 1))]];
    assert!(matches!(
        fixture
            .network
            .set_link_path(mapping, physical, src, dst, &misrouted),
        Err(Error::InvalidPath(..))
    ));

    // The middle hop hasn't been discovered yet.
    let paths = [vec![
        hop((1, 1), (2, 1)),
        hop((2, 4), (3, 4)),
        hop((3, 3), (5, 1)),
    ]];
    let key = fixture
        .network
        .set_link_path(mapping, physical, src, dst, &paths)
        .unwrap();
    let vlink = fixture.network.link(&key).unwrap();
    assert_eq!(vlink.state, ElementState::Inactive);
    assert_eq!(ids(&vlink.paths.path), vec![1, 11, 9]);

    // Discovery reuses the identifier. The link needs both directions.
    physical.create_link(pk(2, 4), pk(3, 4));
    assert_eq!(physical.get_link(pk(2, 4), pk(3, 4)).unwrap().id, 11);
    let vlink = fixture.network.link(&key).unwrap();
    assert_eq!(vlink.state, ElementState::Inactive);
    physical.create_link(pk(3, 4), pk(2, 4));
    let vlink = fixture.network.link(&key).unwrap();
    assert_eq!(vlink.state, ElementState::Active);
}

#[test]
fn test_big_switch_shortest_path() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    let network = hv.create_network().unwrap();
    let tenant_id = network.tenant_id;
    let vswitch = hv
        .create_switch(
            tenant_id,
            &[2, 3, 4],
            RoutingAlgorithm::ShortestPath,
            Some(1),
        )
        .unwrap();
    let in_port = hv.create_port(tenant_id, vswitch.vdpid, pk(2, 1)).unwrap();
    let out_port = hv.create_port(tenant_id, vswitch.vdpid, pk(3, 3)).unwrap();

    let path = hv.get_route(&vswitch, in_port.port, out_port.port).unwrap();
    assert_eq!(ids(&path.unwrap()), vec![3]);

    // The route is cached along with its backup.
    let big = network.switch(vswitch.vdpid).unwrap();
    let SwitchKind::Big(big) = &big.kind else {
        panic!("not a big switch");
    };
    let route_id = big.routes[&(in_port.port, out_port.port)];
    let key = SwitchRouteKey::new(tenant_id, vswitch.vdpid, route_id);
    let route = network.route(&key).unwrap();
    assert_eq!(route.state, ElementState::Active);
    assert_eq!(backup_ids(&route.paths), btreemap! { 127 => vec![5, 7] });
    let path = hv.get_route(&vswitch, in_port.port, out_port.port).unwrap();
    assert_eq!(ids(&path.unwrap()), vec![3]);

    // Single switches have no internal routes.
    let single = fixture.src.switch();
    assert!(matches!(
        hv.get_route(&single, 1, 2),
        Err(Error::NotBigSwitch(..))
    ));
}

#[test]
fn test_big_switch_manual() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    let tenant_id = hv.create_network().unwrap().tenant_id;
    let vswitch = hv
        .create_switch(tenant_id, &[2, 3, 4], RoutingAlgorithm::Manual, None)
        .unwrap();
    let in_port = hv.create_port(tenant_id, vswitch.vdpid, pk(2, 1)).unwrap();
    let out_port = hv.create_port(tenant_id, vswitch.vdpid, pk(3, 3)).unwrap();
    let (in_port, out_port) = (in_port.port, out_port.port);

    // Nothing is computed on demand.
    assert_eq!(hv.get_route(&vswitch, in_port, out_port).unwrap(), None);

    let leaving = [vec![hop((2, 1), (1, 1))]];
    assert!(matches!(
        hv.create_route(&vswitch, in_port, out_port, &leaving),
        Err(Error::InvalidPath(..))
    ));

    let paths = [
        vec![hop((2, 3), (4, 1)), hop((4, 2), (3, 2))],
        vec![hop((2, 2), (3, 1))],
    ];
    let key = hv.create_route(&vswitch, in_port, out_port, &paths).unwrap();
    assert_eq!(key.route_id, 1);
    let path = hv.get_route(&vswitch, in_port, out_port).unwrap();
    assert_eq!(ids(&path.unwrap()), vec![5, 7]);
    assert_eq!(
        hv.mapping().get_switch_routes(&hop((2, 3), (4, 1)), tenant_id),
        Ok(vec![key])
    );

    // Reinstalling between the same ports keeps the route ID.
    let paths = [vec![hop((2, 2), (3, 1))]];
    assert_eq!(
        hv.create_route(&vswitch, in_port, out_port, &paths).unwrap(),
        key
    );
    assert!(
        hv.mapping()
            .get_switch_routes(&hop((2, 3), (4, 1)), tenant_id)
            .is_err()
    );
}

#[test]
fn test_store_and_replay() {
    let store = Arc::new(MemoryStore::default());
    let fixture = diamond(Some(store.clone()));
    let hv = &fixture.hv;

    let key = hv.create_link(&fixture.src, &fixture.dst, Some(1)).unwrap();
    let record = store.records.lock()["link 1/1"].clone();
    assert_eq!(record.element, VirtualLinkLike::Link(key));
    assert_eq!(record.paths.len(), 2);
    assert_eq!(record.paths[0].priority, 128);

    fixture.network.remove_link(hv.mapping(), &key).unwrap();
    assert!(store.records.lock().is_empty());

    // Replaying restores the same element, and replaying twice is harmless.
    for _ in 0..2 {
        assert_eq!(hv.replay(&record).unwrap(), VirtualLinkLike::Link(key));
        assert_eq!(fixture.network.links().len(), 1);
    }
    let vlink = fixture.network.link(&key).unwrap();
    assert_eq!(ids(&vlink.paths.path), vec![1, 3, 9]);
    assert_eq!(vlink.state, ElementState::Active);
    assert_eq!(store.records.lock().len(), 1);

    // Records are replayed on their own tenant only.
    let mut foreign = record.clone();
    foreign.element = VirtualLinkLike::Link(VirtualLinkKey::new(7, 1));
    assert!(matches!(
        fixture.network.restore(hv.mapping(), hv.physical(), &foreign),
        Err(Error::InvalidRequest(..))
    ));
}

#[test]
fn test_remove_switch_cascades() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    let key = hv.create_link(&fixture.src, &fixture.dst, None).unwrap();

    fixture
        .network
        .remove_switch(hv.mapping(), fixture.src.vdpid)
        .unwrap();
    assert!(fixture.network.link(&key).is_none());
    assert!(fixture.network.switch(fixture.src.vdpid).is_none());
    assert!(hv.mapping().get_virtual_ports(&pk(1, 1)).is_empty());
    assert!(hv.query_switch(1, 1).is_err());
    // The remaining port is free again.
    assert!(fixture.network.port(&fixture.dst).unwrap().is_edge());
}

#[test]
fn test_reset() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    hv.create_link(&fixture.src, &fixture.dst, None).unwrap();

    hv.reset();
    assert!(hv.physical().switches().is_empty());
    assert!(hv.physical().links().is_empty());
    assert!(hv.mapping().list_tenant_ids().is_empty());
    assert_eq!(hv.create_network().unwrap().tenant_id, 1);
}

#[test]
fn test_reset_keeps_stored_embeddings() {
    let store = Arc::new(MemoryStore::default());
    let fixture = diamond(Some(store.clone()));
    let hv = &fixture.hv;
    let key = hv.create_link(&fixture.src, &fixture.dst, None).unwrap();
    assert_eq!(store.records.lock().len(), 1);

    hv.reset();
    assert!(fixture.network.links().is_empty());
    assert_eq!(store.records.lock().len(), 1);
    let record = store.records.lock()["link 1/1"].clone();
    assert_eq!(record.element, VirtualLinkLike::Link(key));

    // Removing a network on request still deletes its records.
    let fixture = diamond(Some(store.clone()));
    fixture.hv.replay(&record).unwrap();
    fixture.hv.remove_network(1).unwrap();
    assert!(store.records.lock().is_empty());
}

#[test]
fn test_invalid_config() {
    let (probe_txp, _probe_rxc) = mpsc::unbounded_channel();
    let config = Config {
        tenant_bits: 0,
        ..Default::default()
    };
    assert!(matches!(
        Hypervisor::new(config, probe_txp, None),
        Err(Error::Config(..))
    ));
}

#[test]
fn test_backups_bounded_by_priority() {
    let fixture = diamond(None);
    let hv = &fixture.hv;
    let base = hv.config().routing.base_priority;

    assert!(matches!(
        hv.create_link(&fixture.src, &fixture.dst, Some(base)),
        Err(Error::InvalidRequest(..))
    ));
    assert!(fixture.network.links().is_empty());
    assert!(matches!(
        hv.create_switch(1, &[2, 3, 4], RoutingAlgorithm::ShortestPath, Some(200)),
        Err(Error::InvalidRequest(..))
    ));
    assert!(hv.query_switch(2, 1).is_err());

    let key = hv
        .create_link(&fixture.src, &fixture.dst, Some(base - 1))
        .unwrap();
    let vlink = fixture.network.link(&key).unwrap();
    assert!(vlink.paths.backups.keys().all(|priority| *priority > 0));
}
