//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ovx_hypervisor::error::{MappingError, MappingKind};
use ovx_hypervisor::mapping::Mapping;
use ovx_hypervisor::network::{
    SwitchRouteKey, VirtualLinkKey, VirtualPortKey, VirtualSwitchKey,
};
use ovx_hypervisor::physical::{LinkEndpoints, PhysicalLink, PortKey};
use ovx_utils::mac_addr::MacAddr;

//
// Helper functions.
//

fn link(id: u32, src: (u64, u16), dst: (u64, u16)) -> PhysicalLink {
    PhysicalLink::new(
        id,
        PortKey::new(src.0, src.1),
        PortKey::new(dst.0, dst.1),
        1,
    )
}

//
// Tests.
//

#[test]
fn test_switch_round_trip() {
    let mapping = Mapping::new();
    let vswitch = VirtualSwitchKey::new(1, 0x100);
    mapping.add_switch_mapping(&[10, 11], vswitch);

    for dpid in [10, 11] {
        assert!(mapping.get_physical_switches(&vswitch).unwrap().contains(&dpid));
        assert_eq!(mapping.get_virtual_switch(dpid, 1), Ok(vswitch));
    }
    assert_eq!(
        mapping.get_virtual_switch(10, 2),
        Err(MappingError::TenantSwitchNotFound(10, 2))
    );
    assert_eq!(
        mapping.get_virtual_switch(12, 1),
        Err(MappingError::PhysicalSwitchNotFound(12))
    );
}

#[test]
fn test_switch_cascade_clean() {
    let mapping = Mapping::new();
    let big = VirtualSwitchKey::new(1, 0x100);
    let single = VirtualSwitchKey::new(2, 0x200);
    let unrelated = VirtualSwitchKey::new(3, 0x300);
    mapping.add_switch_mapping(&[10, 11], big);
    mapping.add_switch_mapping(&[10], single);
    mapping.add_switch_mapping(&[20], unrelated);

    mapping.remove_physical_switch(10);

    assert!(!mapping.has_virtual_switch(10, 1));
    assert!(!mapping.has_virtual_switch(10, 2));
    assert_eq!(mapping.get_physical_switches(&big), Ok(vec![11]));
    assert_eq!(
        mapping.get_physical_switches(&single),
        Err(MappingError::VirtualSwitchNotFound(single))
    );
    assert_eq!(mapping.get_physical_switches(&unrelated), Ok(vec![20]));
    assert_eq!(mapping.get_virtual_switch(20, 3), Ok(unrelated));
}

#[test]
fn test_port_mapping() {
    let mapping = Mapping::new();
    let port = PortKey::new(10, 1);
    let vport1 = VirtualPortKey::new(1, 0x100, 1);
    let vport2 = VirtualPortKey::new(2, 0x200, 1);
    mapping.add_port_mapping(port, vport1);
    mapping.add_port_mapping(port, vport2);

    assert_eq!(mapping.get_physical_port(&vport1), Ok(port));
    assert_eq!(mapping.get_virtual_ports(&port), vec![vport1, vport2]);

    mapping.remove_virtual_port(&vport1);
    assert_eq!(mapping.get_virtual_ports(&port), vec![vport2]);
    mapping.remove_virtual_port(&vport2);
    assert!(mapping.get_virtual_ports(&port).is_empty());
}

#[test]
fn test_link_mapping_tenant_scoped() {
    let mapping = Mapping::new();
    let l1 = link(1, (10, 1), (11, 1));
    let l2 = link(2, (11, 2), (12, 1));
    let vlink1 = VirtualLinkKey::new(1, 1);
    let vlink2 = VirtualLinkKey::new(2, 1);
    mapping.add_link_mapping(&[l1.clone(), l2.clone()], vlink1);
    mapping.add_link_mapping(&[l1.clone()], vlink2);

    assert_eq!(mapping.get_virtual_links(&l1.endpoints(), 1), Ok(vec![vlink1]));
    assert_eq!(mapping.get_virtual_links(&l1.endpoints(), 2), Ok(vec![vlink2]));
    assert_eq!(
        mapping.get_virtual_links(&l1.endpoints(), 3),
        Err(MappingError::TenantLinkNotFound(l1.endpoints(), 3))
    );
    assert_eq!(mapping.get_physical_links(&vlink1), Ok(vec![l1.clone(), l2.clone()]));

    // Empty tenant sets are pruned along with the physical entry.
    mapping.remove_virtual_link(&vlink1);
    assert!(!mapping.has_virtual_links(&l2.endpoints(), 1));
    assert_eq!(
        mapping.get_virtual_links(&l2.endpoints(), 1),
        Err(MappingError::PhysicalLinkNotFound(l2.endpoints()))
    );
    assert!(mapping.has_virtual_links(&l1.endpoints(), 2));
}

#[test]
fn test_link_replaced_path() {
    let mapping = Mapping::new();
    let l1 = link(1, (10, 1), (11, 1));
    let l2 = link(2, (10, 2), (11, 2));
    let vlink = VirtualLinkKey::new(1, 1);
    mapping.add_link_mapping(&[l1.clone()], vlink);
    mapping.add_link_mapping(&[l2.clone()], vlink);

    assert!(!mapping.has_virtual_links(&l1.endpoints(), 1));
    assert_eq!(mapping.get_virtual_links(&l2.endpoints(), 1), Ok(vec![vlink]));
}

#[test]
fn test_link_found_from_both_directions() {
    let mapping = Mapping::new();
    let l1 = link(1, (10, 1), (11, 1));
    let l2 = link(2, (11, 2), (12, 1));
    let vlink = VirtualLinkKey::new(1, 1);
    mapping.add_link_mapping(&[l1.clone(), l2.clone()], vlink);

    for hop in [&l1, &l2] {
        assert_eq!(mapping.get_virtual_links(&hop.endpoints(), 1), Ok(vec![vlink]));
        assert_eq!(
            mapping.get_virtual_links(&hop.endpoints().reverse(), 1),
            Ok(vec![vlink])
        );
    }

    // Losing the reverse direction strips the hop and both index entries.
    mapping.remove_physical_link(&l1.endpoints().reverse());
    assert_eq!(mapping.get_physical_links(&vlink), Ok(vec![l2.clone()]));
    assert!(!mapping.has_virtual_links(&l1.endpoints(), 1));
    assert!(!mapping.has_virtual_links(&l1.endpoints().reverse(), 1));
    assert!(mapping.has_virtual_links(&l2.endpoints().reverse(), 1));

    mapping.remove_virtual_link(&vlink);
    assert!(!mapping.has_virtual_links(&l2.endpoints(), 1));
    assert!(!mapping.has_virtual_links(&l2.endpoints().reverse(), 1));
}

#[test]
fn test_link_identity_persistence() {
    let mapping = Mapping::new();
    mapping.record_link_id(&link(7, (1, 1), (2, 2)));

    let mut relearned = link(0, (1, 1), (2, 2));
    assert!(mapping.known_link(&mut relearned));
    assert_eq!(relearned.id, 7);

    let mut reversed = link(0, (2, 2), (1, 1));
    assert!(!mapping.known_link(&mut reversed));
    assert_eq!(reversed.id, 0);

    mapping.remove_physical_link(&LinkEndpoints::new(
        PortKey::new(1, 1),
        PortKey::new(2, 2),
    ));
    assert!(!mapping.known_link(&mut link(0, (1, 1), (2, 2))));
}

#[test]
fn test_remove_physical_link_strips_paths() {
    let mapping = Mapping::new();
    let l1 = link(1, (10, 1), (11, 1));
    let l2 = link(2, (11, 2), (12, 1));
    let vlink = VirtualLinkKey::new(1, 1);
    let route = SwitchRouteKey::new(1, 0x100, 1);
    mapping.add_link_mapping(&[l1.clone(), l2.clone()], vlink);
    mapping.add_route_mapping(route, &[l1.clone()]);

    mapping.remove_physical_link(&l1.endpoints());
    assert_eq!(mapping.get_physical_links(&vlink), Ok(vec![l2]));
    assert_eq!(mapping.get_route(&route), Ok(vec![]));
    assert!(!mapping.has_switch_routes(&l1.endpoints(), 1));
}

#[test]
fn test_address_mapping() {
    let mapping = Mapping::new();
    let vip = Ipv4Addr::new(10, 0, 0, 1);
    let pip1 = Ipv4Addr::new(1, 0, 0, 1);
    let pip2 = Ipv4Addr::new(2, 0, 0, 1);
    let mac = MacAddr::from_bytes([0x02, 0, 0, 0, 0, 1]);
    mapping.add_ip_mapping(1, vip, pip1);
    mapping.add_ip_mapping(2, vip, pip2);
    mapping.add_mac(mac, 1);

    assert_eq!(mapping.get_virtual_ip(pip1), Ok((1, vip)));
    assert_eq!(mapping.get_physical_ip(2, vip), Ok(pip2));
    assert_eq!(mapping.get_mac(&mac), Ok(1));

    mapping.remove_ip_mapping(1, vip);
    assert!(!mapping.has_physical_ip(pip1));
    assert!(mapping.has_virtual_ip(2, vip));

    mapping.remove_virtual_ips(2);
    assert!(!mapping.has_virtual_ip(2, vip));
    let error = mapping.get_virtual_ip(pip2).unwrap_err();
    assert_eq!(error.kind(), MappingKind::Address);
    assert_eq!(error.to_string(), "address mapping not found");
}

#[test]
fn test_reset() {
    let mapping = Mapping::new();
    let vswitch = VirtualSwitchKey::new(1, 0x100);
    mapping.add_switch_mapping(&[10], vswitch);
    mapping.record_link_id(&link(3, (10, 1), (11, 1)));

    mapping.reset();
    assert!(!mapping.has_virtual_switch(10, 1));
    assert!(!mapping.known_link(&mut link(0, (10, 1), (11, 1))));
    assert!(mapping.list_tenant_ids().is_empty());
}

#[test]
fn test_concurrent_link_updates() {
    let mapping = Mapping::new();
    let hops = [
        link(1, (10, 1), (11, 1)),
        link(2, (11, 2), (12, 1)),
        link(3, (10, 2), (12, 2)),
    ];
    let vlinks = [
        VirtualLinkKey::new(1, 1),
        VirtualLinkKey::new(1, 2),
        VirtualLinkKey::new(2, 1),
    ];

    std::thread::scope(|scope| {
        let (mapping, hops) = (&mapping, &hops);
        for (i, vlink) in vlinks.iter().enumerate() {
            scope.spawn(move || {
                for n in 0..500 {
                    let path = if (n + i) % 2 == 0 { &hops[..2] } else { &hops[2..] };
                    mapping.add_link_mapping(path, *vlink);
                }
            });
        }
        scope.spawn(move || {
            for n in 0..500 {
                mapping.remove_physical_link(&hops[n % 3].endpoints());
            }
        });
        scope.spawn(move || {
            for n in 0..500 {
                let endpoints = hops[n % 3].endpoints().reverse();
                if let Ok(found) = mapping.get_virtual_links(&endpoints, 1) {
                    assert!(!found.is_empty());
                }
            }
        });
    });

    // Both link indexes agree, in both directions of every hop.
    let endpoints = hops
        .iter()
        .flat_map(|hop| [hop.endpoints(), hop.endpoints().reverse()])
        .collect::<Vec<_>>();
    for vlink in vlinks {
        let path = mapping.get_physical_links(&vlink).unwrap();
        for link in &endpoints {
            let indexed = mapping
                .get_virtual_links(link, vlink.tenant_id)
                .is_ok_and(|found| found.contains(&vlink));
            let crossed = path
                .iter()
                .any(|hop| hop.endpoints() == *link || hop.endpoints().reverse() == *link);
            assert_eq!(indexed, crossed, "{vlink:?} over {link}");
        }
    }
}
