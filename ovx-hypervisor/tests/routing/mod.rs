//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use ovx_hypervisor::physical::{Dpid, PhysicalLink, PortKey, PortNo};
use ovx_hypervisor::routing::{
    compute_paths, embed_link, scope_edges, shortest_path,
};

//
// Helper functions.
//

fn link(
    id: u32,
    src: (Dpid, PortNo),
    dst: (Dpid, PortNo),
    metric: u32,
) -> PhysicalLink {
    PhysicalLink::new(
        id,
        PortKey::new(src.0, src.1),
        PortKey::new(dst.0, dst.1),
        metric,
    )
}

fn ids(path: &[PhysicalLink]) -> Vec<u32> {
    path.iter().map(|link| link.id).collect()
}

// Three equal-cost, link-disjoint paths from switch 1 to switch 5, through
// switches 2, 3 and 4.
fn three_paths() -> Vec<PhysicalLink> {
    vec![
        link(1, (1, 1), (2, 1), 1),
        link(2, (2, 2), (5, 1), 1),
        link(3, (1, 2), (3, 1), 1),
        link(4, (3, 2), (5, 2), 1),
        link(5, (1, 3), (4, 1), 1),
        link(6, (4, 2), (5, 3), 1),
    ]
}

//
// Tests.
//

#[test]
fn test_shortest_path_metric() {
    let edges = vec![
        link(1, (1, 1), (4, 1), 5),
        link(2, (1, 2), (2, 1), 1),
        link(3, (2, 2), (4, 2), 1),
    ];
    let path = shortest_path(&edges, 1, 4).unwrap();
    assert_eq!(ids(&path), vec![2, 3]);
}

#[test]
fn test_shortest_path_tie_break() {
    // Both paths cost 2. The one whose last link has the lowest ID wins.
    let mut edges = vec![
        link(10, (1, 1), (2, 1), 1),
        link(11, (2, 2), (4, 1), 1),
        link(5, (1, 2), (3, 1), 1),
        link(12, (3, 2), (4, 2), 1),
    ];
    assert_eq!(ids(&shortest_path(&edges, 1, 4).unwrap()), vec![10, 11]);

    edges[3].id = 3;
    assert_eq!(ids(&shortest_path(&edges, 1, 4).unwrap()), vec![5, 3]);
}

#[test]
fn test_shortest_path_parallel_links() {
    let edges = vec![
        link(8, (1, 1), (2, 1), 1),
        link(4, (1, 2), (2, 2), 1),
        link(2, (1, 3), (2, 3), 3),
    ];
    assert_eq!(ids(&shortest_path(&edges, 1, 2).unwrap()), vec![4]);
}

#[test]
fn test_shortest_path_unreachable() {
    let edges = vec![link(1, (1, 1), (2, 1), 1), link(2, (3, 1), (2, 2), 1)];
    assert_eq!(shortest_path(&edges, 1, 3), None);
    assert_eq!(shortest_path(&edges, 3, 3), Some(vec![]));
}

#[test]
fn test_backup_exclusivity() {
    let edges = three_paths();
    let paths = compute_paths(&edges, 1, 5, 2);
    assert_eq!(paths.len(), 3);

    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            let a = a.iter().map(|link| link.id).collect::<BTreeSet<_>>();
            let b = b.iter().map(|link| link.id).collect::<BTreeSet<_>>();
            assert!(a.is_disjoint(&b));
        }
    }
    assert_eq!(ids(&paths[0]), vec![1, 2]);
}

#[test]
fn test_partial_backups() {
    let edges = three_paths();
    assert_eq!(compute_paths(&edges, 1, 5, 5).len(), 3);
    assert!(compute_paths(&edges, 5, 1, 2).is_empty());
}

#[test]
fn test_scope_edges() {
    let edges = three_paths();
    let scoped = scope_edges(&edges, &[1, 2, 5]);
    assert_eq!(ids(&scoped), vec![1, 2]);
    assert_eq!(compute_paths(&scoped, 1, 5, 2).len(), 1);
}

#[test]
fn test_embed_direct_link() {
    let edges = vec![link(1, (1, 1), (2, 1), 1), link(2, (2, 1), (1, 1), 1)];
    let paths =
        embed_link(&edges, PortKey::new(1, 1), PortKey::new(2, 1), 2);
    assert_eq!(paths.len(), 1);
    assert_eq!(ids(&paths[0]), vec![1]);
}

#[test]
fn test_embed_dual_hop() {
    let edges = vec![link(1, (1, 1), (2, 1), 1), link(2, (2, 2), (3, 1), 1)];
    let paths =
        embed_link(&edges, PortKey::new(1, 1), PortKey::new(3, 1), 2);
    assert_eq!(paths.len(), 1);
    assert_eq!(ids(&paths[0]), vec![1, 2]);
}

#[test]
fn test_embed_with_backup() {
    let edges = vec![
        link(1, (1, 1), (2, 1), 1),
        link(2, (2, 2), (3, 1), 1),
        link(3, (2, 3), (4, 1), 1),
        link(4, (4, 2), (3, 2), 1),
        link(5, (3, 3), (5, 1), 1),
    ];
    let paths =
        embed_link(&edges, PortKey::new(1, 1), PortKey::new(5, 1), 1);
    assert_eq!(paths.len(), 2);
    assert_eq!(ids(&paths[0]), vec![1, 2, 5]);
    assert_eq!(ids(&paths[1]), vec![1, 3, 4, 5]);
}

#[test]
fn test_embed_without_access_link() {
    let edges = vec![link(1, (1, 1), (2, 1), 1)];
    let paths =
        embed_link(&edges, PortKey::new(1, 2), PortKey::new(2, 1), 0);
    assert!(paths.is_empty());
}
