//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::physical::{Dpid, PhysicalLink, PortKey};

// Path computation strategy of a big switch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingAlgorithm {
    // Routes are only ever installed explicitly.
    #[default]
    Manual,
    ShortestPath,
}

// Vertex of the shortest-path tree.
#[derive(Debug, new)]
struct Vertex {
    id: Dpid,
    distance: u64,
    // Link used to reach this vertex from its parent.
    parent_link: Option<PhysicalLink>,
}

// ===== global functions =====

/// Computes the least-cost path between two physical switches.
///
/// Only the lowest-metric link is considered between any ordered pair of
/// switches. Ties are resolved deterministically: vertices are settled in
/// (distance, dpid) order, and among equal-cost ways to reach a vertex the one
/// whose last link has the lowest ID wins. Parallel links of equal metric are
/// likewise reduced to the one with the lowest ID.
///
/// Returns an empty path when both ends are the same switch.
pub fn shortest_path(
    edges: &[PhysicalLink],
    src: Dpid,
    dst: Dpid,
) -> Option<Vec<PhysicalLink>> {
    if src == dst {
        return Some(vec![]);
    }
    let adjacencies = reduce_edges(edges);

    // Initialize SPT and candidate list.
    let mut spt: BTreeMap<Dpid, Vertex> = BTreeMap::new();
    let mut cand_list = BTreeMap::new();
    cand_list.insert((0, src), Vertex::new(src, 0, None));

    // Main SPF loop.
    while let Some(((_, vertex_id), vertex)) = cand_list.pop_first() {
        spt.insert(vertex_id, vertex);
        if vertex_id == dst {
            break;
        }
        let distance = spt[&vertex_id].distance;

        for link in adjacencies.get(&vertex_id).into_iter().flatten() {
            let link_vertex = link.dst.dpid;

            // Check if the link's vertex is already on the shortest-path tree.
            if spt.contains_key(&link_vertex) {
                continue;
            }

            let link_distance = distance.saturating_add(u64::from(link.metric));

            // Check if this vertex is already present on the candidate list.
            if let Some((cand_key, cand_v)) = cand_list
                .iter()
                .find(|(_, cand_v)| cand_v.id == link_vertex)
            {
                let better = match link_distance.cmp(&cand_v.distance) {
                    Ordering::Less => true,
                    Ordering::Equal => cand_v
                        .parent_link
                        .as_ref()
                        .is_some_and(|parent| link.id < parent.id),
                    Ordering::Greater => false,
                };
                if !better {
                    continue;
                }
                let cand_key = *cand_key;
                cand_list.remove(&cand_key);
            }
            cand_list.insert(
                (link_distance, link_vertex),
                Vertex::new(link_vertex, link_distance, Some(link.clone())),
            );
        }
    }

    // Walk the tree back from the destination.
    let mut path = vec![];
    let mut vertex = spt.get(&dst)?;
    while let Some(link) = &vertex.parent_link {
        path.push(link.clone());
        vertex = spt.get(&link.src.dpid)?;
    }
    path.reverse();
    Some(path)
}

/// Computes a primary path plus up to `backups` alternatives.
///
/// Each path is computed after removing the links used by the previous ones,
/// so all returned paths are link-disjoint. An empty result means not even
/// the primary path exists. Running out of alternatives early is a normal
/// outcome and yields the paths found so far.
pub fn compute_paths(
    edges: &[PhysicalLink],
    src: Dpid,
    dst: Dpid,
    backups: u8,
) -> Vec<Vec<PhysicalLink>> {
    let mut remaining = edges.to_vec();
    let mut paths = vec![];

    for _ in 0..=backups {
        let Some(path) = shortest_path(&remaining, src, dst) else {
            break;
        };
        if path.is_empty() {
            // Same switch, there's nothing to back up.
            paths.push(path);
            break;
        }
        remaining.retain(|edge| {
            !path.iter().any(|hop| hop.endpoints() == edge.endpoints())
        });
        paths.push(path);
    }

    if !paths.is_empty() && paths.len() <= usize::from(backups) {
        Debug::PartialEmbedding(src, dst, backups, paths.len()).log();
    }
    paths
}

/// Restricts the edge set to links internal to a group of switches.
pub fn scope_edges(edges: &[PhysicalLink], members: &[Dpid]) -> Vec<PhysicalLink> {
    let members = members.iter().collect::<BTreeSet<_>>();
    edges
        .iter()
        .filter(|edge| {
            members.contains(&edge.src.dpid) && members.contains(&edge.dst.dpid)
        })
        .cloned()
        .collect()
}

/// Embeds a virtual link between two physical ports.
///
/// The first hop is the link leaving `src`, the last hop the link reaching
/// `dst`. Directly linked ports, and ports one switch apart, have exactly one
/// possible embedding. Anything longer gets a primary path plus up to
/// `backups` link-disjoint alternatives between the two access links.
pub fn embed_link(
    edges: &[PhysicalLink],
    src: PortKey,
    dst: PortKey,
    backups: u8,
) -> Vec<Vec<PhysicalLink>> {
    // Direct link.
    if let Some(link) = edges.iter().find(|edge| edge.src == src && edge.dst == dst)
    {
        return vec![vec![link.clone()]];
    }

    let Some(head) = edges.iter().find(|edge| edge.src == src) else {
        return vec![];
    };
    let Some(tail) = edges.iter().find(|edge| edge.dst == dst) else {
        return vec![];
    };

    // Dual hop.
    if head.dst.dpid == tail.src.dpid {
        return vec![vec![head.clone(), tail.clone()]];
    }

    // The access ports never carry transit traffic.
    let core = edges
        .iter()
        .filter(|edge| {
            ![src, dst].iter().any(|port| edge.src == *port || edge.dst == *port)
        })
        .cloned()
        .collect::<Vec<_>>();
    compute_paths(&core, head.dst.dpid, tail.src.dpid, backups)
        .into_iter()
        .map(|middle| {
            let mut path = Vec::with_capacity(middle.len() + 2);
            path.push(head.clone());
            path.extend(middle);
            path.push(tail.clone());
            path
        })
        .collect()
}

// ===== helper functions =====

// Groups edges by source switch, keeping only the best link between any
// ordered pair of switches.
fn reduce_edges(edges: &[PhysicalLink]) -> BTreeMap<Dpid, Vec<PhysicalLink>> {
    let mut best: BTreeMap<(Dpid, Dpid), &PhysicalLink> = BTreeMap::new();
    for edge in edges {
        if edge.src.dpid == edge.dst.dpid {
            continue;
        }
        best.entry((edge.src.dpid, edge.dst.dpid))
            .and_modify(|current| {
                if (edge.metric, edge.id) < (current.metric, current.id) {
                    *current = edge;
                }
            })
            .or_insert(edge);
    }

    let mut adjacencies: BTreeMap<Dpid, Vec<PhysicalLink>> = BTreeMap::new();
    for ((src, _), edge) in best {
        adjacencies.entry(src).or_default().push(edge.clone());
    }
    adjacencies
}
