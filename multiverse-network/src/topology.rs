// src/topology.rs

//! Network topology and mana distribution.
//!
//! Peers are wired as a Watts–Strogatz small world: a ring lattice where
//! every node connects to its nearest neighbors, with each edge rewired to a
//! random target with the configured probability. Mana follows a Zipf
//! distribution over the peer ranks, which approximates the skewed stake
//! distributions observed in deployed networks.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

/// Deterministic Zipf mana distribution.
///
/// Peer `i` receives a share proportional to `(i + 1)^-s`, scaled so the
/// weights sum exactly to `total_weight`. An exponent of zero yields a
/// uniform distribution.
pub fn zipf_weights(node_count: usize, s: f64, total_weight: u64) -> Vec<u64> {
    if node_count == 0 {
        return Vec::new();
    }

    let raw: Vec<f64> = (0..node_count)
        .map(|rank| 1.0 / ((rank + 1) as f64).powf(s))
        .collect();
    let sum: f64 = raw.iter().sum();

    let mut weights: Vec<u64> = raw
        .iter()
        .map(|share| (total_weight as f64 * share / sum) as u64)
        .collect();

    // hand out the rounding remainder so the total is exact
    let assigned: u64 = weights.iter().sum();
    let mut remainder = total_weight - assigned;
    let mut rank = 0;
    while remainder > 0 {
        weights[rank % node_count] += 1;
        remainder -= 1;
        rank += 1;
    }

    weights
}

/// Watts–Strogatz small-world topology.
///
/// Returns undirected edges `(low, high)`. Every node starts connected to
/// its `neighbor_count` nearest ring neighbors; each edge is rewired to a
/// uniformly random target with probability `randomness`. Degenerate sizes
/// collapse to a full mesh.
pub fn watts_strogatz<R: Rng>(
    node_count: usize,
    neighbor_count: usize,
    randomness: f64,
    rng: &mut R,
) -> HashSet<(usize, usize)> {
    let mut edges = HashSet::new();
    if node_count < 2 {
        return edges;
    }

    if neighbor_count + 1 >= node_count {
        for a in 0..node_count {
            for b in (a + 1)..node_count {
                edges.insert((a, b));
            }
        }
        return edges;
    }

    let half = (neighbor_count / 2).max(1);
    for node in 0..node_count {
        for offset in 1..=half {
            let mut target = (node + offset) % node_count;

            if rng.gen::<f64>() < randomness {
                let candidates: Vec<usize> = (0..node_count)
                    .filter(|candidate| {
                        *candidate != node
                            && !edges.contains(&edge_key(node, *candidate))
                    })
                    .collect();
                if let Some(rewired) = candidates.choose(rng) {
                    target = *rewired;
                }
            }

            edges.insert(edge_key(node, target));
        }
    }

    edges
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
