//! Assemblage de rings fermés à partir d'une soupe de segments

use std::collections::HashMap;

use geo::{Coord, LineString};

/// Pas de quantification des extrémités (m)
const SNAP_M: f64 = 1e-6;

type NodeKey = (i64, i64);

fn node_key(c: Coord<f64>) -> NodeKey {
    ((c.x / SNAP_M).round() as i64, (c.y / SNAP_M).round() as i64)
}

/// Assemble des boucles fermées à partir d'arcs non ordonnés (soupe de
/// segments d'un dessin).
///
/// Les extrémités sont quantifiées au micromètre et indexées par nœud ;
/// chaque boucle est construite en marchant d'arc en arc via cet index, vers
/// l'avant puis, si elle ne s'est pas refermée, depuis l'autre extrémité.
/// Les arcs qui ne se raccordent à rien sont abandonnés ; une boucle presque
/// fermée est refermée automatiquement.
pub fn assemble_rings(arcs: &[Vec<Coord<f64>>]) -> Vec<LineString<f64>> {
    let segments: Vec<&[Coord<f64>]> = arcs
        .iter()
        .filter(|arc| arc.len() >= 2)
        .map(Vec::as_slice)
        .collect();

    let mut by_node: HashMap<NodeKey, Vec<usize>> = HashMap::new();
    for (idx, segment) in segments.iter().enumerate() {
        by_node.entry(node_key(segment[0])).or_default().push(idx);
        by_node
            .entry(node_key(segment[segment.len() - 1]))
            .or_default()
            .push(idx);
    }

    let mut used = vec![false; segments.len()];
    let mut rings: Vec<LineString<f64>> = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut chain: Vec<Coord<f64>> = segments[start].to_vec();

        extend_tail(&mut chain, &segments, &by_node, &mut used);
        if node_key(chain[0]) != node_key(chain[chain.len() - 1]) {
            // La marche avant a calé : repartir de l'autre extrémité
            chain.reverse();
            extend_tail(&mut chain, &segments, &by_node, &mut used);
        }

        if chain.len() <= 3 {
            continue;
        }
        if node_key(chain[0]) != node_key(chain[chain.len() - 1]) {
            let gap = ((chain[0].x - chain[chain.len() - 1].x).powi(2)
                + (chain[0].y - chain[chain.len() - 1].y).powi(2))
            .sqrt();
            tracing::debug!(points = chain.len(), gap_meters = gap, "Auto-closing open loop");
            let first = chain[0];
            chain.push(first);
        }
        rings.push(LineString::new(chain));
    }

    rings
}

/// Prolonge la chaîne par sa dernière extrémité tant qu'un arc libre s'y
/// raccorde, en l'orientant au passage ; s'arrête dès que la boucle se
/// referme sur son origine.
fn extend_tail(
    chain: &mut Vec<Coord<f64>>,
    segments: &[&[Coord<f64>]],
    by_node: &HashMap<NodeKey, Vec<usize>>,
    used: &mut [bool],
) {
    let origin = node_key(chain[0]);
    loop {
        let tip = node_key(chain[chain.len() - 1]);
        if tip == origin && chain.len() > 2 {
            return;
        }
        let Some(next) = by_node
            .get(&tip)
            .and_then(|candidates| candidates.iter().copied().find(|&i| !used[i]))
        else {
            return;
        };
        used[next] = true;
        let segment = segments[next];
        chain.pop(); // éviter le doublon au raccord
        if node_key(segment[0]) == tip {
            chain.extend_from_slice(segment);
        } else {
            chain.extend(segment.iter().rev().copied());
        }
    }
}
