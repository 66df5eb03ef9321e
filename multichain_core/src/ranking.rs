//! Visit-based local ranking and its comparison against a reference table.

use multichain_env::Identity;
use std::collections::BTreeMap;

/// Builds a ranking from walk visit counts.
///
/// Every identity in `peers` gets an entry; its score is its share of all
/// recorded visits. Without any visit every peer scores zero.
pub fn visit_ranking<'a>(
    visits: &BTreeMap<Identity, u64>,
    peers: impl IntoIterator<Item = &'a Identity>,
) -> BTreeMap<Identity, f64> {
    let total: u64 = visits.values().sum();
    peers
        .into_iter()
        .map(|id| {
            let count = visits.get(id).copied().unwrap_or(0);
            let score = if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            };
            (*id, score)
        })
        .collect()
}

/// Total-variation distance between two rankings over their shared identities.
///
/// Both tables are restricted to the identities they share and normalized to
/// sum one. Returns 0.0 for identical distributions and 1.0 for disjoint
/// support, for no shared identity, or when either side carries no mass.
pub fn ranking_deviation(local: &BTreeMap<Identity, f64>, truth: &BTreeMap<Identity, f64>) -> f64 {
    let shared: Vec<(f64, f64)> = local
        .iter()
        .filter_map(|(id, l)| truth.get(id).map(|t| (*l, *t)))
        .collect();

    let local_mass: f64 = shared.iter().map(|(l, _)| l).sum();
    let truth_mass: f64 = shared.iter().map(|(_, t)| t).sum();
    if shared.is_empty() || local_mass <= 0.0 || truth_mass <= 0.0 {
        return 1.0;
    }

    let distance: f64 = shared
        .iter()
        .map(|(l, t)| (l / local_mass - t / truth_mass).abs())
        .sum();
    (distance / 2.0).clamp(0.0, 1.0)
}

/// Fraction of identity pairs ordered the same way by both rankings.
///
/// Pairs tied in either ranking count as agreeing. Returns 1.0 when fewer
/// than two identities are shared.
pub fn ordering_agreement(local: &BTreeMap<Identity, f64>, truth: &BTreeMap<Identity, f64>) -> f64 {
    const TIE: f64 = 1e-9;

    let shared: Vec<(f64, f64)> = local
        .iter()
        .filter_map(|(id, l)| truth.get(id).map(|t| (*l, *t)))
        .collect();

    let mut pairs = 0u64;
    let mut agreeing = 0u64;
    for i in 0..shared.len() {
        for j in (i + 1)..shared.len() {
            pairs += 1;
            let dl = shared[i].0 - shared[j].0;
            let dt = shared[i].1 - shared[j].1;
            if dl.abs() < TIE || dt.abs() < TIE || dl.signum() == dt.signum() {
                agreeing += 1;
            }
        }
    }

    if pairs == 0 {
        1.0
    } else {
        agreeing as f64 / pairs as f64
    }
}
