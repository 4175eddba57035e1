//! Density-Based Clustering Validation (Moulavi et al., 2014).
//!
//! Internal cluster quality score in [-1, 1], computed without ground truth:
//! all-points core distances give a density estimate per point, mutual
//! reachability distances combine density with geometry, each cluster's
//! sparseness is the largest internal edge of its mutual-reachability
//! spanning tree, and separation is the smallest mutual-reachability
//! distance to any other cluster.
//!
//! The score is deliberately fragile in the same places the reference
//! implementation is: clusters that are too small or contain duplicate
//! points make the index unavailable rather than producing NaN.

use ndarray::{Array2, ArrayView1};
use tracing::debug;

/// Score a labeling over its reduced matrix, ignoring outliers (-1).
/// Returns `None` whenever the index is undefined or the computation
/// degenerates; the caller records it as unavailable and continues.
pub fn score_labeling(points: &Array2<f64>, labels: &[i32]) -> Option<f64> {
    let non_outliers = labels.iter().filter(|&&label| label >= 0).count();
    let mut distinct: Vec<i32> = labels.iter().copied().filter(|&label| label >= 0).collect();
    distinct.sort_unstable();
    distinct.dedup();

    if non_outliers < 2 || distinct.len() < 2 {
        return None;
    }

    match validity_index(points, labels) {
        Ok(score) => Some(score),
        Err(reason) => {
            debug!(%reason, "validity index unavailable");
            None
        }
    }
}

fn validity_index(points: &Array2<f64>, labels: &[i32]) -> Result<f64, String> {
    if points.nrows() != labels.len() {
        return Err("labels do not match the point matrix".to_string());
    }
    let dims = points.ncols();
    if dims == 0 {
        return Err("points have zero dimensions".to_string());
    }

    let mut cluster_ids: Vec<i32> = labels.iter().copied().filter(|&l| l >= 0).collect();
    cluster_ids.sort_unstable();
    cluster_ids.dedup();

    let members: Vec<Vec<usize>> = cluster_ids
        .iter()
        .map(|&id| {
            labels
                .iter()
                .enumerate()
                .filter(|&(_, &label)| label == id)
                .map(|(index, _)| index)
                .collect()
        })
        .collect();

    let core = all_points_core_distances(points, &members, dims)?;
    let sparseness: Vec<f64> = members
        .iter()
        .map(|m| density_sparseness(points, &core, m))
        .collect::<Result<_, _>>()?;

    let n_clusters = members.len();
    let mut separation = vec![vec![f64::INFINITY; n_clusters]; n_clusters];
    for a in 0..n_clusters {
        for b in (a + 1)..n_clusters {
            let sep = density_separation(points, &core, &members[a], &members[b]);
            separation[a][b] = sep;
            separation[b][a] = sep;
        }
    }

    let total_points: usize = members.iter().map(|m| m.len()).sum();
    let mut score = 0.0;
    for (index, m) in members.iter().enumerate() {
        let min_separation = (0..n_clusters)
            .filter(|&other| other != index)
            .map(|other| separation[index][other])
            .fold(f64::INFINITY, f64::min);

        let denominator = min_separation.max(sparseness[index]);
        if !denominator.is_finite() || denominator <= 0.0 {
            return Err("degenerate density estimates".to_string());
        }

        let validity = (min_separation - sparseness[index]) / denominator;
        score += (m.len() as f64 / total_points as f64) * validity;
    }

    if !score.is_finite() {
        return Err("validity index is not finite".to_string());
    }
    Ok(score)
}

/// All-points core distance of every clustered point with respect to its own
/// cluster: an inverse-distance density estimate with the dimensionality as
/// the exponent.
fn all_points_core_distances(
    points: &Array2<f64>,
    members: &[Vec<usize>],
    dims: usize,
) -> Result<Vec<f64>, String> {
    let mut core = vec![0.0f64; points.nrows()];

    for m in members {
        if m.len() < 2 {
            return Err("cluster with fewer than two points".to_string());
        }
        for &i in m {
            let mut acc = 0.0;
            for &j in m {
                if i == j {
                    continue;
                }
                let distance = euclidean(points.row(i), points.row(j));
                if distance <= 0.0 {
                    return Err("duplicate points in cluster".to_string());
                }
                acc += (1.0 / distance).powi(dims as i32);
            }
            core[i] = (acc / (m.len() - 1) as f64).powf(-1.0 / dims as f64);
        }
    }

    Ok(core)
}

/// Largest mutual-reachability MST edge joining two internal nodes of the
/// cluster. Undefined for clusters whose spanning tree has no internal
/// edges (fewer than three points).
fn density_sparseness(
    points: &Array2<f64>,
    core: &[f64],
    members: &[usize],
) -> Result<f64, String> {
    let size = members.len();
    if size < 3 {
        return Err("cluster too small to estimate internal density".to_string());
    }

    let mut reachability = vec![vec![0.0f64; size]; size];
    for a in 0..size {
        for b in (a + 1)..size {
            let distance = euclidean(points.row(members[a]), points.row(members[b]));
            let mutual = core[members[a]].max(core[members[b]]).max(distance);
            reachability[a][b] = mutual;
            reachability[b][a] = mutual;
        }
    }

    let (edges, degrees) = minimum_spanning_tree(&reachability);
    let mut max_internal = f64::NEG_INFINITY;
    for &(a, b, weight) in &edges {
        if degrees[a] > 1 && degrees[b] > 1 {
            max_internal = max_internal.max(weight);
        }
    }

    if !max_internal.is_finite() {
        return Err("no internal edges in the cluster spanning tree".to_string());
    }
    Ok(max_internal)
}

/// Smallest mutual-reachability distance between two clusters.
fn density_separation(
    points: &Array2<f64>,
    core: &[f64],
    left: &[usize],
    right: &[usize],
) -> f64 {
    let mut best = f64::INFINITY;
    for &i in left {
        for &j in right {
            let distance = euclidean(points.row(i), points.row(j));
            let mutual = core[i].max(core[j]).max(distance);
            best = best.min(mutual);
        }
    }
    best
}

/// Prim's algorithm over a dense distance matrix. Returns the tree edges and
/// the degree of every node.
fn minimum_spanning_tree(dist: &[Vec<f64>]) -> (Vec<(usize, usize, f64)>, Vec<usize>) {
    let size = dist.len();
    let mut in_tree = vec![false; size];
    let mut best = vec![f64::INFINITY; size];
    let mut parent = vec![0usize; size];
    let mut degrees = vec![0usize; size];
    let mut edges = Vec::with_capacity(size.saturating_sub(1));

    best[0] = 0.0;
    for _ in 0..size {
        let mut next = usize::MAX;
        let mut next_best = f64::INFINITY;
        for candidate in 0..size {
            if !in_tree[candidate] && best[candidate] < next_best {
                next = candidate;
                next_best = best[candidate];
            }
        }
        if next == usize::MAX {
            break;
        }

        in_tree[next] = true;
        if next != 0 {
            edges.push((parent[next], next, best[next]));
            degrees[parent[next]] += 1;
            degrees[next] += 1;
        }

        for candidate in 0..size {
            if !in_tree[candidate] && dist[next][candidate] < best[candidate] {
                best[candidate] = dist[next][candidate];
                parent[candidate] = next;
            }
        }
    }

    (edges, degrees)
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
