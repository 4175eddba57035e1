//! Response assembly: statistics, cluster descriptors, representative
//! content. This is the single boundary where internal matrices become plain
//! JSON-serializable values.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use ndarray::Array2;
use serde_json::Value;

use clustering_core::keywords::KeywordExtractor;
use clustering_core::models::{ClusterDescriptor, ClusteringStats, InputFormat, NormalizedItem};

/// Representative texts returned per cluster.
pub const REPRESENTATIVE_TOP_N: usize = 5;

pub fn build_stats(labels: &[i32], dbcv_score: Option<f64>) -> ClusteringStats {
    let n_samples = labels.len();
    let mut cluster_sizes: BTreeMap<i32, usize> = BTreeMap::new();
    let mut n_outliers = 0usize;

    for &label in labels {
        if label == -1 {
            n_outliers += 1;
        } else {
            *cluster_sizes.entry(label).or_insert(0) += 1;
        }
    }

    ClusteringStats {
        n_samples,
        n_clusters: cluster_sizes.len(),
        n_outliers,
        outlier_ratio: if n_samples == 0 {
            0.0
        } else {
            n_outliers as f64 / n_samples as f64
        },
        cluster_sizes,
        // a NaN score must never reach the wire
        dbcv_score: dbcv_score.filter(|score| score.is_finite()),
    }
}

/// Group items by label into descriptors: members in original order,
/// centroids from the reduced projection, representative texts, optional
/// keywords. Clusters sort by size descending with the outlier group last.
pub fn build_clusters(
    items: &[NormalizedItem],
    labels: &[i32],
    reduced: &Array2<f64>,
    format: InputFormat,
    remove_outliers: bool,
    content_analysis: bool,
) -> Vec<ClusterDescriptor> {
    let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(index);
    }

    let extractor = content_analysis.then(KeywordExtractor::new);

    let mut clusters = Vec::with_capacity(groups.len());
    for (cluster_id, indices) in groups {
        if cluster_id == -1 && remove_outliers {
            continue;
        }

        let members: Vec<NormalizedItem> =
            indices.iter().map(|&index| items[index].clone()).collect();
        let member_texts: Vec<String> = members.iter().map(|item| item.text.clone()).collect();

        clusters.push(ClusterDescriptor {
            cluster_id,
            size: members.len(),
            centroid: centroid_of(reduced, &indices),
            representative_content: representative_content(&members, format),
            keywords: extractor
                .as_ref()
                .map(|e| e.extract(&member_texts))
                .unwrap_or_default(),
            summary: None,
            items: members,
        });
    }

    clusters.sort_by(|a, b| {
        let a_outlier = a.cluster_id == -1;
        let b_outlier = b.cluster_id == -1;
        a_outlier
            .cmp(&b_outlier)
            .then(b.size.cmp(&a.size))
            .then(a.cluster_id.cmp(&b.cluster_id))
    });

    clusters
}

/// Column-wise mean of the members' reduced rows. Absent when the projection
/// has no columns.
fn centroid_of(reduced: &Array2<f64>, indices: &[usize]) -> Option<Vec<f64>> {
    if indices.is_empty() || reduced.ncols() == 0 {
        return None;
    }

    let mut centroid = vec![0.0f64; reduced.ncols()];
    for &index in indices {
        for (column, value) in reduced.row(index).iter().enumerate() {
            centroid[column] += value;
        }
    }
    for value in &mut centroid {
        *value /= indices.len() as f64;
    }
    Some(centroid)
}

/// Up to `REPRESENTATIVE_TOP_N` member texts. Original order, except article
/// batches where members with a parseable publish date sort newest-first;
/// malformed or missing dates keep their relative order at the end.
fn representative_content(members: &[NormalizedItem], format: InputFormat) -> Vec<String> {
    let mut ordered: Vec<&NormalizedItem> = members.iter().collect();

    if format == InputFormat::Article {
        ordered.sort_by(|a, b| match (publish_date(a), publish_date(b)) {
            (Some(left), Some(right)) => right.cmp(&left),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    ordered
        .iter()
        .take(REPRESENTATIVE_TOP_N)
        .map(|member| member.text.clone())
        .collect()
}

fn publish_date(item: &NormalizedItem) -> Option<DateTime<FixedOffset>> {
    item.metadata
        .get("publishDate")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;

    fn item(id: u64, text: &str) -> NormalizedItem {
        NormalizedItem {
            id: json!(id),
            text: text.to_string(),
            embedding: vec![0.0; 4],
            metadata: Map::new(),
        }
    }

    fn article(id: u64, text: &str, publish_date: Option<&str>) -> NormalizedItem {
        let mut metadata = Map::new();
        if let Some(date) = publish_date {
            metadata.insert("publishDate".to_string(), json!(date));
        }
        NormalizedItem {
            id: json!(id),
            text: text.to_string(),
            embedding: vec![0.0; 4],
            metadata,
        }
    }

    fn reduced(rows: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, 2), |(r, c)| (r * 2 + c) as f64)
    }

    #[test]
    fn stats_partition_the_samples() {
        let labels = vec![0, 0, 1, -1, 1, 0];
        let stats = build_stats(&labels, Some(0.5));

        assert_eq!(stats.n_samples, 6);
        assert_eq!(stats.n_clusters, 2);
        assert_eq!(stats.n_outliers, 1);
        let clustered: usize = stats.cluster_sizes.values().sum();
        assert_eq!(stats.n_outliers + clustered, stats.n_samples);
        assert_eq!(stats.cluster_sizes[&0], 3);
        assert_eq!(stats.cluster_sizes[&1], 2);
        assert!((stats.outlier_ratio - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(stats.dbcv_score, Some(0.5));
    }

    #[test]
    fn nan_scores_become_unavailable() {
        let stats = build_stats(&[0, 1], Some(f64::NAN));
        assert!(stats.dbcv_score.is_none());
    }

    #[test]
    fn clusters_sort_by_size_with_outliers_last() {
        let items: Vec<NormalizedItem> = (0..6).map(|i| item(i, "text")).collect();
        let labels = vec![0, 1, 1, -1, 1, 0];
        let clusters = build_clusters(
            &items,
            &labels,
            &reduced(6),
            InputFormat::SimpleVector,
            false,
            false,
        );

        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].cluster_id, 1);
        assert_eq!(clusters[0].size, 3);
        assert_eq!(clusters[1].cluster_id, 0);
        assert_eq!(clusters[2].cluster_id, -1);
    }

    #[test]
    fn remove_outliers_drops_the_outlier_group_only() {
        let items: Vec<NormalizedItem> = (0..4).map(|i| item(i, "text")).collect();
        let labels = vec![0, 0, -1, 1];
        let clusters = build_clusters(
            &items,
            &labels,
            &reduced(4),
            InputFormat::SimpleVector,
            true,
            false,
        );

        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.cluster_id != -1));
    }

    #[test]
    fn centroid_is_the_mean_of_member_rows() {
        let items: Vec<NormalizedItem> = (0..2).map(|i| item(i, "text")).collect();
        let labels = vec![0, 0];
        // rows: [0, 1], [2, 3]
        let clusters = build_clusters(
            &items,
            &labels,
            &reduced(2),
            InputFormat::SimpleVector,
            false,
            false,
        );

        assert_eq!(clusters[0].centroid.as_deref(), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn members_keep_original_order() {
        let items: Vec<NormalizedItem> = (0..4).map(|i| item(i, &format!("t{i}"))).collect();
        let labels = vec![0, 1, 0, 0];
        let clusters = build_clusters(
            &items,
            &labels,
            &reduced(4),
            InputFormat::SimpleVector,
            false,
            false,
        );

        let texts: Vec<&str> = clusters[0]
            .items
            .iter()
            .map(|item| item.text.as_str())
            .collect();
        assert_eq!(texts, vec!["t0", "t2", "t3"]);
    }

    #[test]
    fn article_representative_content_is_newest_first() {
        let items = vec![
            article(0, "oldest", Some("2024-01-01T00:00:00Z")),
            article(1, "newest", Some("2024-03-01T00:00:00Z")),
            article(2, "undated", None),
            article(3, "middle", Some("2024-02-01T00:00:00+01:00")),
        ];
        let labels = vec![0, 0, 0, 0];
        let clusters = build_clusters(
            &items,
            &labels,
            &reduced(4),
            InputFormat::Article,
            false,
            false,
        );

        assert_eq!(
            clusters[0].representative_content,
            vec!["newest", "middle", "oldest", "undated"]
        );
    }

    #[test]
    fn malformed_dates_do_not_affect_ordering() {
        let items = vec![
            article(0, "bad-date", Some("yesterday")),
            article(1, "dated", Some("2024-03-01T00:00:00Z")),
        ];
        let labels = vec![0, 0];
        let clusters = build_clusters(
            &items,
            &labels,
            &reduced(2),
            InputFormat::Article,
            false,
            false,
        );

        assert_eq!(
            clusters[0].representative_content,
            vec!["dated", "bad-date"]
        );
    }

    #[test]
    fn representative_content_caps_at_top_n() {
        let items: Vec<NormalizedItem> = (0..8).map(|i| item(i, &format!("t{i}"))).collect();
        let labels = vec![0; 8];
        let clusters = build_clusters(
            &items,
            &labels,
            &reduced(8),
            InputFormat::SimpleVector,
            false,
            false,
        );

        assert_eq!(clusters[0].representative_content.len(), REPRESENTATIVE_TOP_N);
        assert_eq!(clusters[0].size, 8);
        assert_eq!(clusters[0].items.len(), 8);
    }

    #[test]
    fn keywords_populate_only_with_content_analysis() {
        let items = vec![
            item(0, "solar panels and solar farms"),
            item(1, "solar energy storage"),
        ];
        let labels = vec![0, 0];

        let without = build_clusters(
            &items,
            &labels,
            &reduced(2),
            InputFormat::VectorWithText,
            false,
            false,
        );
        assert!(without[0].keywords.is_empty());

        let with = build_clusters(
            &items,
            &labels,
            &reduced(2),
            InputFormat::VectorWithText,
            false,
            true,
        );
        assert_eq!(with[0].keywords[0], "solar");
    }
}
