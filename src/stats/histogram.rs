//! Histogramme des tailles de paquets

use serde::{Deserialize, Serialize};

/// Plages fixes, inclusives et disjointes (borne haute absente = infinie)
const SIZE_RANGES: [(u32, Option<u32>, &str); 4] = [
    (0, Some(64), "0-64"),
    (65, Some(512), "65-512"),
    (513, Some(1500), "513-1500"),
    (1501, None, ">1500"),
];

/// Nombre de divisions pour le calcul du 95e centile (20 quantiles, 19e point)
const PERCENTILE_DIVISIONS: usize = 20;
const P95_POINT: usize = 19;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeBucket {
    pub range: String,
    pub count: usize,
    pub min: u32,
    pub max: u32,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
}

impl SizeBucket {
    fn empty(label: &str) -> Self {
        Self {
            range: label.to_string(),
            count: 0,
            min: 0,
            max: 0,
            mean: 0.0,
            median: 0.0,
            p95: 0.0,
        }
    }
}

/// Arrondi au dixième, les demis allant au pair (100.25 donne 100.2)
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Médiane d'un échantillon trié (moyenne des deux valeurs centrales si pair)
pub fn median(sorted: &[u32]) -> f64 {
    let len = sorted.len();
    if len == 0 {
        return 0.0;
    }
    if len % 2 == 1 {
        sorted[len / 2] as f64
    } else {
        (sorted[len / 2 - 1] as f64 + sorted[len / 2] as f64) / 2.0
    }
}

/// Point de coupure `point` parmi `divisions` quantiles, méthode « exclusive »
/// (positions calculées sur n+1, interpolation entre les rangs voisins).
pub fn quantile_cut(sorted: &[u32], divisions: usize, point: usize) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        len => {
            let m = len + 1;
            let j = (point * m / divisions).clamp(1, len - 1);
            let delta = (point * m) as f64 - (j * divisions) as f64;
            let n = divisions as f64;
            (sorted[j - 1] as f64 * (n - delta) + sorted[j] as f64 * delta) / n
        }
    }
}

/// Construit les quatre plages, toujours présentes et dans un ordre fixe
pub fn size_histogram(sizes: &[u32]) -> Vec<SizeBucket> {
    SIZE_RANGES
        .iter()
        .map(|(low, high, label)| {
            let mut in_range: Vec<u32> = sizes
                .iter()
                .copied()
                .filter(|size| *size >= *low && high.map_or(true, |high| *size <= high))
                .collect();

            if in_range.is_empty() {
                return SizeBucket::empty(label);
            }
            in_range.sort_unstable();

            let sum: u64 = in_range.iter().map(|size| *size as u64).sum();
            SizeBucket {
                range: label.to_string(),
                count: in_range.len(),
                min: in_range[0],
                max: in_range[in_range.len() - 1],
                mean: round1(sum as f64 / in_range.len() as f64),
                median: round1(median(&in_range)),
                p95: round1(quantile_cut(&in_range, PERCENTILE_DIVISIONS, P95_POINT)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_partition_sizes() {
        let sizes = vec![0, 64, 65, 512, 513, 1500, 1501, 9000, 40];
        let histogram = size_histogram(&sizes);
        assert_eq!(histogram.len(), 4);
        assert_eq!(histogram.iter().map(|b| b.count).sum::<usize>(), sizes.len());
        assert_eq!(histogram[0].count, 3);
        assert_eq!(histogram[1].min, 65);
        assert_eq!(histogram[1].max, 512);
        assert_eq!(histogram[3].max, 9000);
    }

    #[test]
    fn test_empty_ranges_are_zeroed() {
        let histogram = size_histogram(&[]);
        let labels: Vec<&str> = histogram.iter().map(|b| b.range.as_str()).collect();
        assert_eq!(labels, vec!["0-64", "65-512", "513-1500", ">1500"]);
        assert!(histogram.iter().all(|b| *b == SizeBucket::empty(&b.range)));
    }

    #[test]
    fn test_bucket_statistics() {
        let histogram = size_histogram(&[400, 100, 300, 200]);
        let bucket = &histogram[1];
        assert_eq!(bucket.count, 4);
        assert_eq!(bucket.min, 100);
        assert_eq!(bucket.max, 400);
        assert_eq!(bucket.mean, 250.0);
        assert_eq!(bucket.median, 250.0);
        assert_eq!(bucket.p95, 475.0);
    }

    #[test]
    fn test_round1_ties_to_even() {
        assert_eq!(round1(100.25), 100.2);
        assert_eq!(round1(100.75), 100.8);
        assert_eq!(round1(0.25), 0.2);
        assert_eq!(round1(33.33), 33.3);
        let bucket = &size_histogram(&[100, 100, 100, 101])[1];
        assert_eq!(bucket.mean, 100.2);
    }

    #[test]
    fn test_quantile_cut_edge_cases() {
        assert_eq!(quantile_cut(&[], 20, 19), 0.0);
        assert_eq!(quantile_cut(&[70], 20, 19), 70.0);
        // 20 valeurs de 1 à 20 : 19e point = 20 * 19/20 + 19 * 1/20
        let values: Vec<u32> = (1..=20).collect();
        assert!((quantile_cut(&values, 20, 19) - 19.95).abs() < 1e-9);
        assert_eq!(median(&[1, 3, 5]), 3.0);
    }
}
