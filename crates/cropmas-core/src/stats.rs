//! Statistics used to prune anomalous crop rows.
//!
//! The director only needs two capabilities: split a set of spacings into
//! groups, and say how likely two groups share a mean. Both sit behind
//! [`RowStatistics`] so the pruning bookkeeping can be exercised with a
//! scripted implementation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait RowStatistics {
    /// Assign each value a cluster label in `0..k`.
    fn cluster(&self, values: &[f64], k: usize) -> Vec<usize>;

    /// Two-sided p-value for the hypothesis that `a` and `b` share a mean.
    fn means_differ(&self, a: &[f64], b: &[f64]) -> f64;
}

/// One-dimensional k-means (k-means++ seeding) and Student's t-test with
/// pooled variance.
#[derive(Debug, Clone)]
pub struct KMeansTTest {
    pub seed: u64,
    pub max_iterations: usize,
}

impl Default for KMeansTTest {
    fn default() -> Self {
        Self { seed: 0, max_iterations: 300 }
    }
}

impl RowStatistics for KMeansTTest {
    fn cluster(&self, values: &[f64], k: usize) -> Vec<usize> {
        kmeans_1d(values, k, self.seed, self.max_iterations)
    }

    fn means_differ(&self, a: &[f64], b: &[f64]) -> f64 {
        student_t_test(a, b)
    }
}

// ── k-means ──────────────────────────────────────────────────────────────────

fn nearest(value: f64, centers: &[f64]) -> usize {
    let mut best = 0;
    for (i, c) in centers.iter().enumerate() {
        if (value - c).abs() < (value - centers[best]).abs() {
            best = i;
        }
    }
    best
}

/// Lloyd iterations on scalars, seeded with k-means++ from `seed`.
pub fn kmeans_1d(values: &[f64], k: usize, seed: u64, max_iterations: usize) -> Vec<usize> {
    if values.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(values.len());
    let mut rng = StdRng::seed_from_u64(seed);

    let mut centers = vec![values[rng.gen_range(0..values.len())]];
    while centers.len() < k {
        let d2: Vec<f64> = values
            .iter()
            .map(|&v| {
                let c = centers[nearest(v, &centers)];
                (v - c) * (v - c)
            })
            .collect();
        let total: f64 = d2.iter().sum();
        if total <= 0.0 {
            // Fewer distinct values than clusters.
            centers.push(centers[0]);
            continue;
        }
        let mut target = rng.gen::<f64>() * total;
        let mut pick = values.len() - 1;
        for (i, w) in d2.iter().enumerate() {
            if target < *w {
                pick = i;
                break;
            }
            target -= w;
        }
        centers.push(values[pick]);
    }

    let mut labels: Vec<usize> = values.iter().map(|&v| nearest(v, &centers)).collect();
    for _ in 0..max_iterations {
        for (j, center) in centers.iter_mut().enumerate() {
            let members: Vec<f64> = values
                .iter()
                .zip(&labels)
                .filter(|(_, l)| **l == j)
                .map(|(&v, _)| v)
                .collect();
            if !members.is_empty() {
                *center = mean(&members);
            }
        }
        let next: Vec<usize> = values.iter().map(|&v| nearest(v, &centers)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }
    labels
}

// ── t-test ───────────────────────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Two-sample Student's t-test assuming equal variances. Returns the
/// two-sided p-value, or 1.0 when there are not enough observations.
pub fn student_t_test(a: &[f64], b: &[f64]) -> f64 {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 || n1 + n2 <= 2 {
        return 1.0;
    }
    let (m1, m2) = (mean(a), mean(b));
    let ss = |xs: &[f64], m: f64| xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>();
    let df = (n1 + n2 - 2) as f64;
    let pooled = (ss(a, m1) + ss(b, m2)) / df;
    let se = (pooled * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    if se == 0.0 {
        return if m1 == m2 { 1.0 } else { 0.0 };
    }
    let t = (m1 - m2) / se;
    student_t_two_sided(t, df)
}

/// P(|T| >= |t|) for Student's t distribution with `df` degrees of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    let x = df / (df + t * t);
    regularized_incomplete_beta(x, 0.5 * df, 0.5)
}

/// Lanczos approximation (g = 7, 9 terms).
pub fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + G + 0.5;
    let series = COEF[1..]
        .iter()
        .enumerate()
        .fold(COEF[0], |acc, (i, c)| acc + c / (x + (i + 1) as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// I_x(a, b), evaluated with Lentz's continued fraction.
pub fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    if x < (a + 1.0) / (a + b + 2.0) {
        ln_front.exp() * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - ln_front.exp() * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const TINY: f64 = 1e-300;
    const EPS: f64 = 1e-14;
    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=300 {
        let m = m as f64;
        let m2 = 2.0 * m;
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ln_gamma_matches_factorials() {
        assert_relative_eq!(ln_gamma(1.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(ln_gamma(5.0), 24f64.ln(), epsilon = 1e-10);
        assert_relative_eq!(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), epsilon = 1e-10);
    }

    #[test]
    fn incomplete_beta_bounds_and_symmetry() {
        assert_eq!(regularized_incomplete_beta(0.0, 2.0, 3.0), 0.0);
        assert_eq!(regularized_incomplete_beta(1.0, 2.0, 3.0), 1.0);
        // I_x(a, a) at x = 0.5 is 0.5.
        assert_relative_eq!(regularized_incomplete_beta(0.5, 3.0, 3.0), 0.5, epsilon = 1e-10);
        // I_x(1, 1) is the identity.
        assert_relative_eq!(regularized_incomplete_beta(0.3, 1.0, 1.0), 0.3, epsilon = 1e-10);
    }

    #[test]
    fn t_distribution_tails() {
        assert_relative_eq!(student_t_two_sided(0.0, 8.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(student_t_two_sided(5.0, 8.0), 0.001_052_83, epsilon = 1e-6);
        assert_relative_eq!(student_t_two_sided(-2.0, 10.0), 0.073_388_03, epsilon = 1e-6);
        assert_relative_eq!(student_t_two_sided(1.0, 3.0), 0.391_002_22, epsilon = 1e-6);
    }

    #[test]
    fn t_test_on_separated_samples() {
        let p = student_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_relative_eq!(p, 0.001_052_83, epsilon = 1e-6);
        assert_eq!(student_t_test(&[1.0], &[2.0]), 1.0);
        assert_eq!(student_t_test(&[3.0, 3.0], &[3.0, 3.0]), 1.0);
        assert_eq!(student_t_test(&[3.0, 3.0], &[4.0, 4.0]), 0.0);
    }

    #[test]
    fn kmeans_splits_two_obvious_groups() {
        let values = [10.0, 11.0, 9.0, 10.0, 50.0, 51.0, 49.0];
        let labels = kmeans_1d(&values, 2, 7, 100);
        assert_eq!(labels.len(), values.len());
        assert!(labels[..4].iter().all(|&l| l == labels[0]));
        assert!(labels[4..].iter().all(|&l| l == labels[4]));
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn kmeans_handles_degenerate_input() {
        assert!(kmeans_1d(&[], 2, 0, 10).is_empty());
        let labels = kmeans_1d(&[4.0, 4.0, 4.0], 2, 0, 10);
        assert_eq!(labels, vec![0, 0, 0]);
    }
}
