//! Descriptive statistics and distribution helpers.
//!
//! Distribution functions delegate to `statrs`; the wrappers return `None`
//! instead of an error when the distribution cannot be constructed
//! (e.g. zero degrees of freedom).

use std::cmp::Ordering;

use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::erf::{erf_inv, erfc};

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_sd(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (n as f64 - 1.0)).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Ranks starting at 1, ties receive the average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[i].partial_cmp(&values[j]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j share the average of ranks i+1..=j+1.
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation; `None` if either series has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    let r = sxy / (sxx * syy).sqrt();
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Kendall's tau-b (tie-corrected).
pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> Option<f64> {
    let pairs = kendall_pairs(x, y)?;
    let denom = ((pairs.concordant + pairs.discordant + pairs.ties_x)
        * (pairs.concordant + pairs.discordant + pairs.ties_y))
        .sqrt();
    if denom <= 0.0 {
        return None;
    }
    Some(pairs.score() / denom)
}

/// Normal score `S / √var(S)` of Kendall's statistic with the tie-corrected variance.
///
/// `None` with fewer than three observations or when every value ties in `x` or in `y`.
pub fn kendall_z(x: &[f64], y: &[f64]) -> Option<f64> {
    let pairs = kendall_pairs(x, y)?;
    let n = x.len() as f64;
    if n < 3.0 {
        return None;
    }
    let tx = tie_groups(x);
    let ty = tie_groups(y);
    fn v0(t: f64) -> f64 {
        t * (t - 1.0) * (2.0 * t + 5.0)
    }
    fn v1(t: f64) -> f64 {
        t * (t - 1.0)
    }
    fn v2(t: f64) -> f64 {
        t * (t - 1.0) * (t - 2.0)
    }
    fn sum(groups: &[f64], f: fn(f64) -> f64) -> f64 {
        groups.iter().map(|&t| f(t)).sum()
    }

    let var = (v0(n) - sum(&tx, v0) - sum(&ty, v0)) / 18.0
        + sum(&tx, v2) * sum(&ty, v2) / (9.0 * v2(n))
        + sum(&tx, v1) * sum(&ty, v1) / (2.0 * v1(n));
    if !(var > 0.0) {
        return None;
    }
    Some(pairs.score() / var.sqrt())
}

struct KendallPairs {
    concordant: f64,
    discordant: f64,
    ties_x: f64,
    ties_y: f64,
}

impl KendallPairs {
    fn score(&self) -> f64 {
        self.concordant - self.discordant
    }
}

fn kendall_pairs(x: &[f64], y: &[f64]) -> Option<KendallPairs> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let mut pairs = KendallPairs {
        concordant: 0.0_f64,
        discordant: 0.0_f64,
        ties_x: 0.0_f64,
        ties_y: 0.0_f64,
    };
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                pairs.ties_x += 1.0;
            } else if dy == 0.0 {
                pairs.ties_y += 1.0;
            } else if dx * dy > 0.0 {
                pairs.concordant += 1.0;
            } else {
                pairs.discordant += 1.0;
            }
        }
    }
    Some(pairs)
}

/// Sizes of the groups of equal values with more than one member.
fn tie_groups(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut groups = Vec::new();
    let mut run = 1usize;
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            run += 1;
        } else {
            if run > 1 {
                groups.push(run as f64);
            }
            run = 1;
        }
    }
    if run > 1 {
        groups.push(run as f64);
    }
    groups
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Standard normal quantile for `p` in (0, 1).
pub fn normal_quantile(p: f64) -> f64 {
    std::f64::consts::SQRT_2 * erf_inv(2.0 * p - 1.0)
}

/// Two-sided normal quantile for a confidence level, e.g. 1.96 for 0.95.
pub fn normal_two_sided_quantile(level: f64) -> f64 {
    normal_quantile(1.0 - (1.0 - level) / 2.0)
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn student_t_two_sided_p(t: f64, df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let p = 2.0 * (1.0 - dist.cdf(t.abs()));
    p.is_finite().then_some(p.clamp(0.0, 1.0))
}

/// Two-sided Student-t quantile for a confidence level.
pub fn student_t_two_sided_quantile(level: f64, df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    let q = dist.inverse_cdf(1.0 - (1.0 - level) / 2.0);
    q.is_finite().then_some(q)
}
