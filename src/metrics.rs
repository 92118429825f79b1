//! Evaluation metrics for binary interaction scores and for affinity regression.
//!
//! Undefined values (one class only, fewer than 2 samples, zero variance) are `NaN`.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Scores at or above this count as a predicted interaction.
pub const DECISION_THRESHOLD: f32 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    /// Area under the receiver operating characteristic.
    pub auroc: f32,
    /// Area under the precision-recall curve, as average precision.
    pub auprc: f32,
    pub accuracy: f32,
    pub precision: f32,
    /// Sensitivity.
    pub recall: f32,
    pub specificity: f32,
    pub f1: f32,
    pub log_loss: f32,
    pub n: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean squared error.
    pub mse: f32,
    pub rmse: f32,
    /// Mean Absolute Error
    pub mae: f32,
    /// Coefficient of determination.
    pub r2: f32,
    pub pearson: f32,
    pub spearman: f32,
    /// Concordance index.
    pub ci: f32,
    pub n: usize,
}

/// Metrics of either task, tagged so saved files say which one they hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum Metrics {
    Binary(BinaryMetrics),
    Regression(RegressionMetrics),
}

impl Metrics {
    pub fn compute(scores: &[f32], labels: &[f32], binary: bool) -> Self {
        if binary {
            Self::Binary(BinaryMetrics::compute(scores, labels))
        } else {
            Self::Regression(RegressionMetrics::compute(scores, labels))
        }
    }

    /// The value model selection optimizes, oriented so larger is better: AUROC, or negated MSE.
    pub fn selection_score(&self) -> f32 {
        match self {
            Self::Binary(m) => m.auroc,
            Self::Regression(m) => -m.mse,
        }
    }
}

impl Display for BinaryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AUROC: {:.4} AUPRC: {:.4} Acc: {:.4} Prec: {:.4} Recall: {:.4} Spec: {:.4} F1: {:.4} LogLoss: {:.4} (n={})",
            self.auroc,
            self.auprc,
            self.accuracy,
            self.precision,
            self.recall,
            self.specificity,
            self.f1,
            self.log_loss,
            self.n
        )
    }
}

impl Display for RegressionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MSE: {:.4} RMSE: {:.4} MAE: {:.4} R²: {:.4} Pearson: {:.4} Spearman: {:.4} CI: {:.4} (n={})",
            self.mse, self.rmse, self.mae, self.r2, self.pearson, self.spearman, self.ci, self.n
        )
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary(m) => m.fmt(f),
            Self::Regression(m) => m.fmt(f),
        }
    }
}

impl BinaryMetrics {
    /// `scores` are probabilities; labels above 0.5 are positives.
    pub fn compute(scores: &[f32], labels: &[f32]) -> Self {
        let n = scores.len().min(labels.len());

        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for (&s, &y) in scores.iter().zip(labels) {
            match (s >= DECISION_THRESHOLD, y > 0.5) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if (precision + recall) > 0. {
            2. * precision * recall / (precision + recall)
        } else {
            f32::NAN
        };

        Self {
            auroc: auroc(scores, labels),
            auprc: auprc(scores, labels),
            accuracy: ratio(tp + tn, n),
            precision,
            recall,
            specificity: ratio(tn, tn + fp),
            f1,
            log_loss: log_loss(scores, labels),
            n,
        }
    }
}

impl RegressionMetrics {
    pub fn compute(preds: &[f32], targets: &[f32]) -> Self {
        let n = preds.len().min(targets.len());
        if n == 0 || preds.len() != targets.len() {
            return Self {
                mse: f32::NAN,
                rmse: f32::NAN,
                mae: f32::NAN,
                r2: f32::NAN,
                pearson: f32::NAN,
                spearman: f32::NAN,
                ci: f32::NAN,
                n,
            };
        }

        let mut se = 0.0f64;
        let mut ae = 0.0f64;
        for (&p, &t) in preds.iter().zip(targets) {
            let d = (p - t) as f64;
            se += d * d;
            ae += d.abs();
        }
        let mse = (se / n as f64) as f32;

        let mt = mean(targets);
        let ss_tot: f64 = targets.iter().map(|&t| ((t - mt) as f64).powi(2)).sum();
        let r2 = if ss_tot > 0. {
            (1. - se / ss_tot) as f32
        } else {
            f32::NAN
        };

        Self {
            mse,
            rmse: mse.sqrt(),
            mae: (ae / n as f64) as f32,
            r2,
            pearson: pearson_corr(preds, targets),
            spearman: spearman_corr(preds, targets),
            ci: concordance_index(preds, targets),
            n,
        }
    }
}

fn ratio(num: usize, denom: usize) -> f32 {
    if denom == 0 {
        f32::NAN
    } else {
        num as f32 / denom as f32
    }
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return f32::NAN;
    }
    xs.iter().copied().sum::<f32>() / (xs.len() as f32)
}

pub fn pearson_corr(xs: &[f32], ys: &[f32]) -> f32 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return f32::NAN;
    }

    let mx = mean(xs);
    let my = mean(ys);

    let mut sxx = 0.0f32;
    let mut syy = 0.0f32;
    let mut sxy = 0.0f32;

    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return f32::NAN;
    }
    sxy / denom
}

/// 1-based ranks, ascending; tied values share their average rank.
pub fn ranks_average_ties(xs: &[f32]) -> Vec<f32> {
    let n = xs.len();
    let mut idx: Vec<usize> = (0..n).collect();

    idx.sort_by(|&a, &b| xs[a].total_cmp(&xs[b]));

    let mut ranks = vec![0.0f32; n];
    let mut i = 0usize;

    while i < n {
        let start = i;
        let v = xs[idx[i]];
        i += 1;

        while i < n && xs[idx[i]] == v {
            i += 1;
        }

        let end = i; // exclusive
        let avg_rank = ((start as f32) + 1.0 + end as f32) * 0.5;

        for &j in &idx[start..end] {
            ranks[j] = avg_rank;
        }
    }

    ranks
}

pub fn spearman_corr(xs: &[f32], ys: &[f32]) -> f32 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return f32::NAN;
    }
    let rx = ranks_average_ties(xs);
    let ry = ranks_average_ties(ys);
    pearson_corr(&rx, &ry)
}

/// AUROC via rank-sum (equivalent to Mann–Whitney U).
pub fn auroc(scores: &[f32], labels: &[f32]) -> f32 {
    if scores.len() != labels.len() || scores.len() < 2 {
        return f32::NAN;
    }

    let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
    let n_neg = labels.len() - n_pos;

    // Undefined if only one class present.
    if n_pos == 0 || n_neg == 0 {
        return f32::NAN;
    }

    let ranks = ranks_average_ties(scores);

    let rank_sum_pos: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, y)| **y > 0.5)
        .map(|(r, _)| *r as f64)
        .sum();

    let n_pos_f = n_pos as f64;
    let n_neg_f = n_neg as f64;

    // AUC = (sum_ranks_pos - n_pos*(n_pos+1)/2) / (n_pos*n_neg)
    let u_pos = rank_sum_pos - (n_pos_f * (n_pos_f + 1.0) * 0.5);
    let auc = u_pos / (n_pos_f * n_neg_f);

    if auc.is_finite() {
        auc as f32
    } else {
        f32::NAN
    }
}

/// Average precision: the mean of precision at each positive, walking scores from high to low.
/// Tied scores are taken as one threshold.
pub fn auprc(scores: &[f32], labels: &[f32]) -> f32 {
    if scores.len() != labels.len() || scores.is_empty() {
        return f32::NAN;
    }

    let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
    if n_pos == 0 {
        return f32::NAN;
    }

    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ap = 0.0f64;
    let (mut tp, mut seen) = (0usize, 0usize);
    let mut prev_recall = 0.0f64;

    let mut i = 0;
    while i < idx.len() {
        let v = scores[idx[i]];
        while i < idx.len() && scores[idx[i]] == v {
            if labels[idx[i]] > 0.5 {
                tp += 1;
            }
            seen += 1;
            i += 1;
        }

        let precision = tp as f64 / seen as f64;
        let recall = tp as f64 / n_pos as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }

    ap as f32
}

/// Binary cross-entropy of probabilities, clipped away from 0 and 1.
pub fn log_loss(probs: &[f32], labels: &[f32]) -> f32 {
    if probs.len() != labels.len() || probs.is_empty() {
        return f32::NAN;
    }
    const EPS: f64 = 1e-7;

    let sum: f64 = probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = (p as f64).clamp(EPS, 1. - EPS);
            if y > 0.5 { -p.ln() } else { -(1. - p).ln() }
        })
        .sum();

    (sum / probs.len() as f64) as f32
}

/// Fraction of comparable pairs (different targets) whose predictions are ordered like their
/// targets. Tied predictions count half.
pub fn concordance_index(preds: &[f32], targets: &[f32]) -> f32 {
    if preds.len() != targets.len() || preds.len() < 2 {
        return f32::NAN;
    }

    let mut concordant = 0.0f64;
    let mut comparable = 0usize;

    for i in 0..targets.len() {
        for j in (i + 1)..targets.len() {
            if targets[i] == targets[j] {
                continue;
            }
            comparable += 1;

            let (hi, lo) = if targets[i] > targets[j] { (i, j) } else { (j, i) };
            if preds[hi] > preds[lo] {
                concordant += 1.;
            } else if preds[hi] == preds[lo] {
                concordant += 0.5;
            }
        }
    }

    if comparable == 0 {
        return f32::NAN;
    }
    (concordant / comparable as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn auroc_cases() {
        let labels = [0., 0., 1., 1.];
        assert!(close(auroc(&[0.1, 0.2, 0.8, 0.9], &labels), 1.));
        assert!(close(auroc(&[0.9, 0.8, 0.2, 0.1], &labels), 0.));
        // All tied
        assert!(close(auroc(&[0.5; 4], &labels), 0.5));
        // One pos/neg pair tied, the rest ordered: 3.5 / 4.
        assert!(close(auroc(&[0.1, 0.6, 0.6, 0.9], &labels), 0.875));
        assert!(auroc(&[0.1, 0.2], &[1., 1.]).is_nan());
    }

    #[test]
    fn auprc_cases() {
        assert!(close(auprc(&[0.1, 0.2, 0.8, 0.9], &[0., 0., 1., 1.]), 1.));
        // Ranked: pos, neg, pos. AP = 0.5 * 1 + 0.5 * 2/3.
        assert!(close(auprc(&[0.9, 0.5, 0.1], &[1., 0., 1.]), 0.5 + 1. / 3.));
        assert!(auprc(&[0.9, 0.5], &[0., 0.]).is_nan());
    }

    #[test]
    fn confusion_metrics() {
        let m = BinaryMetrics::compute(&[0.9, 0.6, 0.4, 0.2], &[1., 0., 1., 0.]);
        assert_eq!(m.n, 4);
        assert!(close(m.accuracy, 0.5));
        assert!(close(m.precision, 0.5));
        assert!(close(m.recall, 0.5));
        assert!(close(m.specificity, 0.5));
        assert!(close(m.f1, 0.5));
        assert!(m.log_loss > 0.);

        // Nothing predicted positive: precision is undefined.
        let m = BinaryMetrics::compute(&[0.1, 0.2], &[1., 0.]);
        assert!(m.precision.is_nan());
        assert!(close(m.specificity, 1.));
    }

    #[test]
    fn ranks_with_ties() {
        assert_eq!(ranks_average_ties(&[3., 1., 3., 2.]), vec![3.5, 1., 3.5, 2.]);
    }

    #[test]
    fn regression() {
        let t = [1., 2., 3., 4.];
        let m = RegressionMetrics::compute(&t, &t);
        assert!(close(m.mse, 0.));
        assert!(close(m.r2, 1.));
        assert!(close(m.pearson, 1.));
        assert!(close(m.spearman, 1.));
        assert!(close(m.ci, 1.));

        let m = RegressionMetrics::compute(&[2., 3., 4., 5.], &t);
        assert!(close(m.mse, 1.));
        assert!(close(m.mae, 1.));
        assert!(close(m.rmse, 1.));
        // Monotonic but nonlinear
        assert!(close(spearman_corr(&[1., 4., 9., 16.], &t), 1.));

        assert!(pearson_corr(&[1., 1., 1.], &[1., 2., 3.]).is_nan());
    }

    #[test]
    fn concordance() {
        // Pairs: (0,1) ok, (0,2) ok, (1,2) inverted.
        assert!(close(concordance_index(&[0.1, 0.5, 0.4], &[1., 2., 3.]), 2. / 3.));
        // Tied predictions count half.
        assert!(close(concordance_index(&[0.5, 0.5], &[1., 2.]), 0.5));
        assert!(concordance_index(&[0.5, 0.6], &[1., 1.]).is_nan());
    }

    #[test]
    fn selection_score_orientation() {
        let a = Metrics::compute(&[2., 3.], &[2., 3.], false);
        let b = Metrics::compute(&[0., 0.], &[2., 3.], false);
        assert!(a.selection_score() > b.selection_score());
    }
}
