//! Integrated learning: a convex combination of the link predictor's and the sequence
//! classifier's interaction probabilities.

use std::{fmt::Display, str::FromStr};

use log::info;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    config::EnsembleConfig,
    error::{Error, Result},
    metrics::auroc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsembleStrategy {
    /// Equal weights.
    Mean,
    /// The configured `hoagcn_weight`.
    Weighted,
    /// Grid search over the HOAGCN weight, maximizing validation AUROC.
    Tuned,
}

impl FromStr for EnsembleStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "weighted" => Ok(Self::Weighted),
            "tuned" => Ok(Self::Tuned),
            _ => Err(Error::InvalidOption(format!(
                "unknown ensemble strategy `{s}`"
            ))),
        }
    }
}

impl Display for EnsembleStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = match self {
            Self::Mean => "mean",
            Self::Weighted => "weighted",
            Self::Tuned => "tuned",
        };
        write!(f, "{v}")
    }
}

/// Saved as `ensemble.json`; `predict` reuses the weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    pub strategy: EnsembleStrategy,
    /// The HDN gets `1 - hoagcn_weight`.
    pub hoagcn_weight: f32,
    /// AUROC of the combined validation scores at the chosen weight.
    #[serde(deserialize_with = "nan_from_null")]
    pub valid_auroc: f32,
}

/// JSON writes NaN as `null`.
fn nan_from_null<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f32, D::Error> {
    Ok(Option::<f32>::deserialize(d)?.unwrap_or(f32::NAN))
}

impl Ensemble {
    /// Picks the weight per the configured strategy, using validation scores.
    /// `hoagcn` is `None` where the graph model has no score for the pair.
    pub fn fit(
        cfg: &EnsembleConfig,
        hoagcn: &[Option<f32>],
        hdn: &[f32],
        labels: &[f32],
    ) -> Result<Self> {
        if hoagcn.len() != hdn.len() || hdn.len() != labels.len() {
            return Err(Error::Tensor(format!(
                "ensemble inputs are misaligned: {} HOAGCN, {} HDN scores, {} labels",
                hoagcn.len(),
                hdn.len(),
                labels.len()
            )));
        }

        let hoagcn_weight = match cfg.strategy {
            EnsembleStrategy::Mean => 0.5,
            EnsembleStrategy::Weighted => cfg.hoagcn_weight,
            EnsembleStrategy::Tuned => tune_weight(hoagcn, hdn, labels, cfg.grid_step),
        };

        let valid_auroc = auroc(&combine(hoagcn, hdn, hoagcn_weight), labels);
        info!(
            "Ensemble ({}): HOAGCN weight {hoagcn_weight:.2}, validation AUROC {valid_auroc:.4}",
            cfg.strategy
        );

        Ok(Self {
            strategy: cfg.strategy,
            hoagcn_weight,
            valid_auroc,
        })
    }

    pub fn apply(&self, hoagcn: &[Option<f32>], hdn: &[f32]) -> Vec<f32> {
        combine(hoagcn, hdn, self.hoagcn_weight)
    }

    /// Like `apply`, for pairs either model may lack a score for. A pair with one score keeps it.
    pub fn apply_partial(&self, hoagcn: &[Option<f32>], hdn: &[Option<f32>]) -> Vec<Option<f32>> {
        let w = self.hoagcn_weight;
        hoagcn
            .iter()
            .zip(hdn)
            .map(|(&g, &h)| match (g, h) {
                (Some(g), Some(h)) => Some(w * g + (1. - w) * h),
                (g, h) => g.or(h),
            })
            .collect()
    }
}

/// `w * hoagcn + (1 - w) * hdn`; pairs without a HOAGCN score keep the HDN score.
pub fn combine(hoagcn: &[Option<f32>], hdn: &[f32], w: f32) -> Vec<f32> {
    hoagcn
        .iter()
        .zip(hdn)
        .map(|(g, &h)| match g {
            Some(g) => w * g + (1. - w) * h,
            None => h,
        })
        .collect()
}

/// Weight grid `0, step, 2 step, .., 1`. The endpoint is always included.
fn weight_grid(step: f32) -> Vec<f32> {
    // Points within rounding error of 1 would duplicate the endpoint.
    let mut result: Vec<f32> = (0..)
        .map(|i| i as f32 * step)
        .take_while(|w| *w < 1. - step * 1e-3)
        .collect();
    result.push(1.);
    result
}

/// The weight with the highest validation AUROC. Ties keep the smaller weight; if AUROC is
/// undefined (one class only), falls back to 0.5.
pub fn tune_weight(hoagcn: &[Option<f32>], hdn: &[f32], labels: &[f32], grid_step: f32) -> f32 {
    let mut best: Option<(f32, f32)> = None;

    for w in weight_grid(grid_step) {
        let score = auroc(&combine(hoagcn, hdn, w), labels);
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, s)) if score <= s => (),
            _ => best = Some((w, score)),
        }
    }

    best.map(|(w, _)| w).unwrap_or(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_falls_back_to_hdn() {
        let c = combine(&[Some(1.), None], &[0., 0.4], 0.25);
        assert_eq!(c, vec![0.25, 0.4]);
    }

    #[test]
    fn grid_bounds() {
        let g = weight_grid(0.05);
        assert_eq!(g.len(), 21);
        assert_eq!(g[0], 0.);
        assert_eq!(*g.last().unwrap(), 1.);

        let g = weight_grid(0.3);
        assert_eq!(g.len(), 5);
        assert_eq!(*g.last().unwrap(), 1.);
        assert!(g.iter().all(|w| (0. ..=1.).contains(w)));

        assert_eq!(weight_grid(0.7), vec![0., 0.7, 1.]);
        assert_eq!(weight_grid(1.), vec![0., 1.]);
    }

    #[test]
    fn tuned_can_pick_hoagcn_alone_off_grid() {
        let labels = [0., 0., 1., 1.];
        // Only w = 1 ranks perfectly: any HDN share reorders the middle pair.
        let hoagcn = [Some(0.1), Some(0.45), Some(0.55), Some(0.9)];
        let hdn = [0., 1., 0., 1.];
        assert_eq!(tune_weight(&hoagcn, &hdn, &labels, 0.3), 1.);
    }

    #[test]
    fn tuned_prefers_informative_model() {
        let labels = [0., 0., 1., 1.];
        // HOAGCN ranks perfectly; HDN is inverted.
        let hoagcn = [Some(0.1), Some(0.2), Some(0.8), Some(0.9)];
        let hdn = [0.9, 0.8, 0.2, 0.1];

        let cfg = EnsembleConfig::default();
        let e = Ensemble::fit(&cfg, &hoagcn, &hdn, &labels).unwrap();
        assert_eq!(e.strategy, EnsembleStrategy::Tuned);
        assert!(e.hoagcn_weight > 0.5);
        assert!((e.valid_auroc - 1.).abs() < 1e-6);

        // Reversed roles: ties at AUROC 1 resolve to the smallest weight, 0.
        let hoagcn_bad: Vec<Option<f32>> = hdn.iter().map(|&v| Some(v)).collect();
        let hdn_good = [0.1, 0.2, 0.8, 0.9];
        assert_eq!(tune_weight(&hoagcn_bad, &hdn_good, &labels, 0.05), 0.);
    }

    #[test]
    fn fixed_strategies() {
        let labels = [0., 1.];
        let hoagcn = [Some(0.2), Some(0.6)];
        let hdn = [0.4, 0.8];

        let mut cfg = EnsembleConfig {
            strategy: EnsembleStrategy::Mean,
            ..Default::default()
        };
        let e = Ensemble::fit(&cfg, &hoagcn, &hdn, &labels).unwrap();
        assert_eq!(e.hoagcn_weight, 0.5);
        let out = e.apply(&hoagcn, &hdn);
        assert!((out[0] - 0.3).abs() < 1e-6);

        cfg.strategy = EnsembleStrategy::Weighted;
        cfg.hoagcn_weight = 0.8;
        let e = Ensemble::fit(&cfg, &hoagcn, &hdn, &labels).unwrap();
        assert_eq!(e.hoagcn_weight, 0.8);

        assert!(Ensemble::fit(&cfg, &hoagcn, &hdn[..1], &labels).is_err());
    }

    #[test]
    fn partial_scores() {
        let e = Ensemble {
            strategy: EnsembleStrategy::Weighted,
            hoagcn_weight: 0.5,
            valid_auroc: f32::NAN,
        };
        let out = e.apply_partial(
            &[Some(0.2), None, Some(0.6), None],
            &[Some(0.4), Some(0.9), None, None],
        );
        assert!((out[0].unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(&out[1..], &[Some(0.9), Some(0.6), None]);
    }

    #[test]
    fn single_class_validation() {
        let w = tune_weight(&[Some(0.1), Some(0.2)], &[0.3, 0.4], &[1., 1.], 0.1);
        assert_eq!(w, 0.5);
    }
}
