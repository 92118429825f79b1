//! Train / validation / test splits. Cold splits keep every drug (or target) inside a single
//! part, which measures generalization to unseen entities.

use std::{collections::HashMap, fmt::Display, str::FromStr};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    data::{DtiRecord, unique_in_order},
    error::{Error, Result},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    Random,
    ColdDrug,
    ColdProtein,
}

impl FromStr for SplitMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "cold_drug" => Ok(Self::ColdDrug),
            "cold_protein" => Ok(Self::ColdProtein),
            _ => Err(Error::InvalidOption(format!("unknown split method `{s}`"))),
        }
    }
}

impl Display for SplitMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = match self {
            Self::Random => "random",
            Self::ColdDrug => "cold_drug",
            Self::ColdProtein => "cold_protein",
        };
        write!(f, "{v}")
    }
}

#[derive(Clone, Debug, Default)]
pub struct Split {
    pub train: Vec<DtiRecord>,
    pub valid: Vec<DtiRecord>,
    pub test: Vec<DtiRecord>,
}

/// `frac` is (train, validation, test); it's validated by the run config.
pub fn split(records: &[DtiRecord], method: SplitMethod, frac: [f32; 3], seed: u64) -> Result<Split> {
    if records.is_empty() {
        return Err(Error::Dataset("cannot split an empty dataset".to_owned()));
    }

    let mut rng = StdRng::seed_from_u64(seed);

    match method {
        SplitMethod::Random => {
            let mut shuffled = records.to_vec();
            shuffled.shuffle(&mut rng);

            let n = shuffled.len();
            let n_test = (frac[2] * n as f32).round() as usize;
            let n_valid = ((frac[1] * n as f32).round() as usize).min(n - n_test);

            let train = shuffled.split_off(n_test + n_valid);
            let valid = shuffled.split_off(n_test);

            Ok(Split {
                train,
                valid,
                test: shuffled,
            })
        }
        SplitMethod::ColdDrug => Ok(cold_split(records, |r| &r.drug, frac, &mut rng)),
        SplitMethod::ColdProtein => Ok(cold_split(records, |r| &r.target, frac, &mut rng)),
    }
}

/// Assigns whole entities, in shuffled order, to test and then validation until each part's
/// share of records reaches its fraction. The remaining entities form the training set.
fn cold_split(
    records: &[DtiRecord],
    key: impl Fn(&DtiRecord) -> &String,
    frac: [f32; 3],
    rng: &mut StdRng,
) -> Split {
    let mut entities = unique_in_order(records.iter().map(|r| key(r).as_str()));
    entities.shuffle(rng);

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records {
        *counts.entry(key(r).as_str()).or_default() += 1;
    }

    let n = records.len() as f32;
    let target_test = frac[2] * n;
    let target_valid = frac[1] * n;

    // 0: train, 1: valid, 2: test
    let mut part_of: HashMap<&str, u8> = HashMap::new();
    let (mut n_test, mut n_valid) = (0usize, 0usize);

    for ent in &entities {
        let c = counts[ent.as_str()];
        let part = if (n_test as f32) < target_test {
            n_test += c;
            2
        } else if (n_valid as f32) < target_valid {
            n_valid += c;
            1
        } else {
            0
        };
        part_of.insert(ent.as_str(), part);
    }

    let mut result = Split::default();
    for r in records {
        match part_of[key(r).as_str()] {
            2 => result.test.push(r.clone()),
            1 => result.valid.push(r.clone()),
            _ => result.train.push(r.clone()),
        }
    }

    result
}
