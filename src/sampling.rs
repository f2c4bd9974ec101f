// Quantile strata over a score column and proportional stratified sampling
// for inspection planning.
use crate::error::ScoringError;
use crate::scoring::ScoreTable;
use crate::util::{quantile_sorted, round_half_even};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumAssignment {
    pub asset_id: String,
    pub score: f64,
    /// Zero-based stratum index, lowest scores first.
    pub stratum: usize,
}

/// Equal-frequency bands over a score distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Strata {
    labels: Vec<String>,
    edges: Vec<f64>,
    assignments: Vec<StratumAssignment>,
}

/// `low`/`medium`/`high` for three strata, `S1..Sk` otherwise.
pub fn stratum_labels(k: usize) -> Vec<String> {
    if k == 3 {
        ["low", "medium", "high"].iter().map(|s| s.to_string()).collect()
    } else {
        (1..=k).map(|i| format!("S{}", i)).collect()
    }
}

/// Split assets into `k` quantile bands.
///
/// Edges are the i/k quantiles of the scores. Bins are right-inclusive and
/// the first bin also holds the minimum. When many scores tie, neighbouring
/// edges coincide and some strata stay empty.
pub fn stratify(scores: &ScoreTable, k: usize) -> Result<Strata, ScoringError> {
    if k == 0 {
        return Err(ScoringError::InvalidStrata { strata: k });
    }
    if scores.is_empty() {
        return Err(ScoringError::EmptyDataset);
    }
    let mut sorted = scores.scores();
    sorted.sort_by(f64::total_cmp);
    let edges: Vec<f64> = (0..=k)
        .filter_map(|i| quantile_sorted(&sorted, i as f64 / k as f64))
        .collect();

    let assignments = scores
        .entries()
        .iter()
        .map(|e| {
            let stratum = edges[1..]
                .iter()
                .position(|edge| e.score <= *edge)
                .unwrap_or(k - 1);
            StratumAssignment {
                asset_id: e.asset_id.clone(),
                score: e.score,
                stratum,
            }
        })
        .collect();

    Ok(Strata {
        labels: stratum_labels(k),
        edges,
        assignments,
    })
}

impl Strata {
    pub fn k(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, stratum: usize) -> &str {
        self.labels.get(stratum).map(String::as_str).unwrap_or("")
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn assignments(&self) -> &[StratumAssignment] {
        &self.assignments
    }

    pub fn stratum_of(&self, asset_id: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| a.asset_id == asset_id)
            .map(|a| a.stratum)
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for a in &self.assignments {
            sizes[a.stratum] += 1;
        }
        sizes
    }

    fn members(&self, stratum: usize) -> Vec<&StratumAssignment> {
        self.assignments
            .iter()
            .filter(|a| a.stratum == stratum)
            .collect()
    }
}

/// Per-stratum draw counts: each stratum's population share of
/// `sample_size`, rounded half to even and capped at the stratum size.
pub fn allocate(sizes: &[usize], sample_size: usize) -> Vec<usize> {
    let total: usize = sizes.iter().sum();
    if total == 0 {
        return vec![0; sizes.len()];
    }
    sizes
        .iter()
        .map(|&size| {
            let share = size as f64 / total as f64;
            let wanted = round_half_even(share * sample_size as f64) as usize;
            wanted.min(size)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub picks: Vec<StratumAssignment>,
    /// Number drawn from each stratum, indexed like `Strata::labels`.
    pub per_stratum: Vec<usize>,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.picks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }
}

/// Draw a proportional stratified sample without replacement.
///
/// A single generator seeded with `seed` is consumed stratum by stratum, so
/// the same strata, size and seed always produce the same sample.
pub fn stratified_sample(strata: &Strata, sample_size: usize, seed: u64) -> Sample {
    let counts = allocate(&strata.sizes(), sample_size);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picks = Vec::new();
    for (stratum, &n) in counts.iter().enumerate() {
        let members = strata.members(stratum);
        picks.extend(
            members
                .choose_multiple(&mut rng, n)
                .map(|a| (*a).clone()),
        );
    }
    Sample {
        picks,
        per_stratum: counts,
    }
}
