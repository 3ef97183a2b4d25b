//! Vintage and state-transition utilities for calibrating segment PDs.
//!
//! Works on loan-level observations already loaded into memory: vintage x
//! age balance tables, empirical month-on-month transition counts, row
//! normalization, add-alpha smoothing and shrinkage of sparse age-specific
//! matrices toward the pooled matrix. `absorption_probability` turns a
//! transition matrix into a multi-step default probability usable as a
//! through-the-cycle PD.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::CapitalStressError;
use crate::types::{Money, Rate};
use crate::CapitalStressResult;

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// One loan observed at one month-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanObservation {
    pub loan_id: String,
    pub origination_date: NaiveDate,
    pub observation_date: NaiveDate,
    /// Delinquency bucket, e.g. "current", "30dpd", "default"
    pub state: String,
    pub balance: Money,
}

impl LoanObservation {
    pub fn age_months(&self) -> CapitalStressResult<u32> {
        age_in_months(self.origination_date, self.observation_date)
    }
}

/// Whole calendar months from origination to observation; the day of month
/// is ignored.
pub fn age_in_months(origination: NaiveDate, observation: NaiveDate) -> CapitalStressResult<u32> {
    let months = (observation.year() - origination.year()) * 12 + observation.month() as i32
        - origination.month() as i32;
    if months < 0 {
        return Err(CapitalStressError::configuration(
            "observation_date",
            format!("{} precedes origination {}", observation, origination),
        ));
    }
    Ok(months as u32)
}

/// Balance per state for every (vintage, age) cell. Every cell carries all
/// observed states, zero-filled.
pub fn vintage_balances(
    observations: &[LoanObservation],
) -> CapitalStressResult<BTreeMap<(NaiveDate, u32), BTreeMap<String, Money>>> {
    let states: BTreeSet<&str> = observations.iter().map(|o| o.state.as_str()).collect();
    let mut table: BTreeMap<(NaiveDate, u32), BTreeMap<String, Money>> = BTreeMap::new();

    for obs in observations {
        let key = (obs.origination_date, obs.age_months()?);
        let cell = table.entry(key).or_insert_with(|| {
            states
                .iter()
                .map(|s| (s.to_string(), Decimal::ZERO))
                .collect()
        });
        *cell.entry(obs.state.clone()).or_insert(Decimal::ZERO) += obs.balance;
    }
    Ok(table)
}

/// Transition counts from the state at age `a` to the state at age `a + 1`
/// of the same loan, keyed by `a`. Each (loan, age) may appear once.
pub fn empirical_transitions(
    observations: &[LoanObservation],
) -> CapitalStressResult<BTreeMap<u32, TransitionMatrix>> {
    let mut by_loan: BTreeMap<(&str, u32), &str> = BTreeMap::new();
    for obs in observations {
        let age = obs.age_months()?;
        if by_loan
            .insert((obs.loan_id.as_str(), age), obs.state.as_str())
            .is_some()
        {
            return Err(CapitalStressError::configuration(
                "observations",
                format!("loan '{}' observed twice at age {}", obs.loan_id, age),
            ));
        }
    }

    let mut counts: BTreeMap<u32, BTreeMap<(String, String), Decimal>> = BTreeMap::new();
    for (&(loan, age), &from) in &by_loan {
        if let Some(&to) = by_loan.get(&(loan, age + 1)) {
            *counts
                .entry(age)
                .or_default()
                .entry((from.to_string(), to.to_string()))
                .or_insert(Decimal::ZERO) += Decimal::ONE;
        }
    }

    Ok(counts
        .into_iter()
        .map(|(age, cells)| (age, TransitionMatrix::from_cells(cells)))
        .collect())
}

// ---------------------------------------------------------------------------
// Transition matrix
// ---------------------------------------------------------------------------

/// Square matrix over a sorted set of states. Holds counts or probabilities.
///
/// Fields are public for serde; a matrix that did not come from `new`,
/// `zeros` or the builders here should be checked with `validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatrix {
    pub states: Vec<String>,
    /// Row = from state, column = to state
    pub values: Vec<Vec<Decimal>>,
}

impl TransitionMatrix {
    pub fn zeros(states: &BTreeSet<String>) -> Self {
        let n = states.len();
        TransitionMatrix {
            states: states.iter().cloned().collect(),
            values: vec![vec![Decimal::ZERO; n]; n],
        }
    }

    /// Build a matrix, checking that it is square over strictly sorted states.
    pub fn new(states: Vec<String>, values: Vec<Vec<Decimal>>) -> CapitalStressResult<Self> {
        let m = TransitionMatrix { states, values };
        m.validate()?;
        Ok(m)
    }

    pub fn validate(&self) -> CapitalStressResult<()> {
        if let Some(w) = self.states.windows(2).find(|w| w[0] >= w[1]) {
            return Err(CapitalStressError::configuration(
                "transition_matrix.states",
                format!("states must be sorted and unique, '{}' precedes '{}'", w[0], w[1]),
            ));
        }
        let n = self.states.len();
        if self.values.len() != n {
            return Err(CapitalStressError::configuration(
                "transition_matrix.values",
                format!("{} rows for {} states", self.values.len(), n),
            ));
        }
        if let Some((i, row)) = self.values.iter().enumerate().find(|(_, row)| row.len() != n) {
            return Err(CapitalStressError::configuration(
                format!("transition_matrix.values[{}]", i),
                format!("{} columns for {} states", row.len(), n),
            ));
        }
        Ok(())
    }

    fn from_cells(cells: BTreeMap<(String, String), Decimal>) -> Self {
        let states: BTreeSet<String> = cells
            .keys()
            .flat_map(|(from, to)| [from.clone(), to.clone()])
            .collect();
        let mut m = Self::zeros(&states);
        for ((from, to), v) in cells {
            if let (Some(i), Some(j)) = (m.index_of(&from), m.index_of(&to)) {
                m.values[i][j] = v;
            }
        }
        m
    }

    pub fn index_of(&self, state: &str) -> Option<usize> {
        self.states.binary_search_by(|s| s.as_str().cmp(state)).ok()
    }

    pub fn get(&self, from: &str, to: &str) -> Option<Decimal> {
        let row = self.values.get(self.index_of(from)?)?;
        row.get(self.index_of(to)?).copied()
    }

    /// Same values over a superset of states; new rows and columns are zero.
    pub fn reindexed(&self, states: &BTreeSet<String>) -> Self {
        let mut m = Self::zeros(states);
        for (i, from) in self.states.iter().enumerate() {
            for (j, to) in self.states.iter().enumerate() {
                let v = self.values.get(i).and_then(|row| row.get(j));
                if let (Some(a), Some(b), Some(v)) = (m.index_of(from), m.index_of(to), v) {
                    m.values[a][b] = *v;
                }
            }
        }
        m
    }

    /// Rows scaled to sum to one. Rows summing to zero stay zero.
    pub fn row_normalized(&self) -> Self {
        let values = self
            .values
            .iter()
            .map(|row| {
                let total: Decimal = row.iter().copied().sum();
                if total.is_zero() {
                    vec![Decimal::ZERO; row.len()]
                } else {
                    row.iter().map(|v| *v / total).collect()
                }
            })
            .collect();
        TransitionMatrix {
            states: self.states.clone(),
            values,
        }
    }

    /// Add `alpha` to every count, then row-normalize.
    pub fn laplace_smoothed(&self, alpha: Decimal) -> CapitalStressResult<Self> {
        if alpha < Decimal::ZERO {
            return Err(CapitalStressError::configuration(
                "alpha",
                "smoothing constant must be non-negative",
            ));
        }
        let values = self
            .values
            .iter()
            .map(|row| row.iter().map(|v| *v + alpha).collect())
            .collect();
        Ok(TransitionMatrix {
            states: self.states.clone(),
            values,
        }
        .row_normalized())
    }

    /// Clip negatives to zero and row-normalize.
    pub fn ensure_probability(&self) -> Self {
        let values = self
            .values
            .iter()
            .map(|row| row.iter().map(|v| (*v).max(Decimal::ZERO)).collect())
            .collect();
        TransitionMatrix {
            states: self.states.clone(),
            values,
        }
        .row_normalized()
    }

    /// Probability of having reached `absorbing` within `steps` transitions
    /// starting from `from`, treating `absorbing` as a sink.
    pub fn absorption_probability(
        &self,
        from: &str,
        absorbing: &str,
        steps: u32,
    ) -> CapitalStressResult<Rate> {
        self.validate()?;
        let start = self.index_of(from).ok_or_else(|| {
            CapitalStressError::configuration("from", format!("unknown state '{}'", from))
        })?;
        let sink = self.index_of(absorbing).ok_or_else(|| {
            CapitalStressError::configuration("absorbing", format!("unknown state '{}'", absorbing))
        })?;

        let n = self.states.len();
        let mut dist = vec![Decimal::ZERO; n];
        dist[start] = Decimal::ONE;

        for _ in 0..steps {
            let mut next = vec![Decimal::ZERO; n];
            for (i, mass) in dist.iter().enumerate() {
                if mass.is_zero() {
                    continue;
                }
                if i == sink {
                    next[sink] += *mass;
                    continue;
                }
                for (j, p) in self.values[i].iter().enumerate() {
                    next[j] += *mass * *p;
                }
            }
            dist = next;
        }
        Ok(dist[sink])
    }
}

/// Blend each age-specific probability matrix with the matrix pooled across
/// ages: `(1 - w) * P_age + w * P_pool`. Inputs are counts.
pub fn shrink_toward_pool(
    tables: &BTreeMap<u32, TransitionMatrix>,
    pool_weight: Rate,
) -> CapitalStressResult<BTreeMap<u32, TransitionMatrix>> {
    if pool_weight < Decimal::ZERO || pool_weight > Decimal::ONE {
        return Err(CapitalStressError::configuration(
            "pool_weight",
            "must be in [0, 1]",
        ));
    }

    for t in tables.values() {
        t.validate()?;
    }

    let states: BTreeSet<String> = tables
        .values()
        .flat_map(|t| t.states.iter().cloned())
        .collect();
    let mut pooled = TransitionMatrix::zeros(&states);
    let aligned: BTreeMap<u32, TransitionMatrix> = tables
        .iter()
        .map(|(age, t)| (*age, t.reindexed(&states)))
        .collect();
    for t in aligned.values() {
        for (row, other) in pooled.values.iter_mut().zip(t.values.iter()) {
            for (v, o) in row.iter_mut().zip(other.iter()) {
                *v += *o;
            }
        }
    }
    let pooled = pooled.row_normalized();

    let keep = Decimal::ONE - pool_weight;
    Ok(aligned
        .into_iter()
        .map(|(age, t)| {
            let probs = t.row_normalized();
            let values = probs
                .values
                .iter()
                .zip(pooled.values.iter())
                .map(|(row, pool_row)| {
                    row.iter()
                        .zip(pool_row.iter())
                        .map(|(p, q)| keep * *p + pool_weight * *q)
                        .collect()
                })
                .collect();
            (
                age,
                TransitionMatrix {
                    states: probs.states,
                    values,
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(loan: &str, orig: NaiveDate, seen: NaiveDate, state: &str, balance: Money) -> LoanObservation {
        LoanObservation {
            loan_id: loan.into(),
            origination_date: orig,
            observation_date: seen,
            state: state.into(),
            balance,
        }
    }

    fn approx_eq(a: Decimal, b: Decimal, eps: Decimal) -> bool {
        (a - b).abs() < eps
    }

    fn sample() -> Vec<LoanObservation> {
        let v = date(2024, 1, 15);
        vec![
            obs("A", v, date(2024, 1, 31), "current", dec!(100)),
            obs("A", v, date(2024, 2, 29), "current", dec!(98)),
            obs("A", v, date(2024, 3, 31), "30dpd", dec!(97)),
            obs("B", v, date(2024, 1, 31), "current", dec!(200)),
            obs("B", v, date(2024, 2, 29), "30dpd", dec!(199)),
            obs("B", v, date(2024, 3, 31), "default", dec!(199)),
            obs("C", v, date(2024, 1, 31), "current", dec!(50)),
            obs("C", v, date(2024, 2, 29), "current", dec!(49)),
        ]
    }

    #[test]
    fn test_age_in_months_ignores_day() {
        assert_eq!(age_in_months(date(2024, 1, 31), date(2024, 2, 1)).unwrap(), 1);
        assert_eq!(age_in_months(date(2023, 11, 15), date(2024, 2, 10)).unwrap(), 3);
        assert_eq!(age_in_months(date(2024, 5, 1), date(2024, 5, 31)).unwrap(), 0);
        assert!(age_in_months(date(2024, 5, 1), date(2024, 4, 30)).is_err());
    }

    #[test]
    fn test_vintage_balances() {
        let table = vintage_balances(&sample()).unwrap();
        let v = date(2024, 1, 15);
        let age0 = &table[&(v, 0)];
        assert_eq!(age0["current"], dec!(350));
        assert_eq!(age0["default"], Decimal::ZERO);
        let age2 = &table[&(v, 2)];
        assert_eq!(age2["30dpd"], dec!(97));
        assert_eq!(age2["default"], dec!(199));
    }

    #[test]
    fn test_empirical_transitions() {
        let t = empirical_transitions(&sample()).unwrap();
        let age0 = &t[&0];
        assert_eq!(age0.get("current", "current"), Some(dec!(2)));
        assert_eq!(age0.get("current", "30dpd"), Some(dec!(1)));
        let age1 = &t[&1];
        assert_eq!(age1.get("current", "30dpd"), Some(dec!(1)));
        assert_eq!(age1.get("30dpd", "default"), Some(dec!(1)));
        assert!(!t.contains_key(&2));
    }

    #[test]
    fn test_duplicate_observation_rejected() {
        let mut data = sample();
        data.push(data[0].clone());
        assert!(empirical_transitions(&data).is_err());
    }

    #[test]
    fn test_row_normalize_zero_row_stays_zero() {
        let t = empirical_transitions(&sample()).unwrap();
        let p = t[&0].row_normalized();
        let i = p.index_of("current").unwrap();
        let total: Decimal = p.values[i].iter().copied().sum();
        assert!(approx_eq(total, Decimal::ONE, dec!(0.0000001)));
        let j = p.index_of("30dpd").unwrap();
        assert!(p.values[j].iter().all(|v| v.is_zero()));
    }

    #[test]
    fn test_laplace_smoothing_fills_every_cell() {
        let t = empirical_transitions(&sample()).unwrap();
        let p = t[&0].laplace_smoothed(Decimal::ONE).unwrap();
        assert!(p.values.iter().flatten().all(|v| *v > Decimal::ZERO));
        // current row: counts [1, 2] + 1 over states [30dpd, current]
        assert_eq!(p.get("current", "30dpd"), Some(dec!(2) / dec!(5)));
        assert!(t[&0].laplace_smoothed(dec!(-1)).is_err());
    }

    #[test]
    fn test_ensure_probability_clips_negatives() {
        let m = TransitionMatrix {
            states: vec!["a".into(), "b".into()],
            values: vec![vec![dec!(-0.2), dec!(0.5)], vec![dec!(0.3), dec!(0.1)]],
        };
        let p = m.ensure_probability();
        assert_eq!(p.get("a", "a"), Some(Decimal::ZERO));
        assert_eq!(p.get("a", "b"), Some(Decimal::ONE));
        assert_eq!(p.get("b", "a"), Some(dec!(0.75)));
    }

    #[test]
    fn test_absorption_probability() {
        let m = TransitionMatrix {
            states: vec!["current".into(), "default".into()],
            values: vec![
                vec![dec!(0.99), dec!(0.01)],
                vec![Decimal::ZERO, Decimal::ONE],
            ],
        };
        let one = m.absorption_probability("current", "default", 1).unwrap();
        assert_eq!(one, dec!(0.01));
        // 1 - 0.99^4
        let four = m.absorption_probability("current", "default", 4).unwrap();
        assert!(approx_eq(four, dec!(0.03940399), dec!(0.00000001)));
        assert!(m.absorption_probability("current", "cured", 4).is_err());
    }

    #[test]
    fn test_absorbing_state_is_a_sink() {
        // Default row says it cures, but it must be treated as absorbing.
        let m = TransitionMatrix {
            states: vec!["current".into(), "default".into()],
            values: vec![vec![dec!(0.9), dec!(0.1)], vec![dec!(0.5), dec!(0.5)]],
        };
        let p = m.absorption_probability("current", "default", 2).unwrap();
        // 0.1 + 0.9 * 0.1
        assert_eq!(p, dec!(0.19));
    }

    #[test]
    fn test_new_rejects_malformed_shapes() {
        let states = || vec!["current".to_string(), "default".to_string()];
        assert!(TransitionMatrix::new(states(), vec![vec![dec!(1), dec!(0)], vec![dec!(0), dec!(1)]]).is_ok());
        // Ragged row
        assert!(TransitionMatrix::new(states(), vec![vec![dec!(1), dec!(0)], vec![dec!(1)]]).is_err());
        // Missing row
        assert!(TransitionMatrix::new(states(), vec![vec![dec!(1), dec!(0)]]).is_err());
        // Unsorted states break lookup
        let unsorted = vec!["default".to_string(), "current".to_string()];
        assert!(TransitionMatrix::new(unsorted, vec![vec![dec!(1), dec!(0)], vec![dec!(0), dec!(1)]]).is_err());
    }

    #[test]
    fn test_deserialized_ragged_matrix_is_rejected_not_indexed() {
        let m: TransitionMatrix = serde_json::from_value(serde_json::json!({
            "states": ["current", "default"],
            "values": [["0.99", "0.01"]]
        }))
        .unwrap();
        assert_eq!(m.get("default", "default"), None);
        assert_eq!(m.get("current", "default"), Some(dec!(0.01)));

        let err = m.absorption_probability("current", "default", 3).unwrap_err();
        assert!(err.is_configuration());

        let mut tables = BTreeMap::new();
        tables.insert(0, m);
        assert!(shrink_toward_pool(&tables, dec!(0.5)).unwrap_err().is_configuration());
    }

    #[test]
    fn test_shrink_toward_pool() {
        let t = empirical_transitions(&sample()).unwrap();
        let none = shrink_toward_pool(&t, Decimal::ZERO).unwrap();
        let full = shrink_toward_pool(&t, Decimal::ONE).unwrap();
        let half = shrink_toward_pool(&t, dec!(0.5)).unwrap();

        // With no shrinkage age 0 keeps its own row.
        assert_eq!(none[&0].get("current", "default"), Some(Decimal::ZERO));
        // Full shrinkage makes every age identical.
        assert_eq!(full[&0], full[&1]);
        // Half is the midpoint.
        let a = none[&1].get("current", "30dpd").unwrap();
        let b = full[&1].get("current", "30dpd").unwrap();
        let h = half[&1].get("current", "30dpd").unwrap();
        assert!(approx_eq(h, (a + b) / dec!(2), dec!(0.0000001)));

        assert!(shrink_toward_pool(&t, dec!(1.5)).is_err());
    }
}
