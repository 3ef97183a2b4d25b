//! Nine-quarter stress run orchestration.
//!
//! Quarters run strictly in sequence. Within a quarter every segment is
//! projected independently (satellite, Vasicek, loss parameters, roll) and
//! the capital waterfall is the barrier that closes the quarter. A quarter is
//! only recorded once every segment snapshot and the capital state exist, so
//! partial results never contain a half-finished quarter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capital::{CapitalState, CapitalWaterfall};
use crate::config::{SegmentModelConfig, StressConfig};
use crate::error::CapitalStressError;
use crate::loss::LossParameterEstimator;
use crate::portfolio::{PortfolioSnapshot, Segment};
use crate::results::StressResults;
use crate::roller::{PortfolioRoller, QuarterState, RollInputs, SegmentPath};
use crate::satellite::SatelliteModel;
use crate::scenario::{MacroQuarter, ScenarioPath};
use crate::types::{ComputationMetadata, Money, Quarter, HORIZON_QUARTERS};
use crate::vasicek::VasicekTransform;
use crate::CapitalStressResult;

const METHODOLOGY: &str = "Satellite-driven systematic index, Vasicek single-factor \
conditional PD, quarterly balance roll-forward and CET1 capital waterfall";

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Terminal state of a run. A run moves Initialized -> Running(q) and ends
/// in exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Completed,
    Failed {
        error: CapitalStressError,
        last_completed_quarter: Quarter,
    },
    Aborted {
        last_completed_quarter: Quarter,
    },
}

/// Output envelope of a stress run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressRun {
    pub state: RunState,
    /// Complete on success, partial on failure or abort
    pub results: StressResults,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

impl StressRun {
    pub fn is_completed(&self) -> bool {
        matches!(self.state, RunState::Completed)
    }

    pub fn error(&self) -> Option<&CapitalStressError> {
        match &self.state {
            RunState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn last_completed_quarter(&self) -> Quarter {
        self.results.completed_quarters()
    }

    /// Results of a completed run, or the error that stopped it.
    pub fn into_results(self) -> CapitalStressResult<StressResults> {
        match self.state {
            RunState::Completed => Ok(self.results),
            RunState::Failed { error, .. } => Err(error),
            RunState::Aborted {
                last_completed_quarter,
            } => Err(CapitalStressError::configuration(
                "cancellation",
                format!("run aborted after quarter {}", last_completed_quarter),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellation and observation
// ---------------------------------------------------------------------------

/// Shared flag checked between quarters. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receives every quarter once it is complete.
pub trait RunObserver: Send + Sync {
    fn on_quarter_completed(&self, segments: &[QuarterState], capital: &CapitalState);
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct StressRunner {
    cancellation: CancellationToken,
    observer: Option<Arc<dyn RunObserver>>,
}

impl std::fmt::Debug for StressRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StressRunner")
            .field("cancellation", &self.cancellation)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl StressRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Project `portfolio` through `scenario` for the full horizon.
    ///
    /// Never panics on bad input: validation and computation failures end the
    /// run in `RunState::Failed` with whatever quarters completed before it.
    pub fn run(
        &self,
        scenario: &ScenarioPath,
        portfolio: &PortfolioSnapshot,
        config: &StressConfig,
    ) -> StressRun {
        let start = Instant::now();
        info!(
            scenario = %scenario.name,
            segments = portfolio.segments.len(),
            "stress run initialized"
        );

        let mut warnings = Vec::new();
        let mut paths: Vec<SegmentPath> = portfolio.segments.iter().map(SegmentPath::new).collect();
        let mut capital_path: Vec<CapitalState> = Vec::new();

        let state = match validate_inputs(scenario, portfolio, config) {
            Ok(w) => {
                warnings.extend(w);
                self.project(scenario, portfolio, config, &mut paths, &mut capital_path)
            }
            Err(error) => {
                warn!(%error, "stress run rejected before quarter 1");
                RunState::Failed {
                    error,
                    last_completed_quarter: 0,
                }
            }
        };

        let results = StressResults::build(
            &scenario.name,
            portfolio.jump_off_date,
            paths,
            capital_path,
            config.minimum_cet1_ratio,
        );

        match &state {
            RunState::Completed => {
                if let Some(trough) = &results.trough {
                    info!(
                        scenario = %scenario.name,
                        trough_ratio = %trough.cet1_ratio,
                        trough_quarter = trough.quarter,
                        "stress run completed"
                    );
                }
            }
            RunState::Failed {
                last_completed_quarter,
                ..
            } => warnings.push(format!(
                "Run failed; results cover quarters 1..={} only",
                last_completed_quarter
            )),
            RunState::Aborted {
                last_completed_quarter,
            } => warnings.push(format!(
                "Run aborted; results cover quarters 1..={} only",
                last_completed_quarter
            )),
        }
        for q in &results.breach_quarters {
            warnings.push(format!(
                "CET1 ratio below minimum {} in quarter {}",
                config.minimum_cet1_ratio, q
            ));
        }

        let assumptions = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
        let elapsed = start.elapsed().as_micros() as u64;

        StressRun {
            state,
            results,
            methodology: METHODOLOGY.to_string(),
            assumptions,
            warnings,
            metadata: ComputationMetadata::new(elapsed),
        }
    }

    fn project(
        &self,
        scenario: &ScenarioPath,
        portfolio: &PortfolioSnapshot,
        config: &StressConfig,
        paths: &mut [SegmentPath],
        capital_path: &mut Vec<CapitalState>,
    ) -> RunState {
        let mut cet1 = config.starting_cet1;

        for quarter in 1..=HORIZON_QUARTERS {
            let last_completed_quarter = quarter - 1;
            if self.cancellation.is_cancelled() {
                warn!(last_completed_quarter, "stress run aborted");
                return RunState::Aborted {
                    last_completed_quarter,
                };
            }
            debug!(quarter, "running quarter");

            let outcome = scenario.quarter(quarter).and_then(|macro_quarter| {
                let states = project_segments(portfolio, config, macro_quarter, paths)?;
                let capital = CapitalWaterfall.apply(cet1, quarter, &states, config)?;
                Ok((states, capital))
            });

            let (states, capital) = match outcome {
                Ok(done) => done,
                Err(error) => {
                    warn!(quarter, %error, "stress run failed");
                    return RunState::Failed {
                        error,
                        last_completed_quarter,
                    };
                }
            };

            if let Err(error) = commit_quarter(paths, &states) {
                warn!(quarter, %error, "stress run failed");
                return RunState::Failed {
                    error,
                    last_completed_quarter,
                };
            }

            debug!(
                quarter,
                provisions = %capital.provisions,
                cet1_ratio = %capital.cet1_ratio,
                "quarter completed"
            );
            if let Some(observer) = &self.observer {
                observer.on_quarter_completed(&states, &capital);
            }
            cet1 = capital.cet1_capital;
            capital_path.push(capital);
        }

        RunState::Completed
    }
}

fn validate_inputs(
    scenario: &ScenarioPath,
    portfolio: &PortfolioSnapshot,
    config: &StressConfig,
) -> CapitalStressResult<Vec<String>> {
    scenario.validate()?;
    portfolio.validate()?;
    config.validate(portfolio)
}

/// One quarter for every segment, in portfolio order. The first failure in
/// portfolio order is reported regardless of evaluation order.
/// Append one quarter to every segment path, or to none of them.
fn commit_quarter(paths: &mut [SegmentPath], states: &[QuarterState]) -> CapitalStressResult<()> {
    for (path, state) in paths.iter().zip(states) {
        path.check_next(state)?;
    }
    for (path, state) in paths.iter_mut().zip(states) {
        path.push(state.clone())?;
    }
    Ok(())
}

fn project_segments(
    portfolio: &PortfolioSnapshot,
    config: &StressConfig,
    macro_quarter: &MacroQuarter,
    paths: &[SegmentPath],
) -> CapitalStressResult<Vec<QuarterState>> {
    let work: Vec<(&Segment, Money)> = portfolio
        .segments
        .iter()
        .zip(paths.iter())
        .map(|(segment, path)| (segment, path.current_balance()))
        .collect();

    let project = |(segment, beginning): &(&Segment, Money)| -> CapitalStressResult<QuarterState> {
        let model = config.segment_model(&segment.id)?;
        project_segment(segment, model, &config.vasicek, macro_quarter, *beginning)
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<CapitalStressResult<QuarterState>> = {
        use rayon::prelude::*;
        work.par_iter().map(project).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<CapitalStressResult<QuarterState>> = work.iter().map(project).collect();

    outcomes.into_iter().collect()
}

fn project_segment(
    segment: &Segment,
    model: &SegmentModelConfig,
    vasicek: &VasicekTransform,
    macro_quarter: &MacroQuarter,
    beginning_balance: Money,
) -> CapitalStressResult<QuarterState> {
    let systematic_index = model
        .satellite
        .evaluate(macro_quarter)
        .map_err(|e| e.located(macro_quarter.quarter, &segment.id))?;
    let conditional_pd = vasicek
        .conditional_pd(segment.pd_ttc, segment.asset_correlation, systematic_index)
        .map_err(|e| e.located(macro_quarter.quarter, &segment.id))?;
    let loss = LossParameterEstimator.estimate(
        segment,
        &model.lgd_model,
        &model.ead_model,
        macro_quarter,
        beginning_balance,
    )?;
    PortfolioRoller.roll(
        segment,
        beginning_balance,
        &RollInputs {
            quarter: macro_quarter.quarter,
            systematic_index,
            conditional_pd,
            loss,
        },
    )
}
