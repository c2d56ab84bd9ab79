use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{MetricThresholds, RunStatistics, TrendingThresholds};

/// Performance-change classification for one metric of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendClass {
    Improvement,
    NoChange,
    MinorRegression,
    MajorRegression,
}

/// Per-transaction trending annotation, for both TRT metrics.
/// Classifications are absent when the evaluation had no benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionTrend {
    pub name: String,
    pub script: String,
    pub avg: f64,
    pub percentile: f64,
    pub avg_delta_pct: f64,
    pub pctl_delta_pct: f64,
    pub avg_class: Option<TrendClass>,
    pub pctl_class: Option<TrendClass>,
}

/// Run-level trending over the mean of the per-transaction metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTrend {
    pub avg_delta_pct: f64,
    pub pctl_delta_pct: f64,
    pub avg_class: TrendClass,
    pub pctl_class: TrendClass,
}

/// The annotated outcome of one trending evaluation. With no benchmark
/// it carries only the current run's figures — the first run establishes
/// the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingResult {
    pub current: RunStatistics,
    pub benchmark: Option<RunStatistics>,
    pub benchmark_run_id: Option<u32>,
    pub transactions: Vec<TransactionTrend>,
    pub aggregate: Option<AggregateTrend>,
}

/// Percent change of `current` relative to `benchmark`.
///
/// A zero benchmark cannot be meaningfully regressed from; that case
/// (and any other non-finite result) collapses to 0, which classifies
/// as `NoChange`.
pub fn delta_pct(current: f64, benchmark: f64) -> f64 {
    let delta = (current - benchmark) / benchmark * 100.0;
    if delta.is_finite() {
        delta
    } else {
        0.0
    }
}

/// Classify a percent delta against one metric's thresholds.
/// Boundaries are closed on the regression side, open on the
/// no-change side.
pub fn classify(delta: f64, thresholds: &MetricThresholds) -> TrendClass {
    if delta <= -(thresholds.improvement as f64) {
        TrendClass::Improvement
    } else if delta < thresholds.minor_regression as f64 {
        TrendClass::NoChange
    } else if delta < thresholds.major_regression as f64 {
        TrendClass::MinorRegression
    } else {
        TrendClass::MajorRegression
    }
}

/// Compare a completed run against an optional benchmark run.
///
/// Benchmark transactions are matched by `(script, name)`; a current
/// transaction with no counterpart in the benchmark is compared against
/// itself. Threshold validation happened when `thresholds` was built,
/// never here.
pub fn evaluate(
    current: RunStatistics,
    benchmark: Option<RunStatistics>,
    thresholds: &TrendingThresholds,
) -> TrendingResult {
    let benchmark_tx: HashMap<(&str, &str), &crate::model::TransactionStats> = benchmark
        .as_ref()
        .map(|b| {
            b.transactions
                .iter()
                .map(|tx| ((tx.script.as_str(), tx.name.as_str()), tx))
                .collect()
        })
        .unwrap_or_default();

    let transactions = current
        .transactions
        .iter()
        .map(|tx| {
            if benchmark.is_none() {
                return TransactionTrend {
                    name: tx.name.clone(),
                    script: tx.script.clone(),
                    avg: tx.avg,
                    percentile: tx.percentile_value,
                    avg_delta_pct: 0.0,
                    pctl_delta_pct: 0.0,
                    avg_class: None,
                    pctl_class: None,
                };
            }
            // Fall back to the transaction itself when the benchmark run
            // never measured it — delta 0, no change.
            let bench = benchmark_tx
                .get(&(tx.script.as_str(), tx.name.as_str()))
                .copied()
                .unwrap_or(tx);
            let avg_delta = delta_pct(tx.avg, bench.avg);
            let pctl_delta = delta_pct(tx.percentile_value, bench.percentile_value);
            TransactionTrend {
                name: tx.name.clone(),
                script: tx.script.clone(),
                avg: tx.avg,
                percentile: tx.percentile_value,
                avg_delta_pct: avg_delta,
                pctl_delta_pct: pctl_delta,
                avg_class: Some(classify(avg_delta, &thresholds.avg)),
                pctl_class: Some(classify(pctl_delta, &thresholds.percentile)),
            }
        })
        .collect();

    let aggregate = benchmark.as_ref().map(|bench| {
        let avg_delta = delta_pct(
            mean(current.transactions.iter().map(|tx| tx.avg)),
            mean(bench.transactions.iter().map(|tx| tx.avg)),
        );
        let pctl_delta = delta_pct(
            mean(current.transactions.iter().map(|tx| tx.percentile_value)),
            mean(bench.transactions.iter().map(|tx| tx.percentile_value)),
        );
        AggregateTrend {
            avg_delta_pct: avg_delta,
            pctl_delta_pct: pctl_delta,
            avg_class: classify(avg_delta, &thresholds.avg),
            pctl_class: classify(pctl_delta, &thresholds.percentile),
        }
    });

    TrendingResult {
        benchmark_run_id: benchmark.as_ref().map(|b| b.run_id),
        current,
        benchmark,
        transactions,
        aggregate,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
