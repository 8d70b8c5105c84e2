//! Synthetic trial telemetry
//!
//! Dashboards are usually built before the rig produces real data; this
//! generator feeds them a plausible stream of trial records. One record is
//! produced every one to three seconds until the consumer goes away.

use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Outcome of a synthetic trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialResult {
    Correct,
    Incorrect,
    Timeout,
}

const RESULTS: [TrialResult; 3] = [
    TrialResult::Correct,
    TrialResult::Incorrect,
    TrialResult::Timeout,
];

/// A synthetic trial record
#[derive(Debug, Clone, Serialize)]
pub struct TrialRecord {
    pub trial_id: u64,
    /// Trial start, epoch seconds
    pub trial_start_time: i64,
    /// Trial end, epoch seconds
    pub trial_stop_time: i64,
    pub trial_result: TrialResult,
}

/// Infinite stream of synthetic trial records
///
/// The generator is seeded once per stream. Each record takes one to
/// three seconds of simulated trial time to produce; dropping the stream
/// stops the generator.
pub fn trial_stream() -> impl Stream<Item = TrialRecord> {
    let rng = StdRng::from_entropy();

    futures::stream::unfold((rng, 1u64), |(mut rng, trial_id)| async move {
        let trial_start_time = Utc::now().timestamp();
        let trial_secs = rng.gen_range(1..=3);
        tokio::time::sleep(Duration::from_secs(trial_secs)).await;

        let record = TrialRecord {
            trial_id,
            trial_start_time,
            trial_stop_time: Utc::now().timestamp(),
            trial_result: RESULTS[rng.gen_range(0..RESULTS.len())],
        };

        Some((record, (rng, trial_id + 1)))
    })
}
