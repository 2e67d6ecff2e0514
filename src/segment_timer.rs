//! Segment and cumulative duration bookkeeping for checkpoint crossings.

use crate::config::CheckpointConfig;

/// Duration outcome for one newly recorded crossing.
#[derive(Debug, Clone, Copy)]
pub struct SegmentDuration {
    pub segment_duration_sec: Option<i64>,
    pub cumulative_duration_sec: Option<i64>,
}

/// Computes a crossing's segment and cumulative duration.
///
/// `previous_crossing` is `(pass_time_sec, cumulative_duration_sec)` of the
/// last-recorded crossing for this participant, if any. `event_start_sec` is
/// used only when there is no previous crossing.
pub fn compute(
    pass_time_sec: i64,
    previous_crossing: Option<(i64, Option<i64>)>,
    event_start_sec: i64,
    config: &CheckpointConfig,
) -> SegmentDuration {
    let baseline = previous_crossing.map(|(t, _)| t).unwrap_or(event_start_sec);
    let raw_segment = pass_time_sec - baseline;

    let plausible = raw_segment >= 0 && raw_segment <= config.max_plausible_duration_secs;
    let segment_duration_sec = if plausible { Some(raw_segment) } else { None };

    let cumulative_duration_sec = match (segment_duration_sec, previous_crossing) {
        (Some(seg), Some((_, Some(prev_cumulative)))) => Some(prev_cumulative + seg),
        (Some(seg), None) => Some(seg),
        (Some(seg), Some((_, None))) => Some(seg),
        (None, _) => None,
    };

    SegmentDuration { segment_duration_sec, cumulative_duration_sec }
}
