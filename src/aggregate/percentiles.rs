use hdrhistogram::Histogram;

use crate::model::LatencyPercentiles;

/// HdrHistogram range: 1 ms → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000;
const HIST_SIGFIG: u8 = 3;

/// Percentile breakdown over a set of response times (ms).
/// Returns zeroed values when there is nothing to measure.
pub fn from_response_times(times: impl IntoIterator<Item = u64>) -> LatencyPercentiles {
    let Ok(mut hist) = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG) else {
        return LatencyPercentiles::default();
    };

    // Clamp to ≥ 1 ms; anything beyond the top bucket saturates
    for ms in times {
        hist.saturating_record(ms.max(HIST_LOW));
    }

    if hist.len() == 0 {
        return LatencyPercentiles::default();
    }

    LatencyPercentiles {
        p50: hist.value_at_percentile(50.0),
        p95: hist.value_at_percentile(95.0),
        p99: hist.value_at_percentile(99.0),
    }
}
