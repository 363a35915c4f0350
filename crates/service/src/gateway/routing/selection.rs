use freescan_core::catalog::ModelDescriptor;

use super::health::HealthTracker;

/// One SELECTING pass: the index of the first candidate that is currently
/// available, in candidate order. Availability is re-read on every pass so a
/// model disabled by a concurrent request mid-flight is skipped even if it
/// was healthy when this request started.
pub(super) fn next_available(
    remaining: &[ModelDescriptor],
    health: &HealthTracker,
) -> Option<usize> {
    remaining
        .iter()
        .position(|model| health.is_available(&model.id))
}
