//! Heuristic phase inference from streamed text.
//!
//! Research agents announce their progress with headings such as `**Planning Phase**`.  The
//! inferencer maps such markers to a [`Progress`] triple.  It is a UX signal only: a missed
//! marker leaves the previous progress in place and never affects the stream.

use crate::types::{Phase, Progress};

/// Recognized markers, lowercase, in precedence order.  The first marker found in a fragment
/// wins.
const PHASE_MARKERS: &[(&str, Phase)] = &[
    ("planning phase", Phase::Planning),
    ("search phase", Phase::Searching),
    ("analysis phase", Phase::Analyzing),
    ("evaluation phase", Phase::Analyzing),
    ("synthesis phase", Phase::Synthesizing),
];

/// Infer progress from a fragment of text.
///
/// Matching is a case-insensitive substring search.  Returns `None` when no marker is present,
/// in which case callers keep whatever progress they already had.
pub fn infer_phase(text: &str) -> Option<Progress> {
    let lowered = text.to_lowercase();
    PHASE_MARKERS
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map(|(_, phase)| Progress::for_phase(*phase))
}
