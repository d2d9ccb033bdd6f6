//! Display scores derived from stage results.
//!
//! A derived percentage is display-only. When it cannot be computed the
//! configured fallback is shown with `available = false`; the fallback is
//! never written back to a checkpoint.

use crate::core::StageOutcome;
use crate::models::{AlignmentScores, ContentPreservation};
use serde::{Deserialize, Serialize};

/// A percentage ready for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayScore {
    /// 0..=100.
    pub percent: u8,
    /// False when `percent` is the fallback rather than a real score.
    pub available: bool,
}

impl DisplayScore {
    /// A real score.
    #[must_use]
    pub fn real(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
            available: true,
        }
    }

    /// The fallback shown for a missing or invalid score.
    #[must_use]
    pub fn unavailable(fallback: u8) -> Self {
        Self {
            percent: fallback.min(100),
            available: false,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_of(ratio: f64) -> u8 {
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// `round(100 * achieved / max)` over all skill groups.
///
/// Falls back when no group lists any requirement.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn alignment_percentage(scores: &AlignmentScores, fallback: u8) -> DisplayScore {
    let max = scores.max_sum();
    if max == 0 {
        return DisplayScore::unavailable(fallback);
    }
    DisplayScore::real(percent_of(scores.achieved_sum() as f64 / max as f64))
}

/// `round(100 * ratio)` for a preservation ratio in `[0, 1]`.
///
/// Falls back for NaN or out-of-range ratios.
#[must_use]
pub fn preservation_percentage(preservation: &ContentPreservation, fallback: u8) -> DisplayScore {
    let ratio = preservation.content_preservation_score;
    if ratio.is_finite() && (0.0..=1.0).contains(&ratio) {
        DisplayScore::real(percent_of(ratio))
    } else {
        DisplayScore::unavailable(fallback)
    }
}

/// Display score of an alignment stage outcome.
#[must_use]
pub fn alignment_display(outcome: &StageOutcome<AlignmentScores>, fallback: u8) -> DisplayScore {
    outcome
        .result()
        .map_or(DisplayScore::unavailable(fallback), |scores| {
            alignment_percentage(scores, fallback)
        })
}

/// Display score of a content preservation stage outcome.
#[must_use]
pub fn preservation_display(
    outcome: &StageOutcome<ContentPreservation>,
    fallback: u8,
) -> DisplayScore {
    outcome
        .result()
        .map_or(DisplayScore::unavailable(fallback), |p| {
            preservation_percentage(p, fallback)
        })
}
