use std::collections::HashMap;

use galleria_core::{ModerationConfig, ReviewDecision};

use super::client::{ModerationLabel, RiskLevel};

/// Turns a successful moderation result into a terminal decision.
///
/// A label's threshold is the deny-list entry for that label if present,
/// otherwise the threshold the service attached to the label, otherwise the
/// configured fallback. A label at or above its threshold rejects.
#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    thresholds: HashMap<String, f32>,
    default_threshold: f32,
}

impl ModerationPolicy {
    pub fn new(thresholds: HashMap<String, f32>, default_threshold: f32) -> Self {
        Self {
            thresholds,
            default_threshold,
        }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(config.label_thresholds.clone(), config.default_threshold)
    }

    pub fn threshold_for(&self, label: &ModerationLabel) -> f32 {
        self.thresholds
            .get(&label.label)
            .copied()
            .or(label.threshold)
            .unwrap_or(self.default_threshold)
    }

    pub fn decide(&self, risk_level: RiskLevel, labels: &[ModerationLabel]) -> ReviewDecision {
        if risk_level == RiskLevel::None {
            return ReviewDecision::approved(None);
        }

        let (triggering, advisory): (Vec<_>, Vec<_>) = labels
            .iter()
            .map(|label| (label, self.threshold_for(label)))
            .partition(|(label, threshold)| label.confidence >= *threshold);

        if !triggering.is_empty() {
            return ReviewDecision::rejected(format!(
                "Rejected by automated review: {}",
                describe(&triggering, ">=")
            ));
        }

        if advisory.is_empty() {
            return ReviewDecision::approved(None);
        }
        ReviewDecision::approved(Some(format!(
            "Approved with advisory labels: {}",
            describe(&advisory, "<")
        )))
    }
}

fn describe(labels: &[(&ModerationLabel, f32)], op: &str) -> String {
    labels
        .iter()
        .map(|(label, threshold)| {
            let summary = format!(
                "{} ({:.1} {} {:.1})",
                label.label, label.confidence, op, threshold
            );
            match label.description.as_deref().map(str::trim) {
                Some(description) if !description.is_empty() => {
                    format!("{}: {}", summary, description)
                }
                _ => summary,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
