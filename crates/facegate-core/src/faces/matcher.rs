use serde::Serialize;

use crate::errors::{AppError, AppResult};
use crate::faces::encoding::BiometricEncoding;

pub const DEFAULT_VERIFICATION_THRESHOLD: f64 = 0.6;
pub const FALLBACK_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    WithinThreshold,
    BeyondThreshold,
    FallbackAccepted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    /// `1 - distance` in vector mode; may leave `[0, 1]` for unnormalized input.
    pub confidence: f64,
    pub distance: Option<f64>,
    pub reason: MatchReason,
}

impl VerificationResult {
    pub fn display_confidence(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchEngine {
    threshold: f64,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_VERIFICATION_THRESHOLD)
    }
}

impl MatchEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn compare(
        &self,
        stored: &BiometricEncoding,
        probe: &BiometricEncoding,
    ) -> AppResult<VerificationResult> {
        match (stored, probe) {
            (BiometricEncoding::Vector(lhs), BiometricEncoding::Vector(rhs)) => {
                if lhs.len() != rhs.len() {
                    return Err(AppError::DescriptorShape {
                        stored: lhs.len(),
                        probe: rhs.len(),
                    });
                }
                let distance = euclidean_distance(lhs, rhs);
                // Maximum-distance rule: the boundary itself is accepted.
                let verified = distance <= self.threshold;
                Ok(VerificationResult {
                    verified,
                    confidence: 1.0 - distance,
                    distance: Some(distance),
                    reason: if verified {
                        MatchReason::WithinThreshold
                    } else {
                        MatchReason::BeyondThreshold
                    },
                })
            }
            // Digests are never compared; this only confirms an image was supplied.
            (BiometricEncoding::Digest(_), BiometricEncoding::Digest(_)) => {
                Ok(VerificationResult {
                    verified: true,
                    confidence: FALLBACK_CONFIDENCE,
                    distance: None,
                    reason: MatchReason::FallbackAccepted,
                })
            }
            _ => Err(AppError::ModeMismatch {
                stored: stored.mode(),
                probe: probe.mode(),
            }),
        }
    }
}

pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    lhs.iter()
        .zip(rhs.iter())
        .map(|(l, r)| (l - r) * (l - r))
        .sum::<f64>()
        .sqrt()
}
