//! Decides when an iterative loop stops and with what outcome.

use crate::model::{Finding, Outcome};

#[derive(Debug, Clone)]
pub struct TerminationResult {
    pub should_terminate: bool,
    pub outcome: Option<Outcome>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TerminationEvaluator {
    pub confidence_threshold: f64,
    pub confidence_delta_threshold: f64,
}

impl Default for TerminationEvaluator {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            confidence_delta_threshold: 0.05,
        }
    }
}

impl TerminationEvaluator {
    pub fn new(confidence_threshold: f64, confidence_delta_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            confidence_delta_threshold,
        }
    }

    /// Decision order (first match wins): bounds, high-confidence
    /// convergence, low-confidence stall, saturation, else continue.
    pub fn evaluate(
        &self,
        findings: &[Finding],
        iteration: u32,
        max_iterations: u32,
        confidence_history: &[f64],
        previous_finding_count: usize,
    ) -> TerminationResult {
        if iteration >= max_iterations {
            return TerminationResult {
                should_terminate: true,
                outcome: Some(Outcome::Bounded),
                reason: format!("reached maximum iterations ({max_iterations})"),
            };
        }

        if confidence_history.len() >= 2 {
            let current = confidence_history[confidence_history.len() - 1];
            let previous = confidence_history[confidence_history.len() - 2];
            let delta = (current - previous).abs();

            if delta < self.confidence_delta_threshold {
                if current >= self.confidence_threshold {
                    return TerminationResult {
                        should_terminate: true,
                        outcome: Some(Outcome::Complete),
                        reason: format!("confidence converged at {current:.2} (delta={delta:.3})"),
                    };
                }
                if confidence_history.len() >= 3 {
                    let prev_delta = (confidence_history[confidence_history.len() - 2]
                        - confidence_history[confidence_history.len() - 3])
                        .abs();
                    if prev_delta < self.confidence_delta_threshold {
                        return TerminationResult {
                            should_terminate: true,
                            outcome: Some(Outcome::Inconclusive),
                            reason: format!("confidence stalled at {current:.2} for 2+ iterations"),
                        };
                    }
                }
            }
        }

        let current_finding_count = findings.len();
        if iteration > 1 && current_finding_count <= previous_finding_count {
            return TerminationResult {
                should_terminate: true,
                outcome: Some(Outcome::Saturated),
                reason: "no new findings discovered".to_string(),
            };
        }

        TerminationResult {
            should_terminate: false,
            outcome: None,
            reason: "continue".to_string(),
        }
    }

    /// `min(1, 0.3 + min(0.2, 0.05·|F|) + min(0.2, 0.04·|S|) + 0.2·has_answer + 0.1·mean(confidence))`
    pub fn calculate_confidence(
        &self,
        findings: &[Finding],
        sources_count: usize,
        has_answer: bool,
    ) -> f64 {
        if findings.is_empty() {
            return 0.0;
        }

        let base = 0.3;
        let finding_boost = (0.05 * findings.len() as f64).min(0.2);
        let source_boost = (0.04 * sources_count as f64).min(0.2);
        let answer_boost = if has_answer { 0.2 } else { 0.0 };
        let avg_finding_confidence =
            findings.iter().map(|f| f.confidence).sum::<f64>() / findings.len() as f64;
        let confidence_boost = avg_finding_confidence * 0.1;

        (base + finding_boost + source_boost + answer_boost + confidence_boost).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(confidence: f64) -> Finding {
        Finding::new("x", confidence)
    }

    #[test]
    fn bounds_wins_regardless_of_confidence() {
        let eval = TerminationEvaluator::default();
        let result = eval.evaluate(&[finding(0.9)], 5, 5, &[0.9, 0.91], 0);
        assert!(result.should_terminate);
        assert_eq!(result.outcome, Some(Outcome::Bounded));
    }

    #[test]
    fn converges_to_complete() {
        let eval = TerminationEvaluator::default();
        let history = vec![0.6, 0.82, 0.84];
        let findings = vec![finding(0.8), finding(0.8)];
        let result = eval.evaluate(&findings, 3, 5, &history, 1);
        assert_eq!(result.outcome, Some(Outcome::Complete));
    }

    #[test]
    fn stalls_to_inconclusive() {
        let eval = TerminationEvaluator::default();
        let history = vec![0.5, 0.51, 0.52];
        let findings = vec![finding(0.5), finding(0.5)];
        let result = eval.evaluate(&findings, 3, 5, &history, 1);
        assert_eq!(result.outcome, Some(Outcome::Inconclusive));
    }

    #[test]
    fn saturates_without_new_findings() {
        let eval = TerminationEvaluator::default();
        let findings = vec![finding(0.5)];
        let result = eval.evaluate(&findings, 2, 5, &[0.3, 0.5], 1);
        assert_eq!(result.outcome, Some(Outcome::Saturated));
    }

    #[test]
    fn continues_otherwise() {
        let eval = TerminationEvaluator::default();
        let findings = vec![finding(0.5), finding(0.5)];
        let result = eval.evaluate(&findings, 1, 5, &[0.3], 0);
        assert!(!result.should_terminate);
    }

    #[test]
    fn confidence_formula_matches_spec() {
        let eval = TerminationEvaluator::default();
        let findings = vec![finding(1.0), finding(1.0)];
        let confidence = eval.calculate_confidence(&findings, 3, true);
        // 0.3 + min(0.2, 0.1) + min(0.2, 0.12) + 0.2 + 0.1*1.0 = 0.3+0.1+0.12+0.2+0.1 = 0.82
        assert!((confidence - 0.82).abs() < 1e-9);
    }
}
