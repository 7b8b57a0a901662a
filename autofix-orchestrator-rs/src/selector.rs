// autofix-orchestrator-rs/src/selector.rs

use shared_types::FixValidationResult;

/// The valid result with the highest fix confidence. Among equals the
/// earliest wins. `None` when nothing is valid, including for an empty slice.
pub fn select(results: &[FixValidationResult]) -> Option<&FixValidationResult> {
    results
        .iter()
        .filter(|r| r.valid)
        .fold(None, |best: Option<&FixValidationResult>, candidate| match best {
            Some(current) if current.fix.confidence >= candidate.fix.confidence => Some(current),
            _ => Some(candidate),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{FixType, ProposedFix, ValidationResult};

    fn result(id: &str, confidence: f64, valid: bool) -> FixValidationResult {
        let mut fix = ProposedFix::new(FixType::Infrastructure, id, confidence);
        fix.id = id.to_string();
        FixValidationResult {
            fix,
            validation: ValidationResult::default(),
            valid,
        }
    }

    #[test]
    fn empty_and_all_invalid_select_nothing() {
        assert!(select(&[]).is_none());
        assert!(select(&[result("a", 0.9, false), result("b", 1.0, false)]).is_none());
    }

    #[test]
    fn highest_valid_confidence_wins() {
        let results = [result("a", 0.5, true), result("b", 0.9, true), result("c", 1.0, false)];
        assert_eq!(select(&results).map(|r| r.fix.id.as_str()), Some("b"));
    }

    #[test]
    fn ties_keep_first_seen() {
        let results = [result("first", 0.7, true), result("second", 0.7, true)];
        assert_eq!(select(&results).map(|r| r.fix.id.as_str()), Some("first"));
    }
}
