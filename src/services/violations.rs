use time::PrimitiveDateTime;

use crate::db::models::Violation;

/// Reports beyond this count force the attempt closed.
pub(crate) const VIOLATION_THRESHOLD: usize = 5;

pub(crate) fn record(kind: &str, occurred_at: PrimitiveDateTime) -> Violation {
    let kind = kind.trim();
    Violation {
        kind: if kind.is_empty() { "unspecified".to_string() } else { kind.to_string() },
        occurred_at,
    }
}

pub(crate) fn exceeds_threshold(count: usize) -> bool {
    count > VIOLATION_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn sixth_report_crosses_threshold() {
        assert!(!exceeds_threshold(5));
        assert!(exceeds_threshold(6));
    }

    #[test]
    fn blank_kind_is_recorded_as_unspecified() {
        let violation = record("  ", datetime!(2026-03-01 10:00));
        assert_eq!(violation.kind, "unspecified");
        assert_eq!(record("tab-switch", datetime!(2026-03-01 10:00)).kind, "tab-switch");
    }
}
