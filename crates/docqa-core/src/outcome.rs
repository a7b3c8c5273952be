//! Tagged per-stage results.
//!
//! Fallback is a visible branch, not an implicit catch: a stage returns
//! `Ok`, `Degraded` (usable data plus the reason quality dropped), or
//! `Failed`. The orchestrator composes these explicitly.

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Ok(T),
    Degraded(T, String),
    Failed(String),
}

impl<T> StageOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Usable data, if any, plus the degradation reason when present.
    pub fn into_parts(self) -> (Option<T>, Option<String>) {
        match self {
            Self::Ok(v) => (Some(v), None),
            Self::Degraded(v, reason) => (Some(v), Some(reason)),
            Self::Failed(reason) => (None, Some(reason)),
        }
    }

    /// Usable data or a caller-supplied fallback, recording nothing.
    pub fn unwrap_or_else(self, fallback: impl FnOnce() -> T) -> T {
        match self {
            Self::Ok(v) | Self::Degraded(v, _) => v,
            Self::Failed(_) => fallback(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            Self::Ok(v) => StageOutcome::Ok(f(v)),
            Self::Degraded(v, reason) => StageOutcome::Degraded(f(v), reason),
            Self::Failed(reason) => StageOutcome::Failed(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_parts_splits_data_and_reason() {
        let (v, r) = StageOutcome::Ok(1).into_parts();
        assert_eq!(v, Some(1));
        assert!(r.is_none());

        let (v, r) = StageOutcome::Degraded(2, "slow".to_string()).into_parts();
        assert_eq!(v, Some(2));
        assert_eq!(r.as_deref(), Some("slow"));

        let (v, r) = StageOutcome::<i32>::Failed("down".to_string()).into_parts();
        assert!(v.is_none());
        assert_eq!(r.as_deref(), Some("down"));
    }

    #[test]
    fn failed_takes_fallback() {
        let v = StageOutcome::<i32>::Failed("x".to_string()).unwrap_or_else(|| 7);
        assert_eq!(v, 7);
    }
}
