//! `ReasonedField<T>` — the shape wrapping every extracted scalar.

use serde::{Deserialize, Serialize};

pub const MAX_EVIDENCE_SNIPPET_LEN: usize = 240;
pub const MAX_REASONING_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ExplicitLabel,
    NearbyHeader,
    InferredLayout,
    Conflict,
    Missing,
}

impl ReasonCode {
    /// Parse from an arbitrary string, returning `None` for anything
    /// outside the closed enum — the caller downgrades to `Missing` per
    /// the post-validation sanity rule, it does not default silently here.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "explicit_label" => Some(Self::ExplicitLabel),
            "nearby_header" => Some(Self::NearbyHeader),
            "inferred_layout" => Some(Self::InferredLayout),
            "conflict" => Some(Self::Conflict),
            "missing" => Some(Self::Missing),
            _ => None,
        }
    }
}

/// Every extracted field is wrapped in this shape so the extraction
/// service can reason uniformly about confidence and provenance
/// regardless of the underlying scalar type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonedField<T> {
    pub value: Option<T>,
    pub confidence: Confidence,
    pub reason_code: ReasonCode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub evidence_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assumptions: Option<Vec<String>>,
}

impl<T> ReasonedField<T> {
    pub fn missing() -> Self {
        Self {
            value: None,
            confidence: Confidence::Low,
            reason_code: ReasonCode::Missing,
            evidence_snippet: None,
            reasoning: None,
            assumptions: None,
        }
    }

    pub fn conflict(evidence: impl Into<String>) -> Self {
        Self {
            value: None,
            confidence: Confidence::Low,
            reason_code: ReasonCode::Conflict,
            evidence_snippet: Some(truncate(&evidence.into(), MAX_EVIDENCE_SNIPPET_LEN)),
            reasoning: Some(truncate(
                "invoice_due_date precedes invoice_date",
                MAX_REASONING_LEN,
            )),
            assumptions: None,
        }
    }

    /// Whether this field requires an evidence/reasoning pair under the
    /// emission policy: confidence below `high`, or a null/ambiguous
    /// value.
    pub fn requires_evidence(&self) -> bool {
        self.confidence != Confidence::High || self.value.is_none()
    }

    /// Strip `evidence_snippet`/`reasoning` when `confidence == High` and
    /// the value is present, per the extraction service's emission
    /// policy (reduces response noise for fields the model is sure of).
    pub fn scrub(&mut self) {
        if self.confidence == Confidence::High && self.value.is_some() {
            self.evidence_snippet = None;
            self.reasoning = None;
        }
    }

    /// Enforce the per-field length caps and the reason-code downgrade
    /// rule, in place. Returns `true` if anything was changed.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;
        if let Some(s) = &self.evidence_snippet {
            if s.chars().count() > MAX_EVIDENCE_SNIPPET_LEN {
                self.evidence_snippet = Some(truncate(s, MAX_EVIDENCE_SNIPPET_LEN));
                changed = true;
            }
        }
        if let Some(s) = &self.reasoning {
            if s.chars().count() > MAX_REASONING_LEN {
                self.reasoning = Some(truncate(s, MAX_REASONING_LEN));
                changed = true;
            }
        }
        changed
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_has_low_confidence_and_missing_code() {
        let f: ReasonedField<String> = ReasonedField::missing();
        assert_eq!(f.confidence, Confidence::Low);
        assert_eq!(f.reason_code, ReasonCode::Missing);
        assert!(f.value.is_none());
    }

    #[test]
    fn requires_evidence_unless_high_and_present() {
        let mut f = ReasonedField {
            value: Some(10.0),
            confidence: Confidence::High,
            reason_code: ReasonCode::ExplicitLabel,
            evidence_snippet: None,
            reasoning: None,
            assumptions: None,
        };
        assert!(!f.requires_evidence());
        f.confidence = Confidence::Medium;
        assert!(f.requires_evidence());
    }

    #[test]
    fn scrub_clears_high_confidence_non_null_fields() {
        let mut f = ReasonedField {
            value: Some("INV-1".to_string()),
            confidence: Confidence::High,
            reason_code: ReasonCode::ExplicitLabel,
            evidence_snippet: Some("near label".to_string()),
            reasoning: Some("matched".to_string()),
            assumptions: None,
        };
        f.scrub();
        assert!(f.evidence_snippet.is_none());
        assert!(f.reasoning.is_none());
    }

    #[test]
    fn scrub_keeps_evidence_for_non_high_confidence() {
        let mut f = ReasonedField {
            value: Some("INV-1".to_string()),
            confidence: Confidence::Medium,
            reason_code: ReasonCode::NearbyHeader,
            evidence_snippet: Some("near label".to_string()),
            reasoning: Some("matched".to_string()),
            assumptions: None,
        };
        f.scrub();
        assert!(f.evidence_snippet.is_some());
    }

    #[test]
    fn sanitize_truncates_oversize_strings() {
        let mut f = ReasonedField {
            value: Some(1.0),
            confidence: Confidence::Low,
            reason_code: ReasonCode::Missing,
            evidence_snippet: Some("x".repeat(300)),
            reasoning: Some("y".repeat(200)),
            assumptions: None,
        };
        assert!(f.sanitize());
        assert_eq!(f.evidence_snippet.unwrap().chars().count(), MAX_EVIDENCE_SNIPPET_LEN);
        assert_eq!(f.reasoning.unwrap().chars().count(), MAX_REASONING_LEN);
    }

    #[test]
    fn reason_code_parse_rejects_unknown() {
        assert_eq!(ReasonCode::parse("bogus"), None);
        assert_eq!(ReasonCode::parse("conflict"), Some(ReasonCode::Conflict));
    }
}
