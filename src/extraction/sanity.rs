//! Post-validation sanity passes applied to the LLM's raw JSON and to
//! the parsed invoice before a job is marked complete.

use chrono::NaiveDate;
use serde_json::Value;

use crate::models::reasoned_field::ReasonCode;
use crate::models::{ExtractedInvoice, InvoiceBase, ReasonedField};

/// Walk a raw JSON value looking for `ReasonedField`-shaped objects (an
/// object with both `reason_code` and `confidence` keys) and downgrade
/// any `reason_code` outside the closed enum to `missing` with
/// `confidence` forced to `low`, rather than fail the whole response
/// over one malformed field.
pub fn normalize_reason_codes(value: &mut Value) -> bool {
    let mut changed = false;
    match value {
        Value::Object(map) => {
            if map.contains_key("reason_code") && map.contains_key("confidence") {
                let valid = map
                    .get("reason_code")
                    .and_then(Value::as_str)
                    .map(ReasonCode::parse)
                    .map(|parsed| parsed.is_some())
                    .unwrap_or(false);
                if !valid {
                    map.insert("reason_code".to_string(), Value::String("missing".to_string()));
                    map.insert("confidence".to_string(), Value::String("low".to_string()));
                    changed = true;
                }
            }
            for v in map.values_mut() {
                changed |= normalize_reason_codes(v);
            }
        }
        Value::Array(items) => {
            for v in items {
                changed |= normalize_reason_codes(v);
            }
        }
        _ => {}
    }
    changed
}

/// If the extracted due date precedes the invoice date, both are
/// unreliable: null both out with `reason_code = conflict` rather than
/// keep one of two mutually contradictory dates.
pub fn resolve_date_conflict(base: &mut InvoiceBase) {
    let (Some(date_str), Some(due_str)) = (&base.invoice_date.value, &base.invoice_due_date.value) else {
        return;
    };
    let (Ok(date), Ok(due)) = (
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d"),
        NaiveDate::parse_from_str(due_str, "%Y-%m-%d"),
    ) else {
        return;
    };
    if due < date {
        let evidence = format!("invoice_date={date} invoice_due_date={due}");
        base.invoice_date = ReasonedField::conflict(evidence.clone());
        base.invoice_due_date = ReasonedField::conflict(evidence);
    }
}

fn scrub_base(base: &mut InvoiceBase) {
    base.invoice_date.scrub();
    base.invoice_due_date.scrub();
    base.invoice_number.scrub();
    base.account_number.scrub();
    base.vendor_name.scrub();
    base.community_name.scrub();
    base.payment_remittance_entity.scrub();
    base.payment_remittance_entity_care_of.scrub();
    base.payment_remittance_address.scrub();
    base.total_amount_due.scrub();
    base.invoice_current_due_amount.scrub();
    base.invoice_past_due_amount.scrub();
    base.invoice_late_fee_amount.scrub();
    base.credit_amount.scrub();
}

/// Apply the emission policy's `scrub` rule to every reasoned field in
/// the invoice: high-confidence, non-null fields drop their
/// evidence/reasoning to reduce response noise.
pub fn scrub_invoice(invoice: &mut ExtractedInvoice) {
    scrub_base(invoice.base_mut());
    match invoice {
        ExtractedInvoice::General(_) => {}
        ExtractedInvoice::Insurance(i) => {
            i.policy_start_date.scrub();
            i.policy_end_date.scrub();
            i.policy_number.scrub();
            i.service_termination.scrub();
        }
        ExtractedInvoice::Utility(u) => {
            u.service_start_date.scrub();
            u.service_end_date.scrub();
            u.service_termination.scrub();
        }
        ExtractedInvoice::Tax(t) => {
            t.tax_year.scrub();
            t.property_id.scrub();
        }
    }
}

/// Run the full post-validation pass: date-conflict resolution, then
/// emission-policy scrubbing, then per-field length sanitization.
pub fn apply_sanity_checks(invoice: &mut ExtractedInvoice) {
    resolve_date_conflict(invoice.base_mut());
    scrub_invoice(invoice);
    invoice.base_mut().sanitize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reasoned_field::Confidence;
    use serde_json::json;

    #[test]
    fn normalize_reason_codes_downgrades_unknown_code() {
        let mut value = json!({
            "value": "x",
            "confidence": "high",
            "reason_code": "totally_made_up"
        });
        assert!(normalize_reason_codes(&mut value));
        assert_eq!(value["reason_code"], "missing");
        assert_eq!(value["confidence"], "low");
    }

    #[test]
    fn normalize_reason_codes_leaves_valid_code_untouched() {
        let mut value = json!({
            "value": "x",
            "confidence": "high",
            "reason_code": "explicit_label"
        });
        assert!(!normalize_reason_codes(&mut value));
        assert_eq!(value["reason_code"], "explicit_label");
    }

    #[test]
    fn normalize_reason_codes_recurses_into_nested_objects() {
        let mut value = json!({
            "policy_number": {
                "value": "P1",
                "confidence": "high",
                "reason_code": "bogus"
            }
        });
        assert!(normalize_reason_codes(&mut value));
        assert_eq!(value["policy_number"]["reason_code"], "missing");
    }

    fn missing_base() -> InvoiceBase {
        InvoiceBase {
            invoice_date: ReasonedField::missing(),
            invoice_due_date: ReasonedField::missing(),
            invoice_number: ReasonedField::missing(),
            account_number: ReasonedField::missing(),
            vendor_name: ReasonedField::missing(),
            community_name: ReasonedField::missing(),
            payment_remittance_entity: ReasonedField::missing(),
            payment_remittance_entity_care_of: ReasonedField::missing(),
            payment_remittance_address: ReasonedField::missing(),
            total_amount_due: ReasonedField::missing(),
            invoice_current_due_amount: ReasonedField::missing(),
            invoice_past_due_amount: ReasonedField::missing(),
            invoice_late_fee_amount: ReasonedField::missing(),
            credit_amount: ReasonedField::missing(),
            reasoning: String::new(),
            valid_input: true,
        }
    }

    fn dated_base(date: &str, due: &str) -> InvoiceBase {
        let mut base = missing_base();
        base.invoice_date = ReasonedField {
            value: Some(date.to_string()),
            confidence: Confidence::High,
            reason_code: ReasonCode::ExplicitLabel,
            evidence_snippet: None,
            reasoning: None,
            assumptions: None,
        };
        base.invoice_due_date = ReasonedField {
            value: Some(due.to_string()),
            confidence: Confidence::High,
            reason_code: ReasonCode::ExplicitLabel,
            evidence_snippet: None,
            reasoning: None,
            assumptions: None,
        };
        base
    }

    #[test]
    fn resolve_date_conflict_nulls_both_when_due_precedes_invoice_date() {
        let mut base = dated_base("2026-02-01", "2026-01-15");
        resolve_date_conflict(&mut base);
        assert!(base.invoice_date.value.is_none());
        assert!(base.invoice_due_date.value.is_none());
        assert_eq!(base.invoice_date.reason_code, ReasonCode::Conflict);
    }

    #[test]
    fn resolve_date_conflict_leaves_well_ordered_dates_alone() {
        let mut base = dated_base("2026-01-01", "2026-02-01");
        resolve_date_conflict(&mut base);
        assert_eq!(base.invoice_date.value.as_deref(), Some("2026-01-01"));
        assert_eq!(base.invoice_due_date.value.as_deref(), Some("2026-02-01"));
    }

    #[test]
    fn scrub_invoice_clears_high_confidence_evidence_across_type_specific_fields() {
        let base = dated_base("2026-01-01", "2026-02-01");
        let mut invoice = ExtractedInvoice::Insurance(crate::models::InvoiceInsurance {
            base,
            policy_start_date: ReasonedField {
                value: Some("2026-01-01".to_string()),
                confidence: Confidence::High,
                reason_code: ReasonCode::ExplicitLabel,
                evidence_snippet: Some("near label".to_string()),
                reasoning: Some("matched".to_string()),
                assumptions: None,
            },
            policy_end_date: ReasonedField::missing(),
            policy_number: ReasonedField::missing(),
            service_termination: ReasonedField::missing(),
        });
        scrub_invoice(&mut invoice);
        if let ExtractedInvoice::Insurance(i) = &invoice {
            assert!(i.policy_start_date.evidence_snippet.is_none());
            assert!(i.policy_start_date.reasoning.is_none());
        } else {
            panic!("expected insurance variant");
        }
    }
}
