//! Invoice type discriminator and the four extraction schemas.

use serde::{Deserialize, Serialize};

use super::reasoned_field::ReasonedField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    General,
    Insurance,
    Utility,
    Tax,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Insurance => "insurance",
            Self::Utility => "utility",
            Self::Tax => "tax",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "general" => Some(Self::General),
            "insurance" => Some(Self::Insurance),
            "utility" => Some(Self::Utility),
            "tax" => Some(Self::Tax),
            _ => None,
        }
    }
}

/// The classification-stage schema: a single discriminator field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceTypeSchema {
    pub invoice_type: InvoiceType,
}

/// The fields common to every invoice, regardless of type. `reasoning`
/// and `valid_input` are plain metadata, not `ReasonedField`s — they
/// describe the extraction run itself, not one extracted value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceBase {
    pub invoice_date: ReasonedField<String>,
    pub invoice_due_date: ReasonedField<String>,
    pub invoice_number: ReasonedField<String>,
    pub account_number: ReasonedField<String>,
    pub vendor_name: ReasonedField<String>,
    pub community_name: ReasonedField<String>,
    pub payment_remittance_entity: ReasonedField<String>,
    pub payment_remittance_entity_care_of: ReasonedField<String>,
    pub payment_remittance_address: ReasonedField<String>,
    pub total_amount_due: ReasonedField<f64>,
    pub invoice_current_due_amount: ReasonedField<f64>,
    pub invoice_past_due_amount: ReasonedField<f64>,
    pub invoice_late_fee_amount: ReasonedField<f64>,
    pub credit_amount: ReasonedField<f64>,
    pub reasoning: String,
    pub valid_input: bool,
}

impl InvoiceBase {
    /// Run `ReasonedField::sanitize` over every reasoned field. Returns
    /// `true` if any field was changed.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;
        changed |= self.invoice_date.sanitize();
        changed |= self.invoice_due_date.sanitize();
        changed |= self.invoice_number.sanitize();
        changed |= self.account_number.sanitize();
        changed |= self.vendor_name.sanitize();
        changed |= self.community_name.sanitize();
        changed |= self.payment_remittance_entity.sanitize();
        changed |= self.payment_remittance_entity_care_of.sanitize();
        changed |= self.payment_remittance_address.sanitize();
        changed |= self.total_amount_due.sanitize();
        changed |= self.invoice_current_due_amount.sanitize();
        changed |= self.invoice_past_due_amount.sanitize();
        changed |= self.invoice_late_fee_amount.sanitize();
        changed |= self.credit_amount.sanitize();
        changed
    }
}

// `deny_unknown_fields` cannot be combined with `#[serde(flatten)]` (serde
// has no way to tell an unknown top-level key from one meant for the
// flattened side), so these three types accept stray keys at the schema's
// top level; `InvoiceBase`'s own `deny_unknown_fields` still rejects
// anything unexpected in the shared fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceInsurance {
    #[serde(flatten)]
    pub base: InvoiceBase,
    pub policy_start_date: ReasonedField<String>,
    pub policy_end_date: ReasonedField<String>,
    pub policy_number: ReasonedField<String>,
    pub service_termination: ReasonedField<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceUtility {
    #[serde(flatten)]
    pub base: InvoiceBase,
    pub service_start_date: ReasonedField<String>,
    pub service_end_date: ReasonedField<String>,
    pub service_termination: ReasonedField<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceTax {
    #[serde(flatten)]
    pub base: InvoiceBase,
    /// 4-digit year, stored as a string to preserve a leading-zero-free
    /// literal exactly as extracted.
    pub tax_year: ReasonedField<String>,
    pub property_id: ReasonedField<String>,
}

/// Tagged union of the four schemas, discriminated at the JSON level by
/// `invoice_type` so the serialized payload round-trips through
/// `JobResult::extracted_data` without a separate wrapper field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "invoice_type", rename_all = "snake_case")]
pub enum ExtractedInvoice {
    General(InvoiceBase),
    Insurance(InvoiceInsurance),
    Utility(InvoiceUtility),
    Tax(InvoiceTax),
}

impl ExtractedInvoice {
    pub fn invoice_type(&self) -> InvoiceType {
        match self {
            Self::General(_) => InvoiceType::General,
            Self::Insurance(_) => InvoiceType::Insurance,
            Self::Utility(_) => InvoiceType::Utility,
            Self::Tax(_) => InvoiceType::Tax,
        }
    }

    pub fn base(&self) -> &InvoiceBase {
        match self {
            Self::General(b) => b,
            Self::Insurance(i) => &i.base,
            Self::Utility(u) => &u.base,
            Self::Tax(t) => &t.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut InvoiceBase {
        match self {
            Self::General(b) => b,
            Self::Insurance(i) => &mut i.base,
            Self::Utility(u) => &mut u.base,
            Self::Tax(t) => &mut t.base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reasoned_field::{Confidence, ReasonCode};

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

    #[test]
    fn invoice_type_roundtrip() {
        for t in [
            InvoiceType::General,
            InvoiceType::Insurance,
            InvoiceType::Utility,
            InvoiceType::Tax,
        ] {
            assert_eq!(InvoiceType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn tagged_union_reports_correct_type() {
        let inv = ExtractedInvoice::Insurance(InvoiceInsurance {
            base: missing_base(),
            policy_start_date: ReasonedField::missing(),
            policy_end_date: ReasonedField::missing(),
            policy_number: ReasonedField::missing(),
            service_termination: ReasonedField::missing(),
        });
        assert_eq!(inv.invoice_type(), InvoiceType::Insurance);
    }

    #[test]
    fn base_sanitize_reports_change() {
        let mut base = missing_base();
        base.invoice_number = ReasonedField {
            value: Some("x".repeat(300)),
            confidence: Confidence::Low,
            reason_code: ReasonCode::Missing,
            evidence_snippet: Some("y".repeat(300)),
            reasoning: None,
            assumptions: None,
        };
        assert!(base.sanitize());
    }

    #[test]
    fn serde_round_trips_through_json_value() {
        let inv = ExtractedInvoice::General(missing_base());
        let v = serde_json::to_value(&inv).unwrap();
        assert_eq!(v["invoice_type"], "general");
        let back: ExtractedInvoice = serde_json::from_value(v).unwrap();
        assert_eq!(back.invoice_type(), InvoiceType::General);
    }
}
