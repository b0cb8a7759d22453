//! Two-stage extraction pipeline: classify the invoice type, then run
//! the type-specialized extraction prompt and post-validation sanity
//! passes.

mod sanity;

pub use sanity::{apply_sanity_checks, normalize_reason_codes, resolve_date_conflict, scrub_invoice};

use crate::errors::{AppError, ErrorKind, Stage};
use crate::llm::{GenerateObjectRequest, LlmClient};
use crate::models::{
    ExtractedInvoice, InvoiceBase, InvoiceInsurance, InvoiceTax, InvoiceType, InvoiceTypeSchema,
    InvoiceUtility,
};
use crate::prompts::{classify_prompt, extract_prompt};

const CLASSIFY_MAX_TOKENS: u32 = 64;
const EXTRACT_MAX_TOKENS: u32 = 4096;

/// Sampling temperature used when no explicit value is configured.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

pub struct ExtractionOutcome {
    pub invoice: ExtractedInvoice,
    pub tokens_used: u64,
}

/// Drives the classify -> extract pipeline over a single hosted LLM
/// client. Holds no per-job state; safe to share across worker tasks.
pub struct ExtractionService {
    llm: LlmClient,
    temperature: f32,
}

impl ExtractionService {
    pub fn new(llm: LlmClient) -> Self {
        Self::with_temperature(llm, DEFAULT_TEMPERATURE)
    }

    pub fn with_temperature(llm: LlmClient, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// Classify then extract. A classification rejected as `VALIDATION`
    /// (malformed or schema-mismatched output) does not fail the job: it
    /// falls back to the `general` schema, a business default distinct
    /// from (and not itself subject to) the LLM client's transport retry
    /// policy. Any other classification error (AUTH, QUOTA, TIMEOUT, an
    /// exhausted TRANSIENT retry) propagates, since those indicate the
    /// LLM call itself is unrecoverable rather than merely unparsable.
    /// Token accounting sums both calls; a defaulted classification
    /// contributes zero tokens.
    pub async fn extract(&self, markdown: &str) -> Result<ExtractionOutcome, AppError> {
        let (invoice_type, classify_tokens) = match self.classify(markdown).await {
            Ok((invoice_type, tokens)) => (invoice_type, tokens),
            Err(e) if e.kind == ErrorKind::Validation => {
                tracing::warn!(error = %e, "classification failed, defaulting to general");
                (InvoiceType::General, 0)
            }
            Err(e) => return Err(e),
        };

        let (invoice, extract_tokens) = self.extract_typed(invoice_type, markdown).await?;

        Ok(ExtractionOutcome {
            invoice,
            tokens_used: classify_tokens + extract_tokens,
        })
    }

    async fn classify(&self, markdown: &str) -> Result<(InvoiceType, u64), AppError> {
        let request = GenerateObjectRequest {
            messages: classify_prompt(markdown),
            temperature: self.temperature,
            max_tokens: CLASSIFY_MAX_TOKENS,
        };
        let response = self
            .llm
            .generate_object::<InvoiceTypeSchema>(request)
            .await?;
        Ok((response.data.invoice_type, response.tokens_used))
    }

    async fn extract_typed(
        &self,
        invoice_type: InvoiceType,
        markdown: &str,
    ) -> Result<(ExtractedInvoice, u64), AppError> {
        let request = GenerateObjectRequest {
            messages: extract_prompt(invoice_type, markdown),
            temperature: self.temperature,
            max_tokens: EXTRACT_MAX_TOKENS,
        };

        let (mut value, tokens_used) = self.llm.generate_value(request).await?;
        normalize_reason_codes(&mut value);

        let mut invoice = match invoice_type {
            InvoiceType::General => {
                ExtractedInvoice::General(deserialize_schema::<InvoiceBase>(value)?)
            }
            InvoiceType::Insurance => {
                ExtractedInvoice::Insurance(deserialize_schema::<InvoiceInsurance>(value)?)
            }
            InvoiceType::Utility => {
                ExtractedInvoice::Utility(deserialize_schema::<InvoiceUtility>(value)?)
            }
            InvoiceType::Tax => ExtractedInvoice::Tax(deserialize_schema::<InvoiceTax>(value)?),
        };

        apply_sanity_checks(&mut invoice);
        Ok((invoice, tokens_used))
    }
}

fn deserialize_schema<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|e| {
        AppError::validation(
            Stage::Llm,
            format!("LLM extraction response did not match the expected schema: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reasoned_field::{Confidence, ReasonCode};
    use crate::models::ReasonedField;

    fn sample_base_json() -> serde_json::Value {
        let missing = |reason_code: &str| {
            serde_json::json!({"value": null, "confidence": "low", "reason_code": reason_code})
        };
        serde_json::json!({
            "invoice_date": missing("missing"),
            "invoice_due_date": missing("missing"),
            "invoice_number": missing("missing"),
            "account_number": missing("missing"),
            "vendor_name": missing("missing"),
            "community_name": missing("missing"),
            "payment_remittance_entity": missing("missing"),
            "payment_remittance_entity_care_of": missing("missing"),
            "payment_remittance_address": missing("missing"),
            "total_amount_due": missing("missing"),
            "invoice_current_due_amount": missing("missing"),
            "invoice_past_due_amount": missing("missing"),
            "invoice_late_fee_amount": missing("missing"),
            "credit_amount": missing("missing"),
            "reasoning": "no financial content found",
            "valid_input": false
        })
    }

    #[test]
    fn deserialize_schema_parses_general_invoice() {
        let base: InvoiceBase = deserialize_schema(sample_base_json()).unwrap();
        assert!(!base.valid_input);
        assert_eq!(base.invoice_date.reason_code, ReasonCode::Missing);
    }

    #[test]
    fn deserialize_schema_rejects_missing_required_field() {
        let mut value = sample_base_json();
        value.as_object_mut().unwrap().remove("vendor_name");
        let err = deserialize_schema::<InvoiceBase>(value).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::Validation);
    }

    #[test]
    fn deserialize_schema_rejects_unknown_field() {
        let mut value = sample_base_json();
        value
            .as_object_mut()
            .unwrap()
            .insert("not_a_real_field".to_string(), serde_json::json!(1));
        assert!(deserialize_schema::<InvoiceBase>(value).is_err());
    }

    #[test]
    fn normalize_then_deserialize_tolerates_stray_reason_code() {
        let mut value = sample_base_json();
        value["vendor_name"]["reason_code"] = serde_json::json!("not_a_real_code");
        value["vendor_name"]["confidence"] = serde_json::json!("high");
        normalize_reason_codes(&mut value);
        let base: InvoiceBase = deserialize_schema(value).unwrap();
        assert_eq!(base.vendor_name.reason_code, ReasonCode::Missing);
        assert_eq!(base.vendor_name.confidence, Confidence::Low);
    }

    #[test]
    fn reasoned_field_direct_construction_still_round_trips() {
        let field = ReasonedField {
            value: Some("x".to_string()),
            confidence: Confidence::High,
            reason_code: ReasonCode::ExplicitLabel,
            evidence_snippet: None,
            reasoning: None,
            assumptions: None,
        };
        let v = serde_json::to_value(&field).unwrap();
        let back: ReasonedField<String> = serde_json::from_value(v).unwrap();
        assert_eq!(back.value.as_deref(), Some("x"));
    }
}
