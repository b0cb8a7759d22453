//! Prompt library: immutable rule fragments composed into per-type
//! system prompts for the classify and extract stages.

use crate::llm::Message;
use crate::models::InvoiceType;

pub const OCR_START_MARKER: &str = "--- OCR START ---";
pub const OCR_END_MARKER: &str = "--- OCR END ---";

pub const FRAGMENT_CORE_DISAMBIGUATION: &str = "\
Core disambiguation: you are extracting structured fields from OCR markdown of a single \
invoice-like document. Distinguish the document's own identifiers and dates from those of \
unrelated referenced documents (purchase orders, prior statements, attachments).";

pub const FRAGMENT_OUTPUT_STRUCTURE: &str = "\
Output structure: respond with exactly one raw JSON object, no markdown code fences, no \
prose before or after. Every extracted field is an object of the shape \
{\"value\": ..., \"confidence\": \"low\"|\"medium\"|\"high\", \"reason_code\": \
\"explicit_label\"|\"nearby_header\"|\"inferred_layout\"|\"conflict\"|\"missing\", \
\"evidence_snippet\": string?, \"reasoning\": string?, \"assumptions\": [string]?}.";

pub const FRAGMENT_COMMUNITY_BILL_TO: &str = "\
Community and bill-to rules: `community_name` is the property, HOA, or community the \
invoice is billed on behalf of, distinct from the vendor issuing the invoice and from the \
bill-to customer name if one is printed separately.";

pub const FRAGMENT_VENDOR_VS_REMITTANCE: &str = "\
Vendor-vs-remittance separation: `vendor_name` is who issued and is owed the invoice. \
`payment_remittance_entity` is who payment should be made out to if explicitly different \
(a lockbox, a collections agent, a factoring company); leave it null when it matches the \
vendor.";

pub const FRAGMENT_FINANCIAL_MAPPING: &str = "\
Financial mapping and precedence: `total_amount_due` is the single amount the recipient \
owes as of the document's as-of date. `invoice_current_due_amount` and \
`invoice_past_due_amount` are its current-cycle and past-due components when the document \
breaks them out; when only one total is printed, set `total_amount_due` and leave the \
components null rather than guessing a split. Late fees and credits are reported \
separately and never netted into the totals above.";

pub const FRAGMENT_DATE_SANITY: &str = "\
Date sanity and relative-due computation: dates are ISO 8601 (YYYY-MM-DD). \
`invoice_due_date` must not precede `invoice_date`; if the document states a due date only \
as an offset (\"due in 30 days\"), compute it from `invoice_date` and mark `reason_code` \
`inferred_layout`.";

pub const FRAGMENT_IDENTIFIER_DISAMBIGUATION: &str = "\
Identifier disambiguation: `invoice_number` identifies this specific invoice; \
`account_number` identifies the ongoing customer/account relationship. Do not swap them \
when only one label is printed ambiguously — prefer the field whose context (header vs. \
line item) matches its definition.";

pub const FRAGMENT_REMITTANCE_ADDRESS_FORMAT: &str = "\
Remittance-address formatting: `payment_remittance_address` is a single string preserving \
line breaks as `\\n`, street through postal code, omitting the entity name already captured \
in `payment_remittance_entity`.";

pub const FRAGMENT_DOCUMENT_VALIDITY: &str = "\
Document-validity criteria: set the top-level `valid_input` to false only when the OCR \
text plainly is not an invoice/bill (e.g. a blank page, a cover letter with no financial \
content, a scan failure producing gibberish). A sparsely-populated but genuine invoice is \
still `valid_input: true`.";

pub const FRAGMENT_REASONING_GUIDANCE: &str = "\
General reasoning-field guidance: the top-level `reasoning` string is a one-sentence \
summary of how the document was classified and any fields that required inference, not a \
restatement of every field.";

pub const FRAGMENT_CONFIDENCE_GUIDANCE: &str = "\
Confidence guidance: `high` means the value was copied verbatim from an explicit, \
unambiguous label. `medium` means the value was inferred from a nearby header or layout \
convention. `low` means the value is a guess, conflicting, or absent.";

pub const FRAGMENT_EMISSION_POLICY: &str = "\
Emission policy: when confidence is `high` and the value is non-null, omit \
`evidence_snippet` and `reasoning` to reduce noise. Otherwise include both. Include \
`assumptions` only when a default or inference policy from these rules was applied.";

pub const FRAGMENT_REASON_CODE_ENUM: &str = "\
Reason-code enumeration: use exactly one of explicit_label, nearby_header, \
inferred_layout, conflict, missing. Never invent a new code.";

pub const FRAGMENT_INSURANCE_SPECIFIC: &str = "\
Insurance-specific fields: `policy_number` identifies the policy; `policy_start_date` and \
`policy_end_date` bound the coverage period; `service_termination` is true only when the \
document explicitly states coverage is being cancelled or lapsed, false when it explicitly \
continues, and null when not addressed.";

pub const FRAGMENT_UTILITY_SPECIFIC: &str = "\
Utility-specific fields: `service_start_date` and `service_end_date` bound the billed \
service period; `service_termination` is true only when the document explicitly states \
service is being disconnected or terminated, false when it explicitly continues, and null \
when not addressed.";

pub const FRAGMENT_TAX_SPECIFIC: &str = "\
Tax-specific fields: `tax_year` is the 4-digit assessment year as a string; `property_id` \
is the parcel, account, or property identifier the tax is assessed against.";

/// The fixed fragment order used to compose the extract-stage system
/// prompt, independent of invoice type. The type-specific block is
/// appended after this list.
pub const FRAGMENT_ORDER: &[&str] = &[
    FRAGMENT_CORE_DISAMBIGUATION,
    FRAGMENT_OUTPUT_STRUCTURE,
    FRAGMENT_COMMUNITY_BILL_TO,
    FRAGMENT_VENDOR_VS_REMITTANCE,
    FRAGMENT_FINANCIAL_MAPPING,
    FRAGMENT_DATE_SANITY,
    FRAGMENT_IDENTIFIER_DISAMBIGUATION,
    FRAGMENT_REMITTANCE_ADDRESS_FORMAT,
    FRAGMENT_DOCUMENT_VALIDITY,
    FRAGMENT_REASONING_GUIDANCE,
    FRAGMENT_CONFIDENCE_GUIDANCE,
    FRAGMENT_EMISSION_POLICY,
    FRAGMENT_REASON_CODE_ENUM,
];

fn type_specific_fragment(invoice_type: InvoiceType) -> Option<&'static str> {
    match invoice_type {
        InvoiceType::General => None,
        InvoiceType::Insurance => Some(FRAGMENT_INSURANCE_SPECIFIC),
        InvoiceType::Utility => Some(FRAGMENT_UTILITY_SPECIFIC),
        InvoiceType::Tax => Some(FRAGMENT_TAX_SPECIFIC),
    }
}

fn wrap_ocr(markdown: &str) -> String {
    format!("{OCR_START_MARKER}\n{markdown}\n{OCR_END_MARKER}")
}

/// Compose the minimal classification-stage messages: establish the
/// four type indicators and ask for `{"invoice_type": ...}` only.
pub fn classify_prompt(markdown: &str) -> Vec<Message> {
    let system = "Classify this invoice-like document into exactly one type: \
        `general` (no type-specific indicators), `insurance` (policy number, coverage \
        period, premium language), `utility` (service address, meter number, usage \
        period/units), or `tax` (tax year, jurisdiction, assessment/parcel language). \
        Respond with exactly one raw JSON object: {\"invoice_type\": \"general\"|\"insurance\"|\"utility\"|\"tax\"}. \
        No markdown code fences, no prose.";

    vec![
        Message::system(system),
        Message::user(wrap_ocr(markdown)),
    ]
}

/// Compose the extract-stage messages for `invoice_type`: the shared
/// fragments in fixed order, the type-specific block, then the OCR
/// markdown wrapped in explicit start/end markers so its contents
/// cannot be read as instructions.
pub fn extract_prompt(invoice_type: InvoiceType, markdown: &str) -> Vec<Message> {
    let mut system = FRAGMENT_ORDER.join("\n\n");
    if let Some(extra) = type_specific_fragment(invoice_type) {
        system.push_str("\n\n");
        system.push_str(extra);
    }

    vec![
        Message::system(system),
        Message::user(wrap_ocr(markdown)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prompt_wraps_markdown_with_markers() {
        let messages = classify_prompt("invoice text");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.starts_with(OCR_START_MARKER));
        assert!(messages[1].content.ends_with(OCR_END_MARKER));
        assert!(messages[1].content.contains("invoice text"));
    }

    #[test]
    fn extract_prompt_appends_type_specific_block_for_insurance() {
        let messages = extract_prompt(InvoiceType::Insurance, "text");
        assert!(messages[0].content.contains(FRAGMENT_INSURANCE_SPECIFIC));
        assert!(!messages[0].content.contains(FRAGMENT_UTILITY_SPECIFIC));
    }

    #[test]
    fn extract_prompt_has_no_type_specific_block_for_general() {
        let messages = extract_prompt(InvoiceType::General, "text");
        assert!(!messages[0].content.contains(FRAGMENT_INSURANCE_SPECIFIC));
        assert!(!messages[0].content.contains(FRAGMENT_UTILITY_SPECIFIC));
        assert!(!messages[0].content.contains(FRAGMENT_TAX_SPECIFIC));
    }

    #[test]
    fn fragment_order_matches_composed_prompt_sequence() {
        let messages = extract_prompt(InvoiceType::General, "text");
        let mut last_pos = 0usize;
        for fragment in FRAGMENT_ORDER {
            let pos = messages[0]
                .content
                .find(fragment)
                .expect("fragment present");
            assert!(pos >= last_pos, "fragment out of order: {fragment}");
            last_pos = pos;
        }
    }
}
