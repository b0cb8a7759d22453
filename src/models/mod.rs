pub mod invoice;
pub mod job;
pub mod reasoned_field;
pub mod result;

pub use invoice::{
    ExtractedInvoice, InvoiceBase, InvoiceInsurance, InvoiceTax, InvoiceType, InvoiceTypeSchema,
    InvoiceUtility,
};
pub use job::{Job, JobStatus, ProcessingPhase};
pub use reasoned_field::{Confidence, ReasonCode, ReasonedField};
pub use result::JobResult;
