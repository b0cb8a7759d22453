// @generated manually to match migrations/2024-01-01-000000_create_jobs.

diesel::table! {
    jobs (id) {
        id -> Text,
        client_id -> Nullable<Text>,
        status -> Text,
        processing_phase -> Nullable<Text>,
        pdf_url -> Text,
        created_at -> Text,
        updated_at -> Text,
        completed_at -> Nullable<Text>,
        error_message -> Nullable<Text>,
    }
}

diesel::table! {
    job_results (id) {
        id -> Integer,
        job_id -> Text,
        extracted_data -> Text,
        confidence_score -> Nullable<Double>,
        tokens_used -> BigInt,
        raw_ocr_text -> Text,
        ocr_provider -> Text,
        ocr_duration_ms -> BigInt,
        ocr_pages -> Nullable<Integer>,
        created_at -> Text,
    }
}

diesel::joinable!(job_results -> jobs (job_id));
diesel::allow_tables_to_appear_in_same_query!(jobs, job_results);
