use std::fmt;

/// One rejected field, reported with the JSON path that produced the row.
#[derive(Debug, Clone)]
pub struct FieldFailure {
    /// Concrete path of the node the row was extracted at, e.g.
    /// `root.invoice_line_items[1]`.
    pub path: String,
    /// Model the row was destined for.
    pub model: String,
    /// Field that failed validation.
    pub field: String,
    /// Failure tag, e.g. `missing`, `string_too_long`, `invalid_type`.
    pub kind: String,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}: field '{}' {} ({})",
            self.model, self.path, self.field, self.kind, self.message
        )
    }
}

/// Validation and audit failures raised by the pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Schema validation failed for {} record(s): {}", .failures.len(), format_failures(.failures))]
    SchemaValidation { failures: Vec<FieldFailure> },

    #[error("Grain {table} is not unique")]
    GrainValidation { table: String },

    #[error("Audits failed for table {table}: {audits}")]
    AuditFailed { table: String, audits: String },

    #[error("Watermark value '{value}' is not a valid integer")]
    WatermarkInvalid { value: String },
}

fn format_failures(failures: &[FieldFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SchemaValidation { .. } => "schema_validation_failed",
            Self::GrainValidation { .. } => "grain_validation_failed",
            Self::AuditFailed { .. } => "audit_failed",
            Self::WatermarkInvalid { .. } => "watermark_invalid",
        }
    }
}
