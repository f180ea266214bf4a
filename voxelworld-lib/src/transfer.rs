use serde::{Deserialize, Serialize};

/// How an import treats a document whose id already exists at the destination.
#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    #[default]
    Skip,
    Overwrite,
}

#[derive(Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Success,
    PartialFailure,
    Failure,
}

impl OperationStatus {
    pub fn classify(failed: u64, failure: bool) -> Self {
        if failure {
            OperationStatus::Failure
        } else if failed > 0 {
            OperationStatus::PartialFailure
        } else {
            OperationStatus::Success
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub collection: String,
    pub file: String,
    pub exported_count: u64,
    pub skipped_by_filter: u64,
    pub status: OperationStatus,
    pub failure: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub collection: String,
    pub file: String,
    pub total_count: u64,
    pub success_count: u64,
    pub migration_count: u64,
    /// Lines imported unmigrated because their migration failed.
    pub migration_failures: u64,
    pub skipped_by_filter: u64,
    pub skipped_existing: u64,
    /// Documents without a `_class` type tag.
    pub skipped_untyped: u64,
    pub error_count: u64,
    /// 1-based line numbers that could not be imported.
    pub failed_lines: Vec<u64>,
    pub status: OperationStatus,
    pub failure: Option<String>,
}

impl ImportResult {
    pub fn new(collection: &str, file: &str) -> Self {
        Self {
            collection: collection.to_string(),
            file: file.to_string(),
            total_count: 0,
            success_count: 0,
            migration_count: 0,
            migration_failures: 0,
            skipped_by_filter: 0,
            skipped_existing: 0,
            skipped_untyped: 0,
            error_count: 0,
            failed_lines: vec![],
            status: OperationStatus::Success,
            failure: None,
        }
    }
}
