use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::PlagiarismReport;
use crate::db::types::{Language, PlagiarismStatus};

#[derive(Debug, Deserialize)]
pub(crate) struct TriggerPlagiarismRequest {
    pub(crate) language: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlagiarismReportResponse {
    pub(crate) id: String,
    pub(crate) problem_id: i64,
    pub(crate) language: Language,
    pub(crate) status: PlagiarismStatus,
    pub(crate) report_url: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: String,
    pub(crate) finished_at: Option<String>,
}

pub(crate) fn to_report_response(report: PlagiarismReport) -> PlagiarismReportResponse {
    PlagiarismReportResponse {
        id: report.id,
        problem_id: report.problem_id,
        language: report.language,
        status: report.status,
        report_url: report.report_url,
        error: report.error,
        created_at: format_primitive(report.created_at),
        finished_at: report.finished_at.map(format_primitive),
    }
}
