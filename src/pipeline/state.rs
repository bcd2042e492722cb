use crate::errors::classification::EXIT_HARNESS_ERROR;
use crate::report::document::SummaryRecord;
use crate::models::Classification;

pub const EXIT_OK: i32 = 0;
pub const EXIT_STRICT_INCONCLUSIVE: i32 = 1;

/// Worst outcome wins: any harness error gives 2; otherwise, under `strict`,
/// any inconclusive gives 1; otherwise 0.
///
/// Illustrative examples only fail a strict run when their oracle did not match,
/// which already classifies them as inconclusive.
pub fn exit_code(summary: &SummaryRecord, strict: bool) -> i32 {
    if summary.count(Classification::HarnessError) > 0 {
        EXIT_HARNESS_ERROR
    } else if strict && summary.count(Classification::Inconclusive) > 0 {
        EXIT_STRICT_INCONCLUSIVE
    } else {
        EXIT_OK
    }
}
