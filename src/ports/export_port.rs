//! Range export port.

use crate::domain::error::RangeError;
use crate::domain::merger::MergedRange;
use crate::domain::scanner::CandidateRange;

/// Port for writing the latest computed ranges somewhere outside the process.
pub trait RangeExportPort {
    fn write_ranges(
        &self,
        symbol: &str,
        body_ranges: &[CandidateRange],
        merged_ranges: &[MergedRange],
    ) -> Result<(), RangeError>;
}
