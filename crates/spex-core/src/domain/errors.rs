use crate::table::TableError;

pub type SpexResult<T> = Result<T, SpexError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpexError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("table '{table}' is malformed: {detail}")]
    Format { table: String, detail: String },
    #[error("no response component matches sector {sector}, region {region}")]
    RegionNotFound { sector: usize, region: usize },
    #[error("response matrices are incompatible: {detail}")]
    IncompatibleMatrix { detail: String },
    #[error("spectra are incompatible: {detail}")]
    IncompatibleSpectrum { detail: String },
    #[error("energy grid is discontinuous at bin {bin}: [{low}, {high}] keV")]
    DiscontinuousEnergyGrid { bin: usize, low: f64, high: f64 },
    #[error(
        "channel shift of {shift} moves group {group} outside the valid range 1..={channel_count}"
    )]
    ChannelOutOfRange {
        shift: i64,
        group: usize,
        channel_count: usize,
    },
    #[error("array '{array}' length mismatch: declared {declared}, actual {actual}")]
    ArrayLengthMismatch {
        array: &'static str,
        declared: usize,
        actual: usize,
    },
    #[error("{subject} failed its consistency check:\n{report}")]
    FailedCheck {
        subject: &'static str,
        report: CheckReport,
    },
}

impl SpexError {
    pub fn format(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Format {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub fn failed_check(subject: &'static str, report: CheckReport) -> Self {
        Self::FailedCheck { subject, report }
    }

    /// Stable process exit code for this error kind. Usage and format
    /// problems exit 2, bad keys and incompatible inputs exit 3, violated
    /// internal invariants exit 4.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Table(_) | Self::Format { .. } => 2,
            Self::RegionNotFound { .. }
            | Self::IncompatibleMatrix { .. }
            | Self::IncompatibleSpectrum { .. } => 3,
            Self::DiscontinuousEnergyGrid { .. }
            | Self::ChannelOutOfRange { .. }
            | Self::ArrayLengthMismatch { .. }
            | Self::FailedCheck { .. } => 4,
        }
    }
}

/// Outcome of a `check()`-style validator. Validators collect findings and
/// return them as a value; the caller decides whether a non-empty report is
/// fatal for its purpose.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[must_use]
pub struct CheckReport {
    findings: Vec<String>,
}

impl CheckReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, finding: impl Into<String>) {
        self.findings.push(finding.into());
    }

    pub fn merge(&mut self, other: CheckReport) {
        self.findings.extend(other.findings);
    }

    pub fn is_ok(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings(&self) -> &[String] {
        &self.findings
    }

    /// Turn the report into a result, treating any finding as fatal.
    pub fn into_result(self, subject: &'static str) -> SpexResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SpexError::failed_check(subject, self))
        }
    }
}

impl std::fmt::Display for CheckReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.findings.is_empty() {
            return f.write_str("ok");
        }
        for (index, finding) in self.findings.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {finding}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckReport, SpexError};

    #[test]
    fn exit_codes_are_grouped_by_severity() {
        let format = SpexError::format("SPECTRUM", "missing column RATE");
        assert_eq!(format.exit_code(), 2);

        let key = SpexError::RegionNotFound {
            sector: 1,
            region: 3,
        };
        assert_eq!(key.exit_code(), 3);

        let invariant = SpexError::ArrayLengthMismatch {
            array: "response",
            declared: 10,
            actual: 9,
        };
        assert_eq!(invariant.exit_code(), 4);
    }

    #[test]
    fn empty_report_converts_to_ok() {
        let report = CheckReport::new();
        assert!(report.is_ok());
        report.into_result("spectrum").expect("empty report is ok");
    }

    #[test]
    fn findings_are_preserved_and_fatal_on_request() {
        let mut report = CheckReport::new();
        report.add("bin 3 has zero width");
        report.add("negative error in bin 7");
        assert!(!report.is_ok());
        assert_eq!(report.findings().len(), 2);

        let error = report
            .clone()
            .into_result("spectrum")
            .expect_err("non-empty report is fatal");
        assert_eq!(error.exit_code(), 4);
        let rendered = error.to_string();
        assert!(rendered.contains("bin 3 has zero width"));
        assert!(rendered.contains("negative error in bin 7"));
    }
}
