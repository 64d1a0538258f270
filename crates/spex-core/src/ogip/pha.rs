use crate::domain::{CheckReport, SpexError, SpexResult};
use crate::ogip::Rmf;
use crate::table::{Table, TabularStore};
use tracing::warn;

/// Whether the spectrum column stores accumulated counts or a count rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Count,
    Rate,
}

impl DataType {
    fn from_header(value: &str) -> Self {
        if value.eq_ignore_ascii_case("RATE") {
            Self::Rate
        } else {
            Self::Count
        }
    }
}

/// An OGIP pulse-height spectrum. Counts are normalised to rates on read so
/// the conversion engine only ever sees counts per second.
#[derive(Debug, Clone, Default)]
pub struct Pha {
    pub first_channel: i64,
    pub channel_count: usize,
    pub channel: Vec<i64>,
    pub rate: Vec<f64>,
    pub stat_error: Vec<f64>,
    pub sys_error: Vec<f64>,
    pub quality: Vec<i64>,
    pub grouping: Vec<i64>,
    pub area_scaling: Vec<f64>,
    pub back_scaling: Vec<f64>,
    pub exposure: f64,
    pub poisson_errors: bool,
    pub data_type: DataType,
    pub spectrum_type: String,
}

impl Pha {
    /// Read a spectrum from the SPECTRUM table of `store`.
    pub fn read_from(store: &dyn TabularStore) -> SpexResult<Self> {
        let table = store.read_table("SPECTRUM")?;
        Self::from_table(&table)
    }

    pub fn from_table(table: &Table) -> SpexResult<Self> {
        let channel_count = table.int_header("DETCHANS")? as usize;
        let exposure = table.float_header("EXPOSURE")?;
        let data_type = DataType::from_header(table.optional_text_header("HDUCLAS3")?.unwrap_or("COUNT"));
        let spectrum_type = table
            .optional_text_header("HDUCLAS2")?
            .unwrap_or("TOTAL")
            .to_string();
        let poisson_errors = if table.has_header("POISSERR") {
            table.bool_header("POISSERR")?
        } else {
            false
        };

        let channel = table.int_column("CHANNEL")?.to_vec();
        if channel.len() != channel_count {
            return Err(SpexError::ArrayLengthMismatch {
                array: "CHANNEL",
                declared: channel_count,
                actual: channel.len(),
            });
        }
        let first_channel = channel.first().copied().unwrap_or(0);

        let rate = match data_type {
            DataType::Rate => table.float_column("RATE")?.to_vec(),
            DataType::Count => {
                if exposure <= 0.0 {
                    return Err(SpexError::format(
                        "SPECTRUM",
                        format!("COUNT data with non-positive exposure {exposure}"),
                    ));
                }
                table
                    .float_column("COUNTS")?
                    .iter()
                    .map(|counts| counts / exposure)
                    .collect()
            }
        };

        let stat_error = if poisson_errors {
            rate.iter()
                .map(|rate| (rate.max(0.0) / exposure).sqrt())
                .collect()
        } else {
            match table.optional_float_column("STAT_ERR")? {
                Some(errors) => match data_type {
                    DataType::Rate => errors.to_vec(),
                    DataType::Count => errors.iter().map(|error| error / exposure).collect(),
                },
                None => {
                    warn!("no Poisson errors and no STAT_ERR column; statistical errors set to 0");
                    vec![0.0; channel_count]
                }
            }
        };

        let mut sys_error = match table.optional_float_column("SYS_ERR")? {
            Some(errors) => errors.to_vec(),
            None => vec![0.0; channel_count],
        };
        if data_type == DataType::Rate {
            for error in &mut sys_error {
                *error /= exposure;
            }
        }

        let quality = match table.optional_int_column("QUALITY")? {
            Some(flags) => flags.to_vec(),
            None => vec![0; channel_count],
        };
        let grouping = match table.optional_int_column("GROUPING")? {
            Some(flags) => flags.to_vec(),
            None => vec![0; channel_count],
        };

        let area_scaling = Self::scaling_column(table, "AREASCAL", channel_count)?;
        let back_scaling = Self::scaling_column(table, "BACKSCAL", channel_count)?;

        Ok(Self {
            first_channel,
            channel_count,
            channel,
            rate,
            stat_error,
            sys_error,
            quality,
            grouping,
            area_scaling,
            back_scaling,
            exposure,
            poisson_errors,
            data_type,
            spectrum_type,
        })
    }

    // Scaling factors appear either as a per-channel column or as a scalar
    // header broadcast over all channels.
    fn scaling_column(table: &Table, name: &str, channel_count: usize) -> SpexResult<Vec<f64>> {
        if let Some(column) = table.optional_float_column(name)? {
            return Ok(column.to_vec());
        }
        if table.has_header(name) {
            return Ok(vec![table.float_header(name)?; channel_count]);
        }
        Ok(vec![1.0; channel_count])
    }

    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::new();
        if self.exposure <= 0.0 {
            report.add(format!(
                "exposure time is not positive ({})",
                self.exposure
            ));
        }
        if self.channel_count == 0 {
            report.add("number of channels is zero");
        }
        if self.rate.is_empty() {
            report.add("rate array is empty");
        }
        for (name, len) in [
            ("rate", self.rate.len()),
            ("stat_error", self.stat_error.len()),
            ("sys_error", self.sys_error.len()),
            ("quality", self.quality.len()),
            ("grouping", self.grouping.len()),
            ("area_scaling", self.area_scaling.len()),
            ("back_scaling", self.back_scaling.len()),
        ] {
            if len != self.channel_count {
                report.add(format!(
                    "{name} array has length {len}, expected {}",
                    self.channel_count
                ));
            }
        }
        report
    }

    /// Equal channel counts are required before spectra can be combined.
    pub fn check_compatibility(&self, other: &Pha) -> SpexResult<()> {
        if self.channel_count != other.channel_count {
            return Err(SpexError::IncompatibleSpectrum {
                detail: format!(
                    "channel counts differ ({} vs {})",
                    self.channel_count, other.channel_count
                ),
            });
        }
        Ok(())
    }

    /// Diagnostic unit-rate spectrum over the channels of `rmf`, used when
    /// simulating a response without observed data.
    pub fn create_dummy(rmf: &Rmf) -> Self {
        let channel_count = rmf.channel_count;
        let exposure = 1000.0;
        Self {
            first_channel: rmf.first_channel,
            channel_count,
            channel: rmf.channel.clone(),
            rate: vec![1.0 / exposure; channel_count],
            stat_error: vec![1.0 / exposure; channel_count],
            sys_error: vec![0.0; channel_count],
            quality: vec![0; channel_count],
            grouping: vec![0; channel_count],
            area_scaling: vec![1.0; channel_count],
            back_scaling: vec![1.0; channel_count],
            exposure,
            poisson_errors: true,
            data_type: DataType::Rate,
            spectrum_type: "TOTAL".to_string(),
        }
    }
}
