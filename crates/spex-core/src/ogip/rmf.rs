use crate::domain::{CheckReport, SpexError, SpexResult};
use crate::ogip::Arf;
use crate::table::{TableResult, TabularStore};
use tracing::warn;

/// An OGIP redistribution matrix: the EBOUNDS channel-energy table plus the
/// grouped matrix, flattened into parallel per-group and per-element arrays.
#[derive(Debug, Clone, Default)]
pub struct Rmf {
    pub first_channel: i64,
    pub channel: Vec<i64>,
    pub channel_low_energy: Vec<f64>,
    pub channel_high_energy: Vec<f64>,
    pub channel_count: usize,

    pub low_energy: Vec<f64>,
    pub high_energy: Vec<f64>,
    pub group_count: Vec<usize>,
    pub energy_bin_count: usize,

    pub first_channel_group: Vec<i64>,
    pub channels_per_group: Vec<usize>,
    pub total_group_count: usize,

    pub matrix: Vec<f64>,
    pub total_element_count: usize,

    pub energy_units: String,
    pub area_included: bool,
}

impl Rmf {
    /// Read a response matrix from the EBOUNDS and MATRIX tables of `store`.
    /// A `SPECRESP MATRIX` table (effective area folded in) is accepted with
    /// a warning.
    pub fn read_from(store: &dyn TabularStore) -> SpexResult<Self> {
        let ebounds = store.read_table("EBOUNDS")?;
        let channel = ebounds.int_column("CHANNEL")?.to_vec();
        let channel_low_energy = ebounds.float_column("E_MIN")?.to_vec();
        let channel_high_energy = ebounds.float_column("E_MAX")?.to_vec();
        let channel_count = channel.len();
        let first_channel = channel.first().copied().unwrap_or(0);

        let (matrix_table, area_included) = match store.read_table("MATRIX") {
            Ok(table) => (table, false),
            Err(_) => {
                let table = store.read_table("SPECRESP MATRIX")?;
                warn!("response file has the effective area folded in; do not apply a separate area curve");
                (table, true)
            }
        };

        let low_energy = matrix_table.float_column("ENERG_LO")?.to_vec();
        let high_energy = matrix_table.float_column("ENERG_HI")?.to_vec();
        let energy_bin_count = low_energy.len();
        let energy_units = matrix_table
            .optional_text_header("TUNIT1")?
            .unwrap_or("keV")
            .to_string();

        let group_count: Vec<usize> = matrix_table
            .int_column("N_GRP")?
            .iter()
            .map(|count| *count as usize)
            .collect();
        let first_channel_rows = matrix_table.int_array_column("F_CHAN")?;
        let channels_per_group_rows = matrix_table.int_array_column("N_CHAN")?;
        let matrix_rows = matrix_table.float_array_column("MATRIX")?;

        // Flatten the per-bin variable-length sub-arrays into the parallel
        // group/element arrays used by the conversion.
        let mut first_channel_group = Vec::new();
        let mut channels_per_group = Vec::new();
        let mut matrix = Vec::new();
        for (bin, bin_groups) in group_count.iter().copied().enumerate() {
            if first_channel_rows[bin].len() < bin_groups || channels_per_group_rows[bin].len() < bin_groups
            {
                return Err(SpexError::format(
                    "MATRIX",
                    format!("energy bin {bin} declares {bin_groups} groups but carries fewer group entries"),
                ));
            }
            let mut bin_elements = 0;
            for group in 0..bin_groups {
                first_channel_group.push(first_channel_rows[bin][group]);
                let width = channels_per_group_rows[bin][group] as usize;
                channels_per_group.push(width);
                bin_elements += width;
            }
            if matrix_rows[bin].len() < bin_elements {
                return Err(SpexError::format(
                    "MATRIX",
                    format!(
                        "energy bin {bin} declares {bin_elements} elements but carries {}",
                        matrix_rows[bin].len()
                    ),
                ));
            }
            matrix.extend_from_slice(&matrix_rows[bin][..bin_elements]);
        }

        let total_group_count = first_channel_group.len();
        let total_element_count = matrix.len();

        Ok(Self {
            first_channel,
            channel,
            channel_low_energy,
            channel_high_energy,
            channel_count,
            low_energy,
            high_energy,
            group_count,
            energy_bin_count,
            first_channel_group,
            channels_per_group,
            total_group_count,
            matrix,
            total_element_count,
            energy_units,
            area_included,
        })
    }

    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::new();
        if self.channel_count == 0 {
            report.add("number of channels is zero");
        }
        if self.energy_bin_count == 0 {
            report.add("number of energy bins is zero");
        }
        let declared_groups: usize = self.group_count.iter().sum();
        if declared_groups != self.total_group_count {
            report.add(format!(
                "group index arrays describe {declared_groups} groups, matrix holds {}",
                self.total_group_count
            ));
        }
        let declared_elements: usize = self.channels_per_group.iter().sum();
        if declared_elements != self.matrix.len() {
            report.add(format!(
                "group widths describe {declared_elements} matrix elements, matrix holds {}",
                self.matrix.len()
            ));
        }
        if self.channel_low_energy.len() != self.channel_count
            || self.channel_high_energy.len() != self.channel_count
        {
            report.add("channel energy bound arrays do not match the channel count");
        }
        report
    }

    /// An effective area curve must share the response's energy grid. The
    /// first and last high bounds are compared rather than the low bounds
    /// because the first low bound is occasionally clamped differently.
    pub fn check_compatibility(&self, area: &Arf) -> SpexResult<()> {
        if area.low_energy.len() != self.low_energy.len() {
            return Err(SpexError::IncompatibleMatrix {
                detail: format!(
                    "effective area has {} bins, response has {}",
                    area.low_energy.len(),
                    self.low_energy.len()
                ),
            });
        }
        if self.high_energy.is_empty() {
            return Ok(());
        }
        let last = self.high_energy.len() - 1;
        if area.high_energy[0] != self.high_energy[0] || area.high_energy[last] != self.high_energy[last]
        {
            return Err(SpexError::IncompatibleMatrix {
                detail: "effective area energy grid does not match the response grid".to_string(),
            });
        }
        Ok(())
    }

    /// Convenience for tests and the EBOUNDS writer: write this matrix to a
    /// store in the grouped source layout.
    pub fn write_to(&self, store: &mut dyn TabularStore) -> TableResult<()> {
        use crate::table::{Column, HeaderValue, Table};

        let ebounds = Table::new("EBOUNDS")
            .with_header("DETCHANS", HeaderValue::Int(self.channel_count as i64))
            .with_column("CHANNEL", Column::Int(self.channel.clone()))
            .with_column("E_MIN", Column::Float(self.channel_low_energy.clone()))
            .with_column("E_MAX", Column::Float(self.channel_high_energy.clone()));
        store.write_table(ebounds)?;

        let mut first_channel_rows = Vec::with_capacity(self.energy_bin_count);
        let mut width_rows = Vec::with_capacity(self.energy_bin_count);
        let mut matrix_rows = Vec::with_capacity(self.energy_bin_count);
        let mut group = 0;
        let mut element = 0;
        for bin_groups in self.group_count.iter().copied() {
            let mut bin_first = Vec::with_capacity(bin_groups);
            let mut bin_width = Vec::with_capacity(bin_groups);
            let mut bin_matrix = Vec::new();
            for _ in 0..bin_groups {
                bin_first.push(self.first_channel_group[group]);
                let width = self.channels_per_group[group];
                bin_width.push(width as i64);
                bin_matrix.extend_from_slice(&self.matrix[element..element + width]);
                element += width;
                group += 1;
            }
            first_channel_rows.push(bin_first);
            width_rows.push(bin_width);
            matrix_rows.push(bin_matrix);
        }

        let matrix = Table::new("MATRIX")
            .with_header("DETCHANS", HeaderValue::Int(self.channel_count as i64))
            .with_header("TUNIT1", HeaderValue::Text(self.energy_units.clone()))
            .with_column("ENERG_LO", Column::Float(self.low_energy.clone()))
            .with_column("ENERG_HI", Column::Float(self.high_energy.clone()))
            .with_column(
                "N_GRP",
                Column::Int(self.group_count.iter().map(|count| *count as i64).collect()),
            )
            .with_column("F_CHAN", Column::IntArrays(first_channel_rows))
            .with_column("N_CHAN", Column::IntArrays(width_rows))
            .with_column("MATRIX", Column::FloatArrays(matrix_rows));
        store.write_table(matrix)
    }
}
