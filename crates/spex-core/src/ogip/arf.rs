use crate::domain::{CheckReport, SpexResult};
use crate::table::TabularStore;
use tracing::warn;

/// An OGIP effective area curve (one area value per model energy bin).
#[derive(Debug, Clone, Default)]
pub struct Arf {
    pub low_energy: Vec<f64>,
    pub high_energy: Vec<f64>,
    pub effective_area: Vec<f64>,
    pub energy_units: String,
    pub area_units: String,
}

impl Arf {
    /// Read the effective area from the SPECRESP table of `store`.
    pub fn read_from(store: &dyn TabularStore) -> SpexResult<Self> {
        let table = store.read_table("SPECRESP")?;

        let low_energy = table.float_column("ENERG_LO")?.to_vec();
        let high_energy = table.float_column("ENERG_HI")?.to_vec();
        let mut effective_area = table.float_column("SPECRESP")?.to_vec();

        let energy_units = table.optional_text_header("TUNIT1")?.unwrap_or("keV").to_string();
        let area_units = match table.optional_text_header("TUNIT3")? {
            Some("cm**2") | Some("cm2") | None => "cm2".to_string(),
            Some(other) => {
                warn!(units = other, "effective area units are not recognised");
                other.to_string()
            }
        };

        // NULL/NaN areas happen in real files; treat them as dead bins.
        let mut nulls = 0;
        for area in &mut effective_area {
            if area.is_nan() {
                *area = 0.0;
                nulls += 1;
            }
        }
        if nulls > 0 {
            warn!(count = nulls, "effective area contained NULL values, set to 0");
        }

        Ok(Self {
            low_energy,
            high_energy,
            effective_area,
            energy_units,
            area_units,
        })
    }

    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::new();
        if self.low_energy.is_empty() {
            report.add("energy array has zero length");
        }
        if self.effective_area.is_empty() {
            report.add("effective area array has zero length");
        }
        if self.low_energy.len() != self.high_energy.len()
            || self.low_energy.len() != self.effective_area.len()
        {
            report.add(format!(
                "energy and area arrays have unequal lengths ({}, {}, {})",
                self.low_energy.len(),
                self.high_energy.len(),
                self.effective_area.len()
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::Arf;
    use crate::table::{Column, HeaderValue, JsonTabularStore, Table, TabularStore};

    fn arf_store(area: Vec<f64>) -> JsonTabularStore {
        let mut store = JsonTabularStore::new();
        store
            .write_table(
                Table::new("SPECRESP")
                    .with_header("TUNIT1", HeaderValue::Text("keV".to_string()))
                    .with_header("TUNIT3", HeaderValue::Text("cm**2".to_string()))
                    .with_column("ENERG_LO", Column::Float(vec![0.1, 0.2]))
                    .with_column("ENERG_HI", Column::Float(vec![0.2, 0.3]))
                    .with_column("SPECRESP", Column::Float(area)),
            )
            .expect("write arf table");
        store
    }

    #[test]
    fn area_is_read_with_normalised_units() {
        let arf = Arf::read_from(&arf_store(vec![10.0, 12.0])).expect("read arf");
        assert_eq!(arf.effective_area, vec![10.0, 12.0]);
        assert_eq!(arf.area_units, "cm2");
        assert!(arf.check().is_ok());
    }

    #[test]
    fn null_areas_are_zeroed() {
        let arf = Arf::read_from(&arf_store(vec![f64::NAN, 12.0])).expect("read arf");
        assert_eq!(arf.effective_area, vec![0.0, 12.0]);
    }

    #[test]
    fn check_reports_empty_arrays() {
        let arf = Arf::default();
        assert!(!arf.check().is_ok());
    }
}
