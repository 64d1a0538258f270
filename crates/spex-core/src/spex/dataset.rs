use crate::domain::{RegionKey, SpexError, SpexResult};
use crate::spex::{Region, ResponseMatrix, Spectrum};
use crate::table::TabularStore;

/// An ordered collection of [`Region`]s together with the (sector, region)
/// key table describing how they appear in a file pair. Append-only apart
/// from explicit renumbering through [`Dataset::append_region`].
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub regions: Vec<Region>,
    /// One (sector, region) key per dataset entry, in file order.
    pub config: Vec<RegionKey>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Read one region from a spo/res store pair and append it.
    pub fn read_region(
        &mut self,
        sector: usize,
        region: usize,
        spo_store: &dyn TabularStore,
        res_store: &dyn TabularStore,
        label: &str,
    ) -> SpexResult<()> {
        let spectrum = Spectrum::read_from(spo_store)?;
        let response = ResponseMatrix::read_from(res_store)?;

        let mut entry = Region::new(
            spectrum.extract_region(region)?,
            response.extract_region(sector, region)?,
        )
        .with_label(label);

        // Renumber into this dataset's key space; extraction reset the ids
        // to sector 1, region 1.
        let key = RegionKey::new(sector, self.regions.len() + 1);
        entry.set_sector(key.sector);
        entry.set_region(key.region);
        entry.check(true).into_result("dataset region")?;

        self.config.push(key);
        self.regions.push(entry);
        Ok(())
    }

    /// Read every region of a spo/res store pair in file order.
    pub fn read_all_regions(
        &mut self,
        spo_store: &dyn TabularStore,
        res_store: &dyn TabularStore,
    ) -> SpexResult<()> {
        let spectrum = Spectrum::read_from(spo_store)?;
        let response = ResponseMatrix::read_from(res_store)?;

        if spectrum.region_count() != response.region_count {
            return Err(SpexError::format(
                "SPEX_REGIONS",
                format!(
                    "spo holds {} regions, res holds {}",
                    spectrum.region_count(),
                    response.region_count
                ),
            ));
        }

        let keys = derive_config(&response);
        for (index, key) in keys.iter().enumerate() {
            let mut entry = Region::new(
                spectrum.extract_region(index + 1)?,
                response.extract_region(key.sector, key.region)?,
            );
            entry.set_sector(key.sector);
            entry.set_region(key.region);
            entry.check(true).into_result("dataset region")?;
            self.regions.push(entry);
            self.config.push(*key);
        }
        Ok(())
    }

    /// Append an in-memory region under an explicit (sector, region) key.
    pub fn append_region(&mut self, mut region: Region, key: RegionKey) -> SpexResult<()> {
        if self.config.contains(&key) {
            return Err(SpexError::IncompatibleMatrix {
                detail: format!("dataset already holds a region keyed {key}"),
            });
        }
        region.set_sector(key.sector);
        region.set_region(key.region);
        self.config.push(key);
        self.regions.push(region);
        Ok(())
    }

    /// Write one dataset entry (1-based) to a spo/res store pair.
    pub fn write_region(
        &self,
        entry: usize,
        spo_store: &mut dyn TabularStore,
        res_store: &mut dyn TabularStore,
        exp_rate: bool,
    ) -> SpexResult<()> {
        let region = self
            .regions
            .get(entry.wrapping_sub(1))
            .ok_or(SpexError::RegionNotFound {
                sector: 1,
                region: entry,
            })?;
        region.spectrum.write_to(spo_store, exp_rate)?;
        region.response.write_to(res_store)?;
        Ok(())
    }

    /// Concatenate all regions and write them as one spo/res pair.
    pub fn write_all_regions(
        &self,
        spo_store: &mut dyn TabularStore,
        res_store: &mut dyn TabularStore,
        exp_rate: bool,
    ) -> SpexResult<()> {
        let mut spectrum = Spectrum::default();
        let mut response = ResponseMatrix::default();
        for (region, key) in self.regions.iter().zip(self.config.iter()) {
            spectrum.concatenate(&region.spectrum, 1)?;
            response.concatenate_region(&region.response, key.sector, key.region)?;
        }
        spectrum.write_to(spo_store, exp_rate)?;
        response.write_to(res_store)?;
        Ok(())
    }
}

/// Scan the component table for distinct (sector, region) pairs in file
/// order.
pub fn derive_config(response: &ResponseMatrix) -> Vec<RegionKey> {
    let mut keys: Vec<RegionKey> = Vec::new();
    let mut previous: Option<RegionKey> = None;
    for (sector, region) in response.sector.iter().zip(response.region.iter()) {
        let key = RegionKey::new(*sector, *region);
        if previous != Some(key) {
            keys.push(key);
            previous = Some(key);
        }
    }
    keys
}
