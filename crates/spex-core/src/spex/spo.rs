use crate::domain::{CheckReport, SpexError, SpexResult};
use crate::table::{Column, Table, TabularStore};
use std::ops::Range;

/// Mask selecting one region inside a multi-region [`Spectrum`]: the row in
/// the region table and the contiguous slice of the per-channel arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumRegionMask {
    pub region_row: usize,
    pub channels: Range<usize>,
}

/// A SPEX spectrum file in memory: a per-region channel-count table plus
/// flat per-channel arrays concatenated across regions in region order.
///
/// Region slices are only ever derived through [`Spectrum::get_region_mask`];
/// nothing else may index across region boundaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    /// Channels per region (the SPEX_REGIONS table).
    pub region_channels: Vec<usize>,

    /// Lower energy bound per channel (keV).
    pub energy_low: Vec<f64>,
    /// Upper energy bound per channel (keV).
    pub energy_high: Vec<f64>,
    /// Exposure time per channel (s).
    pub exposure: Vec<f64>,
    /// Background-subtracted source rate (counts/s).
    pub source_rate: Vec<f64>,
    /// Statistical error on the source rate (counts/s).
    pub source_rate_error: Vec<f64>,
    /// Subtracted background rate (counts/s).
    pub back_rate: Vec<f64>,
    /// Statistical error on the background rate (counts/s).
    pub back_rate_error: Vec<f64>,
    /// Exposure-backscale ratio between background and source.
    pub backscale_ratio: Vec<f64>,
    /// Systematic error fraction on the source rate.
    pub sys_source: Vec<f64>,
    /// Systematic error fraction on the background rate.
    pub sys_back: Vec<f64>,
    /// Channel participates in fits.
    pub used: Vec<bool>,
    /// First channel of a bin (or an unbinned channel).
    pub first: Vec<bool>,
    /// Last channel of a bin (or an unbinned channel).
    pub last: Vec<bool>,

    /// Whether the optional backscale-ratio column was present in the file.
    pub backscale_ratio_present: bool,
    /// Channel order was flipped from wavelength to energy order.
    pub swapped: bool,
}

impl Spectrum {
    /// A single-region spectrum of `channels` zeroed channels with all
    /// bookkeeping flags set, ready to be filled channel by channel.
    pub fn zeroed(channels: usize) -> Self {
        Self {
            region_channels: vec![channels],
            energy_low: vec![0.0; channels],
            energy_high: vec![0.0; channels],
            exposure: vec![0.0; channels],
            source_rate: vec![0.0; channels],
            source_rate_error: vec![0.0; channels],
            back_rate: vec![0.0; channels],
            back_rate_error: vec![0.0; channels],
            backscale_ratio: vec![0.0; channels],
            sys_source: vec![0.0; channels],
            sys_back: vec![0.0; channels],
            used: vec![true; channels],
            first: vec![true; channels],
            last: vec![true; channels],
            backscale_ratio_present: false,
            swapped: false,
        }
    }

    pub fn region_count(&self) -> usize {
        self.region_channels.len()
    }

    pub fn channel_count(&self) -> usize {
        self.region_channels.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.region_channels.is_empty()
    }

    /// Locate region `region` (1-based). The channel slice is the cumulative
    /// sum of the channel counts of all preceding regions.
    pub fn get_region_mask(&self, region: usize) -> SpexResult<SpectrumRegionMask> {
        if region < 1 || region > self.region_count() {
            return Err(SpexError::RegionNotFound { sector: 1, region });
        }
        let start: usize = self.region_channels[..region - 1].iter().sum();
        let end = start + self.region_channels[region - 1];
        Ok(SpectrumRegionMask {
            region_row: region - 1,
            channels: start..end,
        })
    }

    /// Copy out one region as a fresh single-region spectrum.
    pub fn extract_region(&self, region: usize) -> SpexResult<Spectrum> {
        let mask = self.get_region_mask(region)?;
        let range = mask.channels;
        let extracted = Spectrum {
            region_channels: vec![self.region_channels[mask.region_row]],
            energy_low: self.energy_low[range.clone()].to_vec(),
            energy_high: self.energy_high[range.clone()].to_vec(),
            exposure: self.exposure[range.clone()].to_vec(),
            source_rate: self.source_rate[range.clone()].to_vec(),
            source_rate_error: self.source_rate_error[range.clone()].to_vec(),
            back_rate: self.back_rate[range.clone()].to_vec(),
            back_rate_error: self.back_rate_error[range.clone()].to_vec(),
            backscale_ratio: self.backscale_ratio[range.clone()].to_vec(),
            sys_source: self.sys_source[range.clone()].to_vec(),
            sys_back: self.sys_back[range.clone()].to_vec(),
            used: self.used[range.clone()].to_vec(),
            first: self.first[range.clone()].to_vec(),
            last: self.last[range].to_vec(),
            backscale_ratio_present: self.backscale_ratio_present,
            swapped: self.swapped,
        };
        extracted.check().into_result("extracted spectrum region")?;
        Ok(extracted)
    }

    /// Append region `region` of `other` to this spectrum.
    pub fn concatenate(&mut self, other: &Spectrum, region: usize) -> SpexResult<()> {
        let mask = other.get_region_mask(region)?;
        if self.is_empty() {
            self.backscale_ratio_present = other.backscale_ratio_present;
        } else if self.backscale_ratio_present != other.backscale_ratio_present {
            return Err(SpexError::IncompatibleSpectrum {
                detail: "backscale-ratio column present in one spectrum but not the other"
                    .to_string(),
            });
        }
        let range = mask.channels;
        self.region_channels.push(other.region_channels[mask.region_row]);
        self.energy_low.extend_from_slice(&other.energy_low[range.clone()]);
        self.energy_high.extend_from_slice(&other.energy_high[range.clone()]);
        self.exposure.extend_from_slice(&other.exposure[range.clone()]);
        self.source_rate.extend_from_slice(&other.source_rate[range.clone()]);
        self.source_rate_error
            .extend_from_slice(&other.source_rate_error[range.clone()]);
        self.back_rate.extend_from_slice(&other.back_rate[range.clone()]);
        self.back_rate_error
            .extend_from_slice(&other.back_rate_error[range.clone()]);
        self.backscale_ratio
            .extend_from_slice(&other.backscale_ratio[range.clone()]);
        self.sys_source.extend_from_slice(&other.sys_source[range.clone()]);
        self.sys_back.extend_from_slice(&other.sys_back[range.clone()]);
        self.used.extend_from_slice(&other.used[range.clone()]);
        self.first.extend_from_slice(&other.first[range.clone()]);
        self.last.extend_from_slice(&other.last[range]);
        Ok(())
    }

    /// Remove region `region`, shifting later regions down.
    pub fn delete_region(&mut self, region: usize) -> SpexResult<()> {
        let mask = self.get_region_mask(region)?;
        let range = mask.channels;
        self.region_channels.remove(mask.region_row);
        self.energy_low.drain(range.clone());
        self.energy_high.drain(range.clone());
        self.exposure.drain(range.clone());
        self.source_rate.drain(range.clone());
        self.source_rate_error.drain(range.clone());
        self.back_rate.drain(range.clone());
        self.back_rate_error.drain(range.clone());
        self.backscale_ratio.drain(range.clone());
        self.sys_source.drain(range.clone());
        self.sys_back.drain(range.clone());
        self.used.drain(range.clone());
        self.first.drain(range.clone());
        self.last.drain(range);
        Ok(())
    }

    /// Flip all per-channel arrays between wavelength and energy order.
    /// Only defined for single-region spectra: a flat reverse across region
    /// boundaries would interleave regions.
    pub fn swap_channel_order(&mut self) -> SpexResult<()> {
        if self.region_count() > 1 {
            return Err(SpexError::IncompatibleSpectrum {
                detail: format!(
                    "channel order swap requires a single region, spectrum has {}",
                    self.region_count()
                ),
            });
        }
        self.energy_low.reverse();
        self.energy_high.reverse();
        self.exposure.reverse();
        self.source_rate.reverse();
        self.source_rate_error.reverse();
        self.back_rate.reverse();
        self.back_rate_error.reverse();
        self.backscale_ratio.reverse();
        self.sys_source.reverse();
        self.sys_back.reverse();
        self.used.reverse();
        self.first.reverse();
        self.last.reverse();
        self.swapped = !self.swapped;
        Ok(())
    }

    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::new();
        let total = self.channel_count();
        for (name, len) in [
            ("energy_low", self.energy_low.len()),
            ("energy_high", self.energy_high.len()),
            ("exposure", self.exposure.len()),
            ("source_rate", self.source_rate.len()),
            ("source_rate_error", self.source_rate_error.len()),
            ("back_rate", self.back_rate.len()),
            ("back_rate_error", self.back_rate_error.len()),
            ("backscale_ratio", self.backscale_ratio.len()),
            ("sys_source", self.sys_source.len()),
            ("sys_back", self.sys_back.len()),
            ("used", self.used.len()),
            ("first", self.first.len()),
            ("last", self.last.len()),
        ] {
            if len != total {
                report.add(format!(
                    "{name} array has length {len}, region table requires {total}"
                ));
            }
        }
        if !report.is_ok() {
            // Per-channel checks would index out of bounds.
            return report;
        }

        let mut start = 0;
        for (region_index, channels) in self.region_channels.iter().copied().enumerate() {
            for offset in 0..channels {
                let channel = start + offset;
                let bin = offset + 1;
                let region = region_index + 1;
                if self.energy_high[channel] <= self.energy_low[channel] {
                    report.add(format!(
                        "bin {bin} in region {region} does not have a positive width"
                    ));
                }
                if self.energy_low[channel] < 0.0 {
                    report.add(format!(
                        "bin {bin} in region {region} has a negative lower limit"
                    ));
                }
                if self.source_rate_error[channel] < 0.0 {
                    report.add(format!("bin {bin} in region {region} has a negative error"));
                }
                if self.sys_source[channel] < 0.0 {
                    report.add(format!(
                        "bin {bin} in region {region} has a negative systematic error"
                    ));
                }
                if self.sys_back[channel] < 0.0 {
                    report.add(format!(
                        "bin {bin} in region {region} has a negative background systematic error"
                    ));
                }
                if self.exposure[channel] < 0.0 {
                    report.add(format!(
                        "bin {bin} in region {region} has a negative exposure time"
                    ));
                }
            }
            start += channels;
        }
        report
    }

    /// Read a spectrum from the SPEX_REGIONS and SPEX_SPECTRUM tables.
    pub fn read_from(store: &dyn TabularStore) -> SpexResult<Self> {
        let regions = store.read_table("SPEX_REGIONS")?;
        let region_channels: Vec<usize> = regions
            .int_column("NCHAN")?
            .iter()
            .map(|count| *count as usize)
            .collect();

        let spectrum = store.read_table("SPEX_SPECTRUM")?;
        let (backscale_ratio, backscale_ratio_present) =
            match spectrum.optional_float_column("Exp_Rate")? {
                Some(column) => (column.to_vec(), true),
                None => (vec![1.0; spectrum.rows()?], false),
            };

        let result = Self {
            region_channels,
            energy_low: spectrum.float_column("Lower_Energy")?.to_vec(),
            energy_high: spectrum.float_column("Upper_Energy")?.to_vec(),
            exposure: spectrum.float_column("Exposure_Time")?.to_vec(),
            source_rate: spectrum.float_column("Source_Rate")?.to_vec(),
            source_rate_error: spectrum.float_column("Err_Source_Rate")?.to_vec(),
            back_rate: spectrum.float_column("Back_Rate")?.to_vec(),
            back_rate_error: spectrum.float_column("Err_Back_Rate")?.to_vec(),
            backscale_ratio,
            sys_source: spectrum.float_column("Sys_Source")?.to_vec(),
            sys_back: spectrum.float_column("Sys_Back")?.to_vec(),
            used: spectrum.bool_column("Used")?.to_vec(),
            first: spectrum.bool_column("First")?.to_vec(),
            last: spectrum.bool_column("Last")?.to_vec(),
            backscale_ratio_present,
            swapped: false,
        };
        Ok(result)
    }

    /// Write the spectrum; `exp_rate` controls whether the optional
    /// backscale-ratio column is emitted. A failing [`Spectrum::check`] is
    /// fatal and nothing is written.
    pub fn write_to(&self, store: &mut dyn TabularStore, exp_rate: bool) -> SpexResult<()> {
        self.check().into_result("spectrum")?;

        let regions = Table::new("SPEX_REGIONS").with_column(
            "NCHAN",
            Column::Int(self.region_channels.iter().map(|count| *count as i64).collect()),
        );
        store.write_table(regions)?;

        let mut spectrum = Table::new("SPEX_SPECTRUM")
            .with_column("Lower_Energy", Column::Float(self.energy_low.clone()))
            .with_column("Upper_Energy", Column::Float(self.energy_high.clone()))
            .with_column("Exposure_Time", Column::Float(self.exposure.clone()))
            .with_column("Source_Rate", Column::Float(self.source_rate.clone()))
            .with_column("Err_Source_Rate", Column::Float(self.source_rate_error.clone()))
            .with_column("Back_Rate", Column::Float(self.back_rate.clone()))
            .with_column("Err_Back_Rate", Column::Float(self.back_rate_error.clone()))
            .with_column("Sys_Source", Column::Float(self.sys_source.clone()))
            .with_column("Sys_Back", Column::Float(self.sys_back.clone()))
            .with_column("Used", Column::Bool(self.used.clone()))
            .with_column("First", Column::Bool(self.first.clone()))
            .with_column("Last", Column::Bool(self.last.clone()));
        if exp_rate {
            spectrum = spectrum.with_column("Exp_Rate", Column::Float(self.backscale_ratio.clone()));
        }
        store.write_table(spectrum)?;
        Ok(())
    }
}
