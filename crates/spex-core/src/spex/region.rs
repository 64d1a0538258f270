use crate::domain::CheckReport;
use crate::spex::{ResponseMatrix, Spectrum};

/// One spectrum/response pairing for a specific observation, instrument, or
/// sky region. The label is a user-facing tag (e.g. "MOS1", "annulus2") and
/// is never written to file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Region {
    pub spectrum: Spectrum,
    pub response: ResponseMatrix,
    pub label: String,
}

impl Region {
    pub fn new(spectrum: Spectrum, response: ResponseMatrix) -> Self {
        Self {
            spectrum,
            response,
            label: String::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Renumber the sector id of every response component. The number of
    /// regions held by the matrix is unchanged.
    pub fn set_sector(&mut self, sector: usize) {
        for component_sector in &mut self.response.sector {
            *component_sector = sector;
        }
    }

    /// Renumber the region id of every response component. The number of
    /// regions held by the matrix is unchanged.
    pub fn set_region(&mut self, region: usize) {
        for component_region in &mut self.response.region {
            *component_region = region;
        }
    }

    /// Verify that spectrum and response agree on the channel count, and
    /// (with `single_region`) that both really hold exactly one region.
    pub fn check(&self, single_region: bool) -> CheckReport {
        let mut report = CheckReport::new();

        let spectrum_channels = self.spectrum.region_channels.first().copied();
        let response_channels = self.response.component_channels.first().copied();
        match (spectrum_channels, response_channels) {
            (Some(spectrum_channels), Some(response_channels))
                if spectrum_channels != response_channels =>
            {
                report.add(format!(
                    "number of channels in spectrum ({spectrum_channels}) is not equal to number of channels in response ({response_channels})"
                ));
            }
            (None, _) | (_, None) => {
                report.add("region is missing a spectrum or a response");
            }
            _ => {}
        }

        if single_region {
            if self.spectrum.region_count() != 1 {
                report.add(format!(
                    "spectrum holds {} regions, expected exactly one",
                    self.spectrum.region_count()
                ));
            }
            if self.response.region_count != 1 {
                report.add(format!(
                    "response holds {} regions, expected exactly one",
                    self.response.region_count
                ));
            }
        }
        report
    }
}
