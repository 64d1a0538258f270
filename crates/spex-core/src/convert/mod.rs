//! Pure OGIP → SPEX conversion: spectra, response matrices, and the
//! channel-shift correction tying them together.

mod response;
mod shift;
mod spectrum;

pub use response::convert_response;
pub use shift::{detect_and_correct_shift, ShiftOutcome};
pub use spectrum::convert_spectrum;

use crate::domain::{SpexError, SpexResult};
use crate::ogip::{Arf, Pha, Rmf};
use crate::spex::Region;
use tracing::debug;

/// Inputs for one region conversion. Background, correction, and effective
/// area are optional; source spectrum and response matrix are not.
#[derive(Debug, Clone, Default)]
pub struct ConversionInput {
    pub source: Pha,
    pub rmf: Rmf,
    pub background: Option<Pha>,
    pub correction: Option<Pha>,
    pub area: Option<Arf>,
    pub keep_grouping: bool,
}

impl ConversionInput {
    pub fn new(source: Pha, rmf: Rmf) -> Self {
        Self {
            source,
            rmf,
            ..Self::default()
        }
    }

    /// Cross-check the input files against each other before converting.
    pub fn check(&self) -> SpexResult<()> {
        self.source.check().into_result("source spectrum")?;

        if let Some(background) = &self.background {
            background.check().into_result("background spectrum")?;
            self.source.check_compatibility(background)?;
        }
        if let Some(correction) = &self.correction {
            correction.check().into_result("correction spectrum")?;
            self.source.check_compatibility(correction)?;
        }

        self.rmf.check().into_result("response matrix")?;
        if self.source.channel_count != self.rmf.channel_count {
            return Err(SpexError::IncompatibleMatrix {
                detail: format!(
                    "source spectrum has {} channels, response has {}",
                    self.source.channel_count, self.rmf.channel_count
                ),
            });
        }

        if let Some(area) = &self.area {
            area.check().into_result("effective area")?;
            self.rmf.check_compatibility(area)?;
        }
        Ok(())
    }
}

/// Convert one set of OGIP files into a SPEX region.
///
/// Runs the cross-checks, both table conversions, and (when the source
/// spectrum counts channels from 0) the shift correction. The converted
/// tables are validated before they are handed back; a failing check means
/// no region is returned.
pub fn convert_region(input: &ConversionInput) -> SpexResult<Region> {
    input.check()?;

    debug!("converting OGIP spectra to spo format");
    let spectrum = convert_spectrum(
        &input.source,
        &input.rmf,
        input.background.as_ref(),
        input.correction.as_ref(),
        input.keep_grouping,
    )?;

    debug!("converting OGIP response to res format");
    let mut response = convert_response(&input.rmf, input.area.as_ref())?;

    if input.source.first_channel == 0 {
        detect_and_correct_shift(&spectrum, &mut response, &input.rmf)?;
    }

    spectrum.check().into_result("converted spectrum")?;
    response.check().into_result("converted response")?;

    let region = Region::new(spectrum, response);
    region.check(true).into_result("converted region")?;
    Ok(region)
}
