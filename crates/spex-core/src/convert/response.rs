use crate::domain::{SpexError, SpexResult, CM2_TO_M2, MIN_GROUP_ENERGY};
use crate::ogip::{Arf, Rmf};
use crate::spex::ResponseMatrix;
use tracing::warn;

/// Convert an OGIP redistribution matrix (optionally multiplied by an
/// effective area curve) into a single-component SPEX response matrix. The
/// grouped per-energy-bin layout is flattened one-to-one into the group and
/// value tables, without re-ordering or optimisation.
pub fn convert_response(rmf: &Rmf, area: Option<&Arf>) -> SpexResult<ResponseMatrix> {
    let total_groups = rmf.total_group_count;
    let total_elements = rmf.total_element_count;

    let mut res = ResponseMatrix {
        component_channels: vec![rmf.channel_count],
        component_groups: vec![total_groups],
        sector: vec![1],
        region: vec![1],
        group_energy_low: vec![0.0; total_groups],
        group_energy_high: vec![0.0; total_groups],
        group_first_channel: vec![0; total_groups],
        group_last_channel: vec![0; total_groups],
        group_channels: vec![0; total_groups],
        response: vec![0.0; total_elements],
        sector_count: 1,
        region_count: 1,
        ..ResponseMatrix::default()
    };

    let mut group = 0;
    let mut element = 0;
    let mut clamped_bounds = 0;
    for bin in 0..rmf.energy_bin_count {
        for _ in 0..rmf.group_count[bin] {
            if group >= total_groups {
                return Err(SpexError::ArrayLengthMismatch {
                    array: "response groups",
                    declared: total_groups,
                    actual: group + 1,
                });
            }

            if rmf.low_energy[bin] <= 0.0 {
                res.group_energy_low[group] = MIN_GROUP_ENERGY;
                clamped_bounds += 1;
            } else {
                res.group_energy_low[group] = rmf.low_energy[bin];
            }
            res.group_energy_high[group] = rmf.high_energy[bin];
            if res.group_energy_high[group] <= res.group_energy_low[group] {
                return Err(SpexError::DiscontinuousEnergyGrid {
                    bin: bin + 1,
                    low: res.group_energy_low[group],
                    high: res.group_energy_high[group],
                });
            }

            let width = rmf.channels_per_group[group];
            res.group_channels[group] = width;
            // The first channel is taken exactly as stored, even when the
            // source file counts from 0; the shift detection measures and
            // repairs the offset afterwards.
            let first = rmf.first_channel_group[group].max(0) as usize;
            res.group_first_channel[group] = first;
            res.group_last_channel[group] = first + width.saturating_sub(1);

            let effective_area = match area {
                Some(arf) => arf.effective_area[bin],
                None => 1.0,
            };
            for _ in 0..width {
                if element >= total_elements {
                    return Err(SpexError::ArrayLengthMismatch {
                        array: "response elements",
                        declared: total_elements,
                        actual: element + 1,
                    });
                }
                // Negative elements appear in some instrument matrices;
                // SPEX requires a non-negative response.
                res.response[element] = (rmf.matrix[element] * effective_area).max(0.0);
                element += 1;
            }
            group += 1;
        }
    }

    if clamped_bounds > 0 {
        warn!(
            count = clamped_bounds,
            "lowest energy boundary is 0, set to {MIN_GROUP_ENERGY} to avoid problems"
        );
    }

    // SPEX stores the response in m^2; OGIP areas are cm^2. When the matrix
    // carries no area at all it is still rescaled so that folding in a SPEX
    // effective area later yields consistent units.
    let apply_unit_conversion = match area {
        Some(arf) => arf.area_units == "cm2",
        None => true,
    };
    if apply_unit_conversion {
        for value in &mut res.response {
            *value *= CM2_TO_M2;
        }
    } else {
        warn!("effective area units not recognised, response left unscaled");
    }

    // Wavelength-ordered instruments store channels with decreasing energy.
    if rmf.channel_count > 1 && rmf.channel_low_energy[0] > rmf.channel_low_energy[1] {
        res.swap_channel_order();
    }

    Ok(res)
}
