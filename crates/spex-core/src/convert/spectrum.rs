use crate::domain::{SpexResult, MIN_CHANNEL_ENERGY};
use crate::ogip::{DataType, Pha, Rmf};
use crate::spex::Spectrum;
use tracing::warn;

/// Convert an OGIP source spectrum (plus optional background and correction
/// spectra) into a single-region SPEX spectrum. The response matrix supplies
/// the channel energy bounds.
///
/// Per channel: the exposure is the source exposure scaled by the channel's
/// area-scaling factor; rates are normalised by the area scaling; the
/// background is rescaled by the source/background backscale ratio before
/// subtraction and recorded separately together with the exposure-backscale
/// ratio; statistical errors accumulate as variances and are square-rooted
/// once at the end.
pub fn convert_spectrum(
    source: &Pha,
    rmf: &Rmf,
    background: Option<&Pha>,
    correction: Option<&Pha>,
    keep_grouping: bool,
) -> SpexResult<Spectrum> {
    let channels = source.channel_count;
    let mut spo = Spectrum::zeroed(channels);

    if rmf.energy_units != "keV" {
        warn!(
            units = rmf.energy_units,
            "energy units of keV are expected in the response file"
        );
    }

    let mut clamped_bounds = 0;
    for i in 0..channels {
        spo.exposure[i] = source.exposure * source.area_scaling[i];

        // Source rate and variance, normalised by the area scaling.
        if spo.exposure[i] > 0.0 {
            spo.source_rate[i] = source.rate[i] / source.area_scaling[i];
            spo.source_rate_error[i] = source.stat_error[i].powi(2) / source.area_scaling[i];
        } else {
            spo.source_rate[i] = 0.0;
            spo.source_rate_error[i] = 0.0;
        }

        if let Some(back) = background {
            let back_exposure = back.exposure * back.area_scaling[i];
            let backscale_ratio = if back.back_scaling[i] > 0.0 {
                source.back_scaling[i] / back.back_scaling[i]
            } else {
                0.0
            };

            let scaled_rate = back.rate[i] * backscale_ratio / back.area_scaling[i];
            let scaled_variance =
                (back.stat_error[i] * backscale_ratio / back.area_scaling[i]).powi(2);

            spo.source_rate[i] -= scaled_rate;
            spo.source_rate_error[i] += scaled_variance;
            spo.back_rate[i] = scaled_rate;
            spo.back_rate_error[i] = scaled_variance;

            spo.backscale_ratio[i] = if backscale_ratio > 0.0 && source.exposure > 0.0 {
                back_exposure / spo.exposure[i] / backscale_ratio
            } else {
                0.0
            };
        }

        if let Some(corr) = correction {
            // The backscale ratio of the correction spectrum is not folded
            // into the exposure-rate column.
            let corr_exposure = corr.exposure * corr.area_scaling[i];
            let corrscale_ratio = if corr.back_scaling[i] > 0.0 {
                source.back_scaling[i] / corr.back_scaling[i]
            } else {
                0.0
            };

            let scaled_rate = corr.rate[i] * corrscale_ratio / corr_exposure;
            let scaled_variance = corr.rate[i] * (corrscale_ratio / corr_exposure).powi(2);

            spo.source_rate[i] -= scaled_rate;
            spo.source_rate_error[i] += scaled_variance;
            spo.back_rate[i] += scaled_rate;
            spo.back_rate_error[i] += scaled_variance;
        }

        // Channels without exposure carry no background either.
        if spo.exposure[i] <= 0.0 {
            spo.back_rate[i] = 0.0;
            spo.back_rate_error[i] = 0.0;
            spo.backscale_ratio[i] = 0.0;
        }

        spo.source_rate_error[i] = spo.source_rate_error[i].sqrt();
        spo.back_rate_error[i] = spo.back_rate_error[i].sqrt();

        // Systematic error fractions.
        spo.sys_source[i] = match source.data_type {
            DataType::Rate => source.sys_error[i],
            DataType::Count => {
                if spo.exposure[i] > 0.0 {
                    source.sys_error[i] / spo.exposure[i]
                } else {
                    0.0
                }
            }
        };
        if let Some(back) = background {
            spo.sys_back[i] = match back.data_type {
                DataType::Rate => back.sys_error[i],
                DataType::Count => {
                    if spo.exposure[i] > 0.0 {
                        back.sys_error[i] / spo.exposure[i]
                    } else {
                        0.0
                    }
                }
            };
        }

        // A bad channel in any of the inputs disables the channel.
        if source.quality[i] != 0 {
            spo.used[i] = false;
        }
        if let Some(back) = background {
            if back.quality[i] != 0 {
                spo.used[i] = false;
            }
        }
        if let Some(corr) = correction {
            if corr.quality[i] != 0 {
                spo.used[i] = false;
            }
        }

        if keep_grouping {
            // OGIP grouping: 1 opens a bin, 0 continues it. A channel is the
            // last of its bin when the next channel opens a new bin or the
            // spectrum ends.
            if source.grouping[i] == 1 {
                spo.first[i] = true;
                spo.last[i] = false;
            }
            if source.grouping[i] == 0 {
                spo.first[i] = false;
                if i + 1 < channels {
                    spo.last[i] = source.grouping[i + 1] == 1;
                } else {
                    spo.last[i] = true;
                }
            }
        }

        // Channel boundaries come from the response; a non-positive lower
        // bound breaks the logarithmic grids downstream.
        if rmf.channel_low_energy[i] <= 0.0 {
            spo.energy_low[i] = MIN_CHANNEL_ENERGY;
            clamped_bounds += 1;
        } else {
            spo.energy_low[i] = rmf.channel_low_energy[i];
        }
        spo.energy_high[i] = rmf.channel_high_energy[i];
    }

    if clamped_bounds > 0 {
        warn!(
            count = clamped_bounds,
            "lowest channel boundary energy is 0, set to {MIN_CHANNEL_ENERGY} to avoid problems"
        );
    }

    // Wavelength-ordered instruments store channels with decreasing energy.
    if channels > 1 && spo.energy_low[0] > spo.energy_low[1] {
        spo.swap_channel_order()?;
    }

    Ok(spo)
}
