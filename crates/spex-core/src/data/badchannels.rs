use crate::domain::{SpexError, SpexResult};
use crate::spex::{Region, ResponseMatrix, Spectrum};
use tracing::debug;

/// Masks produced by the bad-channel scan, plus the re-indexed group
/// boundaries for the surviving groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadChannelMasks {
    /// Per channel: the channel has a positive response somewhere and is
    /// marked used in the spectrum.
    pub channels: Vec<bool>,
    /// Per group: the group retains at least one channel.
    pub groups: Vec<bool>,
    /// Per value-table entry: the entry belongs to a retained channel.
    pub values: Vec<bool>,
    /// Re-indexed (first, last, count) for every group, valid where
    /// `groups` is true.
    pub reindexed_first: Vec<usize>,
    pub reindexed_last: Vec<usize>,
    pub reindexed_count: Vec<usize>,
}

/// Identify channels with zero response or a cleared used-flag and compute
/// the re-indexed group boundaries that skip them.
pub fn bad_channel_masks(region: &Region) -> SpexResult<BadChannelMasks> {
    let spectrum = &region.spectrum;
    let response = &region.response;

    let channel_count = spectrum.used.len();
    if spectrum.channel_count() != channel_count {
        return Err(SpexError::ArrayLengthMismatch {
            array: "spectrum channels",
            declared: spectrum.channel_count(),
            actual: channel_count,
        });
    }
    match response.component_channels.first() {
        Some(response_channels) if *response_channels == channel_count => {}
        _ => {
            return Err(SpexError::ArrayLengthMismatch {
                array: "response channels",
                declared: response.component_channels.first().copied().unwrap_or(0),
                actual: channel_count,
            });
        }
    }

    let group_count = response.group_channels.len();
    let declared_groups: usize = response.component_groups.iter().sum();
    if group_count != declared_groups {
        return Err(SpexError::ArrayLengthMismatch {
            array: "response groups",
            declared: declared_groups,
            actual: group_count,
        });
    }
    let declared_values: usize = response.group_channels.iter().sum();
    if response.response.len() != declared_values {
        return Err(SpexError::ArrayLengthMismatch {
            array: "response values",
            declared: declared_values,
            actual: response.response.len(),
        });
    }

    // First pass: a channel is alive when any group gives it a positive
    // response.
    let mut channels = vec![false; channel_count];
    let mut value = 0;
    for group in 0..group_count {
        let first = response.group_first_channel[group];
        if first < 1 || response.group_last_channel[group] > channel_count {
            return Err(SpexError::ChannelOutOfRange {
                shift: 0,
                group,
                channel_count,
            });
        }
        for offset in 0..response.group_channels[group] {
            let channel = first + offset - 1;
            if response.response[value] > 0.0 {
                channels[channel] = true;
            }
            value += 1;
        }
    }
    for (alive, used) in channels.iter_mut().zip(spectrum.used.iter()) {
        *alive = *alive && *used;
    }

    // Running count of retained channels up to each channel index, so new
    // first channels are a lookup instead of a rescan.
    let mut retained_before = vec![0usize; channel_count + 1];
    for channel in 0..channel_count {
        retained_before[channel + 1] = retained_before[channel] + usize::from(channels[channel]);
    }

    // Second pass: recompute contiguous (first, last, count) per group over
    // retained channels and mark dropped value entries.
    let mut groups = vec![true; group_count];
    let mut values = vec![true; response.response.len()];
    let mut reindexed_first = vec![0usize; group_count];
    let mut reindexed_last = vec![0usize; group_count];
    let mut reindexed_count = vec![0usize; group_count];

    let mut value = 0;
    for group in 0..group_count {
        let first = response.group_first_channel[group];
        let mut retained = 0;
        let mut new_first = 0;
        for offset in 0..response.group_channels[group] {
            let channel = first + offset - 1;
            if channels[channel] {
                if retained == 0 {
                    new_first = retained_before[channel] + 1;
                }
                retained += 1;
            } else {
                values[value] = false;
            }
            value += 1;
        }
        if retained == 0 {
            groups[group] = false;
        } else {
            reindexed_first[group] = new_first;
            reindexed_last[group] = new_first + retained - 1;
            reindexed_count[group] = retained;
        }
    }

    Ok(BadChannelMasks {
        channels,
        groups,
        values,
        reindexed_first,
        reindexed_last,
        reindexed_count,
    })
}

/// Remove bad channels and zero-response groups from a region, re-indexing
/// the response to the surviving contiguous channel numbering. The input is
/// left untouched; the cleaned region is validated before it is returned.
pub fn clean_region(region: &Region) -> SpexResult<Region> {
    let masks = bad_channel_masks(region)?;

    let good_channels = masks.channels.iter().filter(|alive| **alive).count();
    debug!(
        good = good_channels,
        bad = masks.channels.len() - good_channels,
        "bad-channel scan finished"
    );

    let spectrum = filter_spectrum(&region.spectrum, &masks.channels, good_channels);
    let response = filter_response(&region.response, &masks, good_channels);

    spectrum.check().into_result("cleaned spectrum")?;
    response.check().into_result("cleaned response")?;

    Ok(Region {
        spectrum,
        response,
        label: region.label.clone(),
    })
}

fn filter_spectrum(spectrum: &Spectrum, channels: &[bool], good_channels: usize) -> Spectrum {
    fn keep<T: Copy>(values: &[T], mask: &[bool]) -> Vec<T> {
        values
            .iter()
            .zip(mask.iter())
            .filter_map(|(value, alive)| alive.then_some(*value))
            .collect()
    }

    Spectrum {
        region_channels: vec![good_channels; spectrum.region_channels.len()],
        energy_low: keep(&spectrum.energy_low, channels),
        energy_high: keep(&spectrum.energy_high, channels),
        exposure: keep(&spectrum.exposure, channels),
        source_rate: keep(&spectrum.source_rate, channels),
        source_rate_error: keep(&spectrum.source_rate_error, channels),
        back_rate: keep(&spectrum.back_rate, channels),
        back_rate_error: keep(&spectrum.back_rate_error, channels),
        backscale_ratio: keep(&spectrum.backscale_ratio, channels),
        sys_source: keep(&spectrum.sys_source, channels),
        sys_back: keep(&spectrum.sys_back, channels),
        used: keep(&spectrum.used, channels),
        first: keep(&spectrum.first, channels),
        last: keep(&spectrum.last, channels),
        backscale_ratio_present: spectrum.backscale_ratio_present,
        swapped: spectrum.swapped,
    }
}

fn filter_response(
    response: &ResponseMatrix,
    masks: &BadChannelMasks,
    good_channels: usize,
) -> ResponseMatrix {
    fn keep<T: Copy>(values: &[T], mask: &[bool]) -> Vec<T> {
        values
            .iter()
            .zip(mask.iter())
            .filter_map(|(value, alive)| alive.then_some(*value))
            .collect()
    }

    // Surviving groups per component, walking the contiguous group slices.
    let mut component_groups = Vec::with_capacity(response.component_groups.len());
    let mut group_start = 0;
    for groups in response.component_groups.iter().copied() {
        let group_end = group_start + groups;
        let surviving = masks.groups[group_start..group_end]
            .iter()
            .filter(|alive| **alive)
            .count();
        component_groups.push(surviving);
        group_start = group_end;
    }

    ResponseMatrix {
        component_channels: vec![good_channels; response.component_channels.len()],
        component_groups,
        sector: response.sector.clone(),
        region: response.region.clone(),
        shared_component: response.shared_component.clone(),
        group_energy_low: keep(&response.group_energy_low, &masks.groups),
        group_energy_high: keep(&response.group_energy_high, &masks.groups),
        group_first_channel: keep(&masks.reindexed_first, &masks.groups),
        group_last_channel: keep(&masks.reindexed_last, &masks.groups),
        group_channels: keep(&masks.reindexed_count, &masks.groups),
        group_relative_area: if response.area_scaling {
            keep(&response.group_relative_area, &masks.groups)
        } else {
            Vec::new()
        },
        response: keep(&response.response, &masks.values),
        response_derivative: if response.response_derivatives {
            keep(&response.response_derivative, &masks.values)
        } else {
            Vec::new()
        },
        shared_components: response.shared_components,
        area_scaling: response.area_scaling,
        response_derivatives: response.response_derivatives,
        sector_count: response.sector_count,
        region_count: response.region_count,
        swapped: response.swapped,
    }
}
