use crate::domain::{SpexError, SpexResult};
use crate::spex::Region;
use tracing::debug;

/// Resolution of one model energy of one response component.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResolutionElement {
    pub component: usize,
    /// Model energy bin bounds (keV).
    pub energy_low: f64,
    pub energy_high: f64,
    /// Refined peak location (keV).
    pub centroid: f64,
    /// Energies of the half-maximum crossings (keV).
    pub half_max_low: f64,
    pub half_max_high: f64,
    /// FWHM resolution: `half_max_high − half_max_low` (keV).
    pub resolution: f64,
    /// Expected photons within one resolution element, floored at 1.
    pub expected_counts: f64,
    /// Proposed model-side bin width at this energy (keV).
    pub optimal_width: f64,
    /// The summed response column was zero; the element carries no
    /// resolution information.
    pub degenerate: bool,
}

/// Resolution scan over every component of a region.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct ResolutionProfile {
    pub elements: Vec<ResolutionElement>,
    /// `R = Σ (model bin width / resolution)` over non-degenerate elements:
    /// the number of resolution elements the model grid spans.
    pub resolving_sum: f64,
}

impl ResolutionProfile {
    /// Scan a region: per component, per distinct model energy, collapse the
    /// contributing groups into one response column and measure its peak and
    /// half-maximum width.
    pub fn compute(region: &Region) -> SpexResult<ResolutionProfile> {
        let spectrum = &region.spectrum;
        let response = &region.response;

        let channel_count = spectrum.channel_count();
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

        // Cumulative photon counts at channel upper bounds.
        let counts: Vec<f64> = spectrum
            .source_rate
            .iter()
            .zip(spectrum.exposure.iter())
            .map(|(rate, exposure)| rate * exposure)
            .collect();
        let counts_curve = CumulativeCurve::new(&spectrum.energy_low, &spectrum.energy_high, &counts);

        let mut profile = ResolutionProfile::default();

        let mut group = 0;
        let mut value = 0;
        for (component, groups) in response.component_groups.iter().copied().enumerate() {
            let component_end = group + groups;
            while group < component_end {
                // Consecutive groups sharing one model energy bin belong to
                // the same element.
                let energy_low = response.group_energy_low[group];
                let energy_high = response.group_energy_high[group];
                let mut column = vec![0.0; channel_count];
                while group < component_end
                    && response.group_energy_low[group] == energy_low
                    && response.group_energy_high[group] == energy_high
                {
                    let first = response.group_first_channel[group];
                    if first < 1 || response.group_last_channel[group] > channel_count {
                        return Err(SpexError::ChannelOutOfRange {
                            shift: 0,
                            group,
                            channel_count,
                        });
                    }
                    for offset in 0..response.group_channels[group] {
                        column[first + offset - 1] += response.response[value];
                        value += 1;
                    }
                    group += 1;
                }

                let element = measure_element(
                    component,
                    energy_low,
                    energy_high,
                    &column,
                    spectrum,
                    &counts_curve,
                );
                if !element.degenerate && element.resolution > 0.0 {
                    profile.resolving_sum += (energy_high - energy_low) / element.resolution;
                }
                profile.elements.push(element);
            }
        }

        debug!(
            elements = profile.elements.len(),
            resolving_sum = profile.resolving_sum,
            "resolution scan finished"
        );
        Ok(profile)
    }
}

fn measure_element(
    component: usize,
    energy_low: f64,
    energy_high: f64,
    column: &[f64],
    spectrum: &crate::spex::Spectrum,
    counts_curve: &CumulativeCurve,
) -> ResolutionElement {
    let degenerate = ResolutionElement {
        component,
        energy_low,
        energy_high,
        centroid: (energy_low + energy_high) / 2.0,
        half_max_low: 0.0,
        half_max_high: 0.0,
        resolution: 0.0,
        expected_counts: 1.0,
        optimal_width: 0.0,
        degenerate: true,
    };

    let Some(peak_index) = argmax(column) else {
        return degenerate;
    };
    if column[peak_index] <= 0.0 {
        return degenerate;
    }

    let (peak_position, peak_value) = refine_peak(column, peak_index);
    let half_maximum = peak_value / 2.0;

    let left = half_crossing_left(column, peak_index, half_maximum);
    let right = half_crossing_right(column, peak_index, half_maximum);

    let half_max_low = channel_position_to_energy(spectrum, left);
    let half_max_high = channel_position_to_energy(spectrum, right);
    let centroid = channel_position_to_energy(spectrum, peak_position);
    let resolution = half_max_high - half_max_low;

    // Photons inside the element, weighted by the share of this model
    // energy's response that falls between the half-maximum bounds.
    let response_curve = CumulativeCurve::new(&spectrum.energy_low, &spectrum.energy_high, column);
    let counts_inside = counts_curve.interpolate(half_max_high) - counts_curve.interpolate(half_max_low);
    let response_total: f64 = column.iter().sum();
    let response_fraction = if response_total > 0.0 {
        (response_curve.interpolate(half_max_high) - response_curve.interpolate(half_max_low))
            / response_total
    } else {
        0.0
    };
    let expected_counts = (counts_inside * response_fraction).max(1.0);

    ResolutionElement {
        component,
        energy_low,
        energy_high,
        centroid,
        half_max_low,
        half_max_high,
        resolution,
        expected_counts,
        optimal_width: optimal_bin_width(resolution, expected_counts),
        degenerate: false,
    }
}

/// Model-side optimal bin width for a resolution element of width `fwhm`
/// holding `expected_counts` photons: the large-N analytic approximation
/// `fwhm / (2.119 + 0.31 ln N)`.
pub fn optimal_bin_width(fwhm: f64, expected_counts: f64) -> f64 {
    let n = expected_counts.max(1.0);
    fwhm / (2.119 + 0.31 * n.ln())
}

/// Propose model grid boundaries over the energy span of `profile`, stepping
/// by the optimal width of the nearest (by centroid) non-degenerate element.
///
/// This is the planning half of the optimal rebin: it emits a grid and
/// modifies nothing. Applying the grid to data and response tables is a
/// separate concern.
pub fn plan_model_grid(profile: &ResolutionProfile) -> Vec<f64> {
    let elements: Vec<&ResolutionElement> = profile
        .elements
        .iter()
        .filter(|element| !element.degenerate && element.optimal_width > 0.0)
        .collect();
    if elements.is_empty() {
        return Vec::new();
    }

    let start = elements
        .iter()
        .map(|element| element.energy_low)
        .fold(f64::INFINITY, f64::min);
    let end = elements
        .iter()
        .map(|element| element.energy_high)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut boundaries = vec![start];
    let mut energy = start;
    while energy < end {
        let width = elements
            .iter()
            .min_by(|a, b| {
                let da = (a.centroid - energy).abs();
                let db = (b.centroid - energy).abs();
                da.partial_cmp(&db).expect("finite centroid distances")
            })
            .map(|element| element.optimal_width)
            .expect("at least one usable element");
        energy += width;
        boundaries.push(energy.min(end));
    }
    boundaries
}

fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, value) in values.iter().enumerate() {
        match best {
            Some(current) if values[current] >= *value => {}
            _ => best = Some(index),
        }
    }
    best
}

/// 3-point quadratic refinement of the peak. Returns the fractional channel
/// position and refined peak value; falls back to the grid maximum at the
/// array edge or when the fit is not concave.
fn refine_peak(column: &[f64], peak_index: usize) -> (f64, f64) {
    let fallback = (peak_index as f64, column[peak_index]);
    if peak_index == 0 || peak_index + 1 >= column.len() {
        return fallback;
    }
    let left = column[peak_index - 1];
    let center = column[peak_index];
    let right = column[peak_index + 1];
    let curvature = left - 2.0 * center + right;
    if curvature >= 0.0 {
        return fallback;
    }
    let offset = 0.5 * (left - right) / curvature;
    let refined_value = center - 0.25 * (left - right) * offset;
    (peak_index as f64 + offset, refined_value)
}

/// First half-maximum crossing left of the peak, linearly interpolated to a
/// fractional channel position; the column edge when the response never
/// drops below the half maximum.
fn half_crossing_left(column: &[f64], peak_index: usize, half_maximum: f64) -> f64 {
    for index in (0..peak_index).rev() {
        if column[index] < half_maximum {
            let fraction = (half_maximum - column[index]) / (column[index + 1] - column[index]);
            return index as f64 + fraction;
        }
    }
    0.0
}

fn half_crossing_right(column: &[f64], peak_index: usize, half_maximum: f64) -> f64 {
    for index in peak_index + 1..column.len() {
        if column[index] < half_maximum {
            let fraction = (half_maximum - column[index]) / (column[index - 1] - column[index]);
            return index as f64 - fraction;
        }
    }
    (column.len() - 1) as f64
}

/// Convert a fractional channel position to an energy through the channel
/// bounds. Column samples sit at channel centres, so the position
/// interpolates between the centres of neighbouring channels.
fn channel_position_to_energy(spectrum: &crate::spex::Spectrum, position: f64) -> f64 {
    let channel_count = spectrum.energy_low.len();
    let center =
        |channel: usize| (spectrum.energy_low[channel] + spectrum.energy_high[channel]) / 2.0;
    if position <= 0.0 {
        return center(0);
    }
    if position >= (channel_count - 1) as f64 {
        return center(channel_count - 1);
    }
    let lower = position.floor() as usize;
    let fraction = position - lower as f64;
    center(lower) + fraction * (center(lower + 1) - center(lower))
}

/// Piecewise-linear cumulative curve of per-channel quantities, anchored at
/// each channel's upper energy bound.
struct CumulativeCurve {
    energies: Vec<f64>,
    cumulative: Vec<f64>,
}

impl CumulativeCurve {
    fn new(energy_low: &[f64], energy_high: &[f64], values: &[f64]) -> Self {
        let mut energies = Vec::with_capacity(values.len() + 1);
        let mut cumulative = Vec::with_capacity(values.len() + 1);
        energies.push(energy_low.first().copied().unwrap_or(0.0));
        cumulative.push(0.0);
        let mut total = 0.0;
        for (energy, value) in energy_high.iter().zip(values.iter()) {
            total += value;
            energies.push(*energy);
            cumulative.push(total);
        }
        Self {
            energies,
            cumulative,
        }
    }

    fn interpolate(&self, energy: f64) -> f64 {
        if self.energies.is_empty() {
            return 0.0;
        }
        if energy <= self.energies[0] {
            return self.cumulative[0];
        }
        if energy >= *self.energies.last().expect("non-empty curve") {
            return *self.cumulative.last().expect("non-empty curve");
        }
        let upper = self
            .energies
            .partition_point(|grid_energy| *grid_energy < energy);
        let lower = upper - 1;
        let span = self.energies[upper] - self.energies[lower];
        if span <= 0.0 {
            return self.cumulative[upper];
        }
        let fraction = (energy - self.energies[lower]) / span;
        self.cumulative[lower] + fraction * (self.cumulative[upper] - self.cumulative[lower])
    }
}

#[cfg(test)]
mod tests {
    use super::{optimal_bin_width, plan_model_grid, ResolutionProfile};
    use crate::spex::{Region, ResponseMatrix, Spectrum};

    /// 9 channels of 0.1 keV; one model energy with a triangular response
    /// peaking at channel 5.
    fn triangular_region() -> Region {
        let channels = 9;
        let mut spectrum = Spectrum::zeroed(channels);
        for channel in 0..channels {
            spectrum.energy_low[channel] = 0.1 * (channel + 1) as f64;
            spectrum.energy_high[channel] = 0.1 * (channel + 2) as f64;
            spectrum.exposure[channel] = 1000.0;
            spectrum.source_rate[channel] = 0.1;
        }
        let response = ResponseMatrix {
            component_channels: vec![channels],
            component_groups: vec![1],
            sector: vec![1],
            region: vec![1],
            group_energy_low: vec![0.5],
            group_energy_high: vec![0.6],
            group_first_channel: vec![1],
            group_last_channel: vec![channels],
            group_channels: vec![channels],
            response: vec![0.0, 0.25, 0.5, 0.75, 1.0, 0.75, 0.5, 0.25, 0.0],
            sector_count: 1,
            region_count: 1,
            ..ResponseMatrix::default()
        };
        Region::new(spectrum, response)
    }

    #[test]
    fn triangular_peak_yields_symmetric_half_maximum() {
        let profile = ResolutionProfile::compute(&triangular_region()).expect("profile");
        assert_eq!(profile.elements.len(), 1);
        let element = &profile.elements[0];
        assert!(!element.degenerate);

        // Peak at channel index 4 (0.55 keV midpoint of the 0.5-0.6 bin).
        assert!((element.centroid - 0.55).abs() < 1.0e-9);
        // The triangle crosses half maximum (0.5) at indices 2 and 6.
        assert!((element.half_max_low - 0.35).abs() < 1.0e-9);
        assert!((element.half_max_high - 0.75).abs() < 1.0e-9);
        assert!((element.resolution - 0.4).abs() < 1.0e-9);

        // R accumulates model-bin-width over resolution.
        assert!((profile.resolving_sum - 0.1 / 0.4).abs() < 1.0e-9);
    }

    #[test]
    fn zero_response_column_is_degenerate() {
        let mut region = triangular_region();
        region.response.response = vec![0.0; 9];
        let profile = ResolutionProfile::compute(&region).expect("profile");
        assert!(profile.elements[0].degenerate);
        assert_eq!(profile.elements[0].resolution, 0.0);
        assert_eq!(profile.resolving_sum, 0.0);
    }

    #[test]
    fn contiguous_groups_with_one_energy_are_summed() {
        let mut region = triangular_region();
        // Split the single group into two groups of the same model energy.
        region.response.component_groups = vec![2];
        region.response.group_energy_low = vec![0.5, 0.5];
        region.response.group_energy_high = vec![0.6, 0.6];
        region.response.group_first_channel = vec![1, 5];
        region.response.group_last_channel = vec![4, 9];
        region.response.group_channels = vec![4, 5];
        let profile = ResolutionProfile::compute(&region).expect("profile");
        assert_eq!(profile.elements.len(), 1);
        assert!((profile.elements[0].resolution - 0.4).abs() < 1.0e-9);
    }

    #[test]
    fn expected_counts_are_floored_at_one() {
        let mut region = triangular_region();
        region.spectrum.source_rate = vec![0.0; 9];
        let profile = ResolutionProfile::compute(&region).expect("profile");
        assert_eq!(profile.elements[0].expected_counts, 1.0);
        assert!(profile.elements[0].optimal_width > 0.0);
    }

    #[test]
    fn wider_bins_for_fewer_counts() {
        // More photons allow finer model bins.
        let coarse = optimal_bin_width(0.4, 1.0);
        let fine = optimal_bin_width(0.4, 10_000.0);
        assert!(fine < coarse);
        assert!((coarse - 0.4 / 2.119).abs() < 1.0e-12);
    }

    #[test]
    fn planned_grid_spans_the_model_range() {
        let profile = ResolutionProfile::compute(&triangular_region()).expect("profile");
        let grid = plan_model_grid(&profile);
        assert!(grid.len() >= 2);
        assert!((grid[0] - 0.5).abs() < 1.0e-12);
        assert!((grid.last().expect("non-empty grid") - 0.6).abs() < 1.0e-12);
        for pair in grid.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn degenerate_only_profiles_plan_nothing() {
        let mut region = triangular_region();
        region.response.response = vec![0.0; 9];
        let profile = ResolutionProfile::compute(&region).expect("profile");
        assert!(plan_model_grid(&profile).is_empty());
    }
}
