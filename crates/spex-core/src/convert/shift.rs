use crate::ogip::Rmf;
use crate::domain::SpexResult;
use crate::spex::{ResponseMatrix, Spectrum};
use tracing::{debug, warn};

/// Result of the channel-shift heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOutcome {
    /// A non-zero offset was measured and the matrix was shifted.
    Applied { delta: i64 },
    /// Source and target agree; nothing to do.
    NotNeeded,
    /// Detection skipped because the spectrum was channel-swapped.
    SkippedSwapped,
    /// One of the probes found no matching bin or channel; the matrix is
    /// left untouched.
    NotDetected,
}

/// Detect and repair the one-off channel indexing of source files that count
/// channels from 0 (the target format always counts from 1).
///
/// The first source energy bin with a non-empty group anchors a model energy;
/// the source channel holding the first group's start channel anchors a
/// channel energy. Both are located independently in the converted target
/// tables, and the difference between the located target channel number and
/// the group's recorded first channel is the shift. Among multiple matching
/// bins the first match wins.
pub fn detect_and_correct_shift(
    spectrum: &Spectrum,
    response: &mut ResponseMatrix,
    rmf: &Rmf,
) -> SpexResult<ShiftOutcome> {
    // Swapped channel arrays invert the search direction; a zero first
    // channel combined with a swapped array is rare enough to punt on.
    if spectrum.swapped {
        warn!("not auto-detecting shifts in the response array of a channel-swapped spectrum");
        return Ok(ShiftOutcome::SkippedSwapped);
    }

    // First source energy bin with at least one response group.
    let Some(anchor_bin) = rmf.group_count.iter().position(|count| *count > 0) else {
        warn!("response matrix has no non-empty energy bin, shift detection abandoned");
        return Ok(ShiftOutcome::NotDetected);
    };
    let target_energy = (rmf.low_energy[anchor_bin] + rmf.high_energy[anchor_bin]) / 2.0;

    // Source channel row holding the first group's start channel.
    let Some(first_group_channel) = rmf.first_channel_group.first().copied() else {
        warn!("response matrix has no groups, shift detection abandoned");
        return Ok(ShiftOutcome::NotDetected);
    };
    let Some(channel_row) = rmf
        .channel
        .iter()
        .position(|channel| *channel == first_group_channel)
    else {
        warn!(
            channel = first_group_channel,
            "first group channel not present in the channel table, shift detection abandoned"
        );
        return Ok(ShiftOutcome::NotDetected);
    };
    let target_channel_energy =
        (rmf.channel_low_energy[channel_row] + rmf.channel_high_energy[channel_row]) / 2.0;

    // The same model energy bin, located in the converted group table.
    let Some(target_group) = response
        .group_energy_low
        .iter()
        .zip(response.group_energy_high.iter())
        .position(|(low, high)| *low < target_energy && *high > target_energy)
    else {
        warn!("no target group contains the anchor energy, shift detection abandoned");
        return Ok(ShiftOutcome::NotDetected);
    };

    // The same channel, located in the converted spectrum.
    let Some(target_channel) = spectrum
        .energy_low
        .iter()
        .zip(spectrum.energy_high.iter())
        .position(|(low, high)| *low < target_channel_energy && *high > target_channel_energy)
    else {
        warn!("no target channel contains the anchor energy, shift detection abandoned");
        return Ok(ShiftOutcome::NotDetected);
    };

    let delta = (target_channel as i64 + 1) - response.group_first_channel[target_group] as i64;
    if delta == 0 {
        debug!("no shift in response array detected");
        return Ok(ShiftOutcome::NotNeeded);
    }

    warn!(delta, "shift in response array detected, shifting indices");
    response.shift_channels(delta)?;
    Ok(ShiftOutcome::Applied { delta })
}

#[cfg(test)]
mod tests {
    use super::{detect_and_correct_shift, ShiftOutcome};
    use crate::convert::{convert_response, convert_spectrum};
    use crate::ogip::{Pha, Rmf};

    /// A diagonal response over `channels` channels whose channel ids start
    /// at `first_channel` (0 for zero-based source files).
    fn diagonal_rmf(channels: usize, first_channel: i64) -> Rmf {
        Rmf {
            first_channel,
            channel: (0..channels as i64).map(|i| first_channel + i).collect(),
            channel_low_energy: (0..channels).map(|i| 0.1 * (i + 1) as f64).collect(),
            channel_high_energy: (0..channels).map(|i| 0.1 * (i + 2) as f64).collect(),
            channel_count: channels,
            low_energy: (0..channels).map(|i| 0.1 * (i + 1) as f64).collect(),
            high_energy: (0..channels).map(|i| 0.1 * (i + 2) as f64).collect(),
            group_count: vec![1; channels],
            energy_bin_count: channels,
            first_channel_group: (0..channels as i64).map(|i| first_channel + i).collect(),
            channels_per_group: vec![1; channels],
            total_group_count: channels,
            matrix: vec![1.0; channels],
            total_element_count: channels,
            energy_units: "keV".to_string(),
            area_included: false,
        }
    }

    fn unit_pha(channels: usize, first_channel: i64) -> Pha {
        let rmf = diagonal_rmf(channels, first_channel);
        Pha::create_dummy(&rmf)
    }

    #[test]
    fn zero_based_source_yields_a_plus_one_shift() {
        let rmf = diagonal_rmf(4, 0);
        let pha = unit_pha(4, 0);
        let spo = convert_spectrum(&pha, &rmf, None, None, false).expect("spectrum");
        let mut res = convert_response(&rmf, None).expect("response");
        assert_eq!(res.group_first_channel[0], 0);

        let outcome = detect_and_correct_shift(&spo, &mut res, &rmf).expect("shift");
        assert_eq!(outcome, ShiftOutcome::Applied { delta: 1 });

        // After the shift the matrix matches its one-based reference.
        let reference = convert_response(&diagonal_rmf(4, 1), None).expect("reference");
        assert_eq!(res.group_first_channel, reference.group_first_channel);
        assert_eq!(res.group_last_channel, reference.group_last_channel);
        assert!(res.check().is_ok());
    }

    #[test]
    fn one_based_source_needs_no_shift() {
        let rmf = diagonal_rmf(4, 1);
        let pha = unit_pha(4, 1);
        let spo = convert_spectrum(&pha, &rmf, None, None, false).expect("spectrum");
        let mut res = convert_response(&rmf, None).expect("response");
        let reference = res.clone();

        let outcome = detect_and_correct_shift(&spo, &mut res, &rmf).expect("shift");
        assert_eq!(outcome, ShiftOutcome::NotNeeded);
        assert_eq!(res, reference);
    }

    #[test]
    fn swapped_spectrum_skips_detection() {
        let rmf = diagonal_rmf(4, 0);
        let pha = unit_pha(4, 0);
        let mut spo = convert_spectrum(&pha, &rmf, None, None, false).expect("spectrum");
        spo.swap_channel_order().expect("swap");
        let mut res = convert_response(&rmf, None).expect("response");
        let reference = res.clone();

        let outcome = detect_and_correct_shift(&spo, &mut res, &rmf).expect("shift");
        assert_eq!(outcome, ShiftOutcome::SkippedSwapped);
        assert_eq!(res, reference);
    }

    #[test]
    fn unmatchable_anchor_abandons_detection() {
        let rmf = diagonal_rmf(4, 0);
        let pha = unit_pha(4, 0);
        let spo = convert_spectrum(&pha, &rmf, None, None, false).expect("spectrum");
        let mut res = convert_response(&rmf, None).expect("response");

        // An anchor energy outside every target group.
        let mut detached = rmf.clone();
        detached.low_energy = vec![10.0; 4];
        detached.high_energy = vec![10.1; 4];
        let outcome = detect_and_correct_shift(&spo, &mut res, &detached).expect("shift");
        assert_eq!(outcome, ShiftOutcome::NotDetected);
    }
}
