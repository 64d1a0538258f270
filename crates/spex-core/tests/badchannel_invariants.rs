use spex_core::data::clean_region;
use spex_core::spex::{Region, ResponseMatrix, Spectrum};

/// Small deterministic xorshift generator so the randomized matrices are
/// reproducible across runs.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut state = self.0;
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        self.0 = state;
        state
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn next_range(&mut self, low: usize, high: usize) -> usize {
        low + (self.next_u64() as usize) % (high - low)
    }
}

/// A random single-region pairing: random group layout over `channels`
/// channels, with roughly `dead_fraction` of the response elements zeroed
/// and a few channels flagged unused.
fn random_region(rng: &mut XorShift, channels: usize, dead_fraction: f64) -> Region {
    let mut spectrum = Spectrum::zeroed(channels);
    for channel in 0..channels {
        spectrum.energy_low[channel] = 0.01 * (channel + 1) as f64;
        spectrum.energy_high[channel] = 0.01 * (channel + 2) as f64;
        spectrum.exposure[channel] = 100.0;
        spectrum.source_rate[channel] = rng.next_f64();
        if rng.next_f64() < 0.1 {
            spectrum.used[channel] = false;
        }
    }

    let group_count = rng.next_range(3, 9);
    let mut group_energy_low = Vec::new();
    let mut group_energy_high = Vec::new();
    let mut group_first_channel = Vec::new();
    let mut group_last_channel = Vec::new();
    let mut group_channels = Vec::new();
    let mut response = Vec::new();
    for group in 0..group_count {
        let first = rng.next_range(1, channels);
        let width = rng.next_range(1, channels - first + 2);
        group_energy_low.push(0.01 * (group + 1) as f64);
        group_energy_high.push(0.01 * (group + 2) as f64);
        group_first_channel.push(first);
        group_last_channel.push(first + width - 1);
        group_channels.push(width);
        for _ in 0..width {
            if rng.next_f64() < dead_fraction {
                response.push(0.0);
            } else {
                response.push(rng.next_f64().max(1.0e-6));
            }
        }
    }

    let matrix = ResponseMatrix {
        component_channels: vec![channels],
        component_groups: vec![group_count],
        sector: vec![1],
        region: vec![1],
        group_energy_low,
        group_energy_high,
        group_first_channel,
        group_last_channel,
        group_channels,
        response,
        sector_count: 1,
        region_count: 1,
        ..ResponseMatrix::default()
    };
    Region::new(spectrum, matrix)
}

#[test]
fn cleaning_preserves_group_invariants_over_randomized_matrices() {
    let mut rng = XorShift::new(0x5eed_cafe);

    for round in 0..50 {
        let channels = rng.next_range(8, 40);
        let dead_fraction = 0.1 + 0.5 * rng.next_f64();
        let region = random_region(&mut rng, channels, dead_fraction);

        let cleaned = match clean_region(&region) {
            Ok(cleaned) => cleaned,
            // A fully dead matrix cleans to an empty spectrum, which the
            // final check rejects; that is a legal outcome for extreme
            // dead fractions.
            Err(_) if region_is_fully_dead(&region) => continue,
            Err(error) => panic!("round {round}: cleaning failed unexpectedly: {error}"),
        };

        let response = &cleaned.response;
        let indexed: usize = response.group_channels.iter().sum();
        assert_eq!(
            indexed,
            response.response.len(),
            "round {round}: sum of group channels must match value table"
        );
        for group in 0..response.group_channels.len() {
            assert_eq!(
                response.group_last_channel[group] - response.group_first_channel[group] + 1,
                response.group_channels[group],
                "round {round}: group {group} range is inconsistent"
            );
            assert!(response.group_channels[group] > 0);
            assert!(
                response.group_last_channel[group] <= response.component_channels[0],
                "round {round}: group {group} exceeds the channel range"
            );
        }
        assert_eq!(
            cleaned.spectrum.channel_count(),
            response.component_channels[0],
            "round {round}: spectrum and response disagree on channel count"
        );
        let declared_groups: usize = response.component_groups.iter().sum();
        assert_eq!(declared_groups, response.group_channels.len());

        // Every surviving channel must have a positive response somewhere;
        // zero entries may remain where another group keeps the channel
        // alive.
        let channels = cleaned.response.component_channels[0];
        let mut has_positive = vec![false; channels];
        let mut value = 0;
        for group in 0..cleaned.response.group_channels.len() {
            let first = cleaned.response.group_first_channel[group];
            for offset in 0..cleaned.response.group_channels[group] {
                if cleaned.response.response[value] > 0.0 {
                    has_positive[first + offset - 1] = true;
                }
                value += 1;
            }
        }
        assert!(
            has_positive.iter().all(|positive| *positive),
            "round {round}: a retained channel has no positive response"
        );
    }
}

fn region_is_fully_dead(region: &Region) -> bool {
    let live_channels = region
        .spectrum
        .used
        .iter()
        .enumerate()
        .filter(|(channel, used)| {
            **used && channel_has_positive_response(&region.response, channel + 1)
        })
        .count();
    live_channels == 0
}

fn channel_has_positive_response(response: &ResponseMatrix, channel: usize) -> bool {
    let mut value = 0;
    for group in 0..response.group_channels.len() {
        let first = response.group_first_channel[group];
        for offset in 0..response.group_channels[group] {
            if first + offset == channel && response.response[value] > 0.0 {
                return true;
            }
            value += 1;
        }
    }
    false
}

#[test]
fn cleaning_is_idempotent() {
    let mut rng = XorShift::new(0xdead_beef);
    for _ in 0..10 {
        let channels = rng.next_range(10, 30);
        let region = random_region(&mut rng, channels, 0.3);
        let Ok(cleaned) = clean_region(&region) else {
            continue;
        };
        let cleaned_again = clean_region(&cleaned).expect("second clean");
        assert_eq!(cleaned_again.response.response, cleaned.response.response);
        assert_eq!(
            cleaned_again.response.group_first_channel,
            cleaned.response.group_first_channel
        );
        assert_eq!(
            cleaned_again.spectrum.channel_count(),
            cleaned.spectrum.channel_count()
        );
    }
}
