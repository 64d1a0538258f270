use spex_core::domain::RegionKey;
use spex_core::spex::{Dataset, Region, ResponseMatrix, Spectrum};
use spex_core::table::JsonTabularStore;

/// Build a single-region pairing with `channels` channels, a diagonal-ish
/// response, and recognisable per-channel values.
fn build_region(channels: usize, rate_offset: f64) -> Region {
    let mut spectrum = Spectrum::zeroed(channels);
    for channel in 0..channels {
        spectrum.energy_low[channel] = 0.1 * (channel + 1) as f64;
        spectrum.energy_high[channel] = 0.1 * (channel + 2) as f64;
        spectrum.exposure[channel] = 500.0;
        spectrum.source_rate[channel] = rate_offset + channel as f64;
        spectrum.source_rate_error[channel] = 0.01 * (channel + 1) as f64;
        spectrum.back_rate[channel] = 0.001 * channel as f64;
        spectrum.backscale_ratio[channel] = 1.0;
    }

    let response = ResponseMatrix {
        component_channels: vec![channels],
        component_groups: vec![channels],
        sector: vec![1],
        region: vec![1],
        group_energy_low: (0..channels).map(|bin| 0.1 * (bin + 1) as f64).collect(),
        group_energy_high: (0..channels).map(|bin| 0.1 * (bin + 2) as f64).collect(),
        group_first_channel: (1..=channels).collect(),
        group_last_channel: (1..=channels).collect(),
        group_channels: vec![1; channels],
        response: (0..channels).map(|bin| 0.5 + 0.01 * bin as f64).collect(),
        sector_count: 1,
        region_count: 1,
        ..ResponseMatrix::default()
    };
    Region::new(spectrum, response)
}

#[test]
fn single_region_survives_write_read_extract_exactly() {
    let region = build_region(16, 2.0);

    let mut spo_store = JsonTabularStore::new();
    let mut res_store = JsonTabularStore::new();
    region
        .spectrum
        .write_to(&mut spo_store, true)
        .expect("write spectrum");
    region.response.write_to(&mut res_store).expect("write response");

    let spectrum = Spectrum::read_from(&spo_store).expect("read spectrum");
    let response = ResponseMatrix::read_from(&res_store).expect("read response");

    let extracted_spectrum = spectrum.extract_region(1).expect("extract spectrum");
    let extracted_response = response.extract_region(1, 1).expect("extract response");

    assert_eq!(extracted_spectrum.energy_low, region.spectrum.energy_low);
    assert_eq!(extracted_spectrum.source_rate, region.spectrum.source_rate);
    assert_eq!(
        extracted_spectrum.source_rate_error,
        region.spectrum.source_rate_error
    );
    assert_eq!(extracted_spectrum.back_rate, region.spectrum.back_rate);
    assert_eq!(extracted_spectrum.used, region.spectrum.used);

    assert_eq!(
        extracted_response.group_first_channel,
        region.response.group_first_channel
    );
    assert_eq!(extracted_response.response, region.response.response);
}

#[test]
fn dataset_round_trip_preserves_multi_region_files() {
    let mut dataset = Dataset::new();
    dataset
        .append_region(build_region(8, 1.0), RegionKey::new(1, 1))
        .expect("append region 1");
    dataset
        .append_region(build_region(12, 3.0), RegionKey::new(1, 2))
        .expect("append region 2");
    dataset
        .append_region(build_region(6, 7.0), RegionKey::new(2, 3))
        .expect("append region 3");

    let dir = tempfile::tempdir().expect("tempdir");
    let spo_path = dir.path().join("stack.spo");
    let res_path = dir.path().join("stack.res");

    let mut spo_store = JsonTabularStore::new();
    let mut res_store = JsonTabularStore::new();
    dataset
        .write_all_regions(&mut spo_store, &mut res_store, true)
        .expect("write dataset");
    spo_store.save(&spo_path, false).expect("save spo");
    res_store.save(&res_path, false).expect("save res");

    let spo_store = JsonTabularStore::open(&spo_path).expect("open spo");
    let res_store = JsonTabularStore::open(&res_path).expect("open res");
    let mut reread = Dataset::new();
    reread
        .read_all_regions(&spo_store, &res_store)
        .expect("read dataset");

    assert_eq!(reread.len(), 3);
    assert_eq!(
        reread.config,
        vec![RegionKey::new(1, 1), RegionKey::new(1, 2), RegionKey::new(2, 3)]
    );
    for (original, read_back) in dataset.regions.iter().zip(reread.regions.iter()) {
        assert_eq!(read_back.spectrum.source_rate, original.spectrum.source_rate);
        assert_eq!(read_back.response.response, original.response.response);
        assert_eq!(
            read_back.response.group_first_channel,
            original.response.group_first_channel
        );
    }
}

#[test]
fn region_masks_tile_the_value_table_exactly() {
    let mut matrix = ResponseMatrix::default();
    let sizes = [(1usize, 1usize, 8usize), (1, 2, 5), (2, 3, 11), (2, 4, 3)];
    for (sector, region, channels) in sizes {
        let single = build_region(channels, 0.0).response;
        let mut renumbered = single;
        renumbered.sector = vec![sector];
        renumbered.region = vec![region];
        matrix
            .concatenate_region(&renumbered, sector, region)
            .expect("concatenate region");
    }

    let mut covered = vec![0usize; matrix.response.len()];
    for (sector, region, _) in sizes {
        let mask = matrix.get_region_mask(sector, region).expect("mask");
        for row in mask.values {
            covered[row] += 1;
        }
    }
    assert!(
        covered.iter().all(|count| *count == 1),
        "value-table rows must be covered exactly once: {covered:?}"
    );
}

#[test]
fn swapping_twice_is_the_identity_for_both_tables() {
    let region = build_region(10, 4.0);

    let mut spectrum = region.spectrum.clone();
    spectrum.swap_channel_order().expect("first swap");
    spectrum.swap_channel_order().expect("second swap");
    assert_eq!(spectrum, region.spectrum);

    let mut response = region.response.clone();
    response.swap_channel_order();
    response.swap_channel_order();
    assert_eq!(response, region.response);
}
