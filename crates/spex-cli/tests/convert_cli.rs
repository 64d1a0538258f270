use spex_core::ogip::{Pha, Rmf};
use spex_core::spex::{ResponseMatrix, Spectrum};
use spex_core::table::{Column, HeaderValue, JsonTabularStore, Table, TabularStore};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_spextools-rs"))
}

/// Write a small diagonal OGIP file set (PHA + RMF) into `dir`.
fn write_ogip_fixtures(dir: &Path, channels: usize) -> (std::path::PathBuf, std::path::PathBuf) {
    let pha_path = dir.join("source.pha");
    let rmf_path = dir.join("response.rmf");

    let mut pha_store = JsonTabularStore::new();
    pha_store
        .write_table(
            Table::new("SPECTRUM")
                .with_header("DETCHANS", HeaderValue::Int(channels as i64))
                .with_header("EXPOSURE", HeaderValue::Float(1000.0))
                .with_header("HDUCLAS2", HeaderValue::Text("TOTAL".to_string()))
                .with_header("HDUCLAS3", HeaderValue::Text("RATE".to_string()))
                .with_column("CHANNEL", Column::Int((1..=channels as i64).collect()))
                .with_column("RATE", Column::Float(vec![0.01; channels]))
                .with_column("STAT_ERR", Column::Float(vec![0.001; channels])),
        )
        .expect("write spectrum table");
    pha_store.save(&pha_path, false).expect("save pha");

    let rmf = Rmf {
        first_channel: 1,
        channel: (1..=channels as i64).collect(),
        channel_low_energy: (0..channels).map(|i| 0.1 * (i + 1) as f64).collect(),
        channel_high_energy: (0..channels).map(|i| 0.1 * (i + 2) as f64).collect(),
        channel_count: channels,
        low_energy: (0..channels).map(|i| 0.1 * (i + 1) as f64).collect(),
        high_energy: (0..channels).map(|i| 0.1 * (i + 2) as f64).collect(),
        group_count: vec![1; channels],
        energy_bin_count: channels,
        first_channel_group: (1..=channels as i64).collect(),
        channels_per_group: vec![1; channels],
        total_group_count: channels,
        matrix: vec![1.0; channels],
        total_element_count: channels,
        energy_units: "keV".to_string(),
        area_included: false,
    };
    let mut rmf_store = JsonTabularStore::new();
    rmf.write_to(&mut rmf_store).expect("write rmf tables");
    rmf_store.save(&rmf_path, false).expect("save rmf");

    (pha_path, rmf_path)
}

#[test]
fn convert_writes_both_target_files() {
    let temp = TempDir::new().expect("tempdir");
    let (pha_path, rmf_path) = write_ogip_fixtures(temp.path(), 6);
    let spo_path = temp.path().join("out.spo");
    let res_path = temp.path().join("out.res");

    let output = binary()
        .args([
            "convert",
            "--pha",
            pha_path.to_str().expect("utf8 path"),
            "--rmf",
            rmf_path.to_str().expect("utf8 path"),
            "--spo",
            spo_path.to_str().expect("utf8 path"),
            "--res",
            res_path.to_str().expect("utf8 path"),
        ])
        .output()
        .expect("run convert");
    assert!(
        output.status.success(),
        "convert failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(spo_path.exists());
    assert!(res_path.exists());

    // The converted spectrum carries the source rates unchanged.
    let spo_store = JsonTabularStore::open(&spo_path).expect("open spo");
    let spectrum = Spectrum::read_from(&spo_store).expect("read spectrum");
    assert_eq!(spectrum.region_channels, vec![6]);
    for rate in &spectrum.source_rate {
        assert!((rate - 0.01).abs() < 1.0e-9);
    }

    let res_store = JsonTabularStore::open(&res_path).expect("open res");
    let response = ResponseMatrix::read_from(&res_store).expect("read response");
    assert!(response.check().is_ok());
    assert_eq!(response.component_channels, vec![6]);
}

#[test]
fn convert_refuses_to_overwrite_without_flag() {
    let temp = TempDir::new().expect("tempdir");
    let (pha_path, rmf_path) = write_ogip_fixtures(temp.path(), 4);
    let spo_path = temp.path().join("out.spo");
    let res_path = temp.path().join("out.res");

    let args = [
        "convert".to_string(),
        "--pha".to_string(),
        pha_path.display().to_string(),
        "--rmf".to_string(),
        rmf_path.display().to_string(),
        "--spo".to_string(),
        spo_path.display().to_string(),
        "--res".to_string(),
        res_path.display().to_string(),
    ];

    let first = binary().args(&args).output().expect("first run");
    assert!(first.status.success());

    let second = binary().args(&args).output().expect("second run");
    assert!(!second.status.success());
    let stderr = String::from_utf8_lossy(&second.stderr);
    assert!(stderr.contains("refusing to overwrite"), "stderr: {stderr}");

    let mut overwrite_args = args.to_vec();
    overwrite_args.push("--overwrite".to_string());
    let third = binary().args(&overwrite_args).output().expect("third run");
    assert!(third.status.success());
}

#[test]
fn simulate_builds_a_region_from_the_response_alone() {
    let temp = TempDir::new().expect("tempdir");
    let (_pha_path, rmf_path) = write_ogip_fixtures(temp.path(), 5);
    let spo_path = temp.path().join("sim.spo");
    let res_path = temp.path().join("sim.res");

    let output = binary()
        .args([
            "simulate",
            "--rmf",
            rmf_path.to_str().expect("utf8 path"),
            "--spo",
            spo_path.to_str().expect("utf8 path"),
            "--res",
            res_path.to_str().expect("utf8 path"),
        ])
        .output()
        .expect("run simulate");
    assert!(
        output.status.success(),
        "simulate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let spo_store = JsonTabularStore::open(&spo_path).expect("open spo");
    let spectrum = Spectrum::read_from(&spo_store).expect("read spectrum");
    // The dummy spectrum has a unit rate over a 1000 s exposure.
    let dummy = Pha::create_dummy(&Rmf::read_from(&JsonTabularStore::open(&rmf_path).expect("open rmf")).expect("read rmf"));
    assert_eq!(spectrum.channel_count(), dummy.channel_count);
    for (rate, expected) in spectrum.source_rate.iter().zip(dummy.rate.iter()) {
        assert!((rate - expected).abs() < 1.0e-12);
    }
}

#[test]
fn resolution_reports_the_profile() {
    let temp = TempDir::new().expect("tempdir");
    let (pha_path, rmf_path) = write_ogip_fixtures(temp.path(), 6);
    let spo_path = temp.path().join("out.spo");
    let res_path = temp.path().join("out.res");

    let convert = binary()
        .args([
            "convert",
            "--pha",
            pha_path.to_str().expect("utf8 path"),
            "--rmf",
            rmf_path.to_str().expect("utf8 path"),
            "--spo",
            spo_path.to_str().expect("utf8 path"),
            "--res",
            res_path.to_str().expect("utf8 path"),
        ])
        .output()
        .expect("run convert");
    assert!(convert.status.success());

    let output = binary()
        .args([
            "resolution",
            "--spo",
            spo_path.to_str().expect("utf8 path"),
            "--res",
            res_path.to_str().expect("utf8 path"),
        ])
        .output()
        .expect("run resolution");
    assert!(
        output.status.success(),
        "resolution failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Resolution of sector 1 region 1"), "stdout: {stdout}");
    assert!(stdout.contains("R ="), "stdout: {stdout}");

    // The JSON report carries the same profile in machine-readable form.
    let json_output = binary()
        .args([
            "resolution",
            "--spo",
            spo_path.to_str().expect("utf8 path"),
            "--res",
            res_path.to_str().expect("utf8 path"),
            "--json",
        ])
        .output()
        .expect("run resolution --json");
    assert!(json_output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&json_output.stdout).expect("valid JSON report");
    assert_eq!(report["region"], 1);
    assert!(report["profile"]["elements"].as_array().expect("elements").len() >= 1);
}

#[test]
fn missing_input_file_exits_nonzero() {
    let temp = TempDir::new().expect("tempdir");
    let output = binary()
        .args([
            "convert",
            "--pha",
            temp.path().join("missing.pha").to_str().expect("utf8 path"),
            "--rmf",
            temp.path().join("missing.rmf").to_str().expect("utf8 path"),
            "--spo",
            temp.path().join("out.spo").to_str().expect("utf8 path"),
            "--res",
            temp.path().join("out.res").to_str().expect("utf8 path"),
        ])
        .output()
        .expect("run convert");
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}
