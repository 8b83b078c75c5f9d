use std::fs;
use std::path::{Path, PathBuf};

use assert_approx_eq::assert_approx_eq;

use dynein_conformation_rust_lib::metadata::{BendDirection, MetadataFile, SampleMetadata};
use dynein_conformation_rust_lib::output::{write_pooled_outputs, write_sample_outputs};
use dynein_conformation_rust_lib::pipeline::{find_sample_dirs, load_sample, process_sample, PooledAnalysis};
use dynein_conformation_rust_lib::Config;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("dynein_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Contour 3 turns 90 degrees halfway, contour 9 has only 3 points, the rest are straight.
/// Doublets 1-4 carry class 2, doublet 5 class 3, doublets 6-9 class 1.
fn write_sample(data_dir: &Path, sample: &str) {
    let dir = data_dir.join(sample);
    fs::create_dir_all(&dir).unwrap();

    let mut points = String::from("Point,Contour,X,Y,Z\n");
    let mut classes = String::from("class\n");
    let mut point = 1;

    for contour in 1..=9 {
        let n = if contour == 9 { 3 } else { 20 };
        for i in 0..n {
            let (x, y) = if contour == 3 && i >= 10 {
                (9.0, 30.0 + (i - 9) as f64)
            } else {
                (i as f64, contour as f64 * 10.0)
            };
            points.push_str(&format!("{},{},{},{},5.0\n", point, contour, x, y));

            let class = match contour {
                1..=4 => 2,
                5 => 3,
                _ => 1,
            };
            classes.push_str(&format!("{}\n", class));
            point += 1;
        }
    }

    fs::write(dir.join(format!("{}_points.csv", sample)), points).unwrap();
    fs::write(dir.join(format!("{}_classification.csv", sample)), classes).unwrap();
}

fn config(root: &Path) -> Config {
    Config {
        input_path: root.join("Data").display().to_string(),
        output_base_dir: root.join("Results").display().to_string(),
        num_segments: 4,
        align_direction_signs: true,
        ..Config::default()
    }
}

fn clockwise(bend_direction: BendDirection) -> SampleMetadata {
    SampleMetadata {
        first_doublet: 1,
        clock_direction: "c".to_string(),
        bend_direction,
    }
}

#[test]
fn bent_doublet_is_detected_end_to_end() {
    let root = scratch_dir("bend");
    write_sample(&root.join("Data"), "tomo01");
    let config = config(&root);

    let samples = find_sample_dirs(&config.input_path).unwrap();
    assert_eq!(samples.len(), 1);
    let (name, dir) = &samples[0];

    let input = load_sample(dir, name).unwrap();
    assert_eq!(input.records.len(), 163);
    assert_eq!(input.class_codes.len(), 163);

    let analysis = process_sample(&input, &clockwise(BendDirection::Bend), &config).unwrap();
    assert_eq!(analysis.doublet_counts.get(&9), Some(&3));

    let bend = &analysis.bend;
    assert_eq!(bend.bent_doublets, vec![3]);
    assert_eq!(bend.reports.len(), 8);
    assert_eq!(bend.failures.len(), 1);
    assert_eq!(bend.failures[0].doublet, 9);

    let kinked = bend.reports.iter().find(|r| r.doublet == 3).unwrap();
    assert_eq!(kinked.angles.len(), 3);
    assert_approx_eq!(kinked.angles[1], 90.0, 1e-6);
    assert_approx_eq!(kinked.bending_amount, 90.0, 1e-4);
    assert_approx_eq!(bend.max_bending_amount.unwrap(), 90.0, 1e-4);
    assert_approx_eq!(bend.mean_bending_amount.unwrap(), 90.0 / 8.0, 1e-4);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn separated_classes_are_significant() {
    let root = scratch_dir("stats");
    write_sample(&root.join("Data"), "tomo01");
    let config = config(&root);

    let input = load_sample(root.join("Data").join("tomo01"), "tomo01").unwrap();
    let analysis = process_sample(&input, &clockwise(BendDirection::Straight), &config).unwrap();
    assert_eq!(analysis.class_counts.totals, vec![80, 20, 63]);

    let reports = analysis.significance.as_ref().unwrap();
    let pre_ps = reports.iter().find(|r| r.class_set.group == 2).unwrap();
    assert!(pre_ps.omnibus.is_ok());
    assert_approx_eq!(pre_ps.corrected_alpha, 0.05 / 3.0);

    // 1-4 vs 5 is perfectly separated: statistic equals the sample size
    let first = &pre_ps.pairwise[0];
    assert_eq!((first.first.as_str(), first.second.as_str()), ("1-4", "5"));
    let stat = first.result.as_ref().unwrap();
    assert_approx_eq!(stat.statistic, 100.0, 1e-9);
    assert!(stat.significant);

    // Neither 5 nor 6-9 carries class 2, so that pair has an empty column
    let last = &pre_ps.pairwise[2];
    assert_eq!((last.first.as_str(), last.second.as_str()), ("5", "6-9"));
    assert!(last.result.is_err());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn out_of_range_contours_are_dropped_and_recorded() {
    let root = scratch_dir("domain");
    write_sample(&root.join("Data"), "tomo01");
    let config = config(&root);

    let input = load_sample(root.join("Data").join("tomo01"), "tomo01").unwrap();
    // Counter-clockwise from -5: contours 1..=3 land on doublets 4, 3, 2 and 4..=9 fall off the table
    let metadata = SampleMetadata {
        first_doublet: -5,
        clock_direction: "cc".to_string(),
        bend_direction: BendDirection::Bend,
    };
    let analysis = process_sample(&input, &metadata, &config).unwrap();

    assert_eq!(analysis.table.points.len(), 60);
    let unmapped: Vec<(i64, usize)> = analysis.table.unmapped.iter().map(|u| (u.contour, u.points)).collect();
    assert_eq!(unmapped, vec![(4, 20), (5, 20), (6, 20), (7, 20), (8, 20), (9, 3)]);

    // The kinked contour 3 is now doublet 2
    assert_eq!(analysis.bend.bent_doublets, vec![2]);
    assert_eq!(analysis.bend.reports.len(), 3);
    assert_eq!(analysis.bend.failures.len(), 6);

    let output = root.join("Results");
    write_sample_outputs(&analysis, &output).unwrap();
    let report = fs::read_to_string(output.join("tomo01").join("tomo01_bending_results.txt")).unwrap();
    assert!(report.contains("Contour 9 (3 points): Doublet domain error"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn batch_writes_sample_and_pooled_reports() {
    let root = scratch_dir("batch");
    for name in ["tomo01", "tomo02"] {
        write_sample(&root.join("Data"), name);
    }
    let config = config(&root);
    let output = PathBuf::from(&config.output_base_dir);

    let text = r#"
ready_for_analysis = true

[samples.tomo01]
first_doublet = 1
clock_direction = "c"
bend_direction = "bend"

[samples.tomo02]
first_doublet = 1
clock_direction = "c"
bend_direction = "bend"
"#;
    let metadata_path = root.join("metadata.toml");
    fs::write(&metadata_path, text).unwrap();
    let metadata = MetadataFile::from_file(&metadata_path).unwrap();
    metadata.ensure_ready().unwrap();

    let mut pooled = PooledAnalysis::new(&config);
    for (name, dir) in find_sample_dirs(&config.input_path).unwrap() {
        let input = load_sample(&dir, &name).unwrap();
        let analysis = process_sample(&input, metadata.sample(&name).unwrap(), &config).unwrap();
        write_sample_outputs(&analysis, &output).unwrap();
        assert!(pooled.add(&analysis).unwrap());
    }

    let groups = pooled.finalize();
    assert_eq!(groups[1].samples(), &["tomo01".to_string(), "tomo02".to_string()]);
    assert_eq!(groups[1].significance.counts().totals, vec![160, 40, 126]);
    write_pooled_outputs(&groups, &config, &output).unwrap();

    let sample_dir = output.join("tomo01");
    for file in [
        "tomo01_doublets.csv",
        "tomo01_doublet_counts.csv",
        "tomo01_bending_results.txt",
        "tomo01_bending.csv",
        "tomo01_statistics.txt",
        "tomo01_summary.json",
    ] {
        assert!(sample_dir.join(file).is_file(), "missing {}", file);
    }

    assert!(output.join("pooled_statistics_bend.txt").is_file());
    assert!(!output.join("pooled_statistics_straight.txt").exists());
    assert!(output.join("class_distribution_grouped_bend.csv").is_file());
    assert!(output.join("class_distribution_single_bend_fraction.csv").is_file());

    let pooled_text = fs::read_to_string(output.join("pooled_statistics_bend.txt")).unwrap();
    assert!(pooled_text.starts_with("Pooled samples (bend): tomo01, tomo02"));

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(sample_dir.join("tomo01_summary.json")).unwrap()).unwrap();
    assert_eq!(summary["bend_direction"], "bend");
    assert_eq!(summary["bending"]["bent_doublets"][0], 3);

    let _ = fs::remove_dir_all(&root);
}
