//! Writing every report of a run to disk.

use fundamenta_output::{
    ExportFormat, Exporter, ProjectionSummary, RunSummary, cluster_size_rows, elbow_rows,
    variance_rows,
};

#[test]
fn test_full_report_set_written() {
    let dir = tempfile::tempdir().unwrap();
    let ratios = vec![0.5, 0.25, 0.125];
    let sizes = vec![5, 3];

    let mut variance = variance_rows("pca_all", &ratios);
    variance.extend(variance_rows("pca_KPI", &[0.9]));
    variance
        .export_to_file(&dir.path().join("variance.csv"), ExportFormat::Csv)
        .unwrap();
    elbow_rows(&[(1, 9.0), (2, 3.0), (3, 2.5)])
        .export_to_file(&dir.path().join("elbow.json"), ExportFormat::Json)
        .unwrap();
    cluster_size_rows(&sizes)
        .export_to_file(&dir.path().join("clusters.csv"), ExportFormat::Csv)
        .unwrap();

    let summary = RunSummary::new(
        8,
        ProjectionSummary::new("pca_all", 12, ratios),
        ProjectionSummary::new("pca_KPI", 4, vec![0.9]),
        sizes,
        1.5,
    );
    summary
        .export_to_file(&dir.path().join("summary.json"), ExportFormat::PrettyJson)
        .unwrap();

    let variance_csv = std::fs::read_to_string(dir.path().join("variance.csv")).unwrap();
    assert_eq!(variance_csv.lines().count(), 5);
    assert!(variance_csv.contains("pca_all,3,0.125,0.875"));

    let elbow: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("elbow.json")).unwrap())
            .unwrap();
    assert_eq!(elbow.len(), 3);

    let clusters = std::fs::read_to_string(dir.path().join("clusters.csv")).unwrap();
    assert!(clusters.contains("0,5,0.625"));

    let back: RunSummary =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(back, summary);
}
