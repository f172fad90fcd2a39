//! Report files written next to fitted artifacts.

use std::path::Path;

use fundamenta::Result;
use fundamenta::output::{
    ExportFormat, Exporter, RunSummary, cluster_size_rows, elbow_rows, variance_rows,
};

/// Write the run summary (plus a Markdown rendering), per-projection
/// explained variance and cluster sizes into `dir`.
pub(crate) fn write_run_reports(summary: &RunSummary, dir: &Path, format: ExportFormat) -> Result<()> {
    let ext = format.extension();
    summary.export_to_file(&dir.join(format!("summary.{ext}")), format)?;
    std::fs::write(dir.join("summary.md"), summary.to_markdown())?;

    let mut variance = variance_rows(
        &summary.pca_all.name,
        &summary.pca_all.explained_variance_ratio,
    );
    variance.extend(variance_rows(
        &summary.pca_kpi.name,
        &summary.pca_kpi.explained_variance_ratio,
    ));
    variance.export_to_file(&dir.join(format!("explained_variance.{ext}")), format)?;

    cluster_size_rows(&summary.cluster_sizes)
        .export_to_file(&dir.join(format!("cluster_sizes.{ext}")), format)?;
    tracing::info!(dir = %dir.display(), "wrote reports");
    Ok(())
}

/// Write an elbow curve to `path`.
pub(crate) fn write_elbow(curve: &[(usize, f64)], path: &Path, format: ExportFormat) -> Result<()> {
    elbow_rows(curve).export_to_file(path, format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundamenta::output::ProjectionSummary;

    #[test]
    fn test_write_run_reports() {
        let summary = RunSummary::new(
            10,
            ProjectionSummary::new("pca_all", 6, vec![0.5, 0.3]),
            ProjectionSummary::new("pca_KPI", 3, vec![0.7]),
            vec![6, 4],
            12.5,
        );
        let dir = tempfile::tempdir().unwrap();
        write_run_reports(&summary, dir.path(), ExportFormat::Csv).unwrap();

        let variance = std::fs::read_to_string(dir.path().join("explained_variance.csv")).unwrap();
        assert_eq!(variance.lines().count(), 4);
        assert!(variance.contains("pca_KPI"));
        assert!(dir.path().join("summary.csv").exists());
        assert!(dir.path().join("cluster_sizes.csv").exists());
        let markdown = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
        assert!(markdown.starts_with("# Feature Extraction Summary"));
    }
}
