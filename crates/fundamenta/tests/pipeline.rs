//! Clean, split and run the full feature pipeline on a synthetic universe.

use approx::assert_relative_eq;
use fundamenta::reduce::{ArtifactStore, FittedExtraction, KMeansConfig, PcaConfig};
use fundamenta::{
    CleanConfig, Pipeline, PipelineConfig, SplitConfig, clean_universe, stratified_split,
};
use polars::prelude::*;

const ROWS: usize = 64;

fn series(scale: f64, phase: f64) -> Vec<f64> {
    (0..ROWS)
        .map(|i| scale * (2.0 + ((i as f64) * 0.37 + phase).sin()) + i as f64)
        .collect()
}

fn with_gaps(values: Vec<f64>, every: usize) -> Vec<Option<f64>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i % every != 3).then_some(v))
        .collect()
}

fn raw_universe() -> DataFrame {
    let tickers: Vec<String> = (0..ROWS).map(|i| format!("T{i:03}")).collect();
    let sectors: Vec<&str> = (0..ROWS)
        .map(|i| if i % 2 == 0 { "Energy" } else { "Health Care" })
        .collect();
    let market_values: Vec<String> = (0..ROWS)
        .map(|i| if (i / 2) % 2 == 0 { "120,000".to_string() } else { "4,500,000".to_string() })
        .collect();
    let locations: Vec<&str> = (0..ROWS)
        .map(|i| if i % 5 == 0 { "Canada" } else { "United States" })
        .collect();

    let mut columns = vec![
        Column::new("Ticker".into(), tickers),
        Column::new("Asset Class".into(), vec!["Equity"; ROWS]),
        Column::new("Exchange".into(), vec!["NASDAQ"; ROWS]),
        Column::new("Currency".into(), vec!["USD"; ROWS]),
        Column::new("Location".into(), locations),
        Column::new("Sector".into(), sectors),
        Column::new("Market Value".into(), market_values),
    ];
    let metrics = [
        ("Revenue", 500.0),
        ("CostOfRevenue", 200.0),
        ("NetIncome", 40.0),
        ("CurrentAssets", 300.0),
        ("CurrentLiabilities", 150.0),
        ("TotalAssets", 900.0),
        ("TotalEquity", 400.0),
        ("TotalDebt", 250.0),
        ("CashFromOps", 60.0),
    ];
    for (m, (metric, scale)) in metrics.iter().enumerate() {
        for (q, quarter) in ["2024Q3", "2024Q4"].iter().enumerate() {
            let values = series(*scale, (m * 2 + q) as f64);
            let name = format!("{metric}_{quarter}");
            let column = if *metric == "Revenue" && q == 0 {
                Column::new(name.into(), with_gaps(values, 11))
            } else {
                Column::new(name.into(), values)
            };
            columns.push(column);
        }
    }
    DataFrame::new(columns).unwrap()
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.extraction.pca_all = PcaConfig::with_components(4);
    config.extraction.pca_kpi = PcaConfig::with_components(2);
    config.extraction.kmeans = KMeansConfig {
        n_clusters: 3,
        n_init: 4,
        ..KMeansConfig::default()
    };
    config.elbow_max_clusters = 4;
    config
}

#[test]
fn test_full_pipeline() {
    let cleaned = clean_universe(&raw_universe(), &CleanConfig::default()).unwrap();
    assert_eq!(cleaned.height(), ROWS);
    assert!(cleaned.column("Market Cap").is_ok());

    let split = stratified_split(&cleaned, &SplitConfig::default()).unwrap();
    assert_eq!(split.x_train.height() + split.x_test.height(), ROWS);

    let pipeline = Pipeline::new(config());
    let output = pipeline.run(&split.x_train, &split.x_test).unwrap();

    assert_eq!(output.train.height(), split.x_train.height());
    assert_eq!(output.test.height(), split.x_test.height());
    for name in ["KPI_CurrentRatio_2024Q4", "Revenue_QoQ_24Q3_24Q4", "PCA_all_PC4", "PCA_KPI_PC2", "Cluster"] {
        assert!(output.test.column(name).is_ok(), "missing {name}");
    }

    let summary = &output.summary;
    assert_eq!(summary.rows, output.train.height());
    assert_eq!(summary.pca_all.n_components, 4);
    assert_eq!(summary.pca_kpi.n_components, 2);
    assert_eq!(summary.cluster_sizes.iter().sum::<usize>(), summary.rows);
    assert!(summary.pca_all.total_explained() <= 1.0 + 1e-9);
}

#[test]
fn test_saved_transforms_replay_on_test() {
    let cleaned = clean_universe(&raw_universe(), &CleanConfig::default()).unwrap();
    let split = stratified_split(&cleaned, &SplitConfig::default()).unwrap();
    let pipeline = Pipeline::new(config());

    let train = pipeline.prepare_train(&split.x_train).unwrap();
    let test = pipeline.prepare_test(&split.x_test, &split.x_train).unwrap();
    let (fitted, _) = pipeline.extract(&train).unwrap();
    let expected = fitted.apply(&test).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    fitted.save(&store).unwrap();
    let replayed = FittedExtraction::load(&store).unwrap().apply(&test).unwrap();

    let a = expected.column("PCA_KPI_PC1").unwrap().f64().unwrap();
    let b = replayed.column("PCA_KPI_PC1").unwrap().f64().unwrap();
    for (x, y) in a.into_iter().zip(b.into_iter()) {
        assert_relative_eq!(x.unwrap(), y.unwrap());
    }
    let labels = |df: &DataFrame| -> Vec<Option<u32>> {
        df.column("Cluster").unwrap().u32().unwrap().into_iter().collect()
    };
    assert_eq!(labels(&expected), labels(&replayed));
}

#[test]
fn test_elbow_curve() {
    let cleaned = clean_universe(&raw_universe(), &CleanConfig::default()).unwrap();
    let pipeline = Pipeline::new(config());
    let train = pipeline.prepare_train(&cleaned).unwrap();

    let curve = pipeline.elbow(&train).unwrap();
    assert_eq!(curve.len(), 4);
    assert_eq!(curve[0].0, 1);
    assert!(curve.iter().all(|(_, wgss)| wgss.is_finite() && *wgss >= 0.0));
    assert!(curve[3].1 < curve[0].1);
}
