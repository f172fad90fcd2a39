//! End-to-end feature derivation over a small wide table.

use approx::assert_relative_eq;
use fundamenta_features::{
    GrowthEngine, ImputeConfig, Imputer, KpiEngine, SchemaConfig, TableSchema,
};
use polars::prelude::*;

fn raw() -> DataFrame {
    df! {
        "Ticker" => &["AAA", "BBB", "CCC", "DDD"],
        "Sector" => &["Tech", "Tech", "Tech", "Energy"],
        "Market Cap" => &["Mid-Cap", "Mid-Cap", "Mid-Cap", "Large-Cap"],
        "Revenue_2024Q2" => &[Some(100.0), Some(80.0), None, Some(40.0)],
        "Revenue_2024Q3" => &[Some(150.0), Some(90.0), Some(70.0), Some(60.0)],
        "TotalAssets_2024Q2" => &[Some(0.0), Some(500.0), Some(700.0), Some(10.0)],
        "TotalAssets_2024Q3" => &[Some(0.0), Some(520.0), Some(650.0), Some(12.0)],
        "NetIncome_2024Q3" => &[Some(10.0), Some(9.0), Some(7.0), Some(6.0)],
        "GDP_2024Q2" => &[1.0, 1.0, 1.0, 1.0],
        "GDP_2024Q3" => &[1.1, 1.1, 1.1, 1.1],
    }
    .unwrap()
}

#[test]
fn test_impute_kpi_growth() {
    let imputer = Imputer::new(ImputeConfig::default());
    let imputed = imputer.self_fill(&raw()).unwrap();
    assert_eq!(imputed.height(), 4);

    let revenue = imputed.column("Revenue_2024Q2").unwrap().f64().unwrap();
    assert_eq!(revenue.null_count(), 0);
    assert_relative_eq!(revenue.get(2).unwrap(), 90.0);

    let schema = TableSchema::from_frame(&imputed, &SchemaConfig::default()).unwrap();
    assert!(!schema.has_metric("GDP"));

    let (with_kpis, schema) = KpiEngine::default().derive(&imputed, &schema).unwrap();
    assert!(schema.has_metric("KPI_ReturnOnAssets"));

    let out = GrowthEngine::default().compute(&with_kpis, &schema).unwrap();

    let revenue_qoq = out.column("Revenue_QoQ_24Q2_24Q3").unwrap().f64().unwrap();
    assert_relative_eq!(revenue_qoq.get(0).unwrap(), 0.5);

    let assets_qoq = out.column("TotalAssets_QoQ_24Q2_24Q3").unwrap().f64().unwrap();
    assert_eq!(assets_qoq.get(0).unwrap(), 0.0);

    // NetIncome only exists for one quarter, so it has no growth columns.
    assert!(out.column("NetIncome_Rate").is_err());
    assert!(out.column("GDP_QoQ_24Q2_24Q3").is_err());
}

#[test]
fn test_reference_fill_ignores_filled_table() {
    let train = raw();
    let test = df! {
        "Ticker" => &["EEE", "FFF", "GGG"],
        "Sector" => &["Tech", "Tech", "Utilities"],
        "Market Cap" => &["Mid-Cap", "Mid-Cap", "Mid-Cap"],
        "Revenue_2024Q2" => &[None, Some(1_000_000.0), None],
        "Revenue_2024Q3" => &[Some(1.0), Some(2.0), Some(3.0)],
        "TotalAssets_2024Q2" => &[Some(1.0), Some(1.0), Some(1.0)],
        "TotalAssets_2024Q3" => &[Some(1.0), Some(1.0), Some(1.0)],
        "NetIncome_2024Q3" => &[Some(1.0), Some(1.0), Some(1.0)],
        "GDP_2024Q2" => &[1.0, 1.0, 1.0],
        "GDP_2024Q3" => &[1.1, 1.1, 1.1],
    }
    .unwrap();

    let imputer = Imputer::new(ImputeConfig::default());
    let filled = imputer.reference_fill(&test, &train).unwrap();

    // Utilities never occurs in the training set, so GGG stays missing and is dropped.
    assert_eq!(filled.height(), 2);
    let tickers = filled.column("Ticker").unwrap().str().unwrap();
    assert_eq!(tickers.get(0), Some("EEE"));

    // The training median (90) is used, not the test table's own value.
    let revenue = filled.column("Revenue_2024Q2").unwrap().f64().unwrap();
    assert_relative_eq!(revenue.get(0).unwrap(), 90.0);
    assert_eq!(filled.width(), test.width());
}
