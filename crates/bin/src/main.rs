//! Fundamenta CLI binary.
//!
//! One subcommand per pipeline stage; every stage reads and writes CSV
//! tables so runs can be resumed from any intermediate file.

mod config;
mod error;
mod integration;
mod report;

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use error::{StageContext, StageError};
use fundamenta::data::{
    DEFAULT_MACRO_SERIES, FredClient, JsonStatementSource, TICKER_COLUMN, YahooStatementSource,
    broadcast_macro, macro_row, merge_fundamentals, read_table, universe_tickers, write_table,
};
use fundamenta::features::{GrowthEngine, Imputer, KpiEngine, TableSchema};
use fundamenta::output::ExportFormat;
use fundamenta::reduce::{ArtifactStore, FittedExtraction};
use fundamenta::{
    Pipeline, PipelineConfig, Result, clean_universe, stratified_split, summarize,
};
use indicatif::{ProgressBar, ProgressStyle};
use integration::fetch_pipeline::{CacheOptions, fetch_universe, print_cache_info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fundamenta")]
#[command(about = "Fundamenta: fundamentals-driven feature engineering", long_about = None)]
#[command(version)]
struct Cli {
    /// Pipeline configuration file (JSON); flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch quarterly fundamentals for every ticker of a universe table
    Fetch {
        /// Universe CSV with a ticker column
        input: PathBuf,

        /// Output CSV (universe plus fundamentals)
        output: PathBuf,

        /// Read `{ticker}.json` statements from this directory instead of Yahoo
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Column holding the ticker symbols
        #[arg(long, default_value = TICKER_COLUMN)]
        ticker_column: String,

        /// Number of completed quarters to keep
        #[arg(long)]
        quarters: Option<usize>,

        /// Reference date for completed quarters (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<chrono::NaiveDate>,

        /// Concurrent requests
        #[arg(long)]
        concurrency: Option<usize>,

        /// Disable caching (always fetch fresh data)
        #[arg(long)]
        no_cache: bool,

        /// Force refresh cached data
        #[arg(long)]
        refresh: bool,

        /// Cache database path
        #[arg(long)]
        cache_path: Option<PathBuf>,
    },

    /// Broadcast quarterly macroeconomic series onto every row
    Macro {
        /// Input CSV
        input: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Single-row macro table to use instead of querying FRED
        #[arg(long)]
        table: Option<PathBuf>,

        /// Also write the macro row to this file
        #[arg(long)]
        save_table: Option<PathBuf>,
    },

    /// Clean the universe and assign market-cap categories
    Clean {
        /// Input CSV
        input: PathBuf,

        /// Output CSV
        output: PathBuf,
    },

    /// Stratified train/test split
    Split {
        /// Cleaned CSV
        input: PathBuf,

        /// Directory receiving X_train, X_test, y_train and y_test
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Columns containing this string become targets (e.g. `_2025Q2`)
        #[arg(long)]
        target: Option<String>,

        /// Test fraction per stratum
        #[arg(long)]
        test_size: Option<f64>,

        /// Shuffle seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Fill missing fundamentals with strata medians
    Impute {
        /// Table to fill
        input: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Take medians from this table instead of the input
        #[arg(long)]
        reference: Option<PathBuf>,
    },

    /// Derive KPI columns
    Kpis {
        /// Imputed CSV
        input: PathBuf,

        /// Output CSV
        output: PathBuf,
    },

    /// Derive quarter-over-quarter and rate columns
    Qoq {
        /// CSV with KPI columns
        input: PathBuf,

        /// Output CSV
        output: PathBuf,
    },

    /// Impute, then derive KPI and growth columns in one step
    Features {
        /// Raw table
        input: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Take medians from this table instead of the input
        #[arg(long)]
        reference: Option<PathBuf>,
    },

    /// Fit PCA and K-Means on a training table and persist the transforms
    Extract {
        /// Training feature CSV
        input: PathBuf,

        /// Output CSV with projections and cluster labels
        output: PathBuf,

        /// Artifact directory
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,

        /// Number of clusters
        #[arg(long)]
        clusters: Option<usize>,

        /// Directory for summary and variance reports
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Report format (csv, json or pretty)
        #[arg(long, default_value = "csv")]
        format: String,
    },

    /// Apply persisted transforms to another table
    Project {
        /// Feature CSV
        input: PathBuf,

        /// Output CSV with projections and cluster labels
        output: PathBuf,

        /// Artifact directory
        #[arg(long, default_value = "artifacts")]
        artifacts: PathBuf,
    },

    /// Within-group sum of squares for a range of cluster counts
    Elbow {
        /// Training feature CSV
        input: PathBuf,

        /// Largest cluster count
        #[arg(long)]
        max_clusters: Option<usize>,

        /// Write the curve to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format (csv, json or pretty)
        #[arg(long, default_value = "csv")]
        format: String,
    },

    /// Full train/test run: impute, KPIs, growth, extraction
    Run {
        /// Raw training CSV (X_train)
        train: PathBuf,

        /// Raw test CSV (X_test)
        test: PathBuf,

        /// Directory receiving feature tables, artifacts and reports
        #[arg(long, default_value = "output")]
        out_dir: PathBuf,

        /// Number of clusters
        #[arg(long)]
        clusters: Option<usize>,

        /// Report format (csv, json or pretty)
        #[arg(long, default_value = "csv")]
        format: String,
    },

    /// Show or clear the fundamentals cache
    Cache {
        /// Remove cached values
        #[arg(long)]
        clear: bool,

        /// Restrict `--clear` to one ticker
        #[arg(long)]
        ticker: Option<String>,

        /// Cache database path
        #[arg(long)]
        cache_path: Option<PathBuf>,
    },

    /// Print the effective pipeline configuration as JSON
    Config,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> std::result::Result<(), StageError> {
    let cli = Cli::parse();
    let mut config = config::load_config(cli.config.as_deref()).stage("config")?;

    match cli.command {
        Commands::Fetch {
            input,
            output,
            source_dir,
            ticker_column,
            quarters,
            as_of,
            concurrency,
            no_cache,
            refresh,
            cache_path,
        } => {
            if let Some(n) = quarters {
                config.fetch.n_quarters = n;
            }
            if as_of.is_some() {
                config.fetch.as_of = as_of;
            }
            if let Some(n) = concurrency {
                config.fetch.concurrency = n;
            }
            let cache = CacheOptions {
                use_cache: !no_cache,
                force_refresh: refresh,
                path: cache_path,
                ..CacheOptions::default()
            };
            fetch(&input, &output, source_dir, &ticker_column, &cache, &config)
                .await
                .stage("fetch")?;
        }
        Commands::Macro {
            input,
            output,
            table,
            save_table,
        } => {
            add_macro(&input, &output, table.as_deref(), save_table.as_deref(), &config)
                .await
                .stage("macro")?;
        }
        Commands::Clean { input, output } => {
            clean(&input, &output, &config).stage("clean")?;
        }
        Commands::Split {
            input,
            out_dir,
            target,
            test_size,
            seed,
        } => {
            if target.is_some() {
                config.split.target = target;
            }
            if let Some(test_size) = test_size {
                config.split.test_size = test_size;
            }
            if let Some(seed) = seed {
                config.split.seed = seed;
            }
            split(&input, &out_dir, &config).stage("split")?;
        }
        Commands::Impute {
            input,
            output,
            reference,
        } => {
            impute(&input, &output, reference.as_deref(), &config).stage("impute")?;
        }
        Commands::Kpis { input, output } => {
            kpis(&input, &output, &config).stage("kpis")?;
        }
        Commands::Qoq { input, output } => {
            qoq(&input, &output, &config).stage("qoq")?;
        }
        Commands::Features {
            input,
            output,
            reference,
        } => {
            features(&input, &output, reference.as_deref(), &config).stage("features")?;
        }
        Commands::Extract {
            input,
            output,
            artifacts,
            clusters,
            report_dir,
            format,
        } => {
            if let Some(k) = clusters {
                config.extraction.kmeans.n_clusters = k;
            }
            extract(&input, &output, &artifacts, report_dir.as_deref(), &format, &config)
                .stage("extract")?;
        }
        Commands::Project {
            input,
            output,
            artifacts,
        } => {
            project(&input, &output, &artifacts).stage("project")?;
        }
        Commands::Elbow {
            input,
            max_clusters,
            output,
            format,
        } => {
            if let Some(k) = max_clusters {
                config.elbow_max_clusters = k;
            }
            elbow(&input, output.as_deref(), &format, &config).stage("elbow")?;
        }
        Commands::Run {
            train,
            test,
            out_dir,
            clusters,
            format,
        } => {
            if let Some(k) = clusters {
                config.extraction.kmeans.n_clusters = k;
            }
            run_pipeline(&train, &test, &out_dir, &format, &config).stage("run")?;
        }
        Commands::Cache {
            clear,
            ticker,
            cache_path,
        } => {
            manage_cache(clear, ticker.as_deref(), cache_path.as_ref()).stage("cache")?;
        }
        Commands::Config => {
            let json = serde_json::to_string_pretty(&config).stage("config")?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn fetch(
    input: &Path,
    output: &Path,
    source_dir: Option<PathBuf>,
    ticker_column: &str,
    cache: &CacheOptions,
    config: &PipelineConfig,
) -> Result<()> {
    let universe = read_table(input)?;
    let tickers = universe_tickers(&universe, ticker_column)?;
    println!("Fetching fundamentals for {} tickers", tickers.len());
    if cache.use_cache {
        print_cache_info(cache.path.as_ref());
        if cache.force_refresh {
            println!("  Mode: Force refresh (re-fetching all data)");
        }
    } else {
        println!("  Cache: Disabled");
    }

    let pb = progress_bar(tickers.len());
    pb.set_message("Fetching fundamentals...");
    let fetched = match source_dir {
        Some(dir) => {
            let source = JsonStatementSource::new(dir);
            fetch_universe(&source, &tickers, &config.catalog, &config.fetch, cache, Some(&pb)).await
        }
        None => {
            let source = YahooStatementSource::new()?;
            fetch_universe(&source, &tickers, &config.catalog, &config.fetch, cache, Some(&pb)).await
        }
    };
    let mut fundamentals = match fetched {
        Ok(df) => {
            pb.finish_with_message(format!(
                "Fetched {} tickers ({} columns)",
                df.height(),
                df.width() - 1
            ));
            df
        }
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e);
        }
    };

    if ticker_column != TICKER_COLUMN {
        fundamentals.rename(TICKER_COLUMN, ticker_column.into())?;
    }
    let mut merged = merge_fundamentals(&universe, &fundamentals, ticker_column)?;
    write_table(&mut merged, output)?;
    println!("Saved {} rows to {}", merged.height(), output.display());
    Ok(())
}

async fn add_macro(
    input: &Path,
    output: &Path,
    table: Option<&Path>,
    save_table: Option<&Path>,
    config: &PipelineConfig,
) -> Result<()> {
    let df = read_table(input)?;
    let mut macro_table = match table {
        Some(path) => read_table(path)?,
        None => {
            let client = FredClient::from_env()?;
            let series = client.fetch_all(DEFAULT_MACRO_SERIES).await?;
            macro_row(&series, &config.fetch.quarters()?)?
        }
    };
    if let Some(path) = save_table {
        write_table(&mut macro_table, path)?;
    }
    let mut out = broadcast_macro(&df, &macro_table)?;
    write_table(&mut out, output)?;
    println!(
        "Added {} macro columns to {} rows",
        macro_table.width(),
        out.height()
    );
    Ok(())
}

fn clean(input: &Path, output: &Path, config: &PipelineConfig) -> Result<()> {
    let df = read_table(input)?;
    let mut cleaned = clean_universe(&df, &config.clean)?;
    write_table(&mut cleaned, output)?;
    println!(
        "Cleaned {} -> {} rows, saved to {}",
        df.height(),
        cleaned.height(),
        output.display()
    );
    Ok(())
}

fn split(input: &Path, out_dir: &Path, config: &PipelineConfig) -> Result<()> {
    let df = read_table(input)?;
    let mut tables = stratified_split(&df, &config.split)?;
    write_table(&mut tables.x_train, out_dir.join("X_train.csv"))?;
    write_table(&mut tables.x_test, out_dir.join("X_test.csv"))?;
    write_table(&mut tables.y_train, out_dir.join("y_train.csv"))?;
    write_table(&mut tables.y_test, out_dir.join("y_test.csv"))?;
    println!(
        "Saved {} training and {} test rows to {}",
        tables.x_train.height(),
        tables.x_test.height(),
        out_dir.display()
    );
    Ok(())
}

fn impute(input: &Path, output: &Path, reference: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    let df = read_table(input)?;
    let imputer = Imputer::new(config.impute.clone());
    let mut filled = match reference {
        Some(path) => imputer.reference_fill(&df, &read_table(path)?)?,
        None => imputer.self_fill(&df)?,
    };
    write_table(&mut filled, output)?;
    println!(
        "Imputed {} rows ({} dropped), saved to {}",
        filled.height(),
        df.height() - filled.height(),
        output.display()
    );
    Ok(())
}

fn kpis(input: &Path, output: &Path, config: &PipelineConfig) -> Result<()> {
    let df = read_table(input)?;
    let schema = TableSchema::from_frame(&df, &config.schema)?;
    let (mut out, _) = KpiEngine::default().derive(&df, &schema)?;
    write_table(&mut out, output)?;
    println!(
        "Added {} KPI columns, saved to {}",
        out.width() - df.width(),
        output.display()
    );
    Ok(())
}

fn qoq(input: &Path, output: &Path, config: &PipelineConfig) -> Result<()> {
    let df = read_table(input)?;
    let schema = TableSchema::from_frame(&df, &config.schema)?;
    let mut out = GrowthEngine::new(config.qoq.clone()).compute(&df, &schema)?;
    write_table(&mut out, output)?;
    println!(
        "Added {} growth columns, saved to {}",
        out.width() - df.width(),
        output.display()
    );
    Ok(())
}

fn features(input: &Path, output: &Path, reference: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    let df = read_table(input)?;
    let pipeline = Pipeline::new(config.clone());
    let mut out = match reference {
        Some(path) => pipeline.prepare_test(&df, &read_table(path)?)?,
        None => pipeline.prepare_train(&df)?,
    };
    write_table(&mut out, output)?;
    println!(
        "Built {} feature columns for {} rows, saved to {}",
        out.width(),
        out.height(),
        output.display()
    );
    Ok(())
}

fn extract(
    input: &Path,
    output: &Path,
    artifacts: &Path,
    report_dir: Option<&Path>,
    format: &str,
    config: &PipelineConfig,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let df = read_table(input)?;
    let (fitted, mut augmented) = Pipeline::new(config.clone()).extract(&df)?;
    fitted.save(&ArtifactStore::new(artifacts))?;
    write_table(&mut augmented, output)?;

    let summary = summarize(&fitted, &augmented)?;
    println!("{}", summary.to_ascii_table());
    if let Some(dir) = report_dir {
        report::write_run_reports(&summary, dir, format)?;
    }
    println!(
        "Saved artifacts to {} and features to {}",
        artifacts.display(),
        output.display()
    );
    Ok(())
}

fn project(input: &Path, output: &Path, artifacts: &Path) -> Result<()> {
    let fitted = FittedExtraction::load(&ArtifactStore::new(artifacts))?;
    let df = read_table(input)?;
    let mut projected = fitted.apply(&df)?;
    write_table(&mut projected, output)?;
    println!("Projected {} rows, saved to {}", projected.height(), output.display());
    Ok(())
}

fn elbow(input: &Path, output: Option<&Path>, format: &str, config: &PipelineConfig) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let df = read_table(input)?;
    let curve = Pipeline::new(config.clone()).elbow(&df)?;

    println!("{:>4}  {:>16}", "k", "WGSS");
    for (k, wgss) in &curve {
        println!("{:>4}  {:>16.4}", k, wgss);
    }
    if let Some(path) = output {
        report::write_elbow(&curve, path, format)?;
    }
    Ok(())
}

fn run_pipeline(
    train: &Path,
    test: &Path,
    out_dir: &Path,
    format: &str,
    config: &PipelineConfig,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let train_raw = read_table(train)?;
    let test_raw = read_table(test)?;

    let mut output = Pipeline::new(config.clone()).run(&train_raw, &test_raw)?;
    write_table(&mut output.train, out_dir.join("train_features.csv"))?;
    write_table(&mut output.test, out_dir.join("test_features.csv"))?;
    output.fitted.save(&ArtifactStore::new(out_dir.join("artifacts")))?;
    report::write_run_reports(&output.summary, &out_dir.join("reports"), format)?;

    println!("{}", output.summary.to_ascii_table());
    println!("Saved pipeline output to {}", out_dir.display());
    Ok(())
}

fn manage_cache(clear: bool, ticker: Option<&str>, path: Option<&PathBuf>) -> Result<()> {
    let cache = integration::cache_manager::open_cache(path)?;
    if clear {
        match ticker {
            Some(ticker) => cache.clear_ticker(ticker)?,
            None => cache.clear_all()?,
        }
        println!("Cache cleared");
    }
    print_cache_info(path);
    Ok(())
}
