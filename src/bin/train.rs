//! Offline trainer for the risk classifier.
//!
//! Reads `DATA_DIR/gaming_survey.csv`, derives the binary risk target from
//! the stress, anxiety and play-time columns, fits the label encoders and the
//! forest, and writes both artifacts to `MODEL_DIR`. Exits non-zero when the
//! dataset is missing or lacks a required column.

use anyhow::{bail, Context, Result};
use nexus_guardian::domain::questionnaire::QUESTIONS;
use nexus_guardian::model::bundle::{ENCODERS_FILE, MODEL_FILE};
use nexus_guardian::model::{Dataset, EncoderSet, ForestConfig, LabelEncoder, RandomForest};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

const DATASET_FILE: &str = "gaming_survey.csv";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into()));
    let model_dir = PathBuf::from(std::env::var("MODEL_DIR").unwrap_or_else(|_| "model".into()));
    let dataset_path = data_dir.join(DATASET_FILE);

    if !dataset_path.exists() {
        bail!("training dataset not found: {}", dataset_path.display());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&dataset_path)
        .with_context(|| format!("cannot open {}", dataset_path.display()))?;

    let headers = reader.headers()?.clone();
    let mut columns: HashMap<&str, usize> = HashMap::new();
    for question in &QUESTIONS {
        match headers.iter().position(|h| h == question.id) {
            Some(idx) => {
                columns.insert(question.id, idx);
            }
            None => bail!(
                "dataset {} is missing required column '{}'",
                dataset_path.display(),
                question.id
            ),
        }
    }

    let records: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .with_context(|| format!("cannot read {}", dataset_path.display()))?;
    if records.is_empty() {
        bail!("dataset {} has no data rows", dataset_path.display());
    }
    tracing::info!("Loaded {} survey rows", records.len());

    // Encoders are fitted on the full column before any row is encoded, so
    // the class codes match what the server will see.
    let mut encoders = EncoderSet::new();
    for question in QUESTIONS.iter().filter(|q| q.categorical) {
        let idx = columns[question.id];
        let values = records.iter().filter_map(|r| r.get(idx));
        let encoder = LabelEncoder::fit(values);
        tracing::info!(
            "Encoder '{}': {} classes {:?}",
            question.id,
            encoder.classes().len(),
            encoder.classes()
        );
        encoders.insert(question.id.to_string(), encoder);
    }

    let feature_names: Vec<String> = QUESTIONS.iter().map(|q| q.id.to_string()).collect();
    let mut dataset = Dataset::new(feature_names);
    let mut skipped = 0usize;

    'rows: for record in &records {
        let mut row = Vec::with_capacity(QUESTIONS.len());
        for question in &QUESTIONS {
            let raw = record.get(columns[question.id]).unwrap_or("");
            let value = if question.categorical {
                match encoders[question.id].encode(raw) {
                    Some(code) => code,
                    None => {
                        skipped += 1;
                        continue 'rows;
                    }
                }
            } else {
                match raw.parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => {
                        skipped += 1;
                        continue 'rows;
                    }
                }
            };
            row.push(value);
        }
        let stress = record
            .get(columns["stress_level"])
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        let anxiety = record
            .get(columns["anxiety_level"])
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        let hours = record
            .get(columns["hours_per_day"])
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        dataset.push(row, derive_target(stress, anxiety, hours));
    }

    if skipped > 0 {
        tracing::warn!("Skipped {skipped} malformed rows");
    }
    if dataset.n_samples() == 0 {
        bail!("no usable rows in {}", dataset_path.display());
    }
    tracing::info!(
        "Training on {} samples, positive rate {:.1}%",
        dataset.n_samples(),
        dataset.positive_rate() * 100.0
    );

    let forest = RandomForest::fit(ForestConfig::default(), &dataset);
    tracing::info!(
        "Fitted {} trees, training accuracy {:.1}%",
        forest.n_trees(),
        forest.accuracy(&dataset) * 100.0
    );
    for (name, importance) in forest.importance_ranking().into_iter().take(5) {
        tracing::info!("  importance {name}: {importance:.4}");
    }

    fs::create_dir_all(&model_dir)
        .with_context(|| format!("cannot create model directory {}", model_dir.display()))?;

    let model_path = model_dir.join(MODEL_FILE);
    let file = File::create(&model_path)
        .with_context(|| format!("cannot write {}", model_path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &forest)?;

    let encoders_path = model_dir.join(ENCODERS_FILE);
    let file = File::create(&encoders_path)
        .with_context(|| format!("cannot write {}", encoders_path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &encoders)?;

    tracing::info!(
        "Artifacts written: {} and {}",
        model_path.display(),
        encoders_path.display()
    );
    Ok(())
}

/// High-risk target rule: elevated stress or anxiety combined with more than
/// two hours of daily play.
fn derive_target(stress: f64, anxiety: f64, hours: f64) -> f64 {
    if (anxiety >= 7.0 || stress >= 7.0) && hours > 2.0 {
        1.0
    } else {
        0.0
    }
}
