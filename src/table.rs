//! Result table of a job: one row per bin and model, in the shape the web
//! front end feeds to its table widget (`columns` titles plus `data` rows).

use serde::Serialize;
use serde_json::{Value, json};

use crate::db::{Database, bin_repo, job_repo, pica_repo};
use crate::domain::JobKey;
use crate::error::PhenError;

pub const COLUMN_TITLES: [&str; 5] = ["Bin", "Model", "Prediction", "p-value", "Accuracy"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub bin_alias: String,
    pub model_name: String,
    /// `"+"` or `"-"`.
    pub prediction: String,
    pub pica_pval: f64,
    pub accuracy: f64,
}

impl ResultRow {
    fn cells(&self) -> Value {
        json!([
            self.bin_alias,
            self.model_name,
            self.prediction,
            self.pica_pval,
            self.accuracy
        ])
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    pub rows: Vec<ResultRow>,
}

#[derive(Serialize)]
struct Column {
    title: &'static str,
}

impl Serialize for ResultTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire {
            columns: Vec<Column>,
            data: Vec<Value>,
        }
        Wire {
            columns: COLUMN_TITLES.iter().map(|&title| Column { title }).collect(),
            data: self.rows.iter().map(ResultRow::cells).collect(),
        }
        .serialize(serializer)
    }
}

pub fn prediction_symbol(verdict: bool) -> &'static str {
    if verdict { "+" } else { "-" }
}

/// Bins are listed in the order they were added to the job, models by name.
pub fn build_result_table(db: &Database, job: &JobKey) -> Result<ResultTable, PhenError> {
    if !job_repo::exists(db, job.as_str())? {
        return Err(PhenError::JobNotFound(job.to_string()));
    }

    let mut rows = Vec::new();
    for member in bin_repo::bins_in_job(db, job.as_str())? {
        for result in pica_repo::results_for_bin(db, member.bin_id)? {
            rows.push(ResultRow {
                bin_alias: member.bin_alias.clone(),
                model_name: result.model_name,
                prediction: prediction_symbol(result.verdict).to_string(),
                pica_pval: result.pica_pval,
                accuracy: result.accuracy,
            });
        }
    }
    tracing::debug!(job = %job, rows = rows.len(), "result table built");
    Ok(ResultTable { rows })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub description: String,
}

/// Every trait model with its description, for the model filter.
pub fn model_catalog(db: &Database) -> Result<Vec<ModelInfo>, PhenError> {
    Ok(pica_repo::list_models(db)?
        .into_iter()
        .map(|model| ModelInfo {
            name: model.model_name,
            description: model.description.unwrap_or_default(),
        })
        .collect())
}
