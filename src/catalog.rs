use std::time::Duration;

use chrono::{Days, NaiveDate};
use reqwest::blocking::Client;
use serde_json::Value;

use crate::domain::{AssemblyAccession, GenomeRecord};
use crate::error::PhenError;
use crate::http::{build_client, build_query_url, send_with_retries};

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const SUMMARY_BATCH: usize = 200;

/// Inclusive range of sequence release dates to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

pub fn release_window(today: NaiveDate, days_back: u32) -> Result<ReleaseWindow, PhenError> {
    let from = today
        .checked_sub_days(Days::new(u64::from(days_back)))
        .ok_or_else(|| {
            PhenError::InvalidConfig(format!("days_back {days_back} reaches before the calendar"))
        })?;
    Ok(ReleaseWindow { from, to: today })
}

pub fn build_search_term(window: &ReleaseWindow) -> String {
    format!(
        "bacteria[filter] AND (\"reference genome\"[filter] OR \"representative genome\"[filter]) \
         AND (\"{from}\"[SeqReleaseDate] : \"{to}\"[SeqReleaseDate])",
        from = window.from.format("%Y/%m/%d"),
        to = window.to.format("%Y/%m/%d"),
    )
}

pub trait CatalogClient: Send + Sync {
    /// Assembly database uids matching `term`.
    fn search_assemblies(&self, term: &str) -> Result<Vec<String>, PhenError>;
    /// Document summaries for `uids`; records that cannot be read are
    /// omitted.
    fn summarize(&self, uids: &[String]) -> Result<Vec<GenomeRecord>, PhenError>;
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
    retmax: u32,
}

impl EntrezHttpClient {
    pub fn new(email: &str, retmax: u32) -> Result<Self, PhenError> {
        let client = build_client(Duration::from_secs(60))?;
        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            email: email.to_string(),
            api_key,
            retmax,
        })
    }

    fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, PhenError> {
        let mut all = vec![("tool", "phendb"), ("email", self.email.as_str())];
        if let Some(key) = &self.api_key {
            all.push(("api_key", key.as_str()));
        }
        all.extend_from_slice(params);
        let url = build_query_url(&format!("{}/{endpoint}", self.base_url), &all);

        let response = send_with_retries(
            || self.client.get(&url),
            |err| PhenError::EntrezHttp(err.to_string()),
        )?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Entrez request failed".to_string());
            return Err(PhenError::EntrezStatus { status, message });
        }
        response
            .json()
            .map_err(|err| PhenError::EntrezHttp(err.to_string()))
    }
}

impl CatalogClient for EntrezHttpClient {
    fn search_assemblies(&self, term: &str) -> Result<Vec<String>, PhenError> {
        let retmax = self.retmax.to_string();
        let payload = self.get_json(
            "esearch.fcgi",
            &[
                ("db", "assembly"),
                ("term", term),
                ("retmax", retmax.as_str()),
                ("retmode", "json"),
            ],
        )?;
        parse_search_ids(&payload)
    }

    fn summarize(&self, uids: &[String]) -> Result<Vec<GenomeRecord>, PhenError> {
        let mut records = Vec::new();
        for chunk in uids.chunks(SUMMARY_BATCH) {
            let id_list = chunk.join(",");
            let payload = self.get_json(
                "esummary.fcgi",
                &[
                    ("db", "assembly"),
                    ("id", id_list.as_str()),
                    ("retmode", "json"),
                ],
            );
            match payload {
                Ok(payload) => records.extend(parse_assembly_summaries(&payload)),
                Err(err) => {
                    tracing::warn!(error = %err, uids = chunk.len(), "skipping summary batch");
                }
            }
        }
        Ok(records)
    }
}

pub fn parse_search_ids(payload: &Value) -> Result<Vec<String>, PhenError> {
    if let Some(message) = payload["esearchresult"]["ERROR"].as_str() {
        return Err(PhenError::EntrezStatus {
            status: 200,
            message: message.to_string(),
        });
    }
    let ids = payload["esearchresult"]["idlist"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    Ok(ids)
}

/// Extracts one record per uid of an assembly `esummary` JSON payload.
pub fn parse_assembly_summaries(payload: &Value) -> Vec<GenomeRecord> {
    let mut records = Vec::new();
    let Some(uids) = payload["result"]["uids"].as_array() else {
        return records;
    };
    for uid in uids.iter().filter_map(|uid| uid.as_str()) {
        match parse_summary(&payload["result"][uid]) {
            Some(record) => records.push(record),
            None => tracing::warn!(uid, "skipping unreadable assembly summary"),
        }
    }
    records
}

fn parse_summary(doc: &Value) -> Option<GenomeRecord> {
    let species_name = doc["speciesname"].as_str()?.to_string();
    let tax_id = match &doc["taxid"] {
        Value::String(value) => value.clone(),
        Value::Number(value) => value.to_string(),
        _ => return None,
    };
    let assembly_id: AssemblyAccession = doc["lastmajorreleaseaccession"].as_str()?.parse().ok()?;
    let retrieval_path = doc["ftppath_refseq"].as_str().unwrap_or_default().to_string();
    Some(GenomeRecord {
        species_name,
        tax_id,
        assembly_id,
        retrieval_path,
    })
}

/// Queries the catalog for genomes released inside `window` that have a
/// RefSeq retrieval path.
pub fn latest_reference_genomes(
    client: &dyn CatalogClient,
    window: &ReleaseWindow,
) -> Result<Vec<GenomeRecord>, PhenError> {
    let term = build_search_term(window);
    tracing::info!(%term, "searching assembly catalog");
    let uids = client.search_assemblies(&term)?;
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    let records = client
        .summarize(&uids)?
        .into_iter()
        .filter(|record| !record.retrieval_path.is_empty())
        .collect::<Vec<_>>();
    tracing::info!(found = uids.len(), usable = records.len(), "catalog search done");
    Ok(records)
}
