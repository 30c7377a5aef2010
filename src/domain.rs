use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PhenError;

/// Key of the single recurring precalculation job.
pub const PRECALC_JOB_KEY: &str = "PHENDB_PRECALC";

const PRECALC_PREFIX: &str = "PHENDB_PRECALC_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssemblyAccession(String);

impl AssemblyAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name the fetched sequence file is staged under.
    pub fn staged_file_name(&self) -> String {
        format!("{PRECALC_PREFIX}{}.fna.gz", self.0)
    }

    /// Name the pipeline registers the bin under once it has been scored.
    pub fn precalc_bin_name(&self) -> String {
        format!("{PRECALC_PREFIX}{}.genomic.fna.gz", self.0)
    }
}

impl fmt::Display for AssemblyAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssemblyAccession {
    type Err = PhenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = normalized.starts_with("GCF_") || normalized.starts_with("GCA_");
        let parts = normalized.split('.').collect::<Vec<_>>();
        let has_numeric = parts
            .first()
            .map(|prefix| prefix.trim_start_matches("GCF_").trim_start_matches("GCA_"))
            .map(|rest| rest.chars().all(|ch| ch.is_ascii_digit()) && !rest.is_empty())
            .unwrap_or(false);
        if !is_valid || !has_numeric {
            return Err(PhenError::InvalidAssemblyAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Job and upload identifiers double as queue keys and directory names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey(String);

impl JobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn precalc() -> Self {
        Self(PRECALC_JOB_KEY.to_string())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Output folder name for this job under the results root.
    pub fn results_dir_name(&self) -> String {
        format!("{}_results", self.0)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobKey {
    type Err = PhenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(PhenError::InvalidJobKey(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A newly released genome resolved from the assembly catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeRecord {
    pub species_name: String,
    pub tax_id: String,
    pub assembly_id: AssemblyAccession,
    /// Directory on the NCBI genomes server holding the assembly files.
    pub retrieval_path: String,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_assembly_accession_valid() {
        let acc: AssemblyAccession = " GCF_000005845.2 ".parse().unwrap();
        assert_eq!(acc.as_str(), "GCF_000005845.2");
    }

    #[test]
    fn parse_assembly_accession_invalid() {
        let err = "ABC_123".parse::<AssemblyAccession>().unwrap_err();
        assert_matches!(err, PhenError::InvalidAssemblyAccession(_));
        let err = "GCF_.1".parse::<AssemblyAccession>().unwrap_err();
        assert_matches!(err, PhenError::InvalidAssemblyAccession(_));
    }

    #[test]
    fn precalc_names() {
        let acc: AssemblyAccession = "GCF_000005845.2".parse().unwrap();
        assert_eq!(acc.staged_file_name(), "PHENDB_PRECALC_GCF_000005845.2.fna.gz");
        assert_eq!(
            acc.precalc_bin_name(),
            "PHENDB_PRECALC_GCF_000005845.2.genomic.fna.gz"
        );
    }

    #[test]
    fn job_key_rejects_path_separators() {
        assert!("../etc".parse::<JobKey>().is_err());
        assert!("".parse::<JobKey>().is_err());
        let key: JobKey = "7f9c-ab_1".parse().unwrap();
        assert_eq!(key.results_dir_name(), "7f9c-ab_1_results");
    }

    #[test]
    fn generated_keys_are_valid() {
        let key = JobKey::generate();
        assert!(key.as_str().parse::<JobKey>().is_ok());
        assert_ne!(key, JobKey::generate());
    }
}
