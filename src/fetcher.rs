use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use reqwest::blocking::Client;
use serde::Serialize;

use crate::domain::GenomeRecord;
use crate::error::PhenError;
use crate::fs_util;
use crate::http::{build_client, send_with_retries};
use crate::store::Store;

pub trait GenomeSource: Send + Sync {
    /// File names in the remote assembly directory.
    fn list_directory(&self, url: &str) -> Result<Vec<String>, PhenError>;
    fn download(&self, url: &str, destination: &Path) -> Result<(), PhenError>;
}

/// Reads the NCBI genomes tree over HTTPS; `ftp://` catalog paths are served
/// from the same host.
#[derive(Clone)]
pub struct HttpGenomeSource {
    client: Client,
}

impl HttpGenomeSource {
    pub fn new() -> Result<Self, PhenError> {
        Ok(Self {
            client: build_client(Duration::from_secs(600))?,
        })
    }

    pub fn normalize_url(url: &str) -> String {
        if let Some(rest) = url.strip_prefix("ftp://") {
            return format!("https://{rest}");
        }
        url.to_string()
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, PhenError> {
        let response = send_with_retries(
            || self.client.get(url),
            |err| PhenError::TransferHttp(err.to_string()),
        )?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "genome transfer failed".to_string());
            return Err(PhenError::TransferStatus { status, message });
        }
        Ok(response)
    }
}

impl GenomeSource for HttpGenomeSource {
    fn list_directory(&self, url: &str) -> Result<Vec<String>, PhenError> {
        let url = format!("{}/", Self::normalize_url(url).trim_end_matches('/'));
        let html = self
            .get(&url)?
            .text()
            .map_err(|err| PhenError::TransferHttp(err.to_string()))?;
        Ok(parse_directory_listing(&html))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<(), PhenError> {
        let mut response = self.get(&Self::normalize_url(url))?;
        let mut file =
            File::create(destination).map_err(|err| PhenError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| PhenError::TransferHttp(err.to_string()))?;
        Ok(())
    }
}

/// Plain file entries of an HTML directory index. Links that name another
/// directory or climb out of this one are dropped.
pub fn parse_directory_listing(html: &str) -> Vec<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    let href = HREF.get_or_init(|| Regex::new(r#"href="([^"?/][^"]*)""#).expect("valid regex"));
    let mut names = Vec::new();
    for cap in href.captures_iter(html) {
        let name = &cap[1];
        if name.contains('/') || name.contains("..") {
            continue;
        }
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// The genomic sequence file of an assembly directory, skipping the derived
/// `*_cds_from_genomic` and `*_rna_from_genomic` files.
pub fn select_genomic_file(names: &[String]) -> Option<&str> {
    names
        .iter()
        .map(String::as_str)
        .find(|name| name.contains("genomic.fna.gz") && !name.contains("from"))
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchedGenome {
    pub record: GenomeRecord,
    pub path: Utf8PathBuf,
    pub uncompressed_bytes: u64,
}

/// Downloads every record into a staging directory and, when at least one
/// genome was fetched, replaces `publish_dir` with it. On error the previous
/// `publish_dir` is left as it was.
pub fn fetch_genomes(
    source: &dyn GenomeSource,
    records: &[GenomeRecord],
    publish_dir: &Utf8Path,
) -> Result<Vec<FetchedGenome>, PhenError> {
    let staging = Store::staging_dir_for(publish_dir)?;
    let mut staged = Vec::new();

    for record in records {
        let listing = source.list_directory(&record.retrieval_path)?;
        let Some(remote_name) = select_genomic_file(&listing) else {
            tracing::warn!(
                assembly = %record.assembly_id,
                path = %record.retrieval_path,
                "no genomic sequence file in assembly directory"
            );
            continue;
        };

        let url = format!(
            "{}/{remote_name}",
            record.retrieval_path.trim_end_matches('/')
        );
        let download_path = staging.path().join(remote_name);
        let start = std::time::Instant::now();
        source.download(&url, &download_path)?;
        let uncompressed_bytes = fs_util::validate_gzip(&download_path)?;

        let file_name = record.assembly_id.staged_file_name();
        std::fs::rename(&download_path, staging.path().join(&file_name))
            .map_err(|err| PhenError::Filesystem(err.to_string()))?;
        tracing::info!(
            assembly = %record.assembly_id,
            file = %file_name,
            latency_ms = start.elapsed().as_millis() as u64,
            "genome staged"
        );
        staged.push((record.clone(), file_name, uncompressed_bytes));
    }

    if staged.is_empty() {
        return Ok(Vec::new());
    }

    Store::publish_dir(staging, publish_dir)?;
    Ok(staged
        .into_iter()
        .map(|(record, file_name, uncompressed_bytes)| FetchedGenome {
            record,
            path: publish_dir.join(file_name),
            uncompressed_bytes,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_extracts_file_links() {
        let html = r#"<html><body>
            <a href="?C=N;O=D">Name</a>
            <a href="/genomes/all/GCF/000/005/">Parent Directory</a>
            <a href="GCF_000005845.2_ASM584v2_assembly_report.txt">report</a>
            <a href="GCF_000005845.2_ASM584v2_cds_from_genomic.fna.gz">cds</a>
            <a href="GCF_000005845.2_ASM584v2_genomic.fna.gz">genomic</a>
            <a href="GCF_000005845.2_ASM584v2_assembly_structure/">dir</a>
        </body></html>"#;
        let names = parse_directory_listing(html);
        assert_eq!(
            names,
            vec![
                "GCF_000005845.2_ASM584v2_assembly_report.txt",
                "GCF_000005845.2_ASM584v2_cds_from_genomic.fna.gz",
                "GCF_000005845.2_ASM584v2_genomic.fna.gz",
            ]
        );
    }

    #[test]
    fn listing_drops_links_leaving_the_directory() {
        let html = r#"<a href="../../x_genomic.fna.gz">up</a>
            <a href="sub/x_genomic.fna.gz">nested</a>
            <a href="..">parent</a>
            <a href="https://example.org/x_genomic.fna.gz">abs</a>
            <a href="x_genomic.fna.gz">ok</a>"#;
        assert_eq!(parse_directory_listing(html), vec!["x_genomic.fna.gz"]);
    }

    #[test]
    fn genomic_file_skips_derived_sequences() {
        let names = vec![
            "x_cds_from_genomic.fna.gz".to_string(),
            "x_rna_from_genomic.fna.gz".to_string(),
            "x_genomic.fna.gz".to_string(),
        ];
        assert_eq!(select_genomic_file(&names), Some("x_genomic.fna.gz"));
        assert_eq!(select_genomic_file(&names[..2]), None);
    }

    #[test]
    fn ftp_paths_are_served_over_https() {
        assert_eq!(
            HttpGenomeSource::normalize_url("ftp://ftp.ncbi.nlm.nih.gov/genomes/all/GCF"),
            "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF"
        );
    }
}
