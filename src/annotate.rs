use crate::db::Database;
use crate::db::bin_repo::{self, AnnotateOutcome, TaxonomyUpdate};
use crate::domain::GenomeRecord;
use crate::error::PhenError;

pub fn taxonomy_updates(records: &[GenomeRecord]) -> Vec<TaxonomyUpdate> {
    records
        .iter()
        .map(|record| TaxonomyUpdate {
            bin_name: record.assembly_id.precalc_bin_name(),
            tax_id: record.tax_id.clone(),
            assembly_id: record.assembly_id.to_string(),
        })
        .collect()
}

/// Copies catalog taxonomy onto the bins the pipeline registered for the
/// precalculated genomes. All or nothing: a single missing bin leaves the
/// database untouched and reports [`PhenError::BinNotFound`].
pub fn annotate_precalc_bins(db: &Database, records: &[GenomeRecord]) -> Result<usize, PhenError> {
    let updates = taxonomy_updates(records);
    match bin_repo::annotate_taxonomy(db, &updates)? {
        AnnotateOutcome::Updated(count) => {
            tracing::info!(genomes = records.len(), bins = count, "precalculated bins annotated");
            Ok(count)
        }
        AnnotateOutcome::Missing(bin_name) => Err(PhenError::BinNotFound(bin_name)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn record(acc: &str, tax: &str) -> GenomeRecord {
        GenomeRecord {
            species_name: "Escherichia coli".to_string(),
            tax_id: tax.to_string(),
            assembly_id: acc.parse().unwrap(),
            retrieval_path: String::new(),
        }
    }

    #[test]
    fn bin_names_follow_pipeline_naming() {
        let updates = taxonomy_updates(&[record("GCF_000005845.2", "562")]);
        assert_eq!(
            updates[0].bin_name,
            "PHENDB_PRECALC_GCF_000005845.2.genomic.fna.gz"
        );
        assert_eq!(updates[0].assembly_id, "GCF_000005845.2");
    }

    #[test]
    fn annotates_all_or_nothing() {
        let db = Database::open_in_memory().unwrap();
        bin_repo::insert(&db, "PHENDB_PRECALC_GCF_000005845.2.genomic.fna.gz", None).unwrap();

        let err = annotate_precalc_bins(
            &db,
            &[record("GCF_000005845.2", "562"), record("GCF_000006945.2", "90371")],
        )
        .unwrap_err();
        assert_matches!(err, PhenError::BinNotFound(name) if name.contains("GCF_000006945.2"));

        let bins =
            bin_repo::find_by_name(&db, "PHENDB_PRECALC_GCF_000005845.2.genomic.fna.gz").unwrap();
        assert_eq!(bins[0].tax_id, None);

        let count = annotate_precalc_bins(&db, &[record("GCF_000005845.2", "562")]).unwrap();
        assert_eq!(count, 1);
    }
}
