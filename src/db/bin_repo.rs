//! Bin repository: bins, their taxonomy, and their membership in jobs.

use rusqlite::{Connection, Row, params};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct BinRow {
    pub id: i64,
    pub bin_name: String,
    pub md5sum: Option<String>,
    pub tax_id: Option<String>,
    pub assembly_id: Option<String>,
    pub taxon_name: Option<String>,
    pub taxon_rank: Option<String>,
}

impl BinRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            bin_name: row.get("bin_name")?,
            md5sum: row.get("md5sum")?,
            tax_id: row.get("tax_id")?,
            assembly_id: row.get("assembly_id")?,
            taxon_name: row.get("taxon_name")?,
            taxon_rank: row.get("taxon_rank")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BinInJobRow {
    pub bin_id: i64,
    pub job_key: String,
    pub bin_alias: String,
}

/// Taxonomy to copy onto every bin named `bin_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyUpdate {
    pub bin_name: String,
    pub tax_id: String,
    pub assembly_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotateOutcome {
    /// Number of bin rows touched.
    Updated(usize),
    /// The named bin does not exist; nothing was written.
    Missing(String),
}

pub fn insert(db: &Database, bin_name: &str, md5sum: Option<&str>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO bins (bin_name, md5sum) VALUES (?1, ?2)",
            params![bin_name, md5sum],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn find_by_name(db: &Database, bin_name: &str) -> Result<Vec<BinRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM bins WHERE bin_name = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![bin_name], BinRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Applies all updates in one transaction. The first update that matches no
/// bin aborts the batch and rolls back everything written before it.
pub fn annotate_taxonomy(
    db: &Database,
    updates: &[TaxonomyUpdate],
) -> Result<AnnotateOutcome, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let mut touched = 0usize;
        for update in updates {
            let changed = update_taxonomy(&tx, update)?;
            if changed == 0 {
                return Ok(AnnotateOutcome::Missing(update.bin_name.clone()));
            }
            touched += changed;
        }
        tx.commit()?;
        Ok(AnnotateOutcome::Updated(touched))
    })
}

fn update_taxonomy(conn: &Connection, update: &TaxonomyUpdate) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE bins SET tax_id = ?2, assembly_id = ?3, taxon_name = '', taxon_rank = ''
         WHERE bin_name = ?1",
        params![update.bin_name, update.tax_id, update.assembly_id],
    )?;
    Ok(changed)
}

pub fn link_to_job(
    db: &Database,
    bin_id: i64,
    job_key: &str,
    bin_alias: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO bins_in_job (bin_id, job_key, bin_alias) VALUES (?1, ?2, ?3)",
            params![bin_id, job_key, bin_alias],
        )?;
        Ok(())
    })
}

pub fn bins_in_job(db: &Database, job_key: &str) -> Result<Vec<BinInJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT bin_id, job_key, bin_alias FROM bins_in_job WHERE job_key = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![job_key], |row| {
                Ok(BinInJobRow {
                    bin_id: row.get(0)?,
                    job_key: row.get(1)?,
                    bin_alias: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo;

    fn update(name: &str, tax: &str, asm: &str) -> TaxonomyUpdate {
        TaxonomyUpdate {
            bin_name: name.to_string(),
            tax_id: tax.to_string(),
            assembly_id: asm.to_string(),
        }
    }

    #[test]
    fn annotate_updates_every_matching_bin() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, "a.fna.gz", None).unwrap();
        insert(&db, "a.fna.gz", Some("d41d8cd9")).unwrap();

        let outcome = annotate_taxonomy(&db, &[update("a.fna.gz", "562", "GCF_1.1")]).unwrap();
        assert_eq!(outcome, AnnotateOutcome::Updated(2));

        let bins = find_by_name(&db, "a.fna.gz").unwrap();
        assert!(bins.iter().all(|b| b.tax_id.as_deref() == Some("562")));
        assert!(bins.iter().all(|b| b.taxon_name.as_deref() == Some("")));
    }

    #[test]
    fn annotate_rolls_back_on_missing_bin() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, "a.fna.gz", None).unwrap();

        let outcome = annotate_taxonomy(
            &db,
            &[update("a.fna.gz", "562", "GCF_1.1"), update("b.fna.gz", "1", "GCF_2.1")],
        )
        .unwrap();
        assert_eq!(outcome, AnnotateOutcome::Missing("b.fna.gz".to_string()));

        let bins = find_by_name(&db, "a.fna.gz").unwrap();
        assert_eq!(bins[0].tax_id, None);
    }

    #[test]
    fn bins_in_job_preserve_insert_order() {
        let db = Database::open_in_memory().unwrap();
        job_repo::ensure(&db, "job").unwrap();
        let first = insert(&db, "x", None).unwrap();
        let second = insert(&db, "y", None).unwrap();
        link_to_job(&db, second, "job", "bin_y").unwrap();
        link_to_job(&db, first, "job", "bin_x").unwrap();

        let rows = bins_in_job(&db, "job").unwrap();
        let aliases: Vec<_> = rows.iter().map(|r| r.bin_alias.as_str()).collect();
        assert_eq!(aliases, vec!["bin_y", "bin_x"]);
    }
}
