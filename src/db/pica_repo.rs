//! Pica model and result repository.

use rusqlite::{Row, params};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct PicaModelRow {
    pub id: i64,
    pub model_name: String,
    pub description: Option<String>,
}

impl PicaModelRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            model_name: row.get("model_name")?,
            description: row.get("description")?,
        })
    }
}

/// A result joined with the name of the model that produced it.
#[derive(Debug, Clone)]
pub struct PicaResultRow {
    pub bin_id: i64,
    pub model_name: String,
    pub verdict: bool,
    pub pica_pval: f64,
    pub accuracy: f64,
}

pub fn insert_model(
    db: &Database,
    model_name: &str,
    description: Option<&str>,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO pica_models (model_name, description) VALUES (?1, ?2)",
            params![model_name, description],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

pub fn list_models(db: &Database) -> Result<Vec<PicaModelRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM pica_models ORDER BY model_name")?;
        let rows = stmt
            .query_map([], PicaModelRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn insert_result(
    db: &Database,
    bin_id: i64,
    model_id: i64,
    verdict: bool,
    pica_pval: f64,
    accuracy: f64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO pica_results (bin_id, model_id, verdict, pica_pval, accuracy)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![bin_id, model_id, verdict, pica_pval, accuracy],
        )?;
        Ok(())
    })
}

pub fn results_for_bin(db: &Database, bin_id: i64) -> Result<Vec<PicaResultRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT r.bin_id, m.model_name, r.verdict, r.pica_pval, r.accuracy
             FROM pica_results r JOIN pica_models m ON m.id = r.model_id
             WHERE r.bin_id = ?1
             ORDER BY m.model_name",
        )?;
        let rows = stmt
            .query_map(params![bin_id], |row| {
                Ok(PicaResultRow {
                    bin_id: row.get(0)?,
                    model_name: row.get(1)?,
                    verdict: row.get(2)?,
                    pica_pval: row.get(3)?,
                    accuracy: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::bin_repo;

    #[test]
    fn results_join_model_names() {
        let db = Database::open_in_memory().unwrap();
        let bin = bin_repo::insert(&db, "bin", None).unwrap();
        let aerobe = insert_model(&db, "AEROBE", Some("aerobic growth")).unwrap();
        let motile = insert_model(&db, "MOTILE", None).unwrap();
        insert_result(&db, bin, motile, false, 0.2, 0.81).unwrap();
        insert_result(&db, bin, aerobe, true, 0.9, 0.95).unwrap();

        let rows = results_for_bin(&db, bin).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model_name, "AEROBE");
        assert!(rows[0].verdict);
        assert_eq!(rows[1].model_name, "MOTILE");
        assert!(!rows[1].verdict);
    }

    #[test]
    fn model_names_are_unique() {
        let db = Database::open_in_memory().unwrap();
        insert_model(&db, "AEROBE", None).unwrap();
        assert!(insert_model(&db, "AEROBE", None).is_err());
        assert_eq!(list_models(&db).unwrap().len(), 1);
    }
}
