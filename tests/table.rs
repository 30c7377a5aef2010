use phendb::db::{Database, bin_repo, job_repo, pica_repo};
use phendb::domain::JobKey;
use phendb::table::{COLUMN_TITLES, build_result_table};

#[test]
fn table_lists_every_result_of_every_bin() {
    let db = Database::open_in_memory().unwrap();
    job_repo::ensure(&db, "job-1").unwrap();
    job_repo::ensure(&db, "job-2").unwrap();

    let aerobe = pica_repo::insert_model(&db, "AEROBE", Some("aerobic growth")).unwrap();
    let motile = pica_repo::insert_model(&db, "MOTILE", Some("motility")).unwrap();

    let first = bin_repo::insert(&db, "a.fna", Some("aa")).unwrap();
    let second = bin_repo::insert(&db, "b.fna", Some("bb")).unwrap();
    let other = bin_repo::insert(&db, "c.fna", Some("cc")).unwrap();
    bin_repo::link_to_job(&db, first, "job-1", "sample_a.fna").unwrap();
    bin_repo::link_to_job(&db, second, "job-1", "sample_b.fna").unwrap();
    bin_repo::link_to_job(&db, other, "job-2", "other.fna").unwrap();

    pica_repo::insert_result(&db, first, motile, false, 0.31, 0.82).unwrap();
    pica_repo::insert_result(&db, first, aerobe, true, 0.97, 0.94).unwrap();
    pica_repo::insert_result(&db, second, aerobe, false, 0.12, 0.94).unwrap();
    pica_repo::insert_result(&db, other, aerobe, true, 0.99, 0.94).unwrap();

    let job: JobKey = "job-1".parse().unwrap();
    let table = build_result_table(&db, &job).unwrap();

    let rows: Vec<_> = table
        .rows
        .iter()
        .map(|r| (r.bin_alias.as_str(), r.model_name.as_str(), r.prediction.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("sample_a.fna", "AEROBE", "+"),
            ("sample_a.fna", "MOTILE", "-"),
            ("sample_b.fna", "AEROBE", "-"),
        ]
    );

    let json = serde_json::to_value(&table).unwrap();
    let titles: Vec<_> = json["columns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, COLUMN_TITLES);
    assert_eq!(json["data"][1][3], 0.31);
}

#[test]
fn job_without_bins_yields_empty_table() {
    let db = Database::open_in_memory().unwrap();
    job_repo::ensure(&db, "empty").unwrap();
    let table = build_result_table(&db, &"empty".parse().unwrap()).unwrap();
    assert!(table.rows.is_empty());
}
