use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use newsdesk_ingest::{read_snapshot, Normalizer, SnapshotRead, SourceCatalog};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 20).expect("date")
}

#[test]
fn sample_snapshot_normalizes_with_isolated_rejections() {
    let root = workspace_root();
    let catalog = SourceCatalog::load_or_default(root.join("sources.yaml")).expect("catalog");
    assert_eq!(catalog, SourceCatalog::default());

    let snapshot = match read_snapshot(root.join("fixtures/raw_headlines_sample.csv"), run_date())
        .expect("read fixture")
    {
        SnapshotRead::Loaded(snapshot) => snapshot,
        other => panic!("expected a loaded snapshot, got {other:?}"),
    };
    assert_eq!(snapshot.rows.len(), 6);
    assert_eq!(snapshot.rejected.len(), 1);
    assert_eq!(snapshot.rejected[0].position, 5);

    let batch = Normalizer::new(catalog).normalize(&snapshot);
    let positions: Vec<_> = batch.rejected.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![5, 6]);

    let sources: Vec<_> = batch.headlines.iter().map(|h| h.source_name.as_str()).collect();
    assert_eq!(
        sources,
        vec!["BBC Russian", "BBC Hindi", "BBC Spanish", "BBC Japanese", "Other"]
    );

    // Two entities for the first headline, none for the quiet day.
    assert_eq!(batch.entities.len(), 5);
    assert_eq!(
        batch.entities.iter().filter(|e| e.headline_pos == 0).count(),
        2
    );
    assert!(batch.entities.iter().all(|e| e.headline_pos != 3));
    assert_eq!(batch.entities[3].text, "NATO");

    let undated = &batch.headlines[4];
    assert_eq!(undated.scrape_date, run_date());
    assert_eq!(
        batch.headlines[0].scrape_date,
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("date")
    );
    assert!((batch.headlines[1].polarity - -0.3).abs() < 1e-9);
}

#[test]
fn missing_snapshot_is_absent() {
    let read = read_snapshot(workspace_root().join("fixtures/does_not_exist.csv"), run_date())
        .expect("absent is not an error");
    assert_eq!(read, SnapshotRead::Absent);
}
