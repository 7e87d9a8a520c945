//! Reclamation seen from the outside: request-triggered sweeps, concurrent
//! sweeps and the background loop.
//!
//! Run with:
//!   cargo test --test reclamation

mod common;

use common::{file_names, pdf_bytes, upload, FakeOffice};
use edgequake_docconv::{ConversionKind, ConversionRequest, Converter, ConverterConfig};
use filetime::{set_file_mtime, FileTime};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn converter(root: &TempDir, retention_secs: u64, probability: f64) -> Converter {
    let config = ConverterConfig::builder()
        .store_root(root.path())
        .retention_secs(retention_secs)
        .reclaim_probability(probability)
        .build()
        .unwrap();
    Converter::with_external(config, Arc::new(FakeOffice::missing())).unwrap()
}

fn age(path: &Path, secs: u64) {
    let then = SystemTime::now() - Duration::from_secs(secs);
    set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
}

#[tokio::test]
async fn every_request_sweeps_at_probability_one() {
    let root = TempDir::new().unwrap();
    let converter = converter(&root, 3600, 1.0);
    let store = converter.store();

    let stale = store.working_path("yesterday_0123456789ab.pdf");
    std::fs::write(&stale, b"old artifact").unwrap();
    age(&stale, 2 * 3600);
    let recent = store.working_path("recent_0123456789ab.pdf");
    std::fs::write(&recent, b"new artifact").unwrap();

    let input = upload(store, "fresh.pdf", &pdf_bytes(&["one", "two"])).await;
    let output = converter
        .convert(&ConversionRequest::single(ConversionKind::SplitPdf, &input.path))
        .await
        .unwrap();

    assert!(!stale.exists(), "stale artifact should be reclaimed");
    assert!(recent.exists());
    assert!(output.artifact.exists(), "fresh input converts normally");
}

#[tokio::test]
async fn sweeps_leave_files_the_store_did_not_name() {
    let root = TempDir::new().unwrap();
    let converter = converter(&root, 3600, 1.0);
    let store = converter.store();

    // Someone else's file that happens to live in the working area.
    let thesis = store.working_path("thesis-draft.txt");
    std::fs::write(&thesis, b"chapter one").unwrap();
    age(&thesis, 3 * 3600);

    let input = upload(store, "fresh.pdf", &pdf_bytes(&["one"])).await;
    converter
        .convert(&ConversionRequest::single(ConversionKind::CompressPdf, &input.path))
        .await
        .unwrap();
    let report = converter.reclaimer().sweep();

    assert!(thesis.exists());
    assert_eq!(report.removed, 0);
    assert_eq!(std::fs::read(&thesis).unwrap(), b"chapter one");
}

#[tokio::test]
async fn probability_zero_never_sweeps() {
    let root = TempDir::new().unwrap();
    let converter = converter(&root, 1, 0.0);
    let store = converter.store();

    let stale = store.working_path("ancient_00000000abcd.pdf");
    std::fs::write(&stale, b"x").unwrap();
    age(&stale, 86_400);

    for _ in 0..5 {
        let input = upload(store, "doc.pdf", &pdf_bytes(&["p"])).await;
        converter
            .convert(&ConversionRequest::single(ConversionKind::CompressPdf, &input.path))
            .await
            .unwrap();
    }
    assert!(stale.exists());
}

#[test]
fn concurrent_sweeps_remove_each_file_once() {
    let root = TempDir::new().unwrap();
    let config = ConverterConfig::builder()
        .store_root(root.path())
        .retention_secs(60)
        .build()
        .unwrap();
    let converter = Converter::with_external(config, Arc::new(FakeOffice::missing())).unwrap();
    let store = converter.store();

    for i in 0..40 {
        let path = if i % 2 == 0 {
            store.incoming_path(&format!("in_{i:012x}.pdf"))
        } else {
            store.working_path(&format!("out_{i:012x}_split.zip"))
        };
        std::fs::write(&path, i.to_string()).unwrap();
        age(&path, 600);
    }

    let reports: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reclaimer = converter.reclaimer().clone();
                s.spawn(move || reclaimer.sweep())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let removed: usize = reports.iter().map(|r| r.removed).sum();
    let errors: usize = reports.iter().map(|r| r.errors).sum();
    assert_eq!(removed, 40, "{reports:?}");
    assert_eq!(errors, 0, "{reports:?}");
    assert!(file_names(store.incoming_dir()).is_empty());
    assert!(file_names(store.working_dir()).is_empty());
}

#[tokio::test]
async fn background_loop_reclaims_without_traffic() {
    let root = TempDir::new().unwrap();
    let converter = converter(&root, 60, 0.0);
    let store = converter.store();

    let background = converter
        .reclaimer()
        .spawn_background(Duration::from_millis(20));

    let stale = store.incoming_path("forgotten_00000000f0f0.pdf");
    std::fs::write(&stale, b"x").unwrap();
    age(&stale, 3600);

    let mut waited = Duration::ZERO;
    while stale.exists() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert!(!stale.exists(), "background sweep never ran");

    background.shutdown().await;

    // Nothing sweeps once the loop has stopped.
    let later = store.incoming_path("later_00000000a0a0.pdf");
    std::fs::write(&later, b"x").unwrap();
    age(&later, 3600);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(later.exists());
}
