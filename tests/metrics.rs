mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use pagesmith::application::usage::MetricsUsageSink;

use common::*;

fn metric_names(snapshotter: &Snapshotter) -> HashSet<String> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect()
}

#[tokio::test]
async fn document_and_quota_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let harness = harness(1, 1, vec![Arc::new(MetricsUsageSink)]);
    let app = harness.router();
    let pdf = pdf_with_pages(&["only"]);
    let form = || {
        Form::new()
            .file("slot:a", "a.pdf", &pdf)
            .text("pages", &references(&[("a", 0)]))
    };

    let ok = send(&app, multipart_request("/api/v1/assemble", "metrics", form())).await;
    assert_eq!(ok.status(), StatusCode::OK);
    let refused = send(&app, multipart_request("/api/v1/assemble", "metrics", form())).await;
    assert_eq!(refused.status(), StatusCode::TOO_MANY_REQUESTS);

    let expected = [
        "pagesmith_documents_total",
        "pagesmith_document_pages",
        "pagesmith_document_ms",
        "pagesmith_quota_rejected_total",
    ];
    for _ in 0..50 {
        let names = metric_names(&snapshotter);
        if expected.iter().all(|metric| names.contains(*metric)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let names = metric_names(&snapshotter);
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
