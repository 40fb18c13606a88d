//! Integration tests for staged downloads and streamed uploads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use osf_connection::{
    AbortHandle, DownloadStager, ProgressReporter, RequestError, RequestOptions, UploadSource,
    transfer::StagerState,
};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::{Harness, ScriptedLogin, bearer, dir_entries, user_doc};

/// Reporter that keeps every update it receives.
#[derive(Default)]
struct RecordingReporter {
    updates: Mutex<Vec<(u64, Option<u64>)>>,
}

impl ProgressReporter for RecordingReporter {
    fn begin(&self, _label: &str, _total: Option<u64>) {}

    fn update(&self, transferred: u64, total: Option<u64>) {
        self.updates.lock().unwrap().push((transferred, total));
    }

    fn finish(&self) {}
}

async fn logged_in_harness(server: &MockServer, dir: &TempDir) -> Harness {
    Mock::given(method("GET"))
        .and(path("/v2/users/me/"))
        .and(header("authorization", bearer("T1").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_doc("u1")))
        .mount(server)
        .await;
    let harness = Harness::new(server, dir.path(), ScriptedLogin::default());
    harness.store_token("T1");
    harness.manager.login().await.unwrap();
    harness
}

#[tokio::test]
async fn test_download_replaces_destination_after_success() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let body = vec![b'x'; 256 * 1024];
    Mock::given(method("GET"))
        .and(path("/files/data.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let harness = logged_in_harness(&mock_server, &state_dir).await;
    let out = TempDir::new().unwrap();
    let destination = out.path().join("data.csv");
    std::fs::write(&destination, b"old contents").unwrap();

    let progress = Arc::new(Mutex::new(Vec::new()));
    let recorded = progress.clone();
    let options = RequestOptions::new().on_download_progress(move |done, total| {
        recorded.lock().unwrap().push((done, total));
    });
    let stager = Arc::new(tokio::sync::Mutex::new(DownloadStager::new(&destination)));

    let saved = harness
        .manager
        .download_staged(&harness.url("/files/data.csv"), stager.clone(), options)
        .await
        .unwrap();

    assert_eq!(saved, destination);
    assert_eq!(std::fs::read(&destination).unwrap(), body);
    assert_eq!(dir_entries(out.path()), vec!["data.csv".to_string()]);

    let stager = stager.lock().await;
    assert_eq!(stager.state(), StagerState::Done);
    assert_eq!(stager.handles().opened(), 1);
    assert_eq!(stager.handles().open_handles(), 0);

    let progress = progress.lock().unwrap();
    assert_eq!(progress.last().unwrap().0, body.len() as u64);
}

#[tokio::test]
async fn test_failed_download_leaves_destination_untouched() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let mut harness = logged_in_harness(&mock_server, &state_dir).await;
    let out = TempDir::new().unwrap();
    let destination = out.path().join("gone.bin");
    std::fs::write(&destination, b"keep me").unwrap();
    let stager = Arc::new(tokio::sync::Mutex::new(DownloadStager::new(&destination)));

    let err = harness
        .manager
        .download_staged(&harness.url("/files/gone"), stager.clone(), RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(std::fs::read(&destination).unwrap(), b"keep me");
    assert_eq!(dir_entries(out.path()), vec!["gone.bin".to_string()]);
    let stager = stager.lock().await;
    assert_eq!(stager.state(), StagerState::Failed);
    assert_eq!(stager.handles().opened(), 1);
    assert_eq!(stager.handles().open_handles(), 0);
    assert_eq!(harness.drain_errors().len(), 1);
}

#[tokio::test]
async fn test_cancelled_download_removes_staged_file() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/files/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0_u8; 1024])
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let mut harness = logged_in_harness(&mock_server, &state_dir).await;
    let out = TempDir::new().unwrap();
    let destination = out.path().join("slow.bin");
    let stager = Arc::new(tokio::sync::Mutex::new(DownloadStager::new(&destination)));
    let abort = AbortHandle::new();
    let trigger = abort.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.abort();
    });

    let err = harness
        .manager
        .download_staged(
            &harness.url("/files/slow"),
            stager.clone(),
            RequestOptions::new().with_abort(abort),
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!destination.exists());
    assert!(dir_entries(out.path()).is_empty());
    assert_eq!(stager.lock().await.handles().open_handles(), 0);
    assert!(harness.drain_errors().is_empty());
}

#[tokio::test]
async fn test_download_aborted_mid_body_discards_partial_file() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/files/large.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1_u8; 8 * 1024 * 1024]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let mut harness = logged_in_harness(&mock_server, &state_dir).await;
    let out = TempDir::new().unwrap();
    let destination = out.path().join("large.bin");
    std::fs::write(&destination, b"previous").unwrap();
    let stager = Arc::new(tokio::sync::Mutex::new(DownloadStager::new(&destination)));

    let abort = AbortHandle::new();
    let trigger = abort.clone();
    let options = RequestOptions::new()
        .on_download_progress(move |done, _| {
            if done > 0 {
                trigger.abort();
            }
        })
        .with_abort(abort);

    let err = harness
        .manager
        .download_staged(&harness.url("/files/large.bin"), stager.clone(), options)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    let stager = stager.lock().await;
    assert!(stager.bytes_written() > 0);
    assert_eq!(stager.state(), StagerState::Failed);
    assert_eq!(stager.handles().opened(), 1);
    assert_eq!(stager.handles().open_handles(), 0);
    assert_eq!(std::fs::read(&destination).unwrap(), b"previous");
    assert_eq!(dir_entries(out.path()), vec!["large.bin".to_string()]);
    assert!(harness.drain_errors().is_empty());
}

#[tokio::test]
async fn test_discarded_download_closes_staged_file() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    for (token, user) in [("T1", "u1"), ("T2", "u2")] {
        Mock::given(method("GET"))
            .and(path("/v2/users/me/"))
            .and(header("authorization", bearer(token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_doc(user)))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/files/data.csv"))
        .and(header("authorization", bearer("T1").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let harness = Harness::new(&mock_server, state_dir.path(), ScriptedLogin::returning(&["T2"]));
    harness.store_token("T1");
    harness.manager.login().await.unwrap();
    let out = TempDir::new().unwrap();
    let stager = Arc::new(tokio::sync::Mutex::new(DownloadStager::new(
        out.path().join("data.csv"),
    )));

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        harness.manager.download_staged(
            &harness.url("/files/data.csv"),
            stager.clone(),
            RequestOptions::new(),
        ),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert!(matches!(err, RequestError::Discarded { .. }));
    let stager = stager.lock().await;
    assert_eq!(stager.state(), StagerState::Failed);
    assert_eq!(stager.handles().opened(), 1);
    assert_eq!(stager.handles().open_handles(), 0);
    assert!(dir_entries(out.path()).is_empty());
}

#[tokio::test]
async fn test_download_with_invalid_url_stages_nothing() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let state_dir = TempDir::new().unwrap();
    let harness = logged_in_harness(&mock_server, &state_dir).await;
    let out = TempDir::new().unwrap();
    let stager = Arc::new(tokio::sync::Mutex::new(DownloadStager::new(
        out.path().join("data.csv"),
    )));

    let err = harness
        .manager
        .download_staged("not a url", stager.clone(), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::InvalidUrl { .. }));
    let stager = stager.lock().await;
    assert_eq!(stager.state(), StagerState::Idle);
    assert_eq!(stager.handles().opened(), 0);
    assert!(dir_entries(out.path()).is_empty());
}

#[tokio::test]
async fn test_download_into_missing_directory_is_rejected() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/files/data.csv"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let harness = logged_in_harness(&mock_server, &state_dir).await;
    let out = TempDir::new().unwrap();
    let destination = out.path().join("no-such-dir").join("data.csv");
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();

    let err = harness
        .manager
        .download_file(
            &harness.url("/files/data.csv"),
            &destination,
            RequestOptions::new().on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::InvalidDestination { .. }));
    assert!(err.to_string().ends_with("is not a valid destination"));
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upload_streams_file_with_monotonic_progress() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    const SIZE: usize = 10 * 1024 * 1024;
    Mock::given(method("PUT"))
        .and(path("/upload/big.bin"))
        .respond_with(ResponseTemplate::new(201).set_body_string("{}"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let harness = logged_in_harness(&mock_server, &state_dir).await;
    let src_dir = TempDir::new().unwrap();
    let source_path = src_dir.path().join("big.bin");
    std::fs::write(&source_path, vec![7_u8; SIZE]).unwrap();

    let source = UploadSource::from_path(&source_path).await.unwrap();
    let handles = source.handles();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let recorded = progress.clone();
    let reporter = Arc::new(RecordingReporter::default());
    let options = RequestOptions::new()
        .on_upload_progress(move |done, total| {
            recorded.lock().unwrap().push((done, total));
        })
        .with_progress_reporter(reporter.clone());

    let reply = harness
        .manager
        .upload_file(&harness.url("/upload/big.bin"), source, options)
        .await
        .unwrap();

    assert_eq!(reply.status().as_u16(), 201);
    let progress = progress.lock().unwrap();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    assert_eq!(*progress.last().unwrap(), (SIZE as u64, Some(SIZE as u64)));
    let reported = reporter.updates.lock().unwrap();
    assert!(reported.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    assert_eq!(*reported.last().unwrap(), (SIZE as u64, Some(SIZE as u64)));
    assert_eq!(handles.opened(), 1);
    assert_eq!(handles.open_handles(), 0);

    let requests = mock_server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|request| request.method.as_str() == "PUT")
        .unwrap();
    assert_eq!(put.body.len(), SIZE);
}

#[tokio::test]
async fn test_failed_upload_closes_source() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("PUT"))
        .and(path("/upload/notes.txt"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let harness = logged_in_harness(&mock_server, &state_dir).await;
    let src_dir = TempDir::new().unwrap();
    let source_path = src_dir.path().join("notes.txt");
    std::fs::write(&source_path, b"field notes").unwrap();
    let source = UploadSource::from_path(&source_path).await.unwrap();
    let handles = source.handles();

    let err = harness
        .manager
        .upload_file(&harness.url("/upload/notes.txt"), source, RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(handles.opened(), 1);
    assert_eq!(handles.open_handles(), 0);
}

#[tokio::test]
async fn test_upload_aborted_mid_stream_closes_source() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("PUT"))
        .and(path("/upload/big.bin"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let mut harness = logged_in_harness(&mock_server, &state_dir).await;
    let src_dir = TempDir::new().unwrap();
    let source_path = src_dir.path().join("big.bin");
    std::fs::write(&source_path, vec![3_u8; 4 * 1024 * 1024]).unwrap();
    let source = UploadSource::from_path(&source_path).await.unwrap();
    let handles = source.handles();

    let abort = AbortHandle::new();
    let trigger = abort.clone();
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();
    let options = RequestOptions::new()
        .on_upload_progress(move |done, _| {
            if done > 0 {
                trigger.abort();
            }
        })
        .on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_abort(abort);

    let started = std::time::Instant::now();
    let err = harness
        .manager
        .upload_file(&harness.url("/upload/big.bin"), source, options)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(handles.opened(), 1);
    assert_eq!(handles.open_handles(), 0);
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert!(harness.drain_errors().is_empty());
}

#[tokio::test]
async fn test_upload_of_missing_file_is_rejected() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let state_dir = TempDir::new().unwrap();
    let harness = logged_in_harness(&mock_server, &state_dir).await;
    let missing = state_dir.path().join("missing.txt");

    let err = harness
        .manager
        .upload_path(&harness.url("/upload/missing.txt"), &missing, RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::InvalidSource { .. }));
    assert!(err.to_string().ends_with("is not a valid source file"));
}
