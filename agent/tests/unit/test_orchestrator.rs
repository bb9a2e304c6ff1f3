//! Backup job tests against a mock appliance API

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use appliance_backup::app::options::{FetchOptions, Protocol};
use appliance_backup::app::run::Orchestrator;
use appliance_backup::archive::archiver::{Archiver, SyncOutcome};
use appliance_backup::authn::credentials::{Credential, CredentialResolver, TokenSource};
use appliance_backup::errors::BackupError;
use appliance_backup::http::fetcher::{BackupFetcher, BACKUP_API_PATH};
use appliance_backup::models::backup::SyncRequest;
use appliance_backup::models::device::Device;
use appliance_backup::storage::layout::StorageLayout;
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use secrecy::SecretString;
use tempfile::TempDir;

/// Appliance stand-in counting every request it receives
#[derive(Clone, Default)]
struct MockAppliance {
    requests: Arc<AtomicUsize>,
}

impl MockAppliance {
    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn backup_config(
    State(state): State<MockAppliance>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    state.requests.fetch_add(1, Ordering::SeqCst);

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match auth {
        "Bearer good-token" => {}
        "Bearer denied-token" => return (StatusCode::FORBIDDEN, "d".repeat(250)),
        _ => return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
    }

    if params.get("scope").map(String::as_str) != Some("global") {
        return (StatusCode::BAD_REQUEST, "missing scope".to_string());
    }

    match params.get("options").map(String::as_str) {
        Some("encrypt") if params.get("password").map(String::as_str) == Some("s3cret") => {
            (StatusCode::OK, "encrypted-data".to_string())
        }
        Some(_) => (StatusCode::BAD_REQUEST, "bad encryption options".to_string()),
        None => (StatusCode::OK, "config-data".to_string()),
    }
}

async fn spawn_appliance() -> (u16, MockAppliance) {
    let state = MockAppliance::default();
    let app = Router::new()
        .route(BACKUP_API_PATH, get(backup_config))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (port, state)
}

/// Records sync requests instead of touching git
#[derive(Default)]
struct RecordingArchiver {
    requests: Mutex<Vec<SyncRequest>>,
}

impl RecordingArchiver {
    fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Archiver for RecordingArchiver {
    async fn sync(&self, request: SyncRequest) -> SyncOutcome {
        self.requests.lock().unwrap().push(request);
        SyncOutcome::Committed
    }
}

fn plain_http() -> FetchOptions {
    FetchOptions {
        protocol: Protocol::Http,
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn orchestrator(
    backup_root: &Path,
    fetch: FetchOptions,
    env: &[(&str, &str)],
) -> Orchestrator<RecordingArchiver> {
    let env: HashMap<String, String> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Orchestrator::new(
        CredentialResolver::new(Arc::new(env)),
        BackupFetcher::new(fetch, StorageLayout::new(backup_root)).unwrap(),
        RecordingArchiver::default(),
        backup_root.join("devices.txt"),
        30,
    )
}

fn conf_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "conf"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

#[tokio::test]
async fn test_single_device_end_to_end() {
    let (port, appliance) = spawn_appliance().await;
    let root = TempDir::new().unwrap();
    let orchestrator = orchestrator(root.path(), plain_http(), &[("API_TOKEN", "good-token")]);
    let device = Device::parse_line(&format!("127.0.0.1:{port}, Lab-FW")).unwrap();

    let summary = orchestrator.run_batch(&[device]).await;

    assert_eq!(summary.results.len(), 1);
    assert!(summary.results[0].success);
    assert_eq!(appliance.requests(), 1);

    let files = conf_files(&root.path().join("Lab_FW"));
    assert_eq!(files.len(), 1);
    let filename = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(filename.starts_with("Lab_FW_config_"), "{filename}");
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), "config-data");

    let requests = orchestrator.archiver().requests();
    assert_eq!(requests.len(), 2);

    let backup = &requests[0];
    assert_eq!(backup.commit_message, format!("Backup Lab_FW - {filename}"));
    assert_eq!(
        backup.files,
        vec![(
            files[0].clone(),
            PathBuf::from("backups/Lab_FW").join(&filename)
        )]
    );

    let run_summary = &requests[1];
    assert!(run_summary.commit_message.starts_with("Run Summary - "));
    let (summary_path, summary_repo_path) = &run_summary.files[0];
    assert!(summary_repo_path.starts_with("backups/logs"));
    let rendered = fs::read_to_string(summary_path).unwrap();
    assert!(rendered.starts_with("Backup Job Summary - "));
    assert!(rendered.contains("Lab-FW - ✅ SUCCESS"));
}

#[tokio::test]
async fn test_failing_device_does_not_stop_the_batch() {
    let (port, appliance) = spawn_appliance().await;
    let root = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        root.path(),
        plain_http(),
        &[
            ("API_TOKEN_ALPHA", "good-token"),
            ("API_TOKEN_CHARLIE", "good-token"),
        ],
    );
    let devices: Vec<Device> = ["Alpha", "Bravo", "Charlie"]
        .iter()
        .map(|name| Device::new(format!("127.0.0.1:{port}"), Some(name.to_string())))
        .collect();

    let summary = orchestrator.run_batch(&devices).await;

    let outcomes: Vec<(&str, bool)> = summary
        .results
        .iter()
        .map(|r| (r.device_display_name.as_str(), r.success))
        .collect();
    assert_eq!(
        outcomes,
        vec![("Alpha", true), ("Bravo", false), ("Charlie", true)]
    );
    assert!(summary.results[1].message.contains("API_TOKEN_BRAVO"));
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(appliance.requests(), 2);
    assert!(!root.path().join("Bravo").exists());

    // Two backups plus the summary
    assert_eq!(orchestrator.archiver().requests().len(), 3);
}

#[tokio::test]
async fn test_encryption_without_key_makes_no_request() {
    let (port, appliance) = spawn_appliance().await;
    let root = TempDir::new().unwrap();
    let fetch = FetchOptions {
        encrypt: true,
        ..plain_http()
    };
    let orchestrator = orchestrator(root.path(), fetch, &[("API_TOKEN", "good-token")]);
    let device = Device::new(format!("127.0.0.1:{port}"), Some("Edge".to_string()));

    let summary = orchestrator.run_batch(&[device]).await;

    assert!(!summary.results[0].success);
    assert!(summary.results[0].message.starts_with("Configuration error"));
    assert_eq!(appliance.requests(), 0);
    assert!(conf_files(&root.path().join("Edge")).is_empty());
}

#[tokio::test]
async fn test_encrypted_backup() {
    let (port, appliance) = spawn_appliance().await;
    let root = TempDir::new().unwrap();
    let fetch = FetchOptions {
        encrypt: true,
        encryption_key: Some(SecretString::from("s3cret".to_string())),
        ..plain_http()
    };
    let orchestrator = orchestrator(root.path(), fetch, &[("API_TOKEN", "good-token")]);
    let device = Device::new(format!("127.0.0.1:{port}"), Some("Edge".to_string()));

    let summary = orchestrator.run_batch(&[device]).await;

    assert!(summary.results[0].success, "{}", summary.results[0].message);
    assert_eq!(appliance.requests(), 1);
    let files = conf_files(&root.path().join("Edge"));
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), "encrypted-data");
}

#[tokio::test]
async fn test_error_status_truncates_body() {
    let (port, _appliance) = spawn_appliance().await;
    let root = TempDir::new().unwrap();
    let fetcher = BackupFetcher::new(plain_http(), StorageLayout::new(root.path())).unwrap();
    let device = Device::new(format!("127.0.0.1:{port}"), Some("Edge".to_string()));
    let credential = Credential {
        token: SecretString::from("denied-token".to_string()),
        source: TokenSource::Global,
        key: "API_TOKEN".to_string(),
    };

    match fetcher.fetch(&device, &credential).await {
        Err(BackupError::FetchStatus { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "d".repeat(100));
        }
        other => panic!("expected status error, got {:?}", other),
    }
    assert!(conf_files(&root.path().join("Edge")).is_empty());
}

#[tokio::test]
async fn test_unreachable_device_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let root = TempDir::new().unwrap();
    let fetcher = BackupFetcher::new(plain_http(), StorageLayout::new(root.path())).unwrap();
    let device = Device::new(format!("127.0.0.1:{port}"), None);
    let credential = Credential {
        token: SecretString::from("good-token".to_string()),
        source: TokenSource::Global,
        key: "API_TOKEN".to_string(),
    };

    let err = fetcher.fetch(&device, &credential).await.unwrap_err();
    assert!(matches!(err, BackupError::FetchTransport(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_old_backups_are_rotated() {
    let (port, _appliance) = spawn_appliance().await;
    let root = TempDir::new().unwrap();
    let device_dir = root.path().join("Lab_FW");
    fs::create_dir_all(&device_dir).unwrap();
    let stale = device_dir.join("Lab_FW_config_20200101_030000.conf");
    fs::File::create(&stale)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(40 * 86_400))
        .unwrap();

    let orchestrator = orchestrator(root.path(), plain_http(), &[("API_TOKEN", "good-token")]);
    let device = Device::new(format!("127.0.0.1:{port}"), Some("Lab-FW".to_string()));
    orchestrator.run_batch(&[device]).await;

    assert!(!stale.exists());
    assert_eq!(conf_files(&device_dir).len(), 1);
}

#[tokio::test]
async fn test_run_reads_device_list() {
    let (port, appliance) = spawn_appliance().await;
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("devices.txt"),
        format!("# lab\n\n127.0.0.1:{port}, Lab-FW\n"),
    )
    .unwrap();
    let orchestrator = orchestrator(root.path(), plain_http(), &[("API_TOKEN", "good-token")]);

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.results.len(), 1);
    assert_eq!(appliance.requests(), 1);
}

#[tokio::test]
async fn test_run_without_devices_does_nothing() {
    let root = TempDir::new().unwrap();
    let orchestrator = orchestrator(root.path(), plain_http(), &[("API_TOKEN", "good-token")]);

    assert!(orchestrator.run().await.is_none());
    assert!(orchestrator.archiver().requests().is_empty());
    assert!(!root.path().join("logs").exists());
}
