//! End-to-end lifecycle over real HTTP with the default retrieval client.

use crate::helpers::{CURRENT_VERSION, FakeLauncher};
use fae_updater::update::Platform;
use fae_updater::{UpdateCoordinator, UpdateState, UpdaterConfig};
use std::path::PathBuf;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve_descriptor(server: &MockServer, version: &str) {
    let body = format!(
        "LatestVersion={version}\nDownloadUrl.Linux={}/fae-{version}.tgz\n",
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/fae.properties"))
        .and(query_param_present("cacheBuster"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn query_param_present(name: &'static str) -> impl wiremock::Match {
    move |request: &wiremock::Request| request.url.query_pairs().any(|(k, _)| k == name)
}

fn http_config(server: &MockServer, download_dir: PathBuf) -> UpdaterConfig {
    let mut config = UpdaterConfig::with_server_url(format!("{}/fae.properties", server.uri()));
    config.current_version = CURRENT_VERSION.to_owned();
    config.download_dir = Some(download_dir);
    config.exit_after_launch = false;
    config.http.read_timeout_secs = 10;
    config
}

fn run_lifecycle(config: UpdaterConfig, launcher: FakeLauncher) -> UpdateCoordinator {
    let coordinator = UpdateCoordinator::builder(config)
        .with_platform(Platform::Other)
        .with_launcher(launcher)
        .with_exit_hook(|| {})
        .spawn()
        .unwrap();
    coordinator.poll_server();
    coordinator.download_update();
    coordinator.launch_update();
    coordinator.sync().unwrap();
    coordinator
}

#[tokio::test(flavor = "multi_thread")]
async fn downloads_and_launches_over_http() {
    let server = MockServer::start().await;
    serve_descriptor(&server, "1.4.0").await;
    let artifact = vec![7u8; 200_000];
    Mock::given(method("GET"))
        .and(path("/fae-1.4.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(artifact.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = http_config(&server, dir.path().to_owned());
    let launcher = FakeLauncher::default();
    let observed = launcher.clone();

    let coordinator =
        tokio::task::spawn_blocking(move || run_lifecycle(config, launcher))
            .await
            .unwrap();

    assert_eq!(coordinator.state(), UpdateState::ExecutingSetup);
    let target = coordinator.target_path().to_owned();
    assert_eq!(std::fs::read(&target).unwrap(), artifact);
    assert_eq!(observed.opened(), vec![target]);
    assert_eq!(observed.exits(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_artifact_leaves_error_and_no_file() {
    let server = MockServer::start().await;
    serve_descriptor(&server, "1.4.0").await;
    Mock::given(method("GET"))
        .and(path("/fae-1.4.0.tgz"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = http_config(&server, dir.path().to_owned());
    let launcher = FakeLauncher::default();
    let observed = launcher.clone();

    let coordinator =
        tokio::task::spawn_blocking(move || run_lifecycle(config, launcher))
            .await
            .unwrap();

    assert_eq!(coordinator.state(), UpdateState::Error);
    let cause = coordinator.error_cause().unwrap();
    assert_eq!(cause.message(), "Error: Cannot download update");
    assert!(cause.cause().unwrap().to_string().contains("404"));
    assert!(!coordinator.target_path().exists());
    assert!(observed.opened().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_on_descriptor_fails_poll() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fae.properties"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = http_config(&server, dir.path().to_owned());

    let coordinator = tokio::task::spawn_blocking(move || {
        let coordinator = UpdateCoordinator::builder(config)
            .with_platform(Platform::Other)
            .with_launcher(FakeLauncher::default())
            .with_exit_hook(|| {})
            .spawn()
            .unwrap();
        coordinator.poll_server();
        coordinator.sync().unwrap();
        coordinator
    })
    .await
    .unwrap();

    assert_eq!(coordinator.state(), UpdateState::Error);
    assert_eq!(
        coordinator.error_cause().unwrap().message(),
        "Error: Cannot download properties"
    );
}
