use crate::common::*;
use std::time::Duration;

fn project_with_fake_backend(port: u16) -> TestProject {
    let project = TestProject::new("");
    let cli = project.script(
        "fake-convex",
        r#"echo "Convex functions ready" >&2
exec sleep 600"#,
    );
    std::fs::write(
        &project.config_path,
        format!(
            r#"
[project]
name = "test-lifecycle"
backend_cli = "{cli}"

[deployments.local]
path = "backend"
url = "http://127.0.0.1:3210"
local = true

[apps.web]
path = "web"
command = "python3 -m http.server {port}"
port = {port}
deployment = "local"
ready_pattern = "Serving HTTP"
"#,
            cli = cli.display()
        ),
    )
    .unwrap();
    project.mkdir("backend");
    project.mkdir("web");
    project
}

#[tokio::test]
async fn start_then_stop_cleans_up() {
    let home = tempfile::tempdir().unwrap();
    let port = free_port();
    let project = project_with_fake_backend(port);
    let cfg = project.config_path.to_str().unwrap().to_string();

    let mut child = spawn_cortex(home.path(), &["-f", &cfg, "start"]);

    let snapshot = project.snapshot_path();
    assert!(
        wait_for_file(&snapshot, Duration::from_secs(10)).await,
        "session snapshot was not written"
    );
    let backend_pid = snapshot_pid(&snapshot, "local").expect("backend pid recorded");
    assert!(pid_alive(backend_pid));

    cortex(home.path())
        .args(["-f", &cfg, "status"])
        .assert()
        .success()
        .stdout(predicates::str::contains("test-lifecycle"))
        .stdout(predicates::str::contains("web"));

    cortex(home.path())
        .args(["-f", &cfg, "stop"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Stopped session for 'test-lifecycle'."));

    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("cortex did not exit in time")
        .expect("failed to wait on cortex");
    assert_eq!(status.code(), Some(0));

    assert!(!snapshot.exists(), "snapshot should be removed after stop");
    assert!(
        eventually(|| !pid_alive(backend_pid), Duration::from_secs(5)).await,
        "backend process {backend_pid} survived stop"
    );
    assert!(
        wait_for_port_release(port, Duration::from_secs(5)).await,
        "Port {port} was not released after stop"
    );
}

#[tokio::test]
async fn second_session_is_refused() {
    let home = tempfile::tempdir().unwrap();
    let port = free_port();
    let project = project_with_fake_backend(port);
    let cfg = project.config_path.to_str().unwrap().to_string();

    let mut child = spawn_cortex(home.path(), &["-f", &cfg, "start", "local"]);
    assert!(wait_for_file(&project.snapshot_path(), Duration::from_secs(10)).await);

    cortex(home.path())
        .args(["-f", &cfg, "start", "local"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("already running"));

    send_signal(child.id().unwrap(), nix::sys::signal::Signal::SIGINT);
    let status = tokio::time::timeout(Duration::from_secs(15), child.wait())
        .await
        .expect("cortex did not exit in time")
        .expect("failed to wait on cortex");
    assert_eq!(status.code(), Some(0));
    assert!(!project.snapshot_path().exists());
}
