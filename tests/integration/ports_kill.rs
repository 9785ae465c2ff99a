use crate::common::*;
use std::time::Duration;
use tokio::process::Command;

#[tokio::test]
async fn kill_all_frees_listener() {
    let home = tempfile::tempdir().unwrap();
    let port = free_port();

    let mut server = Command::new("python3")
        .args(["-m", "http.server", &port.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to start python3");

    assert!(
        eventually(
            || std::net::TcpStream::connect(("127.0.0.1", port)).is_ok(),
            Duration::from_secs(10)
        )
        .await,
        "listener did not come up on {port}"
    );

    cortex(home.path())
        .args(["ports", "--port", &port.to_string()])
        .assert()
        .success()
        .stdout(predicates::str::contains(format!(":{port}")));

    cortex(home.path())
        .args(["ports", "--kill", "--all", "--port", &port.to_string()])
        .assert()
        .success()
        .stdout(predicates::str::contains("Signalled 1 of 1"));

    tokio::time::timeout(Duration::from_secs(5), server.wait())
        .await
        .expect("listener survived ports --kill")
        .ok();
    assert!(wait_for_port_release(port, Duration::from_secs(5)).await);
}

#[test]
fn kill_without_tty_requires_all() {
    let home = tempfile::tempdir().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    cortex(home.path())
        .args(["ports", "--kill", "--port", &port.to_string()])
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicates::str::contains("pass --all"));
}
