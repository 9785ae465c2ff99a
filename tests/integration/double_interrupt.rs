use crate::common::*;
use nix::sys::signal::Signal;
use std::time::Duration;

#[tokio::test]
async fn second_interrupt_forces_exit() {
    let home = tempfile::tempdir().unwrap();
    let project = TestProject::new("");
    let cli = project.script(
        "stubborn-convex",
        r#"trap '' TERM INT
echo "Convex functions ready" >&2
while true; do sleep 1; done"#,
    );
    std::fs::write(
        &project.config_path,
        format!(
            r#"
[project]
name = "test-force"
# The wrapping shell must ignore TERM too, not just the script.
backend_cli = "trap '' TERM INT; {}"

[session]
grace_period = "20s"

[deployments.local]
local = true
"#,
            cli.display()
        ),
    )
    .unwrap();
    let cfg = project.config_path.to_str().unwrap().to_string();

    let mut child = spawn_cortex(home.path(), &["-f", &cfg, "start"]);
    let snapshot = project.snapshot_path();
    assert!(wait_for_file(&snapshot, Duration::from_secs(10)).await);
    let backend_pid = snapshot_pid(&snapshot, "local").expect("backend pid recorded");

    let pid = child.id().unwrap();
    send_signal(pid, Signal::SIGINT);
    tokio::time::sleep(Duration::from_millis(300)).await;
    send_signal(pid, Signal::SIGINT);

    // Well inside the 20s grace period.
    let status = tokio::time::timeout(Duration::from_secs(8), child.wait())
        .await
        .expect("cortex ignored the second interrupt")
        .expect("failed to wait on cortex");
    assert_eq!(status.code(), Some(1));

    assert!(
        eventually(|| !pid_alive(backend_pid), Duration::from_secs(5)).await,
        "forced shutdown left {backend_pid} running"
    );
}
