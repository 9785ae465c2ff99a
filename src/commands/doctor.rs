use anyhow::Result;
use std::process::Command;

pub fn run() -> Result<()> {
    println!("cortex doctor");
    println!("=============");
    println!();

    let checks: [(&str, &str, &[&str]); 5] = [
        ("node", "node", &["--version"]),
        ("npm", "npm", &["--version"]),
        ("npx", "npx", &["--version"]),
        ("docker", "docker", &["--version"]),
        ("docker compose", "docker", &["compose", "version"]),
    ];

    let mut missing = Vec::new();

    for (label, bin, args) in checks {
        match Command::new(bin).args(args).output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                let version = version.trim();
                // Some tools output to stderr
                let version = if version.is_empty() {
                    String::from_utf8_lossy(&output.stderr).trim().to_string()
                } else {
                    version.lines().next().unwrap_or_default().to_string()
                };
                println!("  [ok] {:<16} {}", label, version);
            }
            _ => {
                println!("  [!!] {:<16} not found", label);
                missing.push(label);
            }
        }
    }

    println!();
    if missing.is_empty() {
        println!("All dependencies found.");
    } else {
        println!("Missing: {}.", missing.join(", "));
        println!("node/npx run the backend dev server and apps; docker is only needed for graph databases.");
    }

    Ok(())
}
