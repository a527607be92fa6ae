//! Build script exposing build metadata to the `/health` endpoint.

use std::process::Command;

fn main() {
    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=APPSTAT_BUILT_AT={}", built_at);

    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=APPSTAT_GIT_COMMIT={}", commit);

    println!("cargo:rerun-if-changed=.git/HEAD");
}
