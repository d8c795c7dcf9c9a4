// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=CHROMAKEY_CAMERA_VERSION");

    // Packagers can pin the version; otherwise ask git, then fall back to Cargo.toml
    let version = std::env::var("CHROMAKEY_CAMERA_VERSION")
        .ok()
        .or_else(describe)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` without the leading `v`, e.g. "0.2.0-3-gabcdef1"
fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty", "--match", "v*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let version = text.strip_prefix('v').unwrap_or(&text);
    (!version.is_empty()).then(|| version.to_string())
}
