// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=FXCAM_VERSION");

    // Packagers pin the version explicitly
    let version = std::env::var("FXCAM_VERSION").unwrap_or_else(|_| git_version());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `0.1.0-abcdef1` on a tag, `0.1.0-dirty-abcdef1` past one, the bare
/// hash without tags, or the package version outside a git checkout
fn git_version() -> String {
    let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) else {
        return env!("CARGO_PKG_VERSION").to_string();
    };
    let Some(described) = git(&["describe", "--tags", "--match", "v*"]) else {
        return hash;
    };
    let described = described.strip_prefix('v').unwrap_or(&described);

    // "<tag>-<commits>-g<hash>" when HEAD is past the tag
    match described.rsplitn(3, '-').collect::<Vec<_>>().as_slice() {
        [_, _, base] => format!("{}-dirty-{}", base, hash),
        _ => format!("{}-{}", described, hash),
    }
}
