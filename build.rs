use std::process::Command;

/// Embeds RESGET_VERSION: the nearest git tag without its `v`, with
/// `-dirty` kept for modified trees. Builds outside a git checkout fall back
/// to the Cargo.toml version.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let version = match described {
        Some(tag) => tag.strip_prefix('v').unwrap_or(&tag).to_string(),
        None => std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0-dev".to_string()),
    };

    println!("cargo:rustc-env=RESGET_VERSION={}", version);
}
