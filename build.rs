use std::process::{Command, Output};

fn git(args: &[&str]) -> Option<Output> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
}

fn main() {
    for path in [".git/HEAD", ".git/refs/heads/", ".git/refs/tags/"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let hash = git(&["rev-parse", "--short", "HEAD"])
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string());

    // A release is a build of an exact tag.
    let is_release = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    let dirty = git(&["status", "--porcelain"]).is_some_and(|out| !out.stdout.is_empty());
    let suffix = if dirty { "-dirty" } else { "" };

    println!("cargo:rustc-env=TURNSTILE_GIT_HASH={hash}{suffix}");
    println!("cargo:rustc-env=TURNSTILE_IS_RELEASE={is_release}");
}
