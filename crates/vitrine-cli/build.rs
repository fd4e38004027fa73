use std::process::Command;

/// Run a git command and return its trimmed stdout, or an empty string when git
/// is unavailable (e.g. building from a source tarball).
fn git(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn main() {
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");

    let hash = git(&["rev-parse", "--short", "HEAD"]);
    let commit_date = git(&["log", "-1", "--format=%cd", "--date=format:%Y-%m-%d"]);
    let dirty = !git(&["status", "--porcelain", "--untracked-files=no"]).is_empty();

    let version = env!("CARGO_PKG_VERSION");
    let tagged = git(&["tag", "--points-at", "HEAD"])
        .lines()
        .any(|tag| tag == format!("v{}", version));

    println!("cargo:rustc-env=VITRINE_GIT_HASH={}", hash);
    println!("cargo:rustc-env=VITRINE_COMMIT_DATE={}", commit_date);
    println!("cargo:rustc-env=VITRINE_IS_RELEASE={}", tagged && !dirty);
}
