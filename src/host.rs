//! Host machine integration: the hosts file and the browser.

use std::fs;
use std::path::Path;

use crate::build::context::BuildContext;
use crate::process::{tools, FailurePolicy, ProcessRunner};

pub const HOSTS_FILE: &str = "/etc/hosts";

/// Whether a hosts file maps `host` to any address.
pub fn hosts_has_entry(contents: &str, host: &str) -> bool {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            fields.next().map(|_| fields)
        })
        .any(|mut names| names.any(|name| name.eq_ignore_ascii_case(host)))
}

/// Line the operator should add for `host`.
pub fn hosts_line(host: &str) -> String {
    format!("127.0.0.1 {host}")
}

/// On macOS, warn when the app host does not resolve locally. Never writes.
pub fn check_host_entry(ctx: &BuildContext) {
    if std::env::consts::OS == "macos" {
        check_hosts_file(ctx, Path::new(HOSTS_FILE));
    }
}

/// Returns true when `path` maps the configured host.
pub fn check_hosts_file(ctx: &BuildContext, path: &Path) -> bool {
    let host = &ctx.config.host;
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read hosts file");
            String::new()
        }
    };
    if hosts_has_entry(&contents, host) {
        return true;
    }
    ctx.console.warning(&format!(
        "{host} is not in {}; add this line to reach the app:\n  {}",
        path.display(),
        hosts_line(host)
    ));
    false
}

pub fn app_url(host: &str) -> String {
    format!("http://{host}")
}

/// Final notice, then the platform opener unless disabled. Opening is
/// best-effort: a missing opener only logs.
pub fn open_app(ctx: &BuildContext, runner: &dyn ProcessRunner) {
    let url = app_url(&ctx.config.host);
    ctx.console
        .note(&format!("Opening {} at {}", ctx.config.app_type.label(), url));
    if !ctx.settings.open_browser {
        return;
    }
    let spec = tools::open_url(std::env::consts::OS, &url);
    if let Err(e) = runner.run(&spec, FailurePolicy::FailSoft) {
        tracing::warn!(%url, error = %e, "could not open browser");
    }
}
