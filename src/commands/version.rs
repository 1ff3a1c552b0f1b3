//! Command: print version information.

/// Version string baked in at build time, or the package version.
#[must_use]
pub fn current() -> &'static str {
    option_env!("RWR_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the rwr version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("rwr {}", current());
}
