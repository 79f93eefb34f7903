//! Build-time metadata, exposed to embedders for tracing/bug-report
//! purposes. Grounded on the teacher's `src/build_info.rs`, which wraps the
//! `built` crate's generated constants in a small stable API rather than
//! exposing `OUT_DIR`-generated items directly.

mod raw {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// This crate's package version, e.g. "0.1.0".
pub const PKG_VERSION: &str = raw::PKG_VERSION;

/// Comma-separated Cargo features enabled for this build.
pub const FEATURES: &str = raw::FEATURES_STR;

/// The target triple this build was compiled for.
pub const TARGET: &str = raw::TARGET;

/// `"release"` or `"debug"`, matching the Cargo profile used.
pub const PROFILE: &str = raw::PROFILE;
