//! **mirror** — reproducibly synchronize files from upstream git repositories
//! into a downstream working repository.
//!
//! A manifest (`.mirror.yaml`) names one or more upstream repositories and,
//! for each, the files to mirror downstream. `mirror install` checks every
//! upstream out, copies the named files, and records what it copied in a
//! version-controlled lock file (`.mirror.lock`). `mirror check` reports
//! whether the lock still matches upstream HEAD. `mirror sync` re-applies
//! upstream's changes as a three-way merge, so local edits to a mirrored
//! file survive alongside upstream's.

/// Typed relative/absolute paths, commit ids, and remote specifiers.
pub mod path;

/// The user-visible error taxonomy.
pub mod error;

/// Domain logic: manifest parsing, the lock-file state machine, the
/// leader/follower cache semaphore, the git façade, and the repo/mirror
/// engines that drive them.
pub mod core {
    /// Platform cache directory resolution and per-remote cache slots.
    pub mod cache;

    /// The exclusive downstream lock (`.mirror.lock`) and its state.
    pub mod lockfile;

    /// Manifest grammar, validation, and in-memory shape.
    pub mod manifest;

    /// Cache-slot leader/follower semaphore.
    pub mod semaphore;

    /// The lock file's on-disk state machine.
    pub mod state;

    /// Thin façade over the `git` binary.
    pub mod vcs;

    /// One upstream and the files mirrored from it.
    pub mod repo;

    /// The aggregate of all repos in one manifest.
    pub mod mirror;

    /// Command entry points: Install, Check, Sync.
    pub mod manager;
}

/// Command-line interface with clap integration.
pub mod cli;

// Flat re-exports: most of the crate is written against `crate::vcs`,
// `crate::state`, `crate::manifest`, `crate::cache`, `crate::lockfile`, and
// `crate::semaphore`, matching how deeply these modules are shared rather
// than threading `core::` through every reference.
pub use core::{cache, lockfile, manifest, semaphore, state, vcs};
pub use core::manager::{Checker, Installer, Syncer};
pub use core::mirror::Mirror;
pub use core::repo::Repo;
pub use error::{MirrorError, Result};
