//! Snapshot tests for the lock file's on-disk determinism: the same
//! `MirrorState` must always dump to the same bytes (sorted files, stable
//! key order), independent of input ordering.

use mirror::path::{Commit, RelFile, Remote};
use mirror::state::{MirrorState, RepoState};

#[test]
fn dump_is_deterministic_and_sorts_files() {
    let state = MirrorState {
        repos: vec![RepoState {
            source: Remote::new("/tmp/upstream"),
            commit: Commit::new("abc123def"),
            files: vec![RelFile::new("b.txt"), RelFile::new("a.txt")],
        }],
    };

    insta::assert_snapshot!(state.dump(), @r###"
    # DANGER: EDIT AT YOUR OWN RISK. This file is maintained by mirror; hand edits may be lost or silently corrupt the mirrored state.
    - source: /tmp/upstream
      commit: abc123def
      files:
        - a.txt
        - b.txt
    "###);
}

#[test]
fn dump_of_empty_state_is_an_empty_sequence() {
    let state = MirrorState::empty();
    insta::assert_snapshot!(state.dump(), @r###"
    # DANGER: EDIT AT YOUR OWN RISK. This file is maintained by mirror; hand edits may be lost or silently corrupt the mirrored state.
    []
    "###);
}

#[test]
fn dump_quotes_scalars_that_would_otherwise_be_ambiguous() {
    let state = MirrorState {
        repos: vec![RepoState {
            source: Remote::new("#local/repo"),
            commit: Commit::new("deadbeef"),
            files: vec![RelFile::new("weird: name.txt")],
        }],
    };
    let dumped = state.dump();
    assert!(dumped.contains("source: \"#local/repo\""));
    assert!(dumped.contains("\"weird: name.txt\""));

    let reloaded = MirrorState::load(&dumped).unwrap();
    assert_eq!(reloaded, state);
}
