//! End-to-end plan → apply → rollback flows through the library API.

mod util;

use std::fs;

use assert_fs::prelude::*;
use devpilot::core::apply::requests_from_plan;
use devpilot::core::merge::candidates;
use devpilot::core::plan::plan;
use devpilot::{ApplyExecutor, ApplyRequest, Classification, ProposedFile, RepoRoot, parse_bundle};
use util::{bundle, repo_with};

fn open(tmp: &assert_fs::TempDir) -> RepoRoot
{
    RepoRoot::new(tmp.path()).unwrap()
}

#[test]
fn update_writes_proposal_and_keeps_baseline_in_backup()
{
    let tmp = repo_with(&[("src/app.ts", "a")]);
    let root = open(&tmp);
    let files = vec![ProposedFile::new("src/app.ts", "b").with_expected("a")];

    let plan = plan(&files, &root).unwrap();
    assert_eq!(plan.entries[0].classification, Classification::Update);

    let exec = ApplyExecutor::new(root);
    let report = exec
        .apply(&requests_from_plan(&plan, &[]), Some(&plan))
        .unwrap();

    assert_eq!(report.applied_paths, ["src/app.ts"]);
    tmp.child("src/app.ts")
        .assert("b");
    tmp.child("src/app.ts.bak.devpilot")
        .assert("a");
}

#[test]
fn drifted_file_is_skipped_without_force()
{
    let tmp = repo_with(&[("app.ts", "z")]);
    let root = open(&tmp);
    let files = vec![ProposedFile::new("app.ts", "b").with_expected("a")];

    let plan = plan(&files, &root).unwrap();
    assert_eq!(plan.entries[0].classification, Classification::Conflict);

    let report = ApplyExecutor::new(root)
        .apply(&requests_from_plan(&plan, &[]), Some(&plan))
        .unwrap();

    assert!(report.applied_paths.is_empty());
    assert_eq!(report.skipped_conflicts, ["app.ts"]);
    tmp.child("app.ts")
        .assert("z");
    tmp.child("app.ts.bak.devpilot")
        .assert(predicates::path::missing());
}

#[test]
fn new_file_is_created_without_backup()
{
    let tmp = repo_with(&[]);
    let root = open(&tmp);
    let files = vec![ProposedFile::new("pkg/new.ts", "new")];

    let plan = plan(&files, &root).unwrap();
    assert_eq!(plan.entries[0].classification, Classification::Create);

    let report = ApplyExecutor::new(root)
        .apply(&requests_from_plan(&plan, &[]), Some(&plan))
        .unwrap();

    assert!(report.backed_up.is_empty());
    tmp.child("pkg/new.ts")
        .assert("new");
    tmp.child("pkg/new.ts.bak.devpilot")
        .assert(predicates::path::missing());
}

#[test]
fn drift_matching_the_proposal_is_unchanged()
{
    let tmp = repo_with(&[("app.ts", "z")]);
    let files = vec![ProposedFile::new("app.ts", "z").with_expected("a")];

    let plan = plan(&files, &open(&tmp)).unwrap();
    assert_eq!(plan.entries[0].classification, Classification::Unchanged);
    assert!(requests_from_plan(&plan, &[]).is_empty());
}

#[test]
fn rollback_without_backup_is_a_noop()
{
    let tmp = repo_with(&[("app.ts", "live")]);
    let exec = ApplyExecutor::new(open(&tmp));

    let outcome = exec
        .rollback("app.ts")
        .unwrap();
    assert!(!outcome.restored);
    tmp.child("app.ts")
        .assert("live");
}

#[test]
fn rollback_restores_pre_apply_bytes_once()
{
    let tmp = repo_with(&[("app.ts", "before")]);
    let exec = ApplyExecutor::new(open(&tmp));

    exec.apply(&[ApplyRequest::new("app.ts", "after")], None)
        .unwrap();
    tmp.child("app.ts")
        .assert("after");

    assert!(exec.rollback("./app.ts").unwrap().restored);
    tmp.child("app.ts")
        .assert("before");
    assert!(!exec.rollback("app.ts").unwrap().restored);
}

#[test]
fn merge_session_forces_only_its_own_file()
{
    let tmp = repo_with(&[("a.ts", "drift-a"), ("b.ts", "drift-b")]);
    let root = open(&tmp);
    let files = parse_bundle(&bundle(&[
        ("a.ts", "proposal-a", Some("base-a")),
        ("b.ts", "proposal-b", Some("base-b")),
    ]))
    .unwrap();
    let plan = plan(&files, &root).unwrap();
    assert_eq!(plan.summary.conflict, 2);

    let mut sessions = candidates(&files, &plan);
    assert_eq!(sessions.len(), 2);
    let a = sessions
        .remove(0)
        .with_merged("hand-merged-a")
        .with_force(true);
    assert_eq!(a.expected, "base-a");
    assert_eq!(a.current, "drift-a");

    let b = sessions.remove(0);
    let report = ApplyExecutor::new(root)
        .apply(&[a.finalize(), b.finalize()], Some(&plan))
        .unwrap();

    assert_eq!(report.applied_paths, ["a.ts"]);
    assert_eq!(report.skipped_conflicts, ["b.ts"]);
    assert_eq!(fs::read_to_string(tmp.path().join("a.ts")).unwrap(), "hand-merged-a");
    tmp.child("b.ts")
        .assert("drift-b");
}

#[test]
fn escaping_path_aborts_batch_before_any_write()
{
    let tmp = repo_with(&[("ok.ts", "old")]);
    let exec = ApplyExecutor::new(open(&tmp));

    let err = exec
        .apply(
            &[ApplyRequest::new("ok.ts", "new"), ApplyRequest::new("../outside.ts", "x")],
            None,
        )
        .unwrap_err();

    assert!(err.report.applied_paths.is_empty());
    assert_eq!(err.source.path(), "../outside.ts");
    tmp.child("ok.ts")
        .assert("old");
}
