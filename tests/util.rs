//! Shared test utilities for integration tests
//!
//! Repository fixtures and bundle builders used across test files.

#![allow(dead_code)]

use assert_fs::prelude::*;
use serde_json::json;

/// Temporary repository seeded with `files` as (path, content) pairs.
pub fn repo_with(files: &[(&str, &str)]) -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    for (path, body) in files
    {
        tmp.child(path)
            .write_str(body)
            .expect("write fixture");
    }
    tmp
}

/// Bundle JSON for (path, proposed, expected) triples.
pub fn bundle(entries: &[(&str, &str, Option<&str>)]) -> String
{
    let files: Vec<_> = entries
        .iter()
        .map(|(path, code, expected)| match expected
        {
            Some(e) => json!({ "path": path, "code": code, "expected": e }),
            None => json!({ "path": path, "code": code }),
        })
        .collect();
    json!({ "files": files }).to_string()
}
