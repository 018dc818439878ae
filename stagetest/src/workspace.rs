//! Test folder preparation.
//!
//! A fresh run works on a private copy of the module tree so parallel
//! tests never share Terraform state. When any skip directive is set the
//! operator is resuming an earlier run, so the original folder is used and
//! the state saved there by the earlier invocation stays reachable.

use crate::errors::StagetestError;
use crate::skip::SkipPolicy;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Returns the directory a test should run in.
///
/// `root` is copied to a new temp directory (minus hidden files and local
/// Terraform state) and `<copy>/<subfolder>` is returned, unless `policy`
/// reports a skip directive, in which case `<root>/<subfolder>` is returned
/// untouched.
pub fn prepare_test_folder(
    root: &Path,
    subfolder: &str,
    policy: &SkipPolicy,
) -> Result<PathBuf, StagetestError> {
    if policy.any_directive_set() {
        let original = root.join(subfolder);
        info!(dir = %original.display(), "skip directive set, reusing original test folder");
        return Ok(original);
    }

    let name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stagetest");
    let target = std::env::temp_dir().join(format!("{name}-{}", Uuid::new_v4().simple()));
    copy_tree(root, &target)?;
    info!(from = %root.display(), to = %target.display(), "copied test folder");
    Ok(target.join(subfolder))
}

/// Recursively copies `from` into `to`, skipping entries [`should_copy`] rejects.
pub fn copy_tree(from: &Path, to: &Path) -> Result<(), StagetestError> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !should_copy(name) {
            continue;
        }
        let source = entry.path();
        let dest = to.join(name);
        if entry.file_type()?.is_dir() {
            copy_tree(&source, &dest)?;
        } else {
            std::fs::copy(&source, &dest)?;
        }
    }
    Ok(())
}

/// Hidden entries and local Terraform state are not copied.
#[must_use]
pub fn should_copy(name: &str) -> bool {
    const KEEP_HIDDEN: [&str; 2] = [".terraform-version", ".terraform.lock.hcl"];
    if name.starts_with("terraform.tfstate") {
        return false;
    }
    !name.starts_with('.') || KEEP_HIDDEN.contains(&name)
}
