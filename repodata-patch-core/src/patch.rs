//! Patch engine: turns one subdir's index into its patch instructions.
//!
//! [`compute_instructions`] is a pure function of the index, the subdir and
//! the rule tables. It never touches the network or disk and never mutates
//! the index; corrections are staged per package in an [`InstructionsBuilder`]
//! and only the staged fields end up in the output document.
//!
//! # Per-record rule order
//! Within one record, later rules see the dependency list produced by earlier ones:
//!   1. namespace corrections
//!   2. exact-version repair, or else the family mutex injection
//!   3. dependency renames
//!   4. revocation and removal pattern matching on the filename
//!
//! # Errors
//! A record without `depends`, or with a missing or non-integer
//! `build_number`, fails the whole subdir. No partial document is returned.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::PatchError;
use crate::repodata::{dependency_name, PackageRecord, Repodata};
use crate::rules::{MutexRule, RuleTables, VersionRepair};
use crate::subdir::Subdir;

pub const PATCH_INSTRUCTIONS_VERSION: u32 = 1;

/// The fields of a package record being overridden. Unset fields are left as served.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_in_name: Option<bool>,
}

/// Patch instructions for one subdir. Fields are declared in key order so the
/// serialised document has sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchInstructions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_dependencies: Option<BTreeMap<String, String>>,
    pub packages: BTreeMap<String, PackagePatch>,
    pub patch_instructions_version: u32,
    pub remove: Vec<String>,
    pub revoke: Vec<String>,
}

/// Accumulates staged corrections; merged into [`PatchInstructions`] by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct InstructionsBuilder {
    packages: BTreeMap<String, PackagePatch>,
    revoke: BTreeSet<String>,
    remove: BTreeSet<String>,
    external_dependencies: Option<BTreeMap<String, String>>,
}

impl InstructionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The patch for `identifier`, created on first use.
    pub fn stage(&mut self, identifier: &str) -> &mut PackagePatch {
        self.packages.entry(identifier.to_string()).or_default()
    }

    pub fn revoke(&mut self, identifier: &str) {
        self.revoke.insert(identifier.to_string());
    }

    pub fn remove(&mut self, identifier: &str) {
        self.remove.insert(identifier.to_string());
    }

    pub fn external_dependencies(&mut self, map: BTreeMap<String, String>) {
        self.external_dependencies = Some(map);
    }

    pub fn build(self) -> PatchInstructions {
        PatchInstructions {
            external_dependencies: self.external_dependencies,
            packages: self.packages,
            patch_instructions_version: PATCH_INSTRUCTIONS_VERSION,
            remove: self.remove.into_iter().collect(),
            revoke: self.revoke.into_iter().collect(),
        }
    }
}

/// Computes the patch instructions for `subdir`.
pub fn compute_instructions(
    repodata: &Repodata,
    subdir: Subdir,
    rules: &RuleTables,
) -> Result<PatchInstructions, PatchError> {
    let mut builder = InstructionsBuilder::new();

    for filename in rules.exact_removals(subdir) {
        builder.remove(filename);
    }

    if subdir.is_noarch() {
        builder.external_dependencies(rules.external_dependencies.clone());
    }

    for (identifier, record) in &repodata.packages {
        patch_record(&mut builder, identifier, record, rules)?;

        if rules.is_revoked(subdir, identifier) {
            debug!(%subdir, identifier = %identifier, "Revoking package");
            builder.revoke(identifier);
        }
        if rules.is_removed(subdir, identifier) {
            debug!(%subdir, identifier = %identifier, "Removing package");
            builder.remove(identifier);
        }
    }

    let instructions = builder.build();
    info!(
        %subdir,
        records = repodata.packages.len(),
        patched = instructions.packages.len(),
        revoked = instructions.revoke.len(),
        removed = instructions.remove.len(),
        "Computed patch instructions"
    );
    Ok(instructions)
}

fn patch_record(
    builder: &mut InstructionsBuilder,
    identifier: &str,
    record: &PackageRecord,
    rules: &RuleTables,
) -> Result<(), PatchError> {
    let original = record.depends(identifier)?;
    let build_number = record.build_number(identifier)?;
    let name = record.name.as_str();

    if rules.namespace_in_name.contains(name) && !record.namespace_in_name() {
        debug!(identifier, "Flagging namespace_in_name");
        builder.stage(identifier).namespace_in_name = Some(true);
    }
    if let Some(namespace) = rules
        .namespace_overrides
        .get(name)
        .filter(|ns| !ns.is_empty())
    {
        debug!(identifier, namespace = %namespace, "Overriding namespace");
        builder.stage(identifier).namespace = Some(namespace.clone());
    }

    let mut depends = original.to_vec();
    let mut changed = false;

    let repair = rules
        .version_repairs
        .iter()
        .find(|repair| repair.name == name && repair.version == record.version);
    if let Some(repair) = repair {
        changed |= apply_repair(&mut depends, repair, build_number, &rules.mutex);
    } else if let Some(spec) = rules.mutex.families.get(name) {
        changed |= inject_mutex(&mut depends, &rules.mutex, spec);
    }

    for rename in &rules.renames {
        changed |= rename_dependency(&mut depends, &rename.from, &rename.to);
    }

    if changed {
        debug!(identifier, ?depends, "Staging depends");
        builder.stage(identifier).depends = Some(depends);
    }
    Ok(())
}

fn apply_repair(
    depends: &mut Vec<String>,
    repair: &VersionRepair,
    build_number: i64,
    mutex: &MutexRule,
) -> bool {
    if build_number < repair.build_threshold {
        inject_mutex(depends, mutex, &repair.mutex)
    } else {
        pin_dependency(depends, &repair.unpinned, &repair.pinned)
    }
}

/// Appends `spec` unless a mutex is already present. A dependency counts as a
/// mutex when its name is one of the reserved names or the name `spec` itself
/// would add.
pub fn inject_mutex(depends: &mut Vec<String>, mutex: &MutexRule, spec: &str) -> bool {
    let injected = dependency_name(spec);
    let present = depends.iter().any(|dep| {
        let name = dependency_name(dep);
        mutex.reserved_names.contains(name) || name == injected
    });
    if present {
        return false;
    }
    depends.push(spec.to_string());
    true
}

/// Replaces the bare `unpinned` entry with `pinned`, appended at the end.
/// Returns false when there is no bare entry to replace.
pub fn pin_dependency(depends: &mut Vec<String>, unpinned: &str, pinned: &str) -> bool {
    let Some(position) = depends.iter().position(|dep| dep == unpinned) else {
        return false;
    };
    depends.remove(position);
    if !depends.iter().any(|dep| dep == pinned) {
        depends.push(pinned.to_string());
    }
    true
}

/// Renames the first dependency named `from` to `to`, keeping its constraint text verbatim.
pub fn rename_dependency(depends: &mut [String], from: &str, to: &str) -> bool {
    let position: Option<usize> = depends.iter().position(|dep| dependency_name(dep) == from);
    let Some(position) = position else {
        return false;
    };
    let dep = &depends[position];
    let name_start = dep.len() - dep.trim_start().len();
    let name_end = dep[name_start..]
        .find(char::is_whitespace)
        .map_or(dep.len(), |offset| name_start + offset);
    let renamed = format!("{}{to}{}", &dep[..name_start], &dep[name_end..]);
    depends[position] = renamed;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn r_mutex() -> MutexRule {
        MutexRule {
            reserved_names: BTreeSet::from(["_r_mutex".to_string()]),
            families: BTreeMap::new(),
        }
    }

    #[test]
    fn rename_matches_first_position() {
        let mut list = deps(&["r-base 3.1.2", "zlib"]);
        assert!(rename_dependency(&mut list, "r-base", "r-base-renamed"));
        assert_eq!(list, deps(&["r-base-renamed 3.1.2", "zlib"]));
    }

    #[test]
    fn rename_keeps_constraint_and_build_string() {
        let mut list = deps(&["zlib", "r-base >=3.4,<3.5 h1234_0"]);
        assert!(rename_dependency(&mut list, "r-base", "mro-base"));
        assert_eq!(list[1], "mro-base >=3.4,<3.5 h1234_0");
    }

    #[test]
    fn rename_keeps_any_whitespace_after_name() {
        let mut list = deps(&["r-base\t>=3.4", "zlib", "r-base  3.1.2"]);
        assert!(rename_dependency(&mut list, "r-base", "mro-base"));
        assert_eq!(list[0], "mro-base\t>=3.4");
        assert!(rename_dependency(&mut list, "r-base", "mro-base"));
        assert_eq!(list[2], "mro-base  3.1.2");
    }

    #[test]
    fn rename_touches_only_first_match() {
        let mut list = deps(&["r-base 3.1", "r-base 3.2"]);
        assert!(rename_dependency(&mut list, "r-base", "x"));
        assert_eq!(list, deps(&["x 3.1", "r-base 3.2"]));
    }

    #[test]
    fn rename_without_match_leaves_list_alone() {
        let mut list = deps(&["r-base-core 1.0"]);
        assert!(!rename_dependency(&mut list, "r-base", "x"));
        assert_eq!(list, deps(&["r-base-core 1.0"]));
    }

    #[test]
    fn mutex_injected_once() {
        let mut list = deps(&["libgcc"]);
        assert!(inject_mutex(&mut list, &r_mutex(), "_r-mutex 1.* anacondar_1"));
        assert!(!inject_mutex(&mut list, &r_mutex(), "_r-mutex 1.* anacondar_1"));
        assert_eq!(list, deps(&["libgcc", "_r-mutex 1.* anacondar_1"]));
    }

    #[test]
    fn reserved_mutex_name_suppresses_injection() {
        let mut list = deps(&["_r_mutex 1.*"]);
        assert!(!inject_mutex(&mut list, &r_mutex(), "_r-mutex 1.* mro_2"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn pin_replaces_bare_entry_only() {
        let mut list = deps(&["r-base", "readline"]);
        assert!(pin_dependency(&mut list, "r-base", "r-base 3.1.2"));
        assert_eq!(list, deps(&["readline", "r-base 3.1.2"]));

        let mut pinned = deps(&["readline", "r-base 3.1.2"]);
        assert!(!pin_dependency(&mut pinned, "r-base", "r-base 3.1.2"));
    }

    #[test]
    fn builder_dedupes_and_sorts_lists() {
        let mut builder = InstructionsBuilder::new();
        builder.remove("b-1.0-0.tar.bz2");
        builder.remove("a-1.0-0.tar.bz2");
        builder.remove("b-1.0-0.tar.bz2");
        builder.revoke("c-1.0-0.tar.bz2");
        let doc = builder.build();
        assert_eq!(doc.remove, vec!["a-1.0-0.tar.bz2", "b-1.0-0.tar.bz2"]);
        assert_eq!(doc.revoke, vec!["c-1.0-0.tar.bz2"]);
        assert!(doc.packages.is_empty());
        assert_eq!(doc.patch_instructions_version, 1);
    }

    #[test]
    fn serialised_document_has_sorted_keys() {
        let mut builder = InstructionsBuilder::new();
        builder.external_dependencies(BTreeMap::from([(
            "zlib".to_string(),
            "global:zlib".to_string(),
        )]));
        let patch = builder.stage("r-3.1.2-0.tar.bz2");
        patch.namespace = Some("global".to_string());
        patch.depends = Some(deps(&["_r-mutex 1.* anacondar_1"]));
        let json = serde_json::to_string(&builder.build()).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"external_dependencies":{"zlib":"global:zlib"},"#,
                r#""packages":{"r-3.1.2-0.tar.bz2":{"depends":["_r-mutex 1.* anacondar_1"],"namespace":"global"}},"#,
                r#""patch_instructions_version":1,"remove":[],"revoke":[]}"#
            )
        );
    }
}
