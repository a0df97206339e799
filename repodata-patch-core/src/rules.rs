//! Rule tables: the declarative corrections applied to every subdir.
//!
//! [`RuleConfig`] is the serialisable shape (YAML on disk, or the built-in R
//! channel tables). [`RuleTables`] is the validated, compiled form the engine
//! consumes: table keys are checked against the known subdirs and every
//! removal/revocation pattern is compiled once, before any index is read.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

use crate::error::RulesError;
use crate::subdir::{Subdir, SubdirKey};

/// Rule tables as written in a rules file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleConfig {
    /// Subdir (or `any`) -> package filenames or filename patterns to remove.
    pub removals: BTreeMap<String, Vec<String>>,
    /// Subdir (or `any`) -> filename patterns to revoke.
    pub revocations: BTreeMap<String, Vec<String>>,
    /// Dependency name -> `namespace:name`, published with the noarch instructions.
    pub external_dependencies: BTreeMap<String, String>,
    /// Package name -> forced namespace.
    pub namespace_overrides: BTreeMap<String, String>,
    /// Package names whose filename already carries the namespace.
    pub namespace_in_name: BTreeSet<String>,
    pub mutex: MutexRule,
    pub version_repairs: Vec<VersionRepair>,
    pub renames: Vec<DependencyRename>,
}

/// Ensures every build of a runtime family depends on the shared mutex package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutexRule {
    /// Dependency names that count as an existing mutex.
    pub reserved_names: BTreeSet<String>,
    /// Runtime family (package name) -> mutex specifier appended when absent.
    pub families: BTreeMap<String, String>,
}

/// A correction scoped to one exact package version, split on build number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionRepair {
    pub name: String,
    pub version: String,
    /// Builds below this get `mutex`; builds at or above get `unpinned` replaced by `pinned`.
    pub build_threshold: i64,
    pub mutex: String,
    pub unpinned: String,
    pub pinned: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyRename {
    pub from: String,
    pub to: String,
}

impl RuleConfig {
    /// The tables for the `pro` R channel.
    pub fn r_channel() -> Self {
        let removals = BTreeMap::from([(
            "linux-64".to_string(),
            // Depends on nlopt, which only exists in conda-forge and is broken there.
            vec!["r-nloptr-1.0.4-r3.2.2_1.tar.bz2".to_string()],
        )]);

        let external_dependencies = R_EXTERNAL_DEPENDENCIES
            .iter()
            .map(|(name, target)| (name.to_string(), target.to_string()))
            .collect();

        let namespace_overrides = BTreeMap::from([
            ("r".to_string(), "global".to_string()),
            ("r-tensorflow".to_string(), "r".to_string()),
        ]);

        let mutex = MutexRule {
            // The underscore form never matches the injected `_r-mutex`, likely a latent bug.
            reserved_names: BTreeSet::from(["_r_mutex".to_string()]),
            families: BTreeMap::from([
                ("r-base".to_string(), "_r-mutex 1.* anacondar_1".to_string()),
                ("mro-base".to_string(), "_r-mutex 1.* mro_2".to_string()),
            ]),
        };

        // None of the r 3.1.2 builds carry the mutex. Builds 0-2 were the real
        // interpreter; later ones are metapackages with an unpinned r-base.
        let version_repairs = vec![VersionRepair {
            name: "r".to_string(),
            version: "3.1.2".to_string(),
            build_threshold: 3,
            mutex: "_r-mutex 1.* anacondar_1".to_string(),
            unpinned: "r-base".to_string(),
            pinned: "r-base 3.1.2".to_string(),
        }];

        RuleConfig {
            removals,
            revocations: BTreeMap::new(),
            external_dependencies,
            namespace_overrides,
            namespace_in_name: BTreeSet::new(),
            mutex,
            version_repairs,
            renames: Vec::new(),
        }
    }
}

const R_EXTERNAL_DEPENDENCIES: &[(&str, &str)] = &[
    ("blas", "global:blas"),
    ("bwidget", "global:bwidget"),
    ("bzip2", "global:bzip2"),
    ("cairo", "global:cairo"),
    ("cudatoolkit", "global:cudatoolkit"),
    ("curl", "global:curl"),
    ("cyrus-sasl", "global:cyrus-sasl"),
    ("expat", "global:expat"),
    ("fonts-anaconda", "global:fonts-anaconda"),
    ("fonts-continuum", "global:fonts-continuum"),
    ("freeglut", "global:freeglut"),
    ("freetype", "global:freetype"),
    ("gcc", "global:gcc"),
    ("gcc_linux-32", "global:gcc_linux-32"),
    ("gcc_linux-64", "global:gcc_linux-64"),
    ("geos", "global:geos"),
    ("gfortran_linux-32", "global:gfortran_linux-32"),
    ("gfortran_linux-64", "global:gfortran_linux-64"),
    ("glib", "global:glib"),
    ("gmp", "global:gmp"),
    ("gsl", "global:gsl"),
    ("gxx_linux-32", "global:gxx_linux-32"),
    ("gxx_linux-64", "global:gxx_linux-64"),
    ("icu", "global:icu"),
    ("ipython-notebook", "python:ipython-notebook"),
    ("jinja2", "python:jinja2"),
    ("jpeg", "global:jpeg"),
    ("jupyter", "python:jupyter"),
    ("krb5", "global:krb5"),
    ("libcurl", "global:libcurl"),
    ("libgcc", "global:libgcc"),
    ("libgcc-ng", "global:libgcc-ng"),
    ("libgdal", "global:libgdal"),
    ("libgfortran-ng", "global:libgfortran-ng"),
    ("libglu", "global:libglu"),
    ("libopenblas", "global:libopenblas"),
    ("libpng", "global:libpng"),
    ("libssh2", "global:libssh2"),
    ("libstdcxx-ng", "global:libstdcxx-ng"),
    ("libtiff", "global:libtiff"),
    ("libuuid", "global:libuuid"),
    ("libxgboost", "global:libxgboost"),
    ("libxml2", "global:libxml2"),
    ("libxslt", "global:libxslt"),
    ("make", "global:make"),
    ("mysql", "global:mysql"),
    ("ncurses", "global:ncurses"),
    ("notebook", "python:notebook"),
    ("openssl", "global:openssl"),
    ("pandoc", "global:pandoc"),
    ("pango", "global:pango"),
    ("pcre", "global:pcre"),
    ("proj4", "global:proj4"),
    ("python", "global:python"),
    ("qt", "global:qt"),
    ("readline", "global:readline"),
    ("singledispatch", "python:singledispatch"),
    ("six", "python:six"),
    ("tk", "global:tk"),
    ("tktable", "global:tktable"),
    ("udunits2", "global:udunits2"),
    ("unixodbc", "global:unixodbc"),
    ("xz", "global:xz"),
    ("zeromq", "global:zeromq"),
    ("zlib", "global:zlib"),
];

/// A removal/revocation entry with its compiled pattern.
#[derive(Debug, Clone)]
struct FilenameRule {
    raw: String,
    pattern: Pattern,
}

impl FilenameRule {
    /// Entries without wildcard syntax also name one exact filename.
    fn is_literal(&self) -> bool {
        !self.raw.contains(&['*', '?', '['][..])
    }
}

type FilenameTable = BTreeMap<SubdirKey, Vec<FilenameRule>>;

/// Validated rule tables. Immutable once built; shared read-only across subdirs.
#[derive(Debug, Clone)]
pub struct RuleTables {
    removals: FilenameTable,
    revocations: FilenameTable,
    pub external_dependencies: BTreeMap<String, String>,
    pub namespace_overrides: BTreeMap<String, String>,
    pub namespace_in_name: BTreeSet<String>,
    pub mutex: MutexRule,
    pub version_repairs: Vec<VersionRepair>,
    pub renames: Vec<DependencyRename>,
}

impl RuleTables {
    pub fn r_channel() -> Result<Self, RulesError> {
        Self::from_config(RuleConfig::r_channel())
    }

    pub fn from_config(config: RuleConfig) -> Result<Self, RulesError> {
        Ok(RuleTables {
            removals: compile_table("removals", config.removals)?,
            revocations: compile_table("revocations", config.revocations)?,
            external_dependencies: config.external_dependencies,
            namespace_overrides: config.namespace_overrides,
            namespace_in_name: config.namespace_in_name,
            mutex: config.mutex,
            version_repairs: config.version_repairs,
            renames: config.renames,
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RulesError> {
        let config: RuleConfig = serde_yaml::from_str(yaml)?;
        Self::from_config(config)
    }

    /// Back to the serialisable shape, e.g. for printing the effective tables.
    pub fn to_config(&self) -> RuleConfig {
        RuleConfig {
            removals: decompile_table(&self.removals),
            revocations: decompile_table(&self.revocations),
            external_dependencies: self.external_dependencies.clone(),
            namespace_overrides: self.namespace_overrides.clone(),
            namespace_in_name: self.namespace_in_name.clone(),
            mutex: self.mutex.clone(),
            version_repairs: self.version_repairs.clone(),
            renames: self.renames.clone(),
        }
    }

    /// Literal removal entries for `subdir` and `any`.
    pub fn exact_removals(&self, subdir: Subdir) -> impl Iterator<Item = &str> {
        rules_for(&self.removals, subdir)
            .filter(|rule| rule.is_literal())
            .map(|rule| rule.raw.as_str())
    }

    pub fn is_removed(&self, subdir: Subdir, filename: &str) -> bool {
        rules_for(&self.removals, subdir).any(|rule| rule.pattern.matches(filename))
    }

    pub fn is_revoked(&self, subdir: Subdir, filename: &str) -> bool {
        rules_for(&self.revocations, subdir).any(|rule| rule.pattern.matches(filename))
    }
}

fn rules_for(table: &FilenameTable, subdir: Subdir) -> impl Iterator<Item = &FilenameRule> {
    [SubdirKey::Subdir(subdir), SubdirKey::Any]
        .into_iter()
        .filter_map(move |key| table.get(&key))
        .flatten()
}

fn compile_table(
    table: &'static str,
    raw: BTreeMap<String, Vec<String>>,
) -> Result<FilenameTable, RulesError> {
    let mut compiled = FilenameTable::new();
    for (key, entries) in raw {
        let subdir_key: SubdirKey = key
            .parse()
            .map_err(|source| RulesError::UnknownSubdir { table, source })?;
        let rules = entries
            .into_iter()
            .map(|raw| match Pattern::new(&shell_pattern(&raw)) {
                Ok(pattern) => Ok(FilenameRule { raw, pattern }),
                Err(source) => Err(RulesError::InvalidPattern {
                    table,
                    key: key.clone(),
                    pattern: raw,
                    source,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(table, key = %subdir_key, entries = rules.len(), "Compiled rule table entry");
        compiled.entry(subdir_key).or_default().extend(rules);
    }
    Ok(compiled)
}

/// Rewrites `raw` into the `glob` dialect with plain shell matching: a run of
/// `*` is one wildcard and a `[` with no closing `]` is a literal bracket.
fn shell_pattern(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push('*');
                while chars.get(i + 1) == Some(&'*') {
                    i += 1;
                }
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.extend(&chars[i..=end]);
                    i = end;
                }
                None => out.push_str("[[]"),
            },
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// Index of the `]` closing the class opened at `start`. A `]` directly after
/// `[` or `[!` is a member, not the terminator.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    (j < chars.len()).then_some(j)
}

fn decompile_table(table: &FilenameTable) -> BTreeMap<String, Vec<String>> {
    table
        .iter()
        .map(|(key, rules)| {
            (
                key.to_string(),
                rules.iter().map(|rule| rule.raw.clone()).collect(),
            )
        })
        .collect()
}

/// Reads and validates a YAML rules file.
pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<RuleTables, RulesError> {
    let path_ref = path.as_ref();
    info!(rules_path = ?path_ref, "Loading rule tables from file");

    let content = fs::read_to_string(path_ref).map_err(|source| {
        error!(error = ?source, rules_path = ?path_ref, "Failed to read rules file");
        RulesError::Io {
            path: path_ref.to_path_buf(),
            source,
        }
    })?;

    let tables = RuleTables::from_yaml_str(&content).map_err(|e| {
        error!(error = %e, rules_path = ?path_ref, "Rejected rules file");
        e
    })?;
    info!(
        rules_path = ?path_ref,
        external_dependencies = tables.external_dependencies.len(),
        namespace_overrides = tables.namespace_overrides.len(),
        "Loaded rule tables"
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_are_valid() {
        let tables = RuleTables::r_channel().expect("built-in tables compile");
        assert_eq!(tables.external_dependencies.len(), 65);
        assert_eq!(
            tables.external_dependencies.get("six").map(String::as_str),
            Some("python:six")
        );
        assert_eq!(
            tables.exact_removals(Subdir::Linux64).collect::<Vec<_>>(),
            vec!["r-nloptr-1.0.4-r3.2.2_1.tar.bz2"]
        );
        assert_eq!(tables.exact_removals(Subdir::Osx64).count(), 0);
    }

    #[test]
    fn unknown_subdir_key_is_rejected_at_load() {
        let yaml = "removals:\n  solaris-64:\n    - foo-1.0-0.tar.bz2\n";
        let err = RuleTables::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            RulesError::UnknownSubdir { table: "removals", .. }
        ));
        assert!(err.to_string().contains("solaris-64"));
    }

    #[test]
    fn repeated_stars_match_like_one() {
        let yaml = "revocations:\n  any:\n    - \"r-**.tar.bz2\"\n";
        let tables = RuleTables::from_yaml_str(yaml).unwrap();
        assert!(tables.is_revoked(Subdir::Linux64, "r-foo-1.0-0.tar.bz2"));
        assert!(!tables.is_revoked(Subdir::Linux64, "py-foo-1.0-0.tar.bz2"));
    }

    #[test]
    fn unclosed_bracket_matches_literally() {
        let yaml = "removals:\n  linux-64:\n    - \"r-foo-[1*\"\n";
        let tables = RuleTables::from_yaml_str(yaml).unwrap();
        assert!(tables.is_removed(Subdir::Linux64, "r-foo-[1.0"));
        assert!(!tables.is_removed(Subdir::Linux64, "r-foo-1.0"));
        assert_eq!(tables.exact_removals(Subdir::Linux64).count(), 0);
    }

    #[test]
    fn shell_pattern_keeps_closed_classes() {
        assert_eq!(shell_pattern("r-[ab]ad-*"), "r-[ab]ad-*");
        assert_eq!(shell_pattern("a***b"), "a*b");
        assert_eq!(shell_pattern("x[]y"), "x[[]]y");
        assert_eq!(shell_pattern("x[!]]y"), "x[!]]y");
    }

    #[test]
    fn unknown_table_is_rejected() {
        assert!(RuleTables::from_yaml_str("removal: {}\n").is_err());
    }

    #[test]
    fn patterns_apply_from_subdir_and_any() {
        let yaml = r#"
revocations:
  any:
    - "r-old-*"
  win-64:
    - "r-win-?.0-0.tar.bz2"
removals:
  linux-64:
    - "r-[ab]ad-1.0-0.tar.bz2"
    - exact-1.0-0.tar.bz2
"#;
        let tables = RuleTables::from_yaml_str(yaml).unwrap();
        assert!(tables.is_revoked(Subdir::Linux64, "r-old-1.0-0.tar.bz2"));
        assert!(tables.is_revoked(Subdir::Win64, "r-win-2.0-0.tar.bz2"));
        assert!(!tables.is_revoked(Subdir::Linux64, "r-win-2.0-0.tar.bz2"));
        assert!(!tables.is_revoked(Subdir::Win64, "r-win-10.0-0.tar.bz2"));
        assert!(tables.is_removed(Subdir::Linux64, "r-bad-1.0-0.tar.bz2"));
        assert!(!tables.is_removed(Subdir::Linux64, "r-cad-1.0-0.tar.bz2"));
        assert_eq!(
            tables.exact_removals(Subdir::Linux64).collect::<Vec<_>>(),
            vec!["exact-1.0-0.tar.bz2"]
        );
    }

    #[test]
    fn config_round_trips_through_yaml() {
        let config = RuleConfig::r_channel();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let tables = RuleTables::from_yaml_str(&yaml).unwrap();
        assert_eq!(tables.to_config(), config);
    }
}
