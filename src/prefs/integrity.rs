#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use serde_json::Value;
use tracing::{info, warn};

use crate::fsutil::{stage, write_atomic};
use crate::prefs::error::PrefsResult;
use crate::prefs::mac::MacCalculator;
use crate::prefs::store::{FileMacStore, MacStore, RegistryMacStore};
use crate::prefs::tree::{build_tree, MacTree};
use crate::prefs::value::{lookup, set_path, PrefValue};

/// A complete set of codes for one trust domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacSet {
    pub macs: MacTree,
    pub super_mac: String,
}

/// Current value of `path`: the first source that has it, else null.
pub fn current_value(sources: &[&Value], path: &str) -> PrefValue {
    sources
        .iter()
        .find_map(|doc| lookup(doc, path))
        .map(PrefValue::from)
        .unwrap_or(PrefValue::Null)
}

/// Recomputes the code of every tracked path against its live value and then
/// the super code over the finished tree. Paths with no value get the code
/// of null instead of being dropped.
pub fn recalculate<'a, I>(
    sources: &[&Value],
    tracked_paths: I,
    calculator: &MacCalculator,
) -> PrefsResult<MacSet>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut flat = BTreeMap::new();
    for path in tracked_paths {
        let value = current_value(sources, path);
        flat.insert(path.to_owned(), calculator.compute_code(path, &value));
    }
    let macs = build_tree(&flat)?;
    let super_mac = calculator.compute_super_code(&macs.to_value());
    Ok(MacSet { macs, super_mac })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacCheck {
    pub path: String,
    pub expected: String,
    pub actual: String,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub domain: String,
    pub checks: Vec<MacCheck>,
    /// `None` when the store records no super code.
    pub super_mac: Option<MacCheck>,
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        self.checks.iter().all(|c| c.valid) && self.super_mac.as_ref().map_or(true, |c| c.valid)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MacCheck> {
        self.checks.iter().filter(|c| !c.valid)
    }
}

/// Compares every stored code with the one computed from the live values.
pub fn verify(sources: &[&Value], stored: &dyn MacStore, calculator: &MacCalculator) -> VerifyReport {
    let checks: Vec<MacCheck> = stored
        .macs()
        .flatten()
        .into_iter()
        .map(|(path, expected)| {
            let actual = calculator.compute_code(&path, &current_value(sources, &path));
            let valid = actual.eq_ignore_ascii_case(&expected);
            if !valid {
                warn!(domain = calculator.domain(), %path, "mac mismatch");
            }
            MacCheck {
                path,
                expected,
                actual,
                valid,
            }
        })
        .collect();

    let super_mac = stored.super_mac().map(|expected| {
        let actual = calculator.compute_super_code(&stored.macs().to_value());
        let valid = actual.eq_ignore_ascii_case(expected);
        if !valid {
            warn!(domain = calculator.domain(), "super mac mismatch");
        }
        MacCheck {
            path: String::new(),
            expected: expected.to_owned(),
            actual,
            valid,
        }
    });

    VerifyReport {
        domain: calculator.domain().to_owned(),
        checks,
        super_mac,
    }
}

/// A preferences file and its registry twin, kept in agreement.
#[derive(Debug)]
pub struct ProtectedPrefs {
    file: FileMacStore,
    registry: RegistryMacStore,
    file_calc: MacCalculator,
    registry_calc: MacCalculator,
    tracked: BTreeSet<String>,
}

impl ProtectedPrefs {
    pub fn new(
        file: FileMacStore,
        registry: RegistryMacStore,
        file_calc: MacCalculator,
        registry_calc: MacCalculator,
    ) -> Self {
        Self {
            file,
            registry,
            file_calc,
            registry_calc,
            tracked: BTreeSet::new(),
        }
    }

    /// Paths to keep codes for even if neither store knows them yet.
    pub fn with_tracked_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn file(&self) -> &FileMacStore {
        &self.file
    }

    pub fn registry(&self) -> &RegistryMacStore {
        &self.registry
    }

    pub fn value(&self, path: &str) -> PrefValue {
        current_value(&[self.file.document()], path)
    }

    /// Every path either store has a code for, plus the configured ones.
    pub fn tracked_paths(&self) -> BTreeSet<String> {
        let mut paths = self.tracked.clone();
        paths.extend(self.file.tracked_paths());
        paths.extend(self.registry.tracked_paths());
        paths
    }

    pub fn verify(&self) -> [VerifyReport; 2] {
        let sources = [self.file.document()];
        [
            verify(&sources, &self.file, &self.file_calc),
            verify(&sources, &self.registry, &self.registry_calc),
        ]
    }

    /// Applies `changes`, recomputes both domains over every tracked path and
    /// writes both stores. Returns the number of codes per domain.
    ///
    /// Both stores are encoded and staged next to their targets before either
    /// target is replaced, and `self` is only updated once both are on disk.
    /// If the second rename fails the preferences file is put back.
    pub fn commit(&mut self, changes: &BTreeMap<String, Value>) -> PrefsResult<usize> {
        let mut document = self.file.document().clone();
        for (path, value) in changes {
            set_path(&mut document, path, value.clone());
        }

        let mut paths = self.tracked_paths();
        paths.extend(changes.keys().cloned());

        let sources = [&document];
        let file_set = recalculate(&sources, paths.iter().map(String::as_str), &self.file_calc)?;
        let registry_set =
            recalculate(&sources, paths.iter().map(String::as_str), &self.registry_calc)?;

        let mut file = self.file.clone();
        file.set_document(document);
        file.store(file_set);
        let mut registry = self.registry.clone();
        registry.store(registry_set);

        let file_stage = stage(file.path(), &file.encode()?)?;
        let registry_stage = stage(registry.path(), &registry.encode()?)?;

        let previous = fs::read(file_stage.target()).ok();
        file_stage.commit()?;
        if let Err(e) = registry_stage.commit() {
            match previous {
                Some(bytes) => {
                    if let Err(restore) = write_atomic(file.path(), &bytes) {
                        warn!(
                            error = %restore,
                            path = %file.path().display(),
                            "could not put preferences file back"
                        );
                    }
                }
                None => {
                    let _ = fs::remove_file(file.path());
                }
            }
            return Err(e.into());
        }

        self.file = file;
        self.registry = registry;

        info!(
            changed = changes.len(),
            tracked = paths.len(),
            "recalculated preference codes"
        );
        Ok(paths.len())
    }
}
