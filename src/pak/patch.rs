#![forbid(unsafe_code)]

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pak::archive::PakArchive;
use crate::pak::content::{ContentKind, Decoded};
use crate::pak::error::{PakError, PakResult};

/// A content rewrite applied to every text resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRule {
    /// Regular expression matched against the decoded text.
    pub pattern: String,
    /// Replacement text; `$1`/`${name}` expand capture groups.
    pub replacement: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl PatchRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            case_insensitive: false,
        }
    }
}

/// Compiled rules, ready to scan an archive.
#[derive(Debug)]
pub struct PatchSet {
    rules: Vec<(PatchRule, Regex)>,
    stop_when_all_matched: bool,
}

/// How one resource was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedResource {
    pub id: u16,
    pub gzipped: bool,
    /// (rule index, replacements made)
    pub hits: Vec<(usize, usize)>,
}

#[derive(Debug, Default)]
pub struct PatchOutcome {
    /// New stored bytes per resource id, framing already re-applied.
    pub modifications: HashMap<u16, Vec<u8>>,
    pub patched: Vec<PatchedResource>,
    /// Indices of rules that matched nothing.
    pub unmatched: Vec<usize>,
    /// Gzip resources that failed to inflate and were left alone.
    pub skipped: Vec<u16>,
}

impl PatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

impl PatchSet {
    pub fn compile(rules: &[PatchRule]) -> PakResult<Self> {
        let compiled = rules
            .iter()
            .map(|r| {
                RegexBuilder::new(&r.pattern)
                    .case_insensitive(r.case_insensitive)
                    .build()
                    .map(|re| (r.clone(), re))
                    .map_err(|e| PakError::Pattern {
                        pattern: r.pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<PakResult<Vec<_>>>()?;
        Ok(Self {
            rules: compiled,
            stop_when_all_matched: false,
        })
    }

    /// Stop scanning once every rule has matched at least one resource.
    pub fn stop_when_all_matched(mut self, yes: bool) -> Self {
        self.stop_when_all_matched = yes;
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = &PatchRule> {
        self.rules.iter().map(|(r, _)| r)
    }

    /// Scans text resources in table order and collects the rewritten ones.
    /// The archive itself is untouched; feed `modifications` to
    /// [`PakArchive::apply`] or [`PakArchive::write_with_modifications`].
    pub fn scan(&self, archive: &PakArchive) -> PakResult<PatchOutcome> {
        let mut out = PatchOutcome::default();
        let mut matched = vec![false; self.rules.len()];

        for id in archive.ids() {
            if self.stop_when_all_matched && !matched.is_empty() && matched.iter().all(|m| *m) {
                debug!(id, "all rules matched, stopping scan");
                break;
            }

            let stored = archive.get(id).ok_or(PakError::UnknownResource(id))?;
            let decoded = match Decoded::from_resource(id, stored) {
                Ok(d) => d,
                Err(e @ PakError::Decompress { .. }) => {
                    warn!(error = %e, "skipping resource");
                    out.skipped.push(id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if decoded.kind() != ContentKind::Text {
                continue;
            }
            let Ok(text) = std::str::from_utf8(&decoded.content) else {
                continue;
            };

            let mut current = text.to_string();
            let mut hits = Vec::new();
            for (i, (rule, re)) in self.rules.iter().enumerate() {
                let count = re.find_iter(&current).count();
                if count == 0 {
                    continue;
                }
                current = re.replace_all(&current, rule.replacement.as_str()).into_owned();
                hits.push((i, count));
                matched[i] = true;
            }

            if hits.is_empty() || current == text {
                continue;
            }

            let encoded = decoded.encode(current.as_bytes())?;
            debug!(id, gzipped = decoded.gzipped, rules = hits.len(), "patched resource");
            out.modifications.insert(id, encoded);
            out.patched.push(PatchedResource {
                id,
                gzipped: decoded.gzipped,
                hits,
            });
        }

        out.unmatched = matched
            .iter()
            .enumerate()
            .filter(|(_, m)| !**m)
            .map(|(i, _)| i)
            .collect();
        Ok(out)
    }

    /// Scans and applies in one step.
    pub fn apply(&self, archive: &mut PakArchive) -> PakResult<PatchOutcome> {
        let outcome = self.scan(archive)?;
        archive.apply(&outcome.modifications)?;
        Ok(outcome)
    }
}
