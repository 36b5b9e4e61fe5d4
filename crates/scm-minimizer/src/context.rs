//! Read-only view of the engine handed to invariants.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use scm_core::{Forest, Language, NodeInformationProvider, UnitId};

use crate::cutter::Cutter;
use crate::error::{MinimizerError, Result};

/// What an invariant may see of the current trial.
///
/// The context borrows the engine for the duration of one call; invariants
/// must not keep anything from it.
pub struct InvariantContext<'a> {
    cutters: &'a [Cutter],
    forest: &'a Forest,
    language: &'a dyn Language,
}

impl<'a> InvariantContext<'a> {
    pub(crate) fn new(cutters: &'a [Cutter], forest: &'a Forest, language: &'a dyn Language) -> Self {
        Self {
            cutters,
            forest,
            language,
        }
    }

    /// Returns true if every unit's scratch text parses.
    pub fn all_inputs_are_parseable(&self) -> bool {
        self.cutters.iter().all(Cutter::is_scratch_parseable)
    }

    pub fn node_information(&self) -> &'a dyn NodeInformationProvider {
        self.language.node_information()
    }

    /// The forest of the last commit (not of the trial).
    pub fn forest(&self) -> &'a Forest {
        self.forest
    }

    pub fn unit_count(&self) -> usize {
        self.cutters.len()
    }

    pub fn units(&self) -> impl Iterator<Item = UnitId> + 'a {
        self.cutters.iter().map(Cutter::unit)
    }

    /// The trial text of `unit`.
    pub fn scratch_text(&self, unit: UnitId) -> Option<&'a str> {
        self.cutters.get(unit.index()).map(Cutter::scratch_text)
    }

    /// The last committed text of `unit`.
    pub fn committed_text(&self, unit: UnitId) -> Option<&'a str> {
        self.cutters.get(unit.index()).map(Cutter::committed_text)
    }

    /// The working file of `unit`, which holds the committed text.
    pub fn working_path(&self, unit: UnitId) -> Option<&'a Path> {
        self.cutters.get(unit.index()).map(Cutter::working_path)
    }

    /// Writes every unit's scratch text into `dir`, keeping the working file
    /// names. A name already used by an earlier unit goes into a
    /// per-unit subdirectory instead. Returns the written paths in unit order.
    pub async fn materialize_scratch(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut used = HashSet::new();
        let mut paths = Vec::with_capacity(self.cutters.len());
        for cutter in self.cutters {
            let name = cutter.file_name();
            let path = if used.insert(name.clone()) {
                dir.join(&name)
            } else {
                let sub = dir.join(cutter.unit().to_string());
                tokio::fs::create_dir_all(&sub)
                    .await
                    .map_err(|e| MinimizerError::io(&sub, e))?;
                sub.join(&name)
            };
            cutter.materialize_scratch(&path).await?;
            paths.push(path);
        }
        Ok(paths)
    }
}
