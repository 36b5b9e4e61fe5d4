//! Per-file transactional state.
//!
//! A [`Cutter`] owns one working copy. It keeps the last committed text
//! (always parseable, always what is on disk) and a scratch text that holds
//! the current trial. Trials are produced in memory; the disk is touched only
//! when a trial is committed, through a staged write that is renamed over the
//! working file.
//!
//! The cutter never decides on its own to commit or roll back. The
//! [`Minimizer`](crate::Minimizer) drives every cutter of a run as a single
//! transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scm_core::{Language, NodeIndex, ParseError, Tree, UnitId};
use tracing::{debug, trace};

use crate::error::{MinimizerError, Result};

/// Whether the scratch text differs from the committed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutterState {
    /// Scratch equals committed.
    Clean,
    /// Scratch holds an unvalidated trial.
    Trial,
}

/// A scratch text written next to its working file, waiting to be installed.
#[derive(Debug)]
pub struct StagedWrite {
    staged: PathBuf,
    target: PathBuf,
}

impl StagedWrite {
    /// Removes the staged file without touching the working file.
    pub async fn discard(self) {
        if let Err(err) = tokio::fs::remove_file(&self.staged).await {
            debug!(path = %self.staged.display(), error = %err, "Could not remove staged file");
        }
    }
}

/// Transactional wrapper around one source file.
pub struct Cutter {
    unit: UnitId,
    working: PathBuf,
    language: Arc<dyn Language>,
    committed: String,
    scratch: String,
    tree: Arc<Tree>,
    state: CutterState,
    staging_suffix: String,
}

impl std::fmt::Debug for Cutter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cutter")
            .field("unit", &self.unit)
            .field("working", &self.working)
            .field("language", &self.language.name())
            .field("committed_bytes", &self.committed.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Cutter {
    /// Loads the working file and establishes it as the committed baseline.
    ///
    /// The baseline is not checked against any invariant, but it must parse.
    pub async fn open(
        unit: UnitId,
        working: impl Into<PathBuf>,
        language: Arc<dyn Language>,
        staging_suffix: impl Into<String>,
    ) -> Result<Self> {
        let working = working.into();
        let committed = tokio::fs::read_to_string(&working)
            .await
            .map_err(|e| MinimizerError::io(&working, e))?;
        let tree = language
            .parse(&committed)
            .map_err(|source| MinimizerError::BaselineUnparseable {
                path: working.clone(),
                source,
            })?;

        debug!(
            %unit,
            path = %working.display(),
            bytes = committed.len(),
            nodes = tree.len(),
            "Opened working copy"
        );

        Ok(Self {
            unit,
            working,
            language,
            scratch: committed.clone(),
            committed,
            tree: Arc::new(tree),
            state: CutterState::Clean,
            staging_suffix: staging_suffix.into(),
        })
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn working_path(&self) -> &Path {
        &self.working
    }

    pub fn state(&self) -> CutterState {
        self.state
    }

    pub fn committed_text(&self) -> &str {
        &self.committed
    }

    pub fn scratch_text(&self) -> &str {
        &self.scratch
    }

    /// The tree of the committed text; this cutter's share of the forest.
    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    /// Size of the committed text in bytes.
    pub fn size_bytes(&self) -> usize {
        self.committed.len()
    }

    /// Node indices of the committed tree.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.tree.indices()
    }

    /// File name used when materializing the scratch text for external tools.
    pub fn file_name(&self) -> String {
        self.working
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.txt", self.unit))
    }

    /// Scratch := committed text with `nodes` deleted.
    pub fn excise(&mut self, nodes: &[NodeIndex]) {
        self.scratch = self.language.excise(&self.committed, &self.tree, nodes);
        self.state = CutterState::Trial;
        trace!(unit = %self.unit, nodes = nodes.len(), bytes = self.scratch.len(), "Excised nodes");
    }

    /// Scratch := committed text with normalised layout.
    pub fn reformat(&mut self) {
        self.scratch = self.language.reformat(&self.committed);
        self.state = CutterState::Trial;
    }

    /// Scratch := committed text without blank lines.
    pub fn strip_blank_lines(&mut self) {
        self.scratch = self.language.strip_blank_lines(&self.committed);
        self.state = CutterState::Trial;
    }

    /// Parses the scratch text without changing any state.
    pub fn try_parse(&self) -> std::result::Result<Tree, ParseError> {
        self.language.parse(&self.scratch)
    }

    /// Returns true if the scratch text parses.
    pub fn is_scratch_parseable(&self) -> bool {
        self.try_parse().is_ok()
    }

    /// Discards the trial.
    pub fn rollback(&mut self) {
        if self.state == CutterState::Trial {
            self.scratch.clone_from(&self.committed);
            self.state = CutterState::Clean;
        }
    }

    /// Writes the scratch text next to the working file. The working file is
    /// left untouched until [`promote`](Self::promote).
    pub async fn stage(&self) -> Result<StagedWrite> {
        let staged = self.staged_path();
        tokio::fs::write(&staged, self.scratch.as_bytes())
            .await
            .map_err(|e| MinimizerError::io(&staged, e))?;
        Ok(StagedWrite {
            staged,
            target: self.working.clone(),
        })
    }

    /// Installs a staged write and makes the scratch text the committed text.
    ///
    /// `tree` must be the parse of the scratch text; without one the previous
    /// tree is kept (only the unchecked escape hatch does that).
    pub async fn promote(&mut self, staged: StagedWrite, tree: Option<Tree>) -> Result<()> {
        debug_assert_eq!(staged.target, self.working);
        tokio::fs::rename(&staged.staged, &staged.target)
            .await
            .map_err(|e| MinimizerError::io(&staged.target, e))?;

        self.committed.clone_from(&self.scratch);
        self.state = CutterState::Clean;
        if let Some(tree) = tree {
            self.tree = Arc::new(tree);
        }
        Ok(())
    }

    /// Stages and promotes in one step, for single-unit use.
    pub async fn commit(&mut self, tree: Tree) -> Result<()> {
        let staged = self.stage().await?;
        self.promote(staged, Some(tree)).await
    }

    /// Writes the scratch text to `path`, for collaborators that need a file.
    pub async fn materialize_scratch(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.scratch.as_bytes())
            .await
            .map_err(|e| MinimizerError::io(path, e))
    }

    fn staged_path(&self) -> PathBuf {
        let name = format!("{}.{}", self.file_name(), self.staging_suffix);
        self.working.with_file_name(name)
    }
}
