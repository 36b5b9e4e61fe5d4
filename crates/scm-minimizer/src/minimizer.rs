//! The orchestrator: commit protocol and pass loop.
//!
//! ```text
//! Init -> Cleanup(initial) -> {Pass}* -> Cleanup(final) -> BlankLineStrip -> Rollback/Close
//! ```
//!
//! Every change goes through [`Session::attempt_commit`], which treats all
//! cutters as one transaction: the invariant is checked over the trial
//! texts, every trial text is re-parsed, every trial is staged on disk, and
//! only then is anything promoted. A refusal at any step leaves every
//! committed text and every working file exactly as it was.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scm_core::{Forest, Generation, Language, NodeInformationProvider, NodeSet, Partition, UnitId};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::{FileMapping, MinimizerConfig};
use crate::context::InvariantContext;
use crate::control::{CommitOutcome, PassControl, Rejection};
use crate::cutter::{Cutter, StagedWrite};
use crate::error::{MinimizerError, Result};
use crate::result::{Checkpoint, MetricsSnapshot, MinimizationReport, MinimizationStats, ProgressEntry};
use crate::traits::{Invariant, MinimizerOperations, Strategy};

/// Engine state shared by the commit protocol and the strategy-facing
/// operations. The forest has a single writer: [`Session::replace_forest`].
struct Session {
    language: Arc<dyn Language>,
    invariant: Box<dyn Invariant>,
    cutters: Vec<Cutter>,
    forest: Arc<Forest>,
    check_timeout: Option<Duration>,
    stats: MinimizationStats,
}

impl Session {
    fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes: self.cutters.iter().map(Cutter::size_bytes).sum(),
            nodes: self.forest.node_count(),
        }
    }

    /// Ends any pending trial. Every operation starts here so that at most
    /// one trial exists at a time.
    fn rollback_all(&mut self) {
        for cutter in &mut self.cutters {
            cutter.rollback();
        }
    }

    fn replace_forest(&mut self) {
        let trees = self.cutters.iter().map(|c| Arc::clone(c.tree())).collect();
        let generation = self.forest.generation().next();
        self.forest = Arc::new(Forest::new(generation, trees));
    }

    async fn initialize_invariant(&mut self) -> Result<()> {
        let ctx = InvariantContext::new(&self.cutters, &self.forest, self.language.as_ref());
        self.invariant.initialize(&ctx).await
    }

    /// Evaluates the invariant; `None` means the check timed out.
    async fn check_invariant(&mut self) -> Result<Option<bool>> {
        self.stats.checks_performed += 1;
        let ctx = InvariantContext::new(&self.cutters, &self.forest, self.language.as_ref());
        let check = self.invariant.check_is_satisfied(&ctx);
        match self.check_timeout {
            Some(limit) => match timeout(limit, check).await {
                Ok(result) => result.map(Some),
                Err(_) => {
                    warn!(timeout = ?limit, "Invariant check timed out");
                    Ok(None)
                }
            },
            None => check.await.map(Some),
        }
    }

    fn reject(&mut self, rejection: Rejection) -> CommitOutcome {
        self.stats.record_rejection(&rejection);
        debug!(reason = %rejection, "Trial rejected");
        CommitOutcome::Rejected(rejection)
    }

    /// Checks, parses, stages and promotes the current trial of every cutter.
    ///
    /// On rejection the cutters stay in their trial state; rolling back is up
    /// to the next operation.
    async fn attempt_commit(&mut self) -> Result<CommitOutcome> {
        match self.check_invariant().await? {
            None => return Ok(self.reject(Rejection::TimedOut)),
            Some(false) => return Ok(self.reject(Rejection::InvariantUnsatisfied)),
            Some(true) => {}
        }

        let mut trees = Vec::with_capacity(self.cutters.len());
        for cutter in &self.cutters {
            match cutter.try_parse() {
                Ok(tree) => trees.push(tree),
                Err(error) => {
                    let unit = cutter.unit();
                    return Ok(self.reject(Rejection::Unparseable { unit, error }));
                }
            }
        }

        let staged = self.stage_all().await?;

        for ((cutter, write), tree) in self.cutters.iter_mut().zip(staged).zip(trees) {
            cutter.promote(write, Some(tree)).await?;
        }
        self.replace_forest();
        self.stats.commits += 1;

        let metrics = self.metrics();
        debug!(
            generation = %self.forest.generation(),
            bytes = metrics.bytes,
            nodes = metrics.nodes,
            "Committed"
        );
        Ok(CommitOutcome::Committed)
    }

    /// Writes every scratch text next to its working file. If any write
    /// fails the ones already staged are removed again.
    async fn stage_all(&self) -> Result<Vec<StagedWrite>> {
        let mut staged = Vec::with_capacity(self.cutters.len());
        for cutter in &self.cutters {
            match cutter.stage().await {
                Ok(write) => staged.push(write),
                Err(err) => {
                    for write in staged {
                        write.discard().await;
                    }
                    return Err(err);
                }
            }
        }
        Ok(staged)
    }

    /// Reformats every unit and tries to commit the result.
    async fn cleanup(&mut self) -> Result<CommitOutcome> {
        self.rollback_all();
        for cutter in &mut self.cutters {
            cutter.reformat();
        }
        self.attempt_commit().await
    }

    /// Splits `nodes` by unit against the current forest, warning about
    /// references that do not belong to it.
    fn partition(&mut self, nodes: &NodeSet) -> Partition {
        let partition = self.forest.partition(nodes);
        if !partition.unknown.is_empty() {
            self.stats.unknown_node_references += partition.unknown.len();
            warn!(
                unknown = partition.unknown.len(),
                generation = %self.forest.generation(),
                first = %partition.unknown[0],
                "Strategy tries to remove unknown nodes"
            );
        }
        partition
    }
}

#[async_trait]
impl MinimizerOperations for Session {
    async fn try_remove_nodes(&mut self, nodes: &NodeSet) -> Result<PassControl> {
        self.rollback_all();
        let partition = self.partition(nodes);
        if partition.matched() == 0 {
            return Ok(PassControl::Failed(Rejection::NothingToRemove));
        }

        for (cutter, indices) in self.cutters.iter_mut().zip(&partition.per_unit) {
            if !indices.is_empty() {
                cutter.excise(indices);
            }
        }
        trace!(requested = nodes.len(), "Trying removal");
        Ok(self.attempt_commit().await?.into_pass_control())
    }

    async fn try_cleanup(&mut self) -> Result<PassControl> {
        Ok(self.cleanup().await?.into_pass_control())
    }

    async fn force_remove_nodes_and_exit(&mut self, nodes: &NodeSet) -> Result<PassControl> {
        self.rollback_all();
        let partition = self.partition(nodes);
        for (cutter, indices) in self.cutters.iter_mut().zip(&partition.per_unit) {
            cutter.excise(indices);
        }

        let staged = self.stage_all().await?;

        for (cutter, write) in self.cutters.iter_mut().zip(staged) {
            let tree = match cutter.try_parse() {
                Ok(tree) => Some(tree),
                Err(error) => {
                    debug!(unit = %cutter.unit(), %error, "Forced text does not parse, keeping old tree");
                    None
                }
            };
            cutter.promote(write, tree).await?;
        }
        self.replace_forest();
        self.stats.commits += 1;
        self.stats.forced_exit = true;
        info!(
            removed = partition.matched(),
            "Forced removal committed without checks; ending minimization"
        );
        Ok(PassControl::Stop)
    }

    fn forest(&self) -> Arc<Forest> {
        Arc::clone(&self.forest)
    }

    fn node_information(&self) -> &dyn NodeInformationProvider {
        self.language.node_information()
    }
}

/// Minimizes a set of source files in place.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use scm_core::StatementLanguage;
/// use scm_minimizer::{FileMapping, GreedyStrategy, Minimizer, MinimizerConfig, ParseableInvariant};
///
/// let minimizer = Minimizer::new(
///     MinimizerConfig::default(),
///     vec![FileMapping::new("crash.stmt", "crash.min.stmt")],
///     Arc::new(StatementLanguage),
///     Box::new(ParseableInvariant::new()),
///     Box::new(GreedyStrategy::new()),
/// )
/// .await?;
/// let report = minimizer.run().await?;
/// println!("{}", report);
/// ```
pub struct Minimizer {
    config: MinimizerConfig,
    strategy: Box<dyn Strategy>,
    session: Session,
}

impl Minimizer {
    /// Copies every input over its working file and loads the working files
    /// as the committed baseline.
    pub async fn new(
        config: MinimizerConfig,
        files: Vec<FileMapping>,
        language: Arc<dyn Language>,
        invariant: Box<dyn Invariant>,
        strategy: Box<dyn Strategy>,
    ) -> Result<Self> {
        config.validate()?;
        if files.is_empty() {
            return Err(MinimizerError::NoInputs);
        }
        FileMapping::check_distinct(&files)?;

        let mut cutters = Vec::with_capacity(files.len());
        for (i, mapping) in files.iter().enumerate() {
            tokio::fs::copy(&mapping.input, &mapping.output)
                .await
                .map_err(|e| MinimizerError::io(&mapping.input, e))?;
            let cutter = Cutter::open(
                UnitId(i),
                &mapping.output,
                Arc::clone(&language),
                config.staging_suffix.clone(),
            )
            .await?;
            cutters.push(cutter);
        }

        let trees = cutters.iter().map(|c| Arc::clone(c.tree())).collect();
        let forest = Arc::new(Forest::new(Generation(0), trees));

        Ok(Self {
            session: Session {
                language,
                invariant,
                cutters,
                forest,
                check_timeout: config.check_timeout(),
                stats: MinimizationStats::new(),
            },
            strategy,
            config,
        })
    }

    pub fn config(&self) -> &MinimizerConfig {
        &self.config
    }

    /// The forest of the last commit.
    pub fn forest(&self) -> Arc<Forest> {
        Arc::clone(&self.session.forest)
    }

    pub fn cutters(&self) -> &[Cutter] {
        &self.session.cutters
    }

    /// Runs the minimization to completion.
    ///
    /// On error the working files still hold the last committed state.
    pub async fn run(mut self) -> Result<MinimizationReport> {
        let start = Instant::now();
        let mut report = MinimizationReport::default();

        self.strategy.initialize(&mut self.session).await?;
        self.session.initialize_invariant().await?;

        let original = self.session.metrics();
        info!(
            units = self.session.cutters.len(),
            bytes = original.bytes,
            nodes = original.nodes,
            strategy = self.strategy.name(),
            invariant = self.session.invariant.name(),
            "Starting minimization"
        );
        self.record(&mut report, Checkpoint::Original);

        self.session.cleanup().await?;
        self.record(&mut report, Checkpoint::InitialCleanup);

        let mut pass = 0;
        let mut cleanup_passes = 0;
        loop {
            if let Some(max) = self.config.max_passes {
                if pass >= max {
                    self.session
                        .stats
                        .record_early_termination("pass limit reached");
                    info!(max_passes = max, "Pass limit reached");
                    break;
                }
            }

            pass += 1;
            let cleanup = pass % self.config.cleanup_interval == 0;
            let control = if cleanup {
                cleanup_passes += 1;
                self.session.cleanup().await?.into_pass_control()
            } else {
                self.session.rollback_all();
                let forest = Arc::clone(&self.session.forest);
                self.strategy
                    .perform_single_pass(forest, &mut self.session)
                    .await?
            };
            self.record(
                &mut report,
                Checkpoint::Pass {
                    number: pass,
                    cleanup,
                },
            );

            match control {
                PassControl::Continue => {}
                PassControl::Stop => break,
                PassControl::Failed(_) if cleanup => {}
                PassControl::Failed(reason) => {
                    info!(pass, %reason, "No further reduction");
                    break;
                }
            }
        }

        self.finalize(&mut report).await?;

        let mut stats = std::mem::take(&mut self.session.stats);
        stats.original = original;
        stats.minimized = self.session.metrics();
        stats.passes = pass;
        stats.cleanup_passes = cleanup_passes;
        stats.duration = Some(start.elapsed());
        info!(
            bytes = stats.minimized.bytes,
            nodes = stats.minimized.nodes,
            reduction_percent = format!("{:.1}%", stats.byte_reduction_percentage()),
            passes = stats.passes,
            commits = stats.commits,
            checks = stats.checks_performed,
            duration = ?stats.duration,
            "Minimization complete"
        );
        report.stats = stats;
        Ok(report)
    }

    async fn finalize(&mut self, report: &mut MinimizationReport) -> Result<()> {
        self.session.cleanup().await?;
        self.record(report, Checkpoint::FinalCleanup);

        for i in 0..self.session.cutters.len() {
            self.session.rollback_all();
            self.session.cutters[i].strip_blank_lines();
            if !self.session.attempt_commit().await?.is_committed() {
                debug!(unit = i, "Blank-line strip kept back");
            }
        }
        self.record(report, Checkpoint::BlankLineCleanup);

        self.session.rollback_all();

        let mut out = Vec::new();
        self.session
            .invariant
            .print_statistics(&mut out)
            .map_err(|e| MinimizerError::Invariant(e.to_string()))?;
        report.invariant_statistics = String::from_utf8_lossy(&out).into_owned();

        out.clear();
        self.strategy
            .print_statistics(&mut out)
            .map_err(|e| MinimizerError::Strategy(e.to_string()))?;
        report.strategy_statistics = String::from_utf8_lossy(&out).into_owned();
        Ok(())
    }

    fn record(&self, report: &mut MinimizationReport, checkpoint: Checkpoint) {
        let metrics = self.session.metrics();
        info!(bytes = metrics.bytes, nodes = metrics.nodes, "{}", checkpoint);
        report.progress.push(ProgressEntry {
            checkpoint,
            metrics,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use scm_core::{NodeIndex, StatementLanguage};

    use crate::cutter::CutterState;
    use crate::invariants::FnInvariant;
    use crate::strategies::GreedyStrategy;

    fn write(dir: &Path, name: &str, text: &str) -> FileMapping {
        let input = dir.join(name);
        std::fs::write(&input, text).unwrap();
        FileMapping::new(input, dir.join(format!("{}.min", name)))
    }

    fn read(path: &PathBuf) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    fn always(value: bool) -> Box<dyn Invariant> {
        Box::new(FnInvariant::new("constant", move |_: &InvariantContext<'_>| value))
    }

    async fn minimizer(
        files: Vec<FileMapping>,
        invariant: Box<dyn Invariant>,
        strategy: Box<dyn Strategy>,
        config: MinimizerConfig,
    ) -> Minimizer {
        Minimizer::new(config, files, Arc::new(StatementLanguage), invariant, strategy)
            .await
            .unwrap()
    }

    /// Removes a fixed selection on its first pass, optionally forcing it.
    struct OneShot {
        pick: fn(&Forest) -> NodeSet,
        force: bool,
        fired: bool,
    }

    #[async_trait]
    impl Strategy for OneShot {
        fn name(&self) -> &str {
            "one-shot"
        }

        async fn perform_single_pass(
            &mut self,
            forest: Arc<Forest>,
            ops: &mut dyn MinimizerOperations,
        ) -> Result<PassControl> {
            if self.fired {
                return Ok(PassControl::exhausted());
            }
            self.fired = true;
            let nodes = (self.pick)(&forest);
            if self.force {
                ops.force_remove_nodes_and_exit(&nodes).await
            } else {
                ops.try_remove_nodes(&nodes).await
            }
        }
    }

    fn first_statement(forest: &Forest) -> NodeSet {
        [forest.node_ref(UnitId(0), NodeIndex(1))].into_iter().collect()
    }

    struct Sleepy;

    #[async_trait]
    impl Invariant for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn check_is_satisfied(&mut self, _ctx: &InvariantContext<'_>) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_two_file_scenario_converges() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y; z;");
        let b = write(dir.path(), "b.stmt", "p; q;");
        let (a_out, b_out) = (a.output.clone(), b.output.clone());

        let invariant = FnInvariant::new("y-and-p", |ctx: &InvariantContext<'_>| {
            ctx.scratch_text(UnitId(0)).is_some_and(|t| t.contains('y'))
                && ctx.scratch_text(UnitId(1)).is_some_and(|t| t.contains('p'))
        });
        let m = minimizer(
            vec![a, b],
            Box::new(invariant),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;
        let report = m.run().await.unwrap();

        assert_eq!(read(&a_out), "y;\n");
        assert_eq!(read(&b_out), "p;\n");
        assert!(report.stats.commits >= 3);
        assert!(!report.stats.forced_exit);

        // Node counts never grow from one snapshot to the next.
        let nodes: Vec<usize> = report.progress.iter().map(|e| e.metrics.nodes).collect();
        assert!(nodes.windows(2).all(|w| w[1] <= w[0]), "{:?}", nodes);
        assert_eq!(report.stats.minimized.nodes, 6);
    }

    /// The node whose committed text is exactly `text`.
    fn statement(m: &Minimizer, unit: UnitId, text: &str) -> NodeSet {
        let forest = m.forest();
        let source = m.cutters()[unit.index()].committed_text();
        let tree = forest.tree(unit).unwrap();
        let (index, _) = tree
            .iter()
            .find(|(index, _)| tree.text(*index, source) == Some(text))
            .unwrap();
        [forest.node_ref(unit, index)].into_iter().collect()
    }

    #[tokio::test]
    async fn test_two_file_scenario_commits_only_satisfying_states() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y; z;");
        let b = write(dir.path(), "b.stmt", "p; q;");
        let (a_out, b_out) = (a.output.clone(), b.output.clone());

        let invariant = FnInvariant::new("y-and-p", |ctx: &InvariantContext<'_>| {
            ctx.scratch_text(UnitId(0)).is_some_and(|t| t.contains('y'))
                && ctx.scratch_text(UnitId(1)).is_some_and(|t| t.contains('p'))
        });
        let mut m = minimizer(
            vec![a, b],
            Box::new(invariant),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;

        // Drive the passes by hand to look at the files after every commit.
        let mut committed = Vec::new();
        assert!(m.session.cleanup().await.unwrap().is_committed());
        committed.push((read(&a_out), read(&b_out)));
        loop {
            m.session.rollback_all();
            let forest = m.forest();
            let control = m
                .strategy
                .perform_single_pass(forest, &mut m.session)
                .await
                .unwrap();
            if control != PassControl::Continue {
                assert_eq!(control, PassControl::exhausted());
                break;
            }
            committed.push((read(&a_out), read(&b_out)));
        }
        m.finalize(&mut MinimizationReport::default()).await.unwrap();

        assert!(committed.len() >= 3);
        for (a_text, b_text) in &committed {
            assert!(a_text.contains('y') && b_text.contains('p'), "{:?}", (a_text, b_text));
        }
        assert_eq!(read(&a_out), "y;\n");
        assert_eq!(read(&b_out), "p;\n");

        // One-minimal: dropping either survivor is refused and touches nothing.
        for (unit, text) in [(UnitId(0), "y;"), (UnitId(1), "p;")] {
            let nodes = statement(&m, unit, text);
            let control = m.session.try_remove_nodes(&nodes).await.unwrap();
            assert_eq!(control, PassControl::Failed(Rejection::InvariantUnsatisfied));
            assert_eq!(read(&a_out), "y;\n");
            assert_eq!(read(&b_out), "p;\n");
        }
    }

    #[tokio::test]
    async fn test_unsatisfiable_invariant_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x;   y;");
        let out = a.output.clone();

        let m = minimizer(
            vec![a],
            always(false),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;
        let report = m.run().await.unwrap();

        assert_eq!(read(&out), "x;   y;");
        assert_eq!(report.stats.passes, 1);
        assert_eq!(report.stats.commits, 0);
        assert!(report.stats.invariant_rejections > 0);
        assert_eq!(report.stats.original, report.stats.minimized);
    }

    #[tokio::test]
    async fn test_failed_parse_commits_no_unit() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y;");
        let b = write(dir.path(), "b.stmt", "p;");
        let (a_out, b_out) = (a.output.clone(), b.output.clone());
        let mut m = minimizer(
            vec![a, b],
            always(true),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;

        let forest = m.forest();
        // Statement `x;` in A parses fine once removed; word `p` in B leaves `;`.
        let nodes: NodeSet = [
            forest.node_ref(UnitId(0), NodeIndex(1)),
            forest.node_ref(UnitId(1), NodeIndex(2)),
        ]
        .into_iter()
        .collect();
        let control = m.session.try_remove_nodes(&nodes).await.unwrap();

        assert!(matches!(
            control,
            PassControl::Failed(Rejection::Unparseable { unit: UnitId(1), .. })
        ));
        assert_eq!(m.cutters()[0].committed_text(), "x; y;");
        assert_eq!(m.cutters()[1].committed_text(), "p;");
        assert_eq!(read(&a_out), "x; y;");
        assert_eq!(read(&b_out), "p;");
        assert_eq!(m.forest().generation(), forest.generation());
        assert!(!dir.path().join("a.stmt.min.scm-staged").exists());

        // The trial is still pending until someone rolls it back.
        assert_eq!(m.cutters()[0].state(), CutterState::Trial);
        m.session.rollback_all();
        for cutter in m.cutters() {
            assert_eq!(cutter.state(), CutterState::Clean);
            assert_eq!(cutter.scratch_text(), cutter.committed_text());
        }
    }

    #[tokio::test]
    async fn test_successful_removal_replaces_forest() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y;");
        let out = a.output.clone();
        let mut m = minimizer(
            vec![a],
            always(true),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;

        let before = m.forest();
        let control = m
            .session
            .try_remove_nodes(&first_statement(&before))
            .await
            .unwrap();

        assert_eq!(control, PassControl::Continue);
        assert_eq!(read(&out), " y;");
        let after = m.forest();
        assert!(after.generation() > before.generation());
        assert!(after.node_count() < before.node_count());
    }

    #[tokio::test]
    async fn test_stale_references_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y; z;");
        let mut m = minimizer(
            vec![a],
            always(true),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;

        let old = m.forest();
        let stale = first_statement(&old);
        assert_eq!(
            m.session.try_remove_nodes(&stale).await.unwrap(),
            PassControl::Continue
        );

        // Same index, previous generation: nothing is removed.
        assert_eq!(
            m.session.try_remove_nodes(&stale).await.unwrap(),
            PassControl::Failed(Rejection::NothingToRemove)
        );
        assert_eq!(m.session.stats.unknown_node_references, 1);

        // Mixed with a fresh reference, only the fresh one is used.
        let fresh = m.forest();
        let mut mixed = stale.clone();
        mixed.insert(fresh.node_ref(UnitId(0), NodeIndex(1)));
        assert_eq!(
            m.session.try_remove_nodes(&mixed).await.unwrap(),
            PassControl::Continue
        );
        assert_eq!(m.session.stats.unknown_node_references, 2);
        assert_eq!(m.cutters()[0].committed_text(), "  z;");
    }

    #[tokio::test]
    async fn test_force_removal_skips_all_checks() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y;");
        let out = a.output.clone();
        let strategy = OneShot {
            // The word of `x;`: the forced text no longer parses.
            pick: |forest| [forest.node_ref(UnitId(0), NodeIndex(2))].into_iter().collect(),
            force: true,
            fired: false,
        };
        let m = minimizer(
            vec![a],
            always(false),
            Box::new(strategy),
            MinimizerConfig::default(),
        )
        .await;
        let report = m.run().await.unwrap();

        assert!(report.stats.forced_exit);
        assert_eq!(report.stats.passes, 1);
        assert_eq!(read(&out), "; y;");
    }

    #[tokio::test]
    async fn test_force_removal_stages_every_unit_before_promoting() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y;");
        let b = write(dir.path(), "b.stmt", "p; q;");
        let (a_out, b_out) = (a.output.clone(), b.output.clone());
        let mut m = minimizer(
            vec![a, b],
            always(true),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;

        // A directory where B's staged file belongs makes staging B fail.
        std::fs::create_dir(dir.path().join("b.stmt.min.scm-staged")).unwrap();
        let forest = m.forest();
        let nodes: NodeSet = [
            forest.node_ref(UnitId(0), NodeIndex(1)),
            forest.node_ref(UnitId(1), NodeIndex(1)),
        ]
        .into_iter()
        .collect();
        let err = m.session.force_remove_nodes_and_exit(&nodes).await.unwrap_err();

        assert!(matches!(err, MinimizerError::Io { .. }));
        assert_eq!(read(&a_out), "x; y;");
        assert_eq!(read(&b_out), "p; q;");
        assert_eq!(m.cutters()[0].committed_text(), "x; y;");
        assert_eq!(m.cutters()[1].committed_text(), "p; q;");
        assert!(!dir.path().join("a.stmt.min.scm-staged").exists());
        assert_eq!(m.forest().generation(), forest.generation());
        assert!(!m.session.stats.forced_exit);
    }

    #[tokio::test]
    async fn test_check_timeout_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; y;");
        let out = a.output.clone();
        let config = MinimizerConfig::new().with_check_timeout(Duration::from_millis(20));
        let mut m = minimizer(
            vec![a],
            Box::new(Sleepy),
            Box::new(GreedyStrategy::new()),
            config,
        )
        .await;

        let nodes = first_statement(&m.forest());
        let control = m.session.try_remove_nodes(&nodes).await.unwrap();

        assert_eq!(control, PassControl::Failed(Rejection::TimedOut));
        assert_eq!(m.session.stats.timeouts, 1);
        assert_eq!(read(&out), "x; y;");
    }

    #[tokio::test]
    async fn test_periodic_cleanup_passes() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "a; b; c; d; e; f;");
        let out = a.output.clone();
        let config = MinimizerConfig::new().with_cleanup_interval(3);
        let m = minimizer(
            vec![a],
            always(true),
            Box::new(GreedyStrategy::new()),
            config,
        )
        .await;
        let report = m.run().await.unwrap();

        let cleanups: Vec<usize> = report
            .progress
            .iter()
            .filter_map(|entry| match entry.checkpoint {
                Checkpoint::Pass {
                    number,
                    cleanup: true,
                } => Some(number),
                _ => None,
            })
            .collect();
        assert!(!cleanups.is_empty());
        assert!(cleanups.iter().all(|n| n % 3 == 0));
        assert_eq!(report.stats.cleanup_passes, cleanups.len());
        assert_eq!(read(&out), "");
    }

    #[tokio::test]
    async fn test_pass_limit_terminates_early() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "a; b; c; d; e; f;");
        let config = MinimizerConfig::new().with_max_passes(2);
        let m = minimizer(
            vec![a],
            always(true),
            Box::new(GreedyStrategy::new()),
            config,
        )
        .await;
        let report = m.run().await.unwrap();

        assert_eq!(report.stats.passes, 2);
        assert!(report.stats.early_terminated);
        assert!(report.to_string().contains("After pass #2"));
    }

    #[tokio::test]
    async fn test_finalization_leaves_canonical_text() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x;\n\n\ny;\n");
        let out = a.output.clone();
        let strategy = OneShot {
            pick: |_| NodeSet::new(),
            force: false,
            fired: true,
        };
        let m = minimizer(
            vec![a],
            always(true),
            Box::new(strategy),
            MinimizerConfig::default(),
        )
        .await;
        let report = m.run().await.unwrap();

        assert_eq!(read(&out), "x;\ny;\n");
        let last = report.progress.last().unwrap();
        assert_eq!(last.checkpoint, Checkpoint::BlankLineCleanup);
        assert!(report.invariant_statistics.contains("constant"));
    }

    #[tokio::test]
    async fn test_rejects_unparseable_baseline_and_empty_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.stmt", "x; {");
        let err = Minimizer::new(
            MinimizerConfig::default(),
            vec![a],
            Arc::new(StatementLanguage),
            always(true),
            Box::new(GreedyStrategy::new()),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, MinimizerError::BaselineUnparseable { .. }));

        let err = Minimizer::new(
            MinimizerConfig::default(),
            Vec::new(),
            Arc::new(StatementLanguage),
            always(true),
            Box::new(GreedyStrategy::new()),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, MinimizerError::NoInputs));
    }

    #[tokio::test]
    async fn test_rejects_output_aliasing_an_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.stmt");
        std::fs::write(&input, "a; needle; b;").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let mapping = FileMapping::new(&input, dir.path().join("sub/../a.stmt"));
        let err = Minimizer::new(
            MinimizerConfig::default(),
            vec![mapping],
            Arc::new(StatementLanguage),
            always(true),
            Box::new(GreedyStrategy::new()),
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(err, MinimizerError::InvalidConfig(_)));
        assert_eq!(read(&input), "a; needle; b;");
    }

    #[tokio::test]
    async fn test_context_materializes_colliding_names() {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("left");
        let right = dir.path().join("right");
        std::fs::create_dir_all(&left).unwrap();
        std::fs::create_dir_all(&right).unwrap();
        let a = write(&left, "same.stmt", "x;");
        let b = write(&right, "same.stmt", "y;");
        let mut m = minimizer(
            vec![a, b],
            always(true),
            Box::new(GreedyStrategy::new()),
            MinimizerConfig::default(),
        )
        .await;
        m.session.cutters[1].excise(&[NodeIndex(1)]);

        let trial = tempfile::tempdir().unwrap();
        let session = &m.session;
        let ctx = InvariantContext::new(&session.cutters, &session.forest, session.language.as_ref());
        let paths = ctx.materialize_scratch(trial.path()).await.unwrap();

        assert_eq!(paths[0], trial.path().join("same.stmt.min"));
        assert_eq!(paths[1], trial.path().join("unit1").join("same.stmt.min"));
        assert_eq!(read(&paths[0]), "x;");
        assert_eq!(read(&paths[1]), "");
        assert!(ctx.all_inputs_are_parseable());
        assert_eq!(ctx.unit_count(), 2);
    }
}
