use std::io::Write;

use async_trait::async_trait;

use crate::context::InvariantContext;
use crate::error::Result;
use crate::traits::Invariant;

/// Wraps a synchronous predicate as an invariant.
///
/// ```rust,ignore
/// let invariant = FnInvariant::new("keeps-main", |ctx: &InvariantContext<'_>| {
///     ctx.units().any(|u| ctx.scratch_text(u).is_some_and(|t| t.contains("main")))
/// });
/// ```
pub struct FnInvariant<F> {
    name: String,
    predicate: F,
    checks: usize,
    accepted: usize,
}

impl<F> FnInvariant<F>
where
    F: Fn(&InvariantContext<'_>) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
            checks: 0,
            accepted: 0,
        }
    }

    pub fn checks(&self) -> usize {
        self.checks
    }
}

impl<F> std::fmt::Debug for FnInvariant<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInvariant")
            .field("name", &self.name)
            .field("checks", &self.checks)
            .field("accepted", &self.accepted)
            .finish()
    }
}

#[async_trait]
impl<F> Invariant for FnInvariant<F>
where
    F: Fn(&InvariantContext<'_>) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_is_satisfied(&mut self, ctx: &InvariantContext<'_>) -> Result<bool> {
        self.checks += 1;
        let ok = (self.predicate)(ctx);
        if ok {
            self.accepted += 1;
        }
        Ok(ok)
    }

    fn print_statistics(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "Invariant '{}': {} checks, {} accepted",
            self.name, self.checks, self.accepted
        )
    }
}
