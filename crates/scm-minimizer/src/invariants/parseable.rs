use std::io::Write;

use async_trait::async_trait;

use crate::context::InvariantContext;
use crate::error::Result;
use crate::traits::Invariant;

/// Accepts any trial in which every unit parses.
///
/// Mostly useful for exercising strategies: with the engine's own parse check
/// it reduces every input to the smallest parseable text.
#[derive(Debug, Default)]
pub struct ParseableInvariant {
    checks: usize,
    accepted: usize,
}

impl ParseableInvariant {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Invariant for ParseableInvariant {
    fn name(&self) -> &str {
        "parseable"
    }

    async fn check_is_satisfied(&mut self, ctx: &InvariantContext<'_>) -> Result<bool> {
        self.checks += 1;
        let ok = ctx.all_inputs_are_parseable();
        if ok {
            self.accepted += 1;
        }
        Ok(ok)
    }

    fn print_statistics(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "Invariant '{}': {} checks, {} accepted",
            self.name(),
            self.checks,
            self.accepted
        )
    }
}
