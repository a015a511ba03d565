//! Safety gate: confirmation protocol that scales with blast radius.
//!
//! Non-production applies proceed on `--force` or per-destructive-operation
//! y/N confirmation. Production applies require the operator to type an
//! exact phrase before the run leaves pending, and the same phrase again
//! once the full plan has been displayed; `--force` never bypasses it.

use crate::config::EnvironmentConfig;
use crate::error::Error;

/// Exact phrase production applies must be confirmed with, twice.
pub const PRODUCTION_PHRASE: &str = "apply to production";

/// Source of operator confirmations.
///
/// The CLI implements this over stdin; tests script the answers.
pub trait Prompt {
    /// Ask a y/N question. Returns `true` only on explicit yes.
    fn confirm(&mut self, message: &str) -> Result<bool, Error>;

    /// Ask for a typed phrase and return it verbatim.
    fn read_phrase(&mut self, message: &str) -> Result<String, Error>;
}

/// Scripted prompt for tests and non-interactive tooling.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: std::collections::VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    fn next(&mut self) -> String {
        self.answers.pop_front().unwrap_or_default()
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&mut self, _message: &str) -> Result<bool, Error> {
        let answer = self.next();
        Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
    }

    fn read_phrase(&mut self, _message: &str) -> Result<String, Error> {
        Ok(self.next())
    }
}

/// Environment-aware confirmation protocol.
pub struct SafetyGate<'a> {
    config: &'a EnvironmentConfig,
    force: bool,
}

impl<'a> SafetyGate<'a> {
    pub fn new(config: &'a EnvironmentConfig, force: bool) -> Self {
        Self { config, force }
    }

    /// Gate before the run leaves pending. Production requires the phrase.
    pub fn confirm_start(&self, prompt: &mut dyn Prompt) -> Result<(), Error> {
        if self.config.is_production() {
            self.require_phrase(
                prompt,
                "You are about to migrate PRODUCTION. Type the confirmation phrase to continue",
            )?;
        }
        Ok(())
    }

    /// Gate immediately before execution, after the plan was displayed.
    /// Production requires the phrase a second time.
    pub fn confirm_execution(&self, prompt: &mut dyn Prompt) -> Result<(), Error> {
        if self.config.is_production() {
            self.require_phrase(
                prompt,
                "Plan displayed above targets PRODUCTION. Type the confirmation phrase again to execute",
            )?;
        }
        Ok(())
    }

    /// Per-destructive-operation gate. `--force` skips it outside
    /// production; destructive operations never reach execution in
    /// production (the linter blocks them).
    pub fn confirm_operation(&self, prompt: &mut dyn Prompt, intent: &str) -> Result<(), Error> {
        if self.force {
            tracing::warn!(operation = intent, "forced past destructive confirmation");
            return Ok(());
        }
        let message = format!("{} - proceed? [y/N]", intent);
        if prompt.confirm(&message)? {
            Ok(())
        } else {
            Err(Error::ConfirmationDeclined)
        }
    }

    fn require_phrase(&self, prompt: &mut dyn Prompt, message: &str) -> Result<(), Error> {
        let message = format!("{} ('{}'):", message, PRODUCTION_PHRASE);
        let answer = prompt.read_phrase(&message)?;
        if answer.trim() == PRODUCTION_PHRASE {
            Ok(())
        } else {
            Err(Error::ConfirmationDeclined)
        }
    }
}
