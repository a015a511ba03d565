//! Custom-script invocation.
//!
//! The escape hatch for migrations too bespoke for the closed operation
//! set: runs a pre-existing script with the migration context injected as
//! environment variables and lets its exit status decide step success.

use crate::config::EnvironmentConfig;
use crate::error::Error;
use std::path::Path;
use std::process::Command;

/// Context injected into every custom script.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub environment: String,
    pub region: String,
    pub table_prefix: String,
    pub dry_run: bool,
}

impl ScriptContext {
    pub fn from_config(config: &EnvironmentConfig, dry_run: bool) -> Self {
        Self {
            environment: config.environment.clone(),
            region: config.region.clone(),
            table_prefix: config.table_prefix.clone(),
            dry_run,
        }
    }

    fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("MIGRATION_ENVIRONMENT", self.environment.clone()),
            ("MIGRATION_REGION", self.region.clone()),
            ("MIGRATION_TABLE_PREFIX", self.table_prefix.clone()),
            (
                "MIGRATION_DRY_RUN",
                if self.dry_run { "1" } else { "0" }.to_string(),
            ),
        ]
    }
}

/// Captured result of a script run.
#[derive(Debug)]
pub struct ScriptOutcome {
    /// Process exit code (-1 if terminated by signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external migration scripts.
pub struct ScriptRunner;

impl ScriptRunner {
    /// Execute a script with captured output. The script must exist.
    pub fn run(
        script_path: &Path,
        args: &[String],
        context: &ScriptContext,
    ) -> Result<ScriptOutcome, Error> {
        if !script_path.exists() {
            return Err(Error::Script(format!(
                "script not found: {}",
                script_path.display()
            )));
        }

        tracing::info!(script = %script_path.display(), ?args, "running custom script");

        let output = Command::new(script_path)
            .args(args)
            .envs(context.env_vars())
            .output()
            .map_err(|e| Error::Script(format!("{}: {}", script_path.display(), e)))?;

        let outcome = ScriptOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !outcome.stdout.is_empty() {
            tracing::debug!(stdout = %outcome.stdout.trim_end(), "script stdout");
        }
        if !outcome.stderr.is_empty() {
            tracing::debug!(stderr = %outcome.stderr.trim_end(), "script stderr");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn context() -> ScriptContext {
        let config = EnvironmentConfig::for_environment("development");
        ScriptContext::from_config(&config, false)
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_missing_script_is_an_error() {
        let result = ScriptRunner::run(Path::new("/no/such/script.sh"), &[], &context());
        assert!(matches!(result, Err(Error::Script(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_receives_migration_context() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "ctx.sh",
            "echo \"$MIGRATION_ENVIRONMENT $MIGRATION_TABLE_PREFIX $MIGRATION_DRY_RUN\"",
        );

        let outcome = ScriptRunner::run(&script, &[], &context()).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "development dev_ 0");
    }

    #[cfg(unix)]
    #[test]
    fn test_script_args_and_failure_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "fail.sh", "echo \"arg: $1\" >&2; exit 3");

        let outcome =
            ScriptRunner::run(&script, &["first".to_string()], &context()).unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.stderr.contains("arg: first"));
    }
}
