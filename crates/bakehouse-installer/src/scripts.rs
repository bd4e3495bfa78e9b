use std::path::Path;

use tracing::warn;

use crate::system::ProcessRunner;

/// What happened to one declared script. Failures are policy, not errors:
/// the surrounding operation keeps going and the caller decides what to
/// show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub command: Vec<String>,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
}

/// Run each script as an independent subprocess. When `format_prefix` is
/// set, the literal `{prefix}` in every argument is replaced with the
/// package directory before running.
pub fn run_scripts(
    runner: &dyn ProcessRunner,
    scripts: &[Vec<String>],
    cwd: &Path,
    format_prefix: Option<&Path>,
) -> Vec<ScriptOutcome> {
    let mut outcomes = Vec::with_capacity(scripts.len());

    for argv in scripts {
        let command: Vec<String> = match format_prefix {
            Some(prefix) => {
                let prefix = prefix.display().to_string();
                argv.iter()
                    .map(|arg| arg.replace("{prefix}", &prefix))
                    .collect()
            }
            None => argv.clone(),
        };

        let outcome = match runner.run(&command, cwd) {
            Ok(code) => {
                if code != 0 {
                    warn!(command = %command.join(" "), code, "script exited non-zero");
                }
                ScriptOutcome {
                    succeeded: code == 0,
                    exit_code: Some(code),
                    command,
                }
            }
            Err(err) => {
                warn!(command = %command.join(" "), error = %err, "error running script");
                ScriptOutcome {
                    command,
                    exit_code: None,
                    succeeded: false,
                }
            }
        };
        outcomes.push(outcome);
    }

    outcomes
}
