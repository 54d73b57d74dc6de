use crate::error::{Result, SchedError};
use common::ScriptType;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Captured result of one script process.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Builds the interpreter invocation for `script_type`. Arguments are split on
/// whitespace and appended for every type that takes them.
pub fn build_command(script_type: &ScriptType, path: &Path, arguments: &str) -> Result<Command> {
    let mut cmd = match script_type {
        ScriptType::Python => interpreter("python", &[], path),
        ScriptType::Shell => interpreter("bash", &[], path),
        ScriptType::Php => interpreter("php", &[], path),
        ScriptType::Node => interpreter("node", &[], path),
        ScriptType::Ruby => interpreter("ruby", &[], path),
        ScriptType::Perl => interpreter("perl", &[], path),
        ScriptType::PowerShell => interpreter("powershell", &["-File"], path),
        ScriptType::R => interpreter("Rscript", &[], path),
        ScriptType::Lua => interpreter("lua", &[], path),
        ScriptType::Go => interpreter("go", &["run"], path),
        ScriptType::Bat | ScriptType::Cmd => shell_execute(path),
        ScriptType::Sql => {
            let mut cmd = Command::new("sqlite3");
            cmd.arg("-init").arg(path).arg(":memory:").arg(".exit");
            cmd
        }
        ScriptType::Other(other) => return Err(SchedError::UnsupportedScriptType(other.clone())),
    };

    if script_type.accepts_arguments() {
        cmd.args(arguments.split_whitespace());
    }
    Ok(cmd)
}

fn interpreter(program: &str, flags: &[&str], path: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(flags).arg(path);
    cmd
}

#[cfg(windows)]
fn shell_execute(path: &Path) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(path);
    cmd
}

// The script runs through the system shell; "$0" is the script path and "$@"
// the appended arguments.
#[cfg(not(windows))]
fn shell_execute(path: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("\"$0\" \"$@\"").arg(path);
    cmd
}

/// Runs the script to completion. There is no timeout: a script that never
/// exits blocks the caller.
pub fn run(script_type: &ScriptType, path: &Path, arguments: &str) -> Result<RunOutput> {
    capture(build_command(script_type, path, arguments)?)
}

fn capture(mut cmd: Command) -> Result<RunOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started = Instant::now();
    let output = cmd.output().map_err(SchedError::ProcessSpawn)?;

    Ok(RunOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn argv(cmd: &Command) -> Vec<String> {
        std::iter::once(cmd.get_program())
            .chain(cmd.get_args())
            .map(|s: &OsStr| s.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_interpreter_table() {
        let path = PathBuf::from("job.x");
        let cases = [
            (ScriptType::Python, vec!["python", "job.x"]),
            (ScriptType::Shell, vec!["bash", "job.x"]),
            (ScriptType::Php, vec!["php", "job.x"]),
            (ScriptType::Node, vec!["node", "job.x"]),
            (ScriptType::Ruby, vec!["ruby", "job.x"]),
            (ScriptType::Perl, vec!["perl", "job.x"]),
            (ScriptType::PowerShell, vec!["powershell", "-File", "job.x"]),
            (ScriptType::R, vec!["Rscript", "job.x"]),
            (ScriptType::Lua, vec!["lua", "job.x"]),
            (ScriptType::Go, vec!["go", "run", "job.x"]),
            (ScriptType::Sql, vec!["sqlite3", "-init", "job.x", ":memory:", ".exit"]),
        ];
        for (script_type, expected) in cases {
            let cmd = build_command(&script_type, &path, "").unwrap();
            assert_eq!(argv(&cmd), expected, "{}", script_type);
        }
    }

    #[test]
    fn test_arguments_are_split_and_appended() {
        let cmd = build_command(&ScriptType::Python, Path::new("a.py"), " --fast  -n 3 ").unwrap();
        assert_eq!(argv(&cmd), vec!["python", "a.py", "--fast", "-n", "3"]);
    }

    #[test]
    fn test_sql_ignores_arguments() {
        let cmd = build_command(&ScriptType::Sql, Path::new("q.sql"), "extra").unwrap();
        assert_eq!(argv(&cmd).last().map(String::as_str), Some(".exit"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = build_command(&ScriptType::Other("xyz".into()), Path::new("a.xyz"), "").unwrap_err();
        assert_eq!(err.to_string(), "Unsupported script type: xyz");
    }

    #[cfg(unix)]
    #[test]
    fn test_bat_goes_through_the_shell() {
        let cmd = build_command(&ScriptType::Bat, Path::new("/tmp/a.bat"), "x y").unwrap();
        assert_eq!(argv(&cmd), vec!["sh", "-c", "\"$0\" \"$@\"", "/tmp/a.bat", "x", "y"]);
    }

    #[test]
    fn test_missing_interpreter_is_a_spawn_error() {
        let err = capture(Command::new("/nonexistent/scriptsched-interpreter")).unwrap_err();
        assert!(matches!(err, SchedError::ProcessSpawn(_)));
        assert!(!err.to_string().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output_and_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let ok = dir.path().join("ok.sh");
        std::fs::write(&ok, "echo \"hi $1\"").unwrap();
        let out = run(&ScriptType::Shell, &ok, "there").unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hi there\n");

        let bad = dir.path().join("bad.sh");
        std::fs::write(&bad, "echo oops >&2\nexit 3").unwrap();
        let out = run(&ScriptType::Shell, &bad, "").unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr, "oops\n");
    }
}
