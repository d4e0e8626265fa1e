use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::Path;

use remote_shell::executor::{execute, Context, EngineState, ExecError, ExecOutcome, StdioOverrides};
use remote_shell::parser::{parse, ParseError};
use serial_test::serial;
use tempfile::TempDir;

fn run_in(dir: &Path, line: &str) -> Result<ExecOutcome, ExecError> {
    let line = line.replace("$DIR", dir.to_str().unwrap());
    let mut state = EngineState::new(Context::Local);
    execute(&parse(&line).unwrap(), &StdioOverrides::inherit(), &mut state)
}

/// Runs `line` with stdout and stderr captured in one file.
fn capture(line: &str, state: &mut EngineState) -> (Result<ExecOutcome, ExecError>, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("captured");
    let file = File::create(&path).unwrap();
    let result = execute(&parse(line).unwrap(), &StdioOverrides::output(&file), state);
    drop(file);
    (result, fs::read_to_string(&path).unwrap())
}

#[test]
fn test_output_redirection_truncates() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.txt");
    fs::write(&out, "old contents that are longer\n").unwrap();

    run_in(dir.path(), "echo hello > $DIR/out.txt").unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
}

#[test]
fn test_append_redirection() {
    let dir = TempDir::new().unwrap();
    run_in(dir.path(), "echo one >> $DIR/log").unwrap();
    run_in(dir.path(), "echo two >> $DIR/log").unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("log")).unwrap(), "one\ntwo\n");
}

#[test]
fn test_input_and_output_redirection() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("in"), "copied\n").unwrap();
    run_in(dir.path(), "cat < $DIR/in > $DIR/out").unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("out")).unwrap(), "copied\n");
}

#[test]
fn test_pipeline_with_redirected_ends() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("words"), "pear\napple\npear\nfig\n").unwrap();
    run_in(dir.path(), "sort < $DIR/words | uniq | wc -l > $DIR/count").unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("count")).unwrap().trim(), "3");
}

#[test]
fn test_redirection_on_middle_stage() {
    let dir = TempDir::new().unwrap();
    run_in(dir.path(), "echo middle | tee $DIR/unused > $DIR/mid | cat").unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("mid")).unwrap(), "middle\n");
}

#[test]
fn test_output_file_mode() {
    use std::os::unix::fs::PermissionsExt;
    let dir = TempDir::new().unwrap();
    run_in(dir.path(), "true > $DIR/created").unwrap();
    let mode = fs::metadata(dir.path().join("created")).unwrap().permissions().mode();
    // umask may only clear bits.
    assert_eq!(mode & 0o7133, 0);
    assert_eq!(mode & 0o600, 0o600);
}

#[test]
fn test_self_redirection_spawns_nothing() {
    let dir = TempDir::new().unwrap();
    let line = format!("cat < {0}/same > {0}/same", dir.path().display());
    assert!(matches!(parse(&line), Err(ParseError::SelfRedirection { .. })));
    assert!(!dir.path().join("same").exists());
}

#[test]
fn test_missing_input_file_creates_no_output() {
    let dir = TempDir::new().unwrap();
    let result = run_in(dir.path(), "cat < $DIR/absent | wc -c > $DIR/out");
    assert!(matches!(result, Err(ExecError::Redirect { .. })));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_pipeline_output_captured() {
    let mut state = EngineState::default();
    let (result, out) = capture("printf \"c\\na\\nb\\n\" | sort | head -n 2", &mut state);
    assert_eq!(result.unwrap(), ExecOutcome::Code(0));
    assert_eq!(out, "a\nb\n");
}

#[test]
fn test_quoted_arguments_reach_program() {
    let mut state = EngineState::default();
    let (_, out) = capture("printf \"%s|%s\\n\" \"a b\" \"c  d\"", &mut state);
    assert_eq!(out, "a b|c  d\n");
}

#[test]
fn test_command_not_found_and_rc() {
    let mut state = EngineState::default();
    let (result, out) = capture("no-such-program-rsh --flag", &mut state);
    assert_eq!(result.unwrap_err().exit_code(), 127);
    assert_eq!(out, "rsh: no-such-program-rsh: command not found\n");

    let (result, out) = capture("rc", &mut state);
    assert_eq!(result.unwrap(), ExecOutcome::Code(127));
    assert_eq!(out, "127\n");
}

#[test]
fn test_permission_denied_is_126() {
    use std::os::unix::fs::PermissionsExt;
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("not-executable");
    fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();

    let mut state = EngineState::default();
    let (result, out) = capture(script.to_str().unwrap(), &mut state);
    assert_eq!(result.unwrap_err().exit_code(), 126);
    assert!(out.ends_with("permission denied\n"));
}

#[test]
fn test_failed_stage_does_not_hang_pipeline() {
    let mut state = EngineState::default();
    let (result, _) = capture("no-such-program-rsh | cat | wc -l", &mut state);
    match result {
        Err(ExecError::StageFailed { stage, exit_code, .. }) => {
            assert_eq!(stage, 0);
            assert_eq!(exit_code, 0);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_builtin_in_pipeline_spawns_nothing() {
    let dir = TempDir::new().unwrap();
    let result = run_in(dir.path(), "echo x > $DIR/marker | rc");
    assert!(matches!(result, Err(ExecError::BuiltinInPipeline { .. })));
    assert!(!dir.path().join("marker").exists());
}

#[test]
fn test_stdin_override() {
    let (ours, mut theirs) = UnixStream::pair().unwrap();
    theirs.write_all(b"from the socket\n").unwrap();
    theirs.shutdown(std::net::Shutdown::Write).unwrap();

    let io = StdioOverrides {
        stdin: Some(ours.as_fd()),
        stdout: Some(ours.as_fd()),
        stderr: None,
    };
    let mut state = EngineState::default();
    execute(&parse("tr a-z A-Z").unwrap(), &io, &mut state).unwrap();
    drop(ours);

    let mut got = String::new();
    theirs.read_to_string(&mut got).unwrap();
    assert_eq!(got, "FROM THE SOCKET\n");
}

#[test]
#[serial]
fn test_cd_changes_directory() {
    let original = env::current_dir().unwrap();
    let dir = TempDir::new().unwrap();
    let target = dir.path().canonicalize().unwrap();

    let mut state = EngineState::default();
    let line = format!("cd {}", target.display());
    assert_eq!(
        execute(&parse(&line).unwrap(), &StdioOverrides::inherit(), &mut state).unwrap(),
        ExecOutcome::Code(0)
    );
    assert_eq!(env::current_dir().unwrap(), target);

    let (_, out) = capture("pwd", &mut state);
    assert_eq!(Path::new(out.trim()), target);
    env::set_current_dir(original).unwrap();
}

#[test]
#[serial]
fn test_cd_failure_keeps_directory() {
    let original = env::current_dir().unwrap();
    let mut state = EngineState::default();
    let (result, out) = capture("cd /definitely/not/a/dir", &mut state);
    assert_eq!(result.unwrap(), ExecOutcome::Code(1));
    assert!(out.starts_with("cd: "));
    assert_eq!(state.last_exit_code, 1);
    assert_eq!(env::current_dir().unwrap(), original);
}
