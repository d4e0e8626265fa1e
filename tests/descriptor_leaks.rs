//! Descriptor accounting. Kept in its own binary so no other test opens
//! descriptors while these count them.

use std::fs;
use std::thread;

use remote_shell::config::ServerConfig;
use remote_shell::executor::{execute, EngineState, StdioOverrides};
use remote_shell::parser::parse;
use remote_shell::remote::{RemoteClient, Server, STOP_MESSAGE};
use serial_test::serial;

fn open_descriptors() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

#[test]
#[serial]
fn test_pipelines_do_not_leak_descriptors() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let line = format!("echo leak | cat | wc -c > {}", out.display());
    let failing = "no-such-program-rsh | cat";
    let mut state = EngineState::default();

    let before = open_descriptors();
    for _ in 0..1000 {
        execute(&parse(&line).unwrap(), &StdioOverrides::inherit(), &mut state).unwrap();
    }
    for _ in 0..100 {
        let devnull = fs::File::create("/dev/null").unwrap();
        let _ = execute(&parse(failing).unwrap(), &StdioOverrides::output(&devnull), &mut state);
    }
    assert_eq!(open_descriptors(), before);
    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "5");
}

#[test]
#[serial]
fn test_sessions_do_not_leak_descriptors() {
    let config = ServerConfig {
        interface: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();
    let before = open_descriptors();
    let handle = thread::spawn(move || server.serve());

    for _ in 0..50 {
        let mut client = RemoteClient::connect(addr).unwrap();
        assert_eq!(client.request("echo churn | cat").unwrap(), "churn\n");
        client.request("exit").unwrap();
        client.finish().unwrap();
    }
    let mut client = RemoteClient::connect(addr).unwrap();
    assert_eq!(client.request("stop-server").unwrap(), STOP_MESSAGE);
    client.finish().unwrap();
    handle.join().unwrap().unwrap();

    // The listener itself is closed once the server returns.
    assert_eq!(open_descriptors(), before - 1);
}
