//! Process-level tests: run the `gentoro-mcp` binary and check how it exits.

use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn relay_command(base_url: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gentoro-mcp"));
    cmd.env("GENTORO_BASE_URL", base_url)
        .env("GENTORO_BRIDGE_UID", "bridge-7")
        .env("GENTORO_API_KEY", "test-key")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

async fn wait_exit(child: &mut Child) -> std::process::ExitStatus {
    tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .expect("relay did not exit in time")
        .unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn test_sigint_exits_zero_with_stdin_open() {
    let remote = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "gentoro", "version": "1.0.0"}
            }
        })))
        .mount(&remote)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/list"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"tools": []}
        })))
        .mount(&remote)
        .await;

    let mut child = relay_command(&remote.uri()).spawn().unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    // A reply means the serve loop is running and the signal handler is installed
    stdin
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
        .await
        .unwrap();
    let mut reply = String::new();
    tokio::time::timeout(Duration::from_secs(10), stdout.read_line(&mut reply))
        .await
        .expect("no reply from relay")
        .unwrap();
    let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply["result"], json!({"tools": []}));

    let pid = child.id().unwrap();
    let killed = Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .status()
        .await
        .unwrap();
    assert!(killed.success());

    // stdin stays open for the whole wait
    let status = wait_exit(&mut child).await;
    assert_eq!(status.code(), Some(0));
    drop(stdin);
}

#[tokio::test]
async fn test_failed_probe_exits_one() {
    let remote = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "agent offline"})))
        .mount(&remote)
        .await;

    let mut child = relay_command(&remote.uri()).spawn().unwrap();
    let _stdin = child.stdin.take().unwrap();

    let status = wait_exit(&mut child).await;
    assert_eq!(status.code(), Some(1));
    assert_eq!(remote.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_config_exits_one() {
    let mut cmd = relay_command("http://127.0.0.1:9");
    cmd.env_remove("GENTORO_BRIDGE_UID");

    let mut child = cmd.spawn().unwrap();
    let _stdin = child.stdin.take().unwrap();

    let status = wait_exit(&mut child).await;
    assert_eq!(status.code(), Some(1));
}
