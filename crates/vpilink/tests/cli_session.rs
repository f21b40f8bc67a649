#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Stdio};

use vpilink_host::{Address, CompanionListener, Message, ReadReply};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/vpilink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn events(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each stdout line should be json"))
        .collect()
}

#[test]
fn host_serves_writes_reads_and_ticks() {
    let dir = unique_temp_dir("host");
    let sock_path = dir.join("sim.sock");
    let listener = CompanionListener::bind(&Address::SeqPacket(sock_path.clone()))
        .expect("companion should bind");

    let child = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("host")
        .arg(&sock_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("host command should start");

    let mut companion = listener.accept().expect("host should connect");
    companion.send_write("sig_a", 3, &[0x01, 0x02]).unwrap();
    companion.send_go().unwrap();
    assert_eq!(companion.recv().unwrap(), Some(Message::Tick));
    companion.send_read("sig_a", 3).unwrap();
    assert_eq!(
        companion.recv().unwrap(),
        Some(Message::ReadReply(ReadReply::new(vec![0x01, 0x02])))
    );

    // Unknown type byte: rejected, and the host keeps serving.
    companion.sender().send_frame(9, &[]).unwrap();
    companion.send_read("sig_a", 4).unwrap();
    assert_eq!(
        companion.recv().unwrap(),
        Some(Message::ReadReply(ReadReply::new(Vec::new())))
    );
    companion.close();

    let output = child.wait_with_output().expect("host should exit");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let events = events(&output.stdout);
    let kinds: Vec<&str> = events
        .iter()
        .map(|event| event["event"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(kinds, ["write", "go", "read", "read", "shutdown"]);
    assert_eq!(events[0]["name"], "sig_a");
    assert_eq!(events[0]["index"], 3);
    assert_eq!(events[0]["data"], "0102");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn companion_script_drives_host_over_unix_stream() {
    let dir = unique_temp_dir("script");
    let sock_path = dir.join("sim.sock");
    let script = dir.join("steps.txt");
    std::fs::write(
        &script,
        "write sig_b 7 42\ngo\nwait\nread sig_b 7\ngo\nwait\n",
    )
    .expect("script should be writable");
    let address = format!("unix-stream:{}", sock_path.display());

    let companion = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("companion")
        .arg(&address)
        .arg("--script")
        .arg(&script)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("companion command should start");

    let host = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("host")
        .arg(&address)
        .arg("--wait")
        .arg("5s")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("host command should start");

    let companion = companion.wait_with_output().expect("companion should exit");
    assert!(
        companion.status.success(),
        "{}",
        String::from_utf8_lossy(&companion.stderr)
    );
    let host = host.wait_with_output().expect("host should exit");
    assert!(host.status.success(), "{}", String::from_utf8_lossy(&host.stderr));

    let received = events(&companion.stdout);
    let kinds: Vec<&str> = received
        .iter()
        .map(|event| event["event"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(kinds, ["tick", "read_reply", "tick"]);
    assert_eq!(received[1]["data"], "42");

    let served = events(&host.stdout);
    assert_eq!(served.len(), 5);
    assert_eq!(served[4]["event"], "shutdown");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn host_count_stops_after_n_requests() {
    let dir = unique_temp_dir("count");
    let sock_path = dir.join("sim.sock");
    let listener = CompanionListener::bind(&Address::SeqPacket(sock_path.clone()))
        .expect("companion should bind");

    let child = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("host")
        .arg(&sock_path)
        .arg("--count")
        .arg("2")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("host command should start");

    let mut companion = listener.accept().expect("host should connect");
    companion.send_go().unwrap();
    companion.send_go().unwrap();
    assert_eq!(companion.recv().unwrap(), Some(Message::Tick));
    assert_eq!(companion.recv().unwrap(), Some(Message::Tick));
    // The host closes after the second request.
    assert_eq!(companion.recv().unwrap(), None);

    let output = child.wait_with_output().expect("host should exit");
    assert!(output.status.success());
    assert_eq!(events(&output.stdout).len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn host_stops_on_malformed_payload() {
    let dir = unique_temp_dir("malformed");
    let sock_path = dir.join("sim.sock");
    let listener = CompanionListener::bind(&Address::SeqPacket(sock_path.clone()))
        .expect("companion should bind");

    let child = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json")
        .arg("host")
        .arg(&sock_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("host command should start");

    let mut companion = listener.accept().expect("host should connect");
    // Go carries no payload.
    companion.sender().send_frame(1, &[0xff]).unwrap();

    let output = child.wait_with_output().expect("host should exit");
    assert_eq!(output.status.code(), Some(60));
    assert!(events(&output.stdout).is_empty());
    assert_eq!(companion.recv().unwrap(), None);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn host_without_companion_returns_transport_error() {
    let missing = PathBuf::from(format!(
        "/tmp/vpilink-cli-missing-{}-{}.sock",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));

    let output = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("host")
        .arg(&missing)
        .output()
        .expect("host should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn invalid_script_returns_usage() {
    let dir = unique_temp_dir("bad-script");
    let script = dir.join("steps.txt");
    std::fs::write(&script, "go\nteleport\n").expect("script should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("companion")
        .arg(dir.join("never.sock"))
        .arg("--script")
        .arg(&script)
        .output()
        .expect("companion should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(!dir.join("never.sock").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_vpilink"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("vpilink "));
}
