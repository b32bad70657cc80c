#![cfg(not(target_arch = "wasm32"))]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use hostvm_cpu::{assemble, Instruction};

fn resolve_cli_exe() -> PathBuf {
    if let Some(exe) = option_env!("CARGO_BIN_EXE_hostvm") {
        return PathBuf::from(exe);
    }
    let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    let target_dir = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| repo_root.join("target"));
    let exe_name = format!("hostvm{}", std::env::consts::EXE_SUFFIX);
    let debug_exe = target_dir.join("debug").join(&exe_name);
    let release_exe = target_dir.join("release").join(&exe_name);
    if debug_exe.exists() {
        debug_exe
    } else if release_exe.exists() {
        release_exe
    } else {
        panic!(
            "expected hostvm binary at {} or {}",
            debug_exe.display(),
            release_exe.display()
        );
    }
}

fn hostvm() -> Command {
    let mut cmd = Command::new(resolve_cli_exe());
    // Keep the caller's environment from leaking into flag defaults.
    for var in [
        "HOSTVM_PROGRAM",
        "HOSTVM_CONFIG",
        "HOSTVM_MEMORY",
        "HOSTVM_WIDTH",
        "HOSTVM_HEIGHT",
        "HOSTVM_GPU_BACKEND",
        "HOSTVM_PORT",
        "HOSTVM_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "hostvm exited with {}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("path should be UTF-8")
}

#[test]
fn demo_program_runs_and_dumps_a_frame() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let png = tmp.path().join("frame.png");

    let output = hostvm()
        .args([
            "--memory",
            "64",
            "--max-insts",
            "1000",
            "--gpu-backend",
            "software",
            "--width",
            "32",
            "--height",
            "16",
            "--frame-png",
            path_arg(&png),
            "--dump-registers",
        ])
        .output()
        .expect("failed to run hostvm");
    assert_success(&output);

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let registers = &summary["state"]["registers"];
    assert_eq!(registers[3], 42);
    assert_eq!(registers[4], 40);
    assert_eq!(registers[5], 84);
    // 64 bytes of guest memory hold 16 instructions; the next fetch faults.
    assert_eq!(summary["retired"], 16);
    assert_eq!(summary["state"]["pc"], 64);
    assert!(summary["fault"]
        .as_str()
        .expect("fault should be reported")
        .contains("out of bounds"));

    let bytes = std::fs::read(&png).expect("expected frame.png to be written");
    assert!(
        bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
        "frame.png did not look like a PNG (first bytes = {:?})",
        bytes.get(..8)
    );
    let frame = image::open(&png).expect("frame.png should decode").to_rgba8();
    assert_eq!(frame.dimensions(), (32, 16));
    assert_eq!(frame.get_pixel(16, 8).0, [0xFF, 0, 0, 0xFF]);
    assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 0, 0]);
}

#[test]
fn program_file_with_unknown_opcodes_keeps_running() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let program = tmp.path().join("program.bin");
    let mut bytes = vec![0x00, 0x00, 0x00, 0xFF];
    bytes.extend(assemble(&[Instruction::nop(), Instruction::add(1, 1, 1)]));
    std::fs::write(&program, bytes).expect("failed to write program");

    let output = hostvm()
        .args([
            "--program",
            path_arg(&program),
            "--memory",
            "4096",
            "--max-insts",
            "3",
            "--dump-registers",
        ])
        .output()
        .expect("failed to run hostvm");
    assert_success(&output);

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(summary["retired"], 3);
    assert_eq!(summary["state"]["pc"], 12);
    assert!(summary["fault"].is_null());
}

#[test]
fn oversized_program_is_an_error() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let program = tmp.path().join("big.bin");
    std::fs::write(&program, vec![0u8; 128]).expect("failed to write program");

    let output = hostvm()
        .args(["--program", path_arg(&program), "--memory", "64", "--max-insts", "1"])
        .output()
        .expect("failed to run hostvm");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not fit"));
}

#[test]
fn missing_stop_condition_is_a_usage_error() {
    let output = hostvm().output().expect("failed to run hostvm");
    assert!(!output.status.success());
}

#[test]
fn serve_echoes_until_the_time_budget_ends() {
    let mut child = hostvm()
        .args([
            "--memory",
            "64",
            "--max-ms",
            "1500",
            "--serve",
            "--port",
            "0",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn hostvm");

    let stderr = child.stderr.take().expect("stderr is piped");
    let mut lines = BufReader::new(stderr).lines();
    let port = loop {
        let line = lines
            .next()
            .expect("hostvm exited before listening")
            .expect("stderr should be UTF-8");
        if let Some(addr) = line.strip_prefix("listening on ") {
            let addr: SocketAddr = addr.trim().parse().expect("listen address");
            break addr.port();
        }
    };

    let mut client = TcpStream::connect(SocketAddr::from(([127, 0, 0, 1], port)))
        .expect("failed to connect");
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    client.write_all(b"hello").unwrap();
    let mut buf = [0u8; 5];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
    drop(client);

    // Drain the rest of stderr so the child never blocks on a full pipe.
    for _ in lines {}
    let status = child.wait().expect("failed to wait for hostvm");
    assert!(status.success(), "hostvm exited with {status}");
}
