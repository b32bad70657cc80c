use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use hostvm_host::{CaptureSink, GpuBackendKind, Host, HostConfig, MemoryBacking, Pacing};

fn test_config() -> HostConfig {
    let mut config = HostConfig::default();
    config.cpu.memory_size = 1 << 16;
    config.cpu.memory_backing = MemoryBacking::Dense;
    config.gpu.width = 16;
    config.gpu.height = 16;
    config.gpu.backend = GpuBackendKind::Software;
    config.audio.format.period_samples = 16;
    config.audio.pacing = Pacing::FixedMillis(1);
    config.net.port = 0;
    config
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn config_file_drives_boot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host.json");
    std::fs::write(&path, test_config().to_json_pretty()).unwrap();

    let config = HostConfig::load(&path).unwrap();
    assert_eq!(config, test_config());

    let mut host = Host::new(config);
    assert!(host.boot());
    assert_eq!(host.cpu().memory_size(), Some(1 << 16));
    assert_eq!(host.gpu().size(), Some((16, 16)));
    host.shutdown();
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = HostConfig::load(&dir.path().join("nope.json")).unwrap_err();
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn audio_through_the_bridge_plays_in_order() {
    let mut host = Host::new(test_config());
    let sink = CaptureSink::new();
    assert!(host.audio_init_with_sink(Box::new(sink.clone())));

    assert!(host.audio_queue(&[1, 1, 1, 1]));
    assert!(host.audio_queue(&[2, 2]));
    assert!(!host.audio_queue(&[3]));
    assert!(host.audio_play());

    wait_until("both blocks", || sink.audible_blocks().len() >= 2);
    assert_eq!(sink.audible_blocks(), vec![vec![1; 4], vec![2; 2]]);

    assert!(host.audio_stop());
    host.audio_cleanup();
    host.audio_cleanup();
}

#[test]
fn network_through_the_bridge_echoes() {
    let mut host = Host::new(test_config());
    assert!(host.net_init(0));
    let port = host.net().local_addr().unwrap().port();

    let mut client = TcpStream::connect(SocketAddr::from(([127, 0, 0, 1], port))).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    client.write_all(b"ping").unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");

    wait_until("connection listed", || host.net_connections().len() == 1);
    let id = host.net_connections()[0].id;
    assert!(host.net_send(id, b"pong"));
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong");

    drop(client);
    wait_until("connection removed", || host.net_connections().is_empty());
    assert!(!host.net_send(id, b"gone"));

    host.net_cleanup();
    host.net_cleanup();
}

#[test]
fn net_reinit_replaces_the_listener() {
    let mut host = Host::new(test_config());
    assert!(host.net_init(0));
    let first = host.net().local_addr().unwrap();
    assert!(host.net_init(0));
    let second = host.net().local_addr().unwrap();
    assert_ne!(first.port(), 0);
    assert_ne!(second.port(), 0);
    assert!(TcpStream::connect(SocketAddr::from(([127, 0, 0, 1], second.port()))).is_ok());
}
