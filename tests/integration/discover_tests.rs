use clap::Parser;
use devprobe::cli::Cli;
use devprobe::devices::{DeviceStore, DiscoveredDevice};
use devprobe::error::{is_terminate, ExitCode};
use std::fs;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const PROBE: &str = "devprobe-test?";

/// Loopback "device fleet" that answers `probes` probes with `replies`.
fn spawn_responder(replies: &'static [&'static str], probes: usize) -> (SocketAddr, JoinHandle<()>) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let addr = socket.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let mut buf = [0u8; 256];
        for _ in 0..probes {
            let (len, from) = socket.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..len], PROBE.as_bytes());
            for reply in replies {
                socket.send_to(reply.as_bytes(), from).unwrap();
            }
        }
    });
    (addr, handle)
}

struct Fixture {
    dir: TempDir,
    config: PathBuf,
    store: PathBuf,
}

impl Fixture {
    fn new(target: SocketAddr) -> Self {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        let store = dir.path().join("data").join("devices.json");
        fs::write(
            &config,
            format!(
                r#"
[discovery]
max_duration = 5
recheck_interval = 1

[[connectors]]
id = "lan"
broadcast = "{target}"
bind = "127.0.0.1:0"
probe = "{PROBE}"
probe_attempts = 1
listen_window_secs = 0.5
"#
            ),
        )
        .unwrap();
        Self { dir, config, store }
    }

    fn discover(&self, extra: &[&str]) -> anyhow::Result<ExitCode> {
        let mut args = vec![
            "devprobe".to_string(),
            "-q".to_string(),
            "--config".to_string(),
            self.config.display().to_string(),
            "discover".to_string(),
            "--no-interaction".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--store".to_string(),
            self.store.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        devprobe::run_app(Cli::try_parse_from(args).unwrap())
    }
}

fn stored_ids(store: &Path, connector: &str) -> Vec<String> {
    DeviceStore::load(store)
        .unwrap()
        .devices_for(connector)
        .map(|d| d.device.identifier.clone())
        .collect()
}

#[test]
fn test_discover_records_devices() {
    static REPLIES: &[&str] = &[
        r#"{"id":"plug-1","model":"SHPLG-S","fw":"1.14.0"}"#,
        r#"{"id":"bulb-7","model":"SHBLB-1","name":"Desk lamp"}"#,
        "not json at all",
    ];
    let (target, responder) = spawn_responder(REPLIES, 2);
    let fixture = Fixture::new(target);

    assert_eq!(fixture.discover(&[]).unwrap(), ExitCode::Success);
    assert_eq!(stored_ids(&fixture.store, "lan"), vec!["bulb-7", "plug-1"]);

    let store = DeviceStore::load(&fixture.store).unwrap();
    let plug = store
        .devices
        .iter()
        .find(|d| d.device.identifier == "plug-1")
        .unwrap();
    assert_eq!(plug.device.firmware.as_deref(), Some("1.14.0"));
    assert_eq!(plug.device.address.to_string(), "127.0.0.1");
    let first_seen = plug.first_seen;

    // A second session refreshes the same devices instead of adding new ones
    assert_eq!(fixture.discover(&[]).unwrap(), ExitCode::Success);
    let store = DeviceStore::load(&fixture.store).unwrap();
    assert_eq!(store.devices.len(), 2);
    let plug = store
        .devices
        .iter()
        .find(|d| d.device.identifier == "plug-1")
        .unwrap();
    assert_eq!(plug.first_seen, first_seen);
    assert!(plug.last_seen >= first_seen);

    responder.join().unwrap();
}

#[test]
fn test_discover_device_filter() {
    static REPLIES: &[&str] = &[
        r#"{"id":"plug-1","model":"SHPLG-S"}"#,
        r#"{"id":"bulb-7","model":"SHBLB-1"}"#,
    ];
    let (target, responder) = spawn_responder(REPLIES, 1);
    let fixture = Fixture::new(target);

    assert_eq!(
        fixture.discover(&["--device", "bulb-7"]).unwrap(),
        ExitCode::Success
    );
    assert_eq!(stored_ids(&fixture.store, "lan"), vec!["bulb-7"]);

    responder.join().unwrap();
}

#[test]
fn test_discover_device_owned_by_other_connector_terminates() {
    static REPLIES: &[&str] = &[r#"{"id":"plug-1","model":"SHPLG-S"}"#];
    let (target, responder) = spawn_responder(REPLIES, 1);
    let fixture = Fixture::new(target);

    let mut store = DeviceStore::new();
    store.record(
        "garage",
        &[DiscoveredDevice {
            identifier: "plug-1".to_string(),
            model: "SHPLG-S".to_string(),
            name: None,
            firmware: None,
            address: "10.0.0.9".parse().unwrap(),
            discovered_at: chrono::Utc::now(),
        }],
    );
    store.save(&fixture.store).unwrap();

    let err = fixture.discover(&[]).unwrap_err();
    assert!(is_terminate(&err));
    let message = format!("{:#}", err);
    assert!(message.starts_with("Device discovery failed"));
    assert!(message.contains("device plug-1 is already registered to connector garage"));

    // The store is left untouched
    assert_eq!(stored_ids(&fixture.store, "garage"), vec!["plug-1"]);
    assert!(stored_ids(&fixture.store, "lan").is_empty());

    responder.join().unwrap();
}

#[test]
fn test_discover_without_responses() {
    // The target never answers, so the listen window simply runs out.
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let fixture = Fixture::new(silent.local_addr().unwrap());

    assert_eq!(fixture.discover(&[]).unwrap(), ExitCode::Success);
    assert!(!fixture.store.exists(), "an empty session does not create a store");
    assert!(fixture.dir.path().exists());
}
