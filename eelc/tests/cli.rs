use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs::write;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// Writes a config whose cache lives inside `dir` and whose key file is `key`.
fn write_config(dir: &Path, key: &Path) -> PathBuf {
    let path = dir.join("config.yaml");
    let yaml = format!(
        "gcs:\n  service_account: exporter@eelc-test.iam.gserviceaccount.com\n  private_key: {}\n  bucket_name: chips\ncache_dir: {}\n",
        key.display(),
        dir.join("dat").display()
    );
    write(&path, yaml).expect("Writing temp config failed");
    path
}

fn eelc(log_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("eelc").expect("Binary exists");
    cmd.arg("--log-file").arg(log_dir.path().join("eelc.log"));
    cmd
}

#[test]
fn help_lists_subcommands() {
    let logs = tempdir().unwrap();
    eelc(&logs)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export").and(predicate::str::contains("footprints")));
}

#[test]
fn missing_config_is_reported_with_setup_hint() {
    let dir = tempdir().unwrap();
    eelc(&dir)
        .arg("export")
        .arg("--path")
        .arg(dir.path())
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("Configuration not found")
                .and(predicate::str::contains("service account credentials")),
        );
}

#[test]
fn missing_key_file_fails_before_any_request() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("no-such-key.json"));
    eelc(&dir)
        .arg("export")
        .arg("--path")
        .arg(dir.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("service account key file"));
}

#[test]
fn footprints_writes_cache_and_log() {
    let dir = tempdir().unwrap();
    let tiles = dir.path().join("ROIs1970_fall_s1");
    std::fs::create_dir(&tiles).unwrap();
    let config = write_config(dir.path(), Path::new("unused.json"));

    eelc(&dir)
        .arg("footprints")
        .arg("--path")
        .arg(&tiles)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    assert!(dir.path().join("dat").join("ROIs1970_fall_s1.geojson").exists());
    let log = std::fs::read_to_string(dir.path().join("eelc.log")).unwrap();
    assert!(log.contains("trace_initialised"), "log was: {log}");
    assert!(!log.contains("\u{1b}["), "log file must not contain ANSI escapes");
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let msg = format!("{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
#[serial]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use eelc::cli::{run, Cli, Commands};

    // A config that does not exist still gets as far as the first event.
    let cli = Cli {
        log_file: PathBuf::from("eelc.log"),
        command: Commands::Footprints {
            path: PathBuf::from("tiles"),
            config: PathBuf::from("dummy.yaml"),
        },
    };

    let err = run(cli).await.unwrap_err();
    assert!(err.to_string().contains("Configuration not found"));

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

#[tokio::test]
#[serial]
async fn default_config_is_resolved_against_working_directory() {
    use eelc::cli::{run, Cli, Commands, DEFAULT_CONFIG};

    let dir = tempdir().unwrap();
    let tiles = dir.path().join("tiles");
    std::fs::create_dir(&tiles).unwrap();
    write_config(dir.path(), Path::new("unused.json"));

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    let result = run(Cli {
        log_file: PathBuf::from("eelc.log"),
        command: Commands::Footprints {
            path: tiles,
            config: PathBuf::from(DEFAULT_CONFIG),
        },
    })
    .await;
    std::env::set_current_dir(previous).unwrap();

    result.unwrap();
    assert!(dir.path().join("dat").join("tiles.geojson").exists());
}
