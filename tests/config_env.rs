use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use intruder_watch::{BackendConfig, BackendKind, PipelineConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

const KEY_HEX: &str = "8f3b1c2d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f9";

fn clear_env() {
    for key in [
        "INTRUDER_ENV_PATH",
        "INTRUDER_CONFIG",
        "ENCRYPTION_KEY",
        "CLOUD_SERVICE",
        "CLOUDINARY_CLOUD_NAME",
        "CLOUDINARY_API_KEY",
        "CLOUDINARY_API_SECRET",
        "DROPBOX_API_KEY",
        "INTRUDER_LOCAL_UPLOAD_DIR",
        "INTRUDER_CAMERA",
        "INTRUDER_FRAME_WIDTH",
        "INTRUDER_FRAME_HEIGHT",
        "INTRUDER_CAPTURE_DIR",
        "INTRUDER_UPLOAD_FOLDER",
        "INTRUDER_LOG_FILE",
        "INTRUDER_CLIP_SECS",
        "INTRUDER_CLIP_FPS",
        "INTRUDER_DARK_THRESHOLD",
        "INTRUDER_DARK_INTERVAL_SECS",
        "INTRUDER_FRAME_INTERVAL_MS",
        "INTRUDER_UPLOAD_TIMEOUT_SECS",
        "INTRUDER_UPLOAD_ATTEMPTS",
    ] {
        std::env::remove_var(key);
    }
}

/// Points the env-file lookup at a path that does not exist, so a developer's
/// own tokens.env never leaks into the test.
fn no_env_file() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var("INTRUDER_ENV_PATH", dir.path().join("missing.env"));
    dir
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let _env_dir = no_env_file();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": { "device": "stub://porch", "width": 320, "height": 240 },
        "detector": { "dark_threshold": 25.5, "clip_secs": 8, "priming_frames": 4 },
        "storage": { "capture_dir": "/var/lib/intruder", "upload_folder": "porch" },
        "upload": { "service": "local", "local_dir": "/srv/uploads", "attempts": 5 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("INTRUDER_CONFIG", file.path());
    std::env::set_var("ENCRYPTION_KEY", KEY_HEX);
    std::env::set_var("INTRUDER_FRAME_WIDTH", "640");
    std::env::set_var("INTRUDER_CLIP_SECS", "3");

    let cfg = PipelineConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://porch");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 240);
    assert_eq!(cfg.detector.dark_threshold, 25.5);
    assert_eq!(cfg.detector.clip_duration, Duration::from_secs(3));
    assert_eq!(cfg.detector.priming_frames, 4);
    assert_eq!(cfg.storage.capture_dir, PathBuf::from("/var/lib/intruder"));
    assert_eq!(cfg.detector.capture_dir, cfg.storage.capture_dir);
    assert_eq!(cfg.storage.upload_folder, "porch");
    assert_eq!(cfg.upload.attempts, 5);
    assert_eq!(cfg.backend.kind(), BackendKind::Local);
    assert!(matches!(
        &cfg.backend,
        BackendConfig::Local { root } if root == &PathBuf::from("/srv/uploads")
    ));
    assert_eq!(cfg.key.to_hex(), KEY_HEX);

    clear_env();
}

#[test]
fn env_file_seeds_credentials() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut env_file = NamedTempFile::new().expect("temp env file");
    let contents = format!(
        "ENCRYPTION_KEY={}\nCLOUDINARY_CLOUD_NAME=demo\nCLOUDINARY_API_KEY=1234\nCLOUDINARY_API_SECRET=s3cret\n",
        KEY_HEX
    );
    std::io::Write::write_all(&mut env_file, contents.as_bytes()).expect("write env file");
    std::env::set_var("INTRUDER_ENV_PATH", env_file.path());

    let cfg = PipelineConfig::load().expect("load config");

    match &cfg.backend {
        BackendConfig::Cloudinary(creds) => {
            assert_eq!(creds.cloud_name, "demo");
            assert_eq!(creds.api_key, "1234");
        }
        other => panic!("expected cloudinary backend, got {:?}", other),
    }
    assert_eq!(cfg.storage.upload_folder, "webcam_captures");
    assert_eq!(cfg.storage.log_path(), PathBuf::from("motion_captures/intruder.log"));
    assert!(!format!("{:?}", cfg).contains("s3cret"));

    clear_env();
}

#[test]
fn missing_secrets_are_reported_together() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let _env_dir = no_env_file();
    std::env::set_var("INTRUDER_CLIP_FPS", "fast");

    let err = PipelineConfig::load().expect_err("config should be rejected");

    let problems = err.problems.join("\n");
    assert!(problems.contains("ENCRYPTION_KEY"));
    assert!(problems.contains("CLOUDINARY_CLOUD_NAME"));
    assert!(problems.contains("CLOUDINARY_API_SECRET"));
    assert!(problems.contains("INTRUDER_CLIP_FPS"));

    clear_env();
}

#[test]
fn unreadable_config_file_is_reported_with_missing_secrets() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let _env_dir = no_env_file();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ \"camera\": ").expect("write config");
    std::env::set_var("INTRUDER_CONFIG", file.path());
    std::env::set_var("CLOUD_SERVICE", "local");

    let err = PipelineConfig::load().expect_err("config should be rejected");

    let problems = err.problems.join("\n");
    assert!(problems.contains("invalid config file"), "{}", problems);
    assert!(problems.contains("ENCRYPTION_KEY must be set"), "{}", problems);

    clear_env();
}

#[test]
fn broken_env_file_is_reported_with_missing_secrets() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_dir = tempfile::tempdir().expect("temp dir");
    // A directory where the env file should be fails to load without being "not found".
    std::env::set_var("INTRUDER_ENV_PATH", env_dir.path());
    std::env::set_var("CLOUD_SERVICE", "local");

    let err = PipelineConfig::load().expect_err("config should be rejected");

    let problems = err.problems.join("\n");
    assert!(problems.contains("failed to load env file"), "{}", problems);
    assert!(problems.contains("ENCRYPTION_KEY must be set"), "{}", problems);

    clear_env();
}
