use pce_core::*;

#[test]
fn test_image_reference_validation() {
    // Valid references
    assert!(ImageReference::new("alpine").is_ok());
    assert!(ImageReference::new("alpine:3.19").is_ok());
    assert!(ImageReference::new("docker.io/library/ubuntu:22.04").is_ok());
    assert!(ImageReference::new("localhost:5000/app@sha256:0123abcd").is_ok());
    assert!(ImageReference::new("my_registry.example.com/a-b/c_d:v1.2").is_ok());

    // Invalid references - empty
    assert!(ImageReference::new("").is_err());

    // Invalid references - too long
    assert!(ImageReference::new("a".repeat(513)).is_err());

    // Invalid references - bad characters
    assert!(ImageReference::new("alpine latest").is_err());
    assert!(ImageReference::new("alpine\\tag").is_err());
    assert!(ImageReference::new("alpine;rm -rf").is_err());
    assert!(ImageReference::new("$(whoami)").is_err());
}

#[test]
fn test_image_reference_error_kind() {
    let err = ImageReference::new("").unwrap_err();
    assert!(matches!(
        err,
        Error::Provider(ProviderError::InvalidReference { .. })
    ));
}

#[test]
fn test_image_reference_serialization() {
    let reference = ImageReference::new("alpine:3.19").unwrap();

    let json = serde_json::to_string(&reference).unwrap();
    assert_eq!(json, "\"alpine:3.19\"");

    let deserialized: ImageReference = serde_json::from_str(&json).unwrap();
    assert_eq!(reference, deserialized);
}

#[test]
fn test_default_command_entrypoint_and_cmd() {
    let command = ImageCommand::new(
        vec!["/bin/sh".to_string()],
        vec!["-c".to_string(), "echo hi".to_string()],
    );

    assert_eq!(
        command.effective().unwrap(),
        vec!["/bin/sh", "-c", "echo hi"]
    );
}

#[test]
fn test_default_command_cmd_only() {
    let command = ImageCommand::new(Vec::new(), vec!["echo".to_string(), "hi".to_string()]);
    assert_eq!(command.effective().unwrap(), vec!["echo", "hi"]);
}

#[test]
fn test_default_command_none() {
    assert!(ImageCommand::default().effective().is_none());
}

#[test]
fn test_image_command_deserialize_missing_fields() {
    let command: ImageCommand = serde_json::from_str(r#"{"cmd":["sh"]}"#).unwrap();
    assert!(command.entrypoint.is_empty());
    assert_eq!(command.cmd, vec!["sh"]);
}

#[test]
fn test_process_id() {
    let pid = ProcessId::from_raw(1234);
    assert_eq!(pid.as_raw(), 1234);
    assert_eq!(pid.as_nix_pid(), nix::unistd::Pid::from_raw(1234));
}

#[test]
fn test_termination_state_from_exit_status() {
    let status = std::process::Command::new("sh")
        .args(["-c", "exit 3"])
        .status()
        .unwrap();

    let state = TerminationState::from(status);
    assert_eq!(state, TerminationState::Exited { code: 3 });
    assert_eq!(state.exit_code(), 3);
}

#[test]
fn test_termination_state_serialization() {
    let state = TerminationState::Signaled { signal: 9 };
    let json = serde_json::to_string(&state).unwrap();
    assert_eq!(json, r#"{"state":"signaled","signal":9}"#);
}

#[test]
fn test_runtime_config_roundtrip() {
    let config = RuntimeConfig::new()
        .with_hostname("box")
        .with_absolute_symlinks(AbsoluteSymlinks::RootRelative);

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, deserialized);
}

#[test]
fn test_runtime_config_rejects_bad_hostname() {
    let config = RuntimeConfig::new().with_hostname("not valid");
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig { .. })
    ));
}

#[test]
fn test_byte_size_comparison() {
    let small = ByteSize::from_mb(256);
    let large = ByteSize::from_mb(512);

    assert!(small < large);
    assert_eq!(small, ByteSize::from_mb(256));
}

#[test]
fn test_constants() {
    assert_eq!(constants::REENTRY_SUBCOMMAND, "internalrun");
    assert_eq!(constants::DEFAULT_HOSTNAME, "container");
    assert_eq!(constants::EXTRACTED_MODE, 0o755);
}
