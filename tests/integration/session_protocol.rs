//! Session protocol and device access over a scripted RouterOS console
//!
//! These tests verify that:
//! - Sessions return to Ready after every command
//! - A hung command disconnects the session and the registry reconnects
//! - Typed reads and validated mutations travel end to end
//! - One unreachable device does not affect another

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use routeros_monitoring::{
    device::{DeviceRegistry, commands},
    session::{
        SessionClient, SessionConfig, SessionError, SessionState,
        mock::{ScriptedFactory, ScriptedTransport},
        ssh::SshTarget,
    },
};

fn short_timeouts() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_millis(500),
        prompt_timeout: Duration::from_millis(300),
        command_timeout: Duration::from_millis(300),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_every_command_returns_to_ready() {
    let transport = ScriptedTransport::new("admin", "core")
        .respond("/system identity print", "name: core")
        .respond("/ip address print", "0 192.168.88.1/24 192.168.88.0 bridge")
        .respond("/interface print count-only", "12")
        .chunked(7);
    let mut session = SessionClient::new(Box::new(transport), SessionConfig::default());
    session.connect().await.unwrap();

    for (command, expected) in [
        ("/system identity print", "name: core"),
        ("/ip address print", "0 192.168.88.1/24 192.168.88.0 bridge"),
        ("/interface print count-only", "12"),
    ] {
        let output = session.execute(command).await.unwrap();
        assert_eq!(output.stdout, expected);
        assert_eq!(session.state(), SessionState::Ready);
    }
}

#[tokio::test]
async fn test_execute_without_connect_fails_fast() {
    let mut session = SessionClient::new(
        Box::new(ScriptedTransport::new("admin", "core")),
        SessionConfig::default(),
    );

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        session.execute("/system identity print"),
    )
    .await
    .expect("execute before connect must not hang");

    assert_matches!(result, Err(SessionError::InvalidState { .. }));
}

#[tokio::test]
async fn test_hung_command_forces_reconnect() {
    let template = ScriptedTransport::new("admin", "core")
        .respond("/system identity print", "name: core")
        .hang_on("/tool torch interface=ether1");
    let log = template.log();
    let registry = DeviceRegistry::new(Arc::new(ScriptedFactory::new(template)), short_timeouts());
    registry
        .add_device("mikrotik_10.0.0.1", SshTarget::password("10.0.0.1", "admin", "secret"))
        .await;

    let hung = registry
        .execute_on_device("mikrotik_10.0.0.1", "/tool torch interface=ether1")
        .await;
    assert_matches!(hung, Err(SessionError::CommandTimeout { .. }));

    let session = registry.session("mikrotik_10.0.0.1").await.unwrap();
    assert_eq!(session.lock().await.state(), SessionState::Ready);
    drop(session);

    let output = registry
        .execute_on_device("mikrotik_10.0.0.1", "/system identity print")
        .await
        .unwrap();
    assert_eq!(output.stdout, "name: core");
    assert_eq!(log.opens(), 2);
}

#[tokio::test]
async fn test_queue_added_then_listed() {
    let add = commands::add_queue("guest", "192.168.88.0/24", "10M/10M", Some("guests")).unwrap();
    let listing = "Flags: X - disabled, I - invalid, D - dynamic\n\
                   name: guest\n\
                   target: 192.168.88.0/24\n\
                   max-limit: 10M/10M\n\
                   priority: 8/8\n\
                   comment: guests";
    let template = ScriptedTransport::new("admin", "core")
        .respond(&add, "")
        .respond(commands::SIMPLE_QUEUES, listing);
    let log = template.log();
    let registry = DeviceRegistry::new(Arc::new(ScriptedFactory::new(template)), SessionConfig::default());
    registry
        .add_device("mikrotik_10.0.0.1", SshTarget::password("10.0.0.1", "admin", "secret"))
        .await;
    let client = registry.client("mikrotik_10.0.0.1").await.unwrap();

    assert!(client.add_queue("guest", "192.168.88.0/24", "10M/10M", Some("guests")).await.unwrap());
    let queues = client.queues().await.unwrap();

    assert_eq!(queues.len(), 1);
    assert_eq!(queues[0].name, "guest");
    assert_eq!(queues[0].max_limit, "10M/10M");
    assert_eq!(queues[0].comment, "guests");
    assert_eq!(log.commands(), vec![add, commands::SIMPLE_QUEUES.to_string()]);
}

#[tokio::test]
async fn test_rejected_arguments_never_reach_device() {
    let template = ScriptedTransport::new("admin", "core");
    let log = template.log();
    let registry = DeviceRegistry::new(Arc::new(ScriptedFactory::new(template)), SessionConfig::default());
    registry
        .add_device("mikrotik_10.0.0.1", SshTarget::password("10.0.0.1", "admin", "secret"))
        .await;
    let client = registry.client("mikrotik_10.0.0.1").await.unwrap();

    let result = client
        .add_dhcp_lease("192.168.88.300", "AA:BB:CC:00:00:01", None)
        .await;

    assert_matches!(result, Err(SessionError::InvalidArgument(_)));
    assert!(log.commands().is_empty());
}

#[tokio::test]
async fn test_unreachable_device_is_isolated() {
    let factory = ScriptedFactory::new(
        ScriptedTransport::new("admin", "core").respond("/system identity print", "name: core"),
    )
    .with_host("10.0.0.2", ScriptedTransport::new("admin", "edge").unreachable());
    let registry = DeviceRegistry::new(Arc::new(factory), short_timeouts());
    registry
        .add_device("mikrotik_10.0.0.1", SshTarget::password("10.0.0.1", "admin", "secret"))
        .await;
    registry
        .add_device("mikrotik_10.0.0.2", SshTarget::password("10.0.0.2", "admin", "secret"))
        .await;

    let (ok, failed) = tokio::join!(
        registry.execute_on_device("mikrotik_10.0.0.1", "/system identity print"),
        registry.execute_on_device("mikrotik_10.0.0.2", "/system identity print"),
    );

    assert_eq!(ok.unwrap().stdout, "name: core");
    assert_matches!(failed, Err(SessionError::Transport(_)));
}
