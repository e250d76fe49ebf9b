//! Coordinator built from a config file, delivering through a channel and
//! publishing lifecycle events.

use std::sync::Arc;

use servitor_config::Config;
use servitor_lifecycle::prelude::*;
use servitor_test::prelude::*;

const T1: TenantId = TenantId::new(1);

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("servitor.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn collaborators(launcher: &MockLauncher, dispatcher: ChannelDispatcher) -> Collaborators {
    Collaborators::new(
        Arc::new(MockResolver::new().with_service(test_descriptor("Sync"))),
        Arc::new(launcher.clone()),
        Arc::new(MockProcessRegistry::new()),
        Arc::new(dispatcher),
    )
}

#[tokio::test]
async fn test_file_config_disables_bind_rollback() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "[coordinator]\nrollback_bind_on_launch_failure = false\n\n[events]\nchannel_capacity = 16\n",
    );
    let config = Config::load_file(&path).unwrap();
    let launcher = MockLauncher::new().failing(TEST_PROCESS);
    let (dispatcher, _deliveries) = ChannelDispatcher::channel();
    let coordinator = LifecycleCoordinator::from_config(collaborators(&launcher, dispatcher), &config);
    let connection = MockConnection::new();

    assert_eq!(coordinator.events().capacity(), 16);
    let proxy = coordinator
        .bind_service(
            T1,
            test_request("Sync"),
            test_descriptor("Sync"),
            &connection,
            BindFlags::AUTO_CREATE,
            TEST_APP_UID,
        )
        .await
        .unwrap();

    assert!(proxy.is_none());
    assert_eq!(coordinator.client_count(T1, &test_component("Sync")), Some(1));
    assert_eq!(connection.active_links(), 1);
}

#[tokio::test]
async fn test_invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[events]\nchannel_capacity = 0\n");

    assert!(Config::load_file(&path).is_err());
}

#[tokio::test]
async fn test_starts_are_delivered_through_the_channel() {
    let launcher = MockLauncher::new();
    let (dispatcher, mut deliveries) = ChannelDispatcher::channel();
    let coordinator =
        LifecycleCoordinator::from_config(collaborators(&launcher, dispatcher), &Config::default());

    for _ in 0..2 {
        coordinator
            .start_service(T1, test_request("Sync"), TEST_APP_UID)
            .await
            .unwrap();
    }

    let first = deliveries.recv().await.unwrap();
    let second = deliveries.recv().await.unwrap();
    assert_eq!(first.start_id, StartId::new(1));
    assert_eq!(second.start_id, StartId::new(2));
    assert_eq!(second.request, test_request("Sync"));
    assert_eq!(second.process.uid, 110_042);
    assert_eq!(launcher.launch_count(), 2);
}

#[tokio::test]
async fn test_lifecycle_publishes_events_in_order() {
    let launcher = MockLauncher::new();
    let (dispatcher, _deliveries) = ChannelDispatcher::channel();
    let coordinator =
        LifecycleCoordinator::from_config(collaborators(&launcher, dispatcher), &Config::default());
    let mut tenant_events = coordinator.events().subscribe_tenant(T1);
    let mut other_events = coordinator.events().subscribe_tenant(TenantId::new(2));
    let k = test_component("Sync");
    let connection = MockConnection::new();

    coordinator
        .start_service(T1, test_request("Sync"), TEST_APP_UID)
        .await
        .unwrap();
    coordinator
        .bind_service(
            T1,
            test_request("Sync"),
            test_descriptor("Sync"),
            &connection,
            BindFlags::NONE,
            TEST_APP_UID,
        )
        .await
        .unwrap();
    coordinator.stop_service(T1, &k, SENTINEL_LAST);
    connection.kill();
    coordinator.stop_service(T1, &k, SENTINEL_LAST);
    coordinator.on_destroyed(T1, &k);
    coordinator.process_terminated(T1, TEST_PROCESS);

    let types: Vec<&'static str> = tenant_events
        .drain()
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        types,
        vec![
            "service_started",
            "service_bound",
            "stop_refused",
            "binding_died",
            "service_stopped",
            "service_destroyed",
            "process_terminated",
        ]
    );
    assert!(other_events.drain().is_empty());
}

#[tokio::test]
async fn test_bound_event_reports_first_binding() {
    let launcher = MockLauncher::new();
    let (dispatcher, _deliveries) = ChannelDispatcher::channel();
    let coordinator =
        LifecycleCoordinator::from_config(collaborators(&launcher, dispatcher), &Config::default());
    let mut events = coordinator.subscribe();
    let connection = MockConnection::new();

    for _ in 0..2 {
        coordinator
            .bind_service(
                T1,
                test_request("Sync"),
                test_descriptor("Sync"),
                &connection,
                BindFlags::AUTO_CREATE,
                TEST_APP_UID,
            )
            .await
            .unwrap();
    }

    let firsts: Vec<bool> = events
        .drain()
        .iter()
        .filter_map(|e| match &**e {
            LifecycleEvent::ServiceBound { first_binding, client_count, .. } => {
                assert_eq!(*client_count, 1);
                Some(*first_binding)
            },
            _ => None,
        })
        .collect();
    assert_eq!(firsts, vec![true, false]);
}

#[test]
fn test_file_logging_section_builds_log_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "[logging]\nlevel = \"debug\"\nformat = \"json\"\ndirectives = [\"servitor_lifecycle=trace\"]\n",
    );
    let config = Config::load_file(&path).unwrap();

    let log = servitor_telemetry::LogConfig::try_from(&config.logging).unwrap();

    assert_eq!(log.level, "debug");
    assert_eq!(log.format, servitor_telemetry::LogFormat::Json);
    assert_eq!(log.directives, vec!["servitor_lifecycle=trace".to_owned()]);
    assert_eq!(log.target, servitor_telemetry::LogTarget::Stderr);
}
