//! # Configuration Loading and Reload Tests

use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use indirect_agent_lb::{
    ConfigManager, ConfigProvider, IndirectAgentLoadBalancer, LbConfig, StaticHostInventory,
};

const INITIAL_CONFIG: &str = r#"
management_server:
  addresses: "192.168.10.10, 192.168.10.11, 192.168.10.12"
  lb_algorithm: static
inventory:
  hosts:
    - { id: 1, data_center_id: 1, hypervisor_type: KVM }
    - { id: 2, data_center_id: 1, hypervisor_type: KVM }
"#;

const UPDATED_CONFIG: &str = r#"
management_server:
  addresses: "192.168.10.10, 192.168.10.11, 192.168.10.12"
  lb_algorithm: roundrobin
  lb_check_interval: 45s
inventory:
  hosts:
    - { id: 1, data_center_id: 1, hypervisor_type: KVM }
    - { id: 2, data_center_id: 1, hypervisor_type: KVM }
"#;

#[tokio::test]
async fn test_load_yaml_and_json() {
    let dir = tempfile::tempdir().unwrap();

    let yaml_path = dir.path().join("agent-lb.yaml");
    fs::write(&yaml_path, INITIAL_CONFIG).await.unwrap();
    let config = LbConfig::load_from_file(&yaml_path).await.unwrap();
    assert_eq!(config.inventory.hosts.len(), 2);

    let json_path = dir.path().join("agent-lb.json");
    fs::write(&json_path, serde_json::to_string(&config).unwrap()).await.unwrap();
    let from_json = LbConfig::load_from_file(&json_path).await.unwrap();
    assert_eq!(from_json, config);
}

#[tokio::test]
async fn test_invalid_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-lb.yaml");
    fs::write(&path, "management_server:\n  lb_algorithm: invalid-algo\n").await.unwrap();

    let err = ConfigManager::load(&path).await.err().expect("validation error");
    assert_eq!(err.error_type(), "configuration_error");
    assert!(err.to_string().contains("invalid-algo"));

    let missing = ConfigManager::load(dir.path().join("missing.yaml")).await.err().expect("read error");
    assert_eq!(missing.error_type(), "io_error");
    assert!(missing.is_retryable());
}

#[tokio::test]
async fn test_manual_reload_switches_algorithm() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-lb.yaml");
    fs::write(&path, INITIAL_CONFIG).await.unwrap();

    let manager = Arc::new(ConfigManager::load(&path).await.unwrap());
    let inventory = Arc::new(StaticHostInventory::from_hosts(manager.get_config().inventory.hosts));
    let lb = IndirectAgentLoadBalancer::new(manager.clone(), inventory);
    let mut changes = manager.subscribe_to_changes();

    let before = lb.get_management_server_list(Some(2), 1, None).unwrap();
    assert_eq!(before, vec!["192.168.10.10", "192.168.10.11", "192.168.10.12"]);

    fs::write(&path, UPDATED_CONFIG).await.unwrap();
    manager.reload_config().await.unwrap();

    let event = changes.recv().await.unwrap();
    assert_eq!(event.config.management_server.lb_algorithm, "roundrobin");
    assert_eq!(manager.lb_check_interval(None), Duration::from_secs(45));

    let after = lb.get_management_server_list(Some(2), 1, None).unwrap();
    assert_eq!(after, vec!["192.168.10.11", "192.168.10.12", "192.168.10.10"]);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-lb.yaml");
    fs::write(&path, INITIAL_CONFIG).await.unwrap();

    let manager = ConfigManager::load(&path).await.unwrap();
    fs::write(&path, "management_server: 42\n").await.unwrap();

    let err = manager.reload_config().await.unwrap_err();
    assert_eq!(err.error_type(), "yaml_error");
    assert_eq!(manager.lb_algorithm(1), "static");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_watcher_reloads_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-lb.yaml");
    fs::write(&path, INITIAL_CONFIG).await.unwrap();

    let manager = ConfigManager::watch(&path).await.unwrap();
    let mut changes = manager.subscribe_to_changes();

    fs::write(&path, UPDATED_CONFIG).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), changes.recv())
        .await
        .expect("reload within timeout")
        .unwrap();
    assert_eq!(event.file_path, path);
    assert_eq!(manager.lb_algorithm(1), "roundrobin");
}
