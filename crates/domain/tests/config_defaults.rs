use cf_domain::config::{Config, QueueBackend, StoreBackend};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8430
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn default_backends_are_in_memory() {
    let config = Config::default();
    assert_eq!(config.transport.queue_backend, QueueBackend::Memory);
    assert_eq!(config.transport.store_backend, StoreBackend::Memory);
}

#[test]
fn backend_names_parse_from_toml() {
    let toml_str = r#"
[transport]
queue_backend = "external"
store_backend = "relational"
database_url = "sqlite://careflow.db"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.transport.queue_backend, QueueBackend::External);
    assert_eq!(config.transport.store_backend, StoreBackend::Relational);
}

#[test]
fn response_ttl_honors_the_grace_floor() {
    // Responses must stay readable for at least five minutes after the
    // terminal event.
    let config = Config::default();
    assert!(config.transport.response_ttl_secs >= 300);
}
