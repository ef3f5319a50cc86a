use super::*;
use serial_test::serial;
use std::env;
use std::net::IpAddr;

fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    let result = f();

    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, _) in vars {
        unsafe { env::remove_var(key) };
    }

    result
}

fn clear_lifeline_env() {
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    unsafe {
        env::remove_var("LIFELINE_PORT");
        env::remove_var("LIFELINE_BIND_ADDR");
        env::remove_var("LIFELINE_MARKETPLACE_URL");
        env::remove_var("LIFELINE_SNAPSHOT_URL");
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.port, 8080);
    assert_eq!(
        config.bind_addr,
        IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
    );
    assert_eq!(config.marketplace_url, DEFAULT_MARKETPLACE_URL);
    assert_eq!(config.snapshot_url, DEFAULT_SNAPSHOT_URL);
}

#[test]
fn test_socket_addr() {
    let config = Config::default();
    assert_eq!(config.socket_addr(), "127.0.0.1:8080");

    let config = Config {
        port: 3000,
        bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        ..Default::default()
    };
    assert_eq!(config.socket_addr(), "0.0.0.0:3000");
}

#[test]
#[serial]
fn test_from_env_with_defaults() {
    clear_lifeline_env();

    let config = Config::from_env().expect("should parse with defaults");

    assert_eq!(config.port, 8080);
    assert_eq!(
        config.bind_addr,
        IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
    );
}

#[test]
#[serial]
fn test_from_env_custom_port() {
    clear_lifeline_env();

    with_env_vars(&[("LIFELINE_PORT", "3000")], || {
        let config = Config::from_env().expect("should parse");
        assert_eq!(config.port, 3000);
    });
}

#[test]
#[serial]
fn test_from_env_custom_bind_addr() {
    clear_lifeline_env();

    with_env_vars(&[("LIFELINE_BIND_ADDR", "0.0.0.0")], || {
        let config = Config::from_env().expect("should parse");
        assert_eq!(
            config.bind_addr,
            IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
        );
    });
}

#[test]
#[serial]
fn test_from_env_custom_urls() {
    clear_lifeline_env();

    with_env_vars(
        &[
            ("LIFELINE_MARKETPLACE_URL", "http://market.internal:7070"),
            ("LIFELINE_SNAPSHOT_URL", "http://snapstore.internal:7071"),
        ],
        || {
            let config = Config::from_env().expect("should parse");
            assert_eq!(config.marketplace_url, "http://market.internal:7070");
            assert_eq!(config.snapshot_url, "http://snapstore.internal:7071");
        },
    );
}

#[test]
#[serial]
fn test_invalid_port_zero() {
    clear_lifeline_env();

    with_env_vars(&[("LIFELINE_PORT", "0")], || {
        let result = Config::from_env();
        assert!(result.is_err());

        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort { .. }));
        assert!(err.to_string().contains("invalid port"));
    });
}

#[test]
#[serial]
fn test_invalid_port_not_number() {
    clear_lifeline_env();

    with_env_vars(&[("LIFELINE_PORT", "not_a_port")], || {
        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::PortParseError { .. }
        ));
    });
}

#[test]
#[serial]
fn test_invalid_bind_addr() {
    clear_lifeline_env();

    with_env_vars(&[("LIFELINE_BIND_ADDR", "not.an.ip.address")], || {
        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidBindAddr { .. }
        ));
    });
}

#[test]
fn test_validate_rejects_non_http_urls() {
    let config = Config {
        marketplace_url: "ftp://market".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        config.validate().unwrap_err(),
        ConfigError::InvalidValue { .. }
    ));
}

#[test]
fn test_validate_success_with_defaults() {
    assert!(Config::default().validate().is_ok());
}
