use std::{env, fs, time::Duration};

use socialgate_auth::config::ProtocolVersion;
use socialgate_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("socialgate.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081

[logging]
level = "warn"
ansi = false

[federation]
version = 1
domain = "https://api.stitchz.net/"
app_secret = "s3cret"
request_timeout = "10s"

[redirects]
users_can_register = true
registration_url = "/signup"

[session]
cookie_name = "sg"
ttl = "1h"

[access]
admin_accounts = ["1"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level, "warn");
    assert!(!cfg.logging.ansi);
    assert_eq!(cfg.federation.version, ProtocolVersion::V1);
    assert_eq!(cfg.federation.request_timeout, Duration::from_secs(10));
    assert_eq!(cfg.federation.trusted_domain, "stitchz.net");
    assert!(cfg.redirects.users_can_register);
    assert_eq!(cfg.redirects.without_profile(), "/signup");
    assert_eq!(cfg.redirects.profile_url, "/profile");
    assert_eq!(cfg.session.cookie_name, "sg");
    assert_eq!(cfg.session.ttl, Duration::from_secs(3600));
    assert_eq!(cfg.access.admin_accounts, vec!["1".to_string()]);

    // 2) Env override should win over file
    unsafe {
        env::set_var("SOCIALGATE__LOGGING__LEVEL", "debug");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.logging.level, "debug");
    unsafe {
        env::remove_var("SOCIALGATE__LOGGING__LEVEL");
    }

    // 3) v2 without a client id is rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[federation]
version = "v2"
redirect_url = "https://www.example.com/"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("federation.api_key"), "{err}");

    // 4) A provider outside the trusted domain is rejected
    let untrusted_path = dir.path().join("untrusted.toml");
    let untrusted_toml = r#"
[federation]
version = 1
domain = "https://evil.example.com/"
"#;
    fs::write(&untrusted_path, untrusted_toml).expect("write untrusted toml");
    let err = load_config(untrusted_path.to_str()).expect_err("expected endpoint error");
    assert!(err.contains("federation.domain"), "{err}");

    // 5) Unknown log level is rejected
    let bad_level_path = dir.path().join("bad_level.toml");
    fs::write(
        &bad_level_path,
        "[logging]\nlevel = \"loud\"\n[federation]\nversion = 1\n",
    )
    .expect("write bad level toml");
    let err = load_config(bad_level_path.to_str()).expect_err("expected level error");
    assert!(err.contains("logging.level"), "{err}");
}
