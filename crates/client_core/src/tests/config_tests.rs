use std::io::Write;

use super::*;

const FULL: &str = r#"
provider_url = "https://project.supabase.co/"
provider_anon_key = "anon-key"
backend_url = "http://localhost:8000/"
"#;

#[test]
fn parses_toml_and_defaults_redirect_url() {
    let config = ClientConfig::from_toml_str(FULL)
        .expect("parse")
        .validate()
        .expect("valid");

    assert_eq!(config.provider_url, "https://project.supabase.co");
    assert_eq!(config.backend_url, "http://localhost:8000");
    assert_eq!(config.provider_anon_key, "anon-key");
    assert_eq!(config.redirect_url, DEFAULT_REDIRECT_URL);
}

#[test]
fn missing_fields_are_reported_by_name() {
    let config = ClientConfig::from_toml_str("provider_url = \"https://p.example\"")
        .expect("parse");
    assert_eq!(
        config.validate(),
        Err(ConfigError::Missing("provider_anon_key"))
    );

    let config = ClientConfig::from_toml_str(
        "provider_url = \"https://p.example\"\nprovider_anon_key = \"k\"\nbackend_url = \"  \"",
    )
    .expect("parse");
    assert_eq!(config.validate(), Err(ConfigError::Missing("backend_url")));

    let empty = ClientConfig::from_toml_str("").expect("parse");
    assert_eq!(empty.validate(), Err(ConfigError::Missing("provider_url")));
}

#[test]
fn malformed_url_is_invalid() {
    let config = ClientConfig::from_toml_str(
        "provider_url = \"not a url\"\nprovider_anon_key = \"k\"\nbackend_url = \"http://b\"",
    )
    .expect("parse");

    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn environment_overrides_file_values() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(FULL.as_bytes()).expect("write config");
    let env: Map<String, String> = [(
        "PROFILE_SYNC__BACKEND_URL".to_string(),
        "http://backend.internal:9000".to_string(),
    )]
    .into_iter()
    .collect();

    let config = ClientConfig::load_with_env(Some(file.path()), Some(env))
        .expect("load")
        .validate()
        .expect("valid");

    assert_eq!(config.backend_url, "http://backend.internal:9000");
    assert_eq!(config.provider_anon_key, "anon-key");
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");

    let err = ClientConfig::load_with_env(Some(&missing), Some(Map::new()))
        .expect_err("missing file");

    assert!(matches!(err, ConfigError::Invalid(_)));
}
