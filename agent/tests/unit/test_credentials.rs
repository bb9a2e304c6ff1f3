//! Credential resolution tests

use std::collections::HashMap;
use std::sync::Arc;

use appliance_backup::authn::credentials::{CredentialResolver, TokenSource};
use appliance_backup::errors::BackupError;
use appliance_backup::models::device::Device;
use secrecy::ExposeSecret;

fn resolver(vars: &[(&str, &str)]) -> CredentialResolver {
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    CredentialResolver::new(Arc::new(env))
}

#[test]
fn test_name_token_wins_over_host_and_global() {
    let resolver = resolver(&[
        ("API_TOKEN_BRANCH_OFFICE", "name-token"),
        ("API_TOKEN_192_168_1_99", "host-token"),
        ("API_TOKEN", "global-token"),
    ]);
    let device = Device::new("192.168.1.99", Some("Branch Office".to_string()));

    let credential = resolver.resolve(&device).unwrap();
    assert_eq!(credential.token.expose_secret(), "name-token");
    assert_eq!(credential.source, TokenSource::Name);
    assert_eq!(credential.key, "API_TOKEN_BRANCH_OFFICE");
}

#[test]
fn test_host_token_wins_over_global() {
    let resolver = resolver(&[
        ("API_TOKEN_192_168_1_99", "host-token"),
        ("API_TOKEN", "global-token"),
    ]);
    let device = Device::new("192.168.1.99", Some("Branch Office".to_string()));

    let credential = resolver.resolve(&device).unwrap();
    assert_eq!(credential.token.expose_secret(), "host-token");
    assert_eq!(credential.source, TokenSource::Host);
}

#[test]
fn test_host_key_ignores_port() {
    let resolver = resolver(&[("API_TOKEN_10_0_0_1", "host-token")]);
    let device = Device::new("10.0.0.1:8443", None);

    let credential = resolver.resolve(&device).unwrap();
    assert_eq!(credential.source, TokenSource::Host);
}

#[test]
fn test_falls_back_to_global() {
    let resolver = resolver(&[("API_TOKEN", "global-token")]);
    let device = Device::new("10.0.0.1", None);

    let credential = resolver.resolve(&device).unwrap();
    assert_eq!(credential.token.expose_secret(), "global-token");
    assert_eq!(credential.source, TokenSource::Global);
}

#[test]
fn test_empty_values_are_unset() {
    let resolver = resolver(&[
        ("API_TOKEN_EDGE", ""),
        ("API_TOKEN_10_0_0_1", "   "),
        ("API_TOKEN", "global-token"),
    ]);
    let device = Device::new("10.0.0.1", Some("Edge".to_string()));

    let credential = resolver.resolve(&device).unwrap();
    assert_eq!(credential.source, TokenSource::Global);
}

#[test]
fn test_missing_token_lists_checked_keys() {
    let resolver = resolver(&[]);
    let device = Device::new("10.0.0.1", Some("Edge".to_string()));

    match resolver.resolve(&device) {
        Err(BackupError::AuthError {
            display_name,
            checked_keys,
        }) => {
            assert_eq!(display_name, "Edge");
            assert_eq!(
                checked_keys,
                vec!["API_TOKEN_EDGE", "API_TOKEN_10_0_0_1", "API_TOKEN"]
            );
        }
        other => panic!("expected auth error, got {:?}", other),
    }
}
