//! Builders for the simple secret types: password, RSA, SSH, basic-auth and
//! dockerconfigjson.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::ResourceExt;
use serde_json::json;
use tracing::info;

use crate::controller::error::{ReconcilerError, Result};
use crate::controller::quarks_secret::apply;
use crate::controller::Ctx;
use crate::crd::{QuarksSecret, SecretReference};
use crate::credsgen::PasswordGenerationRequest;

const SECRET_TYPE_BASIC_AUTH: &str = "kubernetes.io/basic-auth";
const SECRET_TYPE_DOCKER_CONFIG_JSON: &str = "kubernetes.io/dockerconfigjson";
const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

pub async fn create_password_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    info!("Generating password for '{}'", qsec.namespaced_name());
    let password = ctx
        .generator
        .generate_password(&qsec.name_any(), PasswordGenerationRequest::default());

    let mut secret = apply::new_target_secret(qsec);
    secret.string_data = Some(BTreeMap::from([("password".to_string(), password)]));

    apply::create_secrets(ctx, qsec, secret).await
}

pub async fn create_rsa_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    info!("Generating RSA key for '{}'", qsec.namespaced_name());
    let key = ctx
        .generator
        .generate_rsa_key(&qsec.name_any())
        .map_err(ReconcilerError::Generation)?;

    let mut secret = apply::new_target_secret(qsec);
    secret.string_data = Some(BTreeMap::from([
        ("private_key".to_string(), key.private_key),
        ("public_key".to_string(), key.public_key),
    ]));

    apply::create_secrets(ctx, qsec, secret).await
}

pub async fn create_ssh_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    info!("Generating SSH key for '{}'", qsec.namespaced_name());
    let key = ctx
        .generator
        .generate_ssh_key(&qsec.name_any())
        .map_err(ReconcilerError::Generation)?;

    let mut secret = apply::new_target_secret(qsec);
    secret.string_data = Some(BTreeMap::from([
        ("private_key".to_string(), key.private_key),
        ("public_key".to_string(), key.public_key),
        ("public_key_fingerprint".to_string(), key.fingerprint),
    ]));

    apply::create_secrets(ctx, qsec, secret).await
}

pub async fn create_basic_auth_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    let preset = &qsec.spec.request.basic_auth.username;
    let username = if preset.is_empty() {
        ctx.generator.generate_password(
            &format!("{}/username", qsec.name_any()),
            PasswordGenerationRequest::default(),
        )
    } else {
        preset.clone()
    };
    let password = ctx.generator.generate_password(
        &format!("{}/password", qsec.name_any()),
        PasswordGenerationRequest::default(),
    );

    let mut secret = apply::new_target_secret(qsec);
    secret.type_ = Some(SECRET_TYPE_BASIC_AUTH.into());
    secret.string_data = Some(BTreeMap::from([
        ("username".to_string(), username),
        ("password".to_string(), password),
    ]));

    apply::create_secrets(ctx, qsec, secret).await
}

pub async fn create_docker_config_json_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    info!("Generating dockerconfigjson for '{}'", qsec.namespaced_name());
    let request = &qsec.spec.request.image_credentials;
    let namespace = qsec
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("QuarksSecret has no namespace".into()))?;

    let mut username = String::new();
    if !request.username.name.is_empty() {
        username = resolve_secret_value(ctx, &namespace, &request.username, "username").await?;
    }
    if username.is_empty() {
        username = ctx.generator.generate_password(
            &format!("{}/username", qsec.name_any()),
            PasswordGenerationRequest::default(),
        );
    }

    let mut password = String::new();
    if !request.password.name.is_empty() {
        password = resolve_secret_value(ctx, &namespace, &request.password, "password").await?;
    }
    if password.is_empty() {
        password = ctx.generator.generate_password(
            &format!("{}/password", qsec.name_any()),
            PasswordGenerationRequest::default(),
        );
    }

    let payload = docker_config_json(&request.registry, &username, &password, &request.email);

    let mut secret = apply::new_target_secret(qsec);
    secret.type_ = Some(SECRET_TYPE_DOCKER_CONFIG_JSON.into());
    secret.string_data = Some(BTreeMap::from([(
        DOCKER_CONFIG_JSON_KEY.to_string(),
        payload,
    )]));

    apply::create_secrets(ctx, qsec, secret).await
}

/// The `.dockerconfigjson` payload for a single registry.
pub fn docker_config_json(registry: &str, username: &str, password: &str, email: &str) -> String {
    let auth = BASE64.encode(format!("{username}:{password}"));
    json!({
        "auths": {
            (registry): {
                "username": username,
                "password": password,
                "email": email,
                "auth": auth,
            }
        }
    })
    .to_string()
}

/// Read one key out of a referenced secret.
///
/// A missing secret is a not-ready condition (short requeue); a missing key
/// inside a present secret is a validation error that needs user attention.
pub async fn resolve_secret_value(
    ctx: &Ctx,
    namespace: &str,
    reference: &SecretReference,
    what: &str,
) -> Result<String> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let secret = api
        .get_opt(&reference.name)
        .await?
        .ok_or_else(|| ReconcilerError::SecretNotReady(format!("{what} secret not found")))?;

    let data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(&reference.key))
        .ok_or_else(|| {
            ReconcilerError::Validation(format!(
                "failed to get {what} data by key: {}",
                reference.key
            ))
        })?;

    String::from_utf8(data.0.clone()).map_err(|_| {
        ReconcilerError::Validation(format!(
            "secret '{}' key '{}' is not valid UTF-8",
            reference.name, reference.key
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_config_json_round_trips() {
        let payload = docker_config_json("registry.example.com", "user1", "pass1", "a@b.com");
        let decoded: serde_json::Value = serde_json::from_str(&payload).unwrap();

        let entry = &decoded["auths"]["registry.example.com"];
        assert_eq!(entry["username"], "user1");
        assert_eq!(entry["password"], "pass1");
        assert_eq!(entry["email"], "a@b.com");

        let auth = BASE64.decode(entry["auth"].as_str().unwrap()).unwrap();
        assert_eq!(String::from_utf8(auth).unwrap(), "user1:pass1");
    }
}
