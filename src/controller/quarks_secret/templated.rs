//! Templated config secrets: render a map of templates with values pulled
//! from other secrets.

use std::collections::BTreeMap;

use anyhow::{Context, Result as AnyResult};
use kube::ResourceExt;
use minijinja::{context, Environment, UndefinedBehavior};
use tracing::info;

use crate::controller::error::{ReconcilerError, Result};
use crate::controller::quarks_secret::{apply, generate};
use crate::controller::Ctx;
use crate::crd::{QuarksSecret, HELM_TEMPLATE};

/// Rendering engine used for templated config secrets.
///
/// `execute_map` renders every template in the map against the same set of
/// values and returns the rendered map, keyed like the input.
pub trait TemplateEngine {
    fn execute_map(
        &self,
        templates: &BTreeMap<String, String>,
        values: &BTreeMap<String, String>,
    ) -> AnyResult<BTreeMap<String, String>>;
}

/// Default engine. Values are exposed under `Values.<name>`, so templates
/// written for the Helm engine keep their shape.
#[derive(Debug, Default)]
pub struct MiniJinjaEngine;

impl TemplateEngine for MiniJinjaEngine {
    fn execute_map(
        &self,
        templates: &BTreeMap<String, String>,
        values: &BTreeMap<String, String>,
    ) -> AnyResult<BTreeMap<String, String>> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for (name, body) in templates {
            env.add_template(name, body)
                .with_context(|| format!("parsing template '{name}'"))?;
        }

        let mut rendered = BTreeMap::new();
        for name in templates.keys() {
            let output = env
                .get_template(name)?
                .render(context! { Values => values })
                .with_context(|| format!("rendering template '{name}'"))?;
            rendered.insert(name.clone(), output);
        }
        Ok(rendered)
    }
}

pub async fn create_templated_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<()> {
    info!(
        "Generating templated config for '{}'",
        qsec.namespaced_name()
    );
    let secret_data = render_secret(ctx, qsec).await?;

    let mut secret = apply::new_target_secret(qsec);
    secret.string_data = Some(secret_data);

    apply::create_secrets(ctx, qsec, secret).await
}

/// Resolve the value references and run the requested engine.
async fn render_secret(ctx: &Ctx, qsec: &QuarksSecret) -> Result<BTreeMap<String, String>> {
    let request = &qsec.spec.request.templated_config;
    if request.type_.is_empty() {
        return Err(ReconcilerError::Validation(
            "templatedConfig needs a type to be specified. E.g. helm".into(),
        ));
    }

    let namespace = qsec
        .namespace()
        .ok_or_else(|| ReconcilerError::Validation("QuarksSecret has no namespace".into()))?;

    let mut values = BTreeMap::new();
    for (name, reference) in &request.values {
        let value = generate::resolve_secret_value(ctx, &namespace, reference, name).await?;
        values.insert(name.clone(), value);
    }

    match request.type_.as_str() {
        HELM_TEMPLATE => MiniJinjaEngine
            .execute_map(&request.templates, &values)
            .map_err(ReconcilerError::Generation),
        other => Err(ReconcilerError::Validation(format!(
            "unsupported template type has been specified: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_templates_with_values() {
        let templates = BTreeMap::from([
            (
                "config.yaml".to_string(),
                "password: {{ Values.password }}".to_string(),
            ),
            ("plain".to_string(), "no interpolation".to_string()),
        ]);
        let values = BTreeMap::from([("password".to_string(), "s3cr3t".to_string())]);

        let rendered = MiniJinjaEngine.execute_map(&templates, &values).unwrap();
        assert_eq!(rendered["config.yaml"], "password: s3cr3t");
        assert_eq!(rendered["plain"], "no interpolation");
    }

    #[test]
    fn unknown_value_is_an_error() {
        let templates = BTreeMap::from([("t".to_string(), "{{ Values.missing }}".to_string())]);
        let rendered = MiniJinjaEngine.execute_map(&templates, &BTreeMap::new());
        assert!(rendered.is_err());
    }
}
