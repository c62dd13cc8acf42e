use crate::error::{CatalogError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Immutable service → actions table.
///
/// Built once per process and shared by reference; every lookup is a pure
/// function of the table and the queried pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCatalog {
    services: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Deserialize)]
struct PolicyEditorConfig {
    #[serde(rename = "serviceMap")]
    service_map: HashMap<String, ServiceEntry>,
}

#[derive(Deserialize)]
struct ServiceEntry {
    #[serde(rename = "StringPrefix")]
    string_prefix: String,
    #[serde(rename = "Actions", default)]
    actions: Vec<String>,
}

impl ActionCatalog {
    pub fn from_services<S, A, I>(services: I) -> Self
    where
        S: Into<String>,
        A: Into<String>,
        I: IntoIterator<Item = (S, Vec<A>)>,
    {
        let mut table: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (service, actions) in services {
            table
                .entry(service.into())
                .or_default()
                .extend(actions.into_iter().map(Into::into));
        }
        Self { services: table }
    }

    /// Parse any supported catalog text.
    ///
    /// Accepts the AWS policy generator script (`app.PolicyEditorConfig={...}`),
    /// the bare JSON object it assigns, or a plain `{service: [actions]}` map.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let json = if trimmed.starts_with('{') {
            trimmed
        } else {
            let start = trimmed.find('{').ok_or_else(|| {
                CatalogError::Invalid("no JSON object found in catalog text".to_string())
            })?;
            trimmed[start..].trim_end().trim_end_matches(';')
        };

        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("serviceMap").is_some() {
            let config: PolicyEditorConfig = serde_json::from_value(value)?;
            return Ok(Self::from_policy_editor_config(config));
        }

        let plain: BTreeMap<String, Vec<String>> = serde_json::from_value(value)?;
        Ok(Self::from_services(plain))
    }

    fn from_policy_editor_config(config: PolicyEditorConfig) -> Self {
        // Several display names can share one prefix; their actions are unioned.
        Self::from_services(
            config
                .service_map
                .into_values()
                .map(|entry| (entry.string_prefix, entry.actions)),
        )
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog = Self::parse(&raw)?;
        log::info!(
            "Loaded action catalog from {} services={} actions={}",
            path.display(),
            catalog.len(),
            catalog.action_count()
        );
        Ok(catalog)
    }

    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self> {
        log::info!("Fetching action catalog from {url}");
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|source| CatalogError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|source| CatalogError::Fetch {
            url: url.to_string(),
            source,
        })?;
        let catalog = Self::parse(&body)?;
        log::info!(
            "Fetched action catalog services={} actions={}",
            catalog.len(),
            catalog.action_count()
        );
        Ok(catalog)
    }

    pub fn contains(&self, service: &str, action: &str) -> bool {
        self.services
            .get(service)
            .is_some_and(|actions| actions.contains(action))
    }

    pub fn contains_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn actions(&self, service: &str) -> Option<&BTreeSet<String>> {
        self.services.get(service)
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Catalog restricted to the given services; unknown names are skipped.
    pub fn subset<'a>(&self, services: impl IntoIterator<Item = &'a str>) -> Self {
        let mut table = BTreeMap::new();
        for service in services {
            if let Some(actions) = self.services.get(service) {
                table.insert(service.to_string(), actions.clone());
            }
        }
        Self { services: table }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn action_count(&self) -> usize {
        self.services.values().map(BTreeSet::len).sum()
    }

    /// `service: [actions]` mapping rendered for prompts.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.services)?)
    }

    /// Service name list rendered for prompts.
    pub fn service_names_yaml(&self) -> Result<String> {
        let names: Vec<&str> = self.service_names().collect();
        Ok(serde_yaml::to_string(&names)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> ActionCatalog {
        ActionCatalog::from_services([
            ("s3", vec!["GetObject", "PutObject"]),
            ("ses", vec!["ListTemplates"]),
        ])
    }

    #[test]
    fn parses_policy_generator_script() {
        let raw = r#"app.PolicyEditorConfig={"conditionOperators":[],"serviceMap":{
            "Amazon S3":{"StringPrefix":"s3","Actions":["GetObject","PutObject"],"ARNFormat":"arn:aws:s3:::<bucket>"},
            "Amazon SES":{"StringPrefix":"ses","Actions":["ListTemplates"]},
            "Amazon SES v2":{"StringPrefix":"ses","Actions":["SendEmail"]}
        }};"#;
        let catalog = ActionCatalog::parse(raw).unwrap();

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("s3", "GetObject"));
        assert!(catalog.contains("ses", "ListTemplates"));
        assert!(catalog.contains("ses", "SendEmail"));
    }

    #[test]
    fn parses_plain_service_map() {
        let catalog = ActionCatalog::parse(r#"{"sqs":["SendMessage"]}"#).unwrap();
        assert!(catalog.contains("sqs", "SendMessage"));
        assert_eq!(catalog.action_count(), 1);
    }

    #[test]
    fn rejects_text_without_json() {
        assert!(matches!(
            ActionCatalog::parse("var nothing;"),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn lookups_are_exact() {
        let catalog = sample();
        assert!(catalog.contains("s3", "PutObject"));
        assert!(!catalog.contains("s3", "putObject"));
        assert!(!catalog.contains("S3", "PutObject"));
        assert!(!catalog.contains("nonexistent-service", "PutObject"));
    }

    #[test]
    fn subset_keeps_only_known_services() {
        let subset = sample().subset(["s3", "made-up"]);
        assert_eq!(subset.service_names().collect::<Vec<_>>(), vec!["s3"]);
    }

    #[test]
    fn yaml_renders_services_and_actions() {
        let yaml = sample().subset(["s3"]).to_yaml().unwrap();
        assert_eq!(yaml, "s3:\n- GetObject\n- PutObject\n");

        let names = sample().service_names_yaml().unwrap();
        assert_eq!(names, "- s3\n- ses\n");
    }
}
