use crate::error::{PipelineError, Result};
use crate::extractor::expect_parsed;
use crate::prompts::{self, REFINED_POLICY_SHAPE};
use iam_clients::{invoke_structured, CompletionModel};
use iam_protocol::{IamPolicy, POLICY_VERSION};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};

/// The model's answer: a policy document serialized as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RefinedPolicyDocument {
    /// The refined IAM policy as a JSON document string.
    pub policy_document: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(value) => vec![value.as_str()],
            Self::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn is_one(&self) -> bool {
        matches!(self, Self::One(_))
    }

    fn into_values(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }

    /// A single value stays scalar when the original was scalar.
    fn shaped(scalar: bool, mut values: Vec<String>) -> Self {
        if scalar && values.len() == 1 {
            Self::One(values.remove(0))
        } else {
            Self::Many(values)
        }
    }
}

fn default_effect() -> String {
    "Allow".to_string()
}

fn default_version() -> String {
    POLICY_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Effect", default = "default_effect")]
    pub effect: String,
    #[serde(rename = "Action")]
    pub action: OneOrMany,
    #[serde(rename = "Resource")]
    pub resource: OneOrMany,
    /// Keys such as `Condition` are carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Final policy document as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version", default = "default_version")]
    pub version: String,
    #[serde(rename = "Statement", deserialize_with = "statements_one_or_many")]
    pub statements: Vec<PolicyStatement>,
}

fn statements_one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<PolicyStatement>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(PolicyStatement),
        Many(Vec<PolicyStatement>),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(statement) => vec![statement],
        Raw::Many(statements) => statements,
    })
}

impl From<&IamPolicy> for PolicyDocument {
    fn from(policy: &IamPolicy) -> Self {
        Self {
            version: policy.version.clone(),
            statements: policy
                .statements
                .iter()
                .map(|stmt| PolicyStatement {
                    sid: None,
                    effect: default_effect(),
                    action: OneOrMany::Many(stmt.actions.iter().cloned().collect()),
                    resource: OneOrMany::One(stmt.resource.clone()),
                    extra: serde_json::Map::new(),
                })
                .collect(),
        }
    }
}

impl PolicyDocument {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn actions(&self) -> BTreeSet<&str> {
        self.statements
            .iter()
            .flat_map(|stmt| stmt.action.values())
            .collect()
    }

    /// Four-space indented JSON.
    pub fn to_pretty_json(&self) -> Result<String> {
        iam_protocol::serialize_json_pretty(self).map_err(|err| PipelineError::Output(err.to_string()))
    }
}

/// Asks the model to tidy a draft policy, then holds the answer to the
/// draft's bounds.
pub struct PolicyRefiner {
    model: Arc<dyn CompletionModel>,
}

impl PolicyRefiner {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }

    pub async fn refine(&self, draft: &IamPolicy) -> Result<PolicyDocument> {
        if draft.is_empty() {
            log::info!("Draft policy has no actions, skipping refinement");
            return Ok(PolicyDocument::from(draft));
        }

        let draft_json = serde_json::to_string_pretty(draft)?;
        log::info!(
            "Refining policy statement_count={} action_count={}",
            draft.statements.len(),
            draft.actions().len()
        );
        let prompt = prompts::refine_policy(&draft_json);
        let answer: RefinedPolicyDocument = expect_parsed(
            REFINED_POLICY_SHAPE,
            invoke_structured(self.model.as_ref(), REFINED_POLICY_SHAPE, &prompt).await?,
        )?;

        let refined: PolicyDocument = serde_json::from_str(answer.policy_document.trim())
            .map_err(|err| PipelineError::InvalidPolicy(err.to_string()))?;
        Ok(constrain_to_draft(draft, refined))
    }
}

/// What the draft grants: each resource, placeholders wildcarded, with its actions.
struct DraftGrants<'a> {
    grants: Vec<(ResourceMatcher, &'a BTreeSet<String>)>,
}

struct ResourceMatcher {
    resource: String,
    pattern: Option<Regex>,
}

impl ResourceMatcher {
    fn new(resource: &str) -> Self {
        let resource = replace_placeholders(resource);
        let source = format!(
            "^{}$",
            regex::escape(&resource)
                .replace(r"\*", ".*")
                .replace(r"\?", ".")
        );
        Self {
            pattern: Regex::new(&source).ok(),
            resource,
        }
    }

    /// `resource` is the draft resource or a narrower match of its wildcards.
    fn covers(&self, resource: &str) -> bool {
        resource == self.resource
            || self
                .pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(resource))
    }
}

impl<'a> DraftGrants<'a> {
    fn new(draft: &'a IamPolicy) -> Self {
        Self {
            grants: draft
                .statements
                .iter()
                .map(|stmt| (ResourceMatcher::new(&stmt.resource), &stmt.actions))
                .collect(),
        }
    }

    fn grants_action(&self, action: &str) -> bool {
        self.grants.iter().any(|(_, actions)| actions.contains(action))
    }

    fn grants(&self, action: &str, resource: &str) -> bool {
        self.grants
            .iter()
            .any(|(matcher, actions)| actions.contains(action) && matcher.covers(resource))
    }
}

fn unique(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// Hold the refined document to the draft: every allowed (action, resource)
/// pair must be granted by the draft, template placeholders become wildcards,
/// and duplicates are removed.
///
/// A statement whose actions end up allowed on different resources is split
/// into one statement per resource set.
pub fn constrain_to_draft(draft: &IamPolicy, refined: PolicyDocument) -> PolicyDocument {
    let grants = DraftGrants::new(draft);
    let mut seen_statements = HashSet::new();
    let mut statements = Vec::with_capacity(refined.statements.len());

    for stmt in refined.statements {
        let scalar_action = stmt.action.is_one();
        let scalar_resource = stmt.resource.is_one();
        let deny = stmt.effect.eq_ignore_ascii_case("deny");
        let resources = unique(
            stmt.resource
                .into_values()
                .into_iter()
                .map(|resource| replace_placeholders(&resource)),
        );

        // (resources, actions) in first-seen order.
        let mut groups: Vec<(Vec<String>, Vec<String>)> = Vec::new();
        for action in unique(stmt.action.into_values()) {
            if !grants.grants_action(&action) {
                log::warn!("Dropping action introduced by refinement action={action}");
                continue;
            }
            let allowed: Vec<String> = resources
                .iter()
                .filter(|resource| {
                    let granted = deny || grants.grants(&action, resource);
                    if !granted {
                        log::warn!(
                            "Dropping resource widened by refinement action={action} resource={resource}"
                        );
                    }
                    granted
                })
                .cloned()
                .collect();
            if allowed.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(group, _)| *group == allowed) {
                Some((_, actions)) => actions.push(action),
                None => groups.push((allowed, vec![action])),
            }
        }
        if groups.is_empty() {
            log::debug!("Dropping refined statement without granted actions");
            continue;
        }

        let mut sid = stmt.sid;
        for (resources, actions) in groups {
            let statement = PolicyStatement {
                sid: sid.take(),
                effect: stmt.effect.clone(),
                action: OneOrMany::shaped(scalar_action, actions),
                resource: OneOrMany::shaped(scalar_resource, resources),
                extra: stmt.extra.clone(),
            };
            let key = (
                statement.effect.clone(),
                statement.action.clone(),
                statement.resource.clone(),
            );
            if seen_statements.insert(key) {
                statements.push(statement);
            }
        }
    }

    let version = if refined.version.trim().is_empty() {
        default_version()
    } else {
        refined.version
    };
    PolicyDocument {
        version,
        statements,
    }
}

/// Shell-style tokens that are literal ARN parts, such as Lambda's `$LATEST` qualifier.
const LITERAL_TOKENS: &[&str] = &["$LATEST"];

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\$\{\{[^}]*\}\}|\$\{[^}]*\}|\{\{[^}]*\}\}|<[^<>]*>|\{[A-Za-z_][A-Za-z0-9_.-]*\}|\$[A-Z_][A-Z0-9_]*",
        )
        .expect("placeholder pattern is valid")
    })
}

fn repeated_wildcard() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\*{2,}").expect("wildcard pattern is valid"))
}

/// `arn:aws:s3:::${bucket}/<key>` becomes `arn:aws:s3:::*/*`.
pub fn replace_placeholders(resource: &str) -> String {
    let replaced = placeholder_pattern().replace_all(resource, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        if LITERAL_TOKENS.contains(&token) {
            token.to_string()
        } else {
            "*".to_string()
        }
    });
    repeated_wildcard().replace_all(&replaced, "*").into_owned()
}

pub fn has_placeholder(resource: &str) -> bool {
    placeholder_pattern()
        .find_iter(resource)
        .any(|found| !LITERAL_TOKENS.contains(&found.as_str()))
}
