use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const POLICY_VERSION: &str = "2012-10-17";

/// Draft statement: one per distinct resource, actions kept as a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RenderedStatement", try_from = "RenderedStatement")]
pub struct IamStatement {
    pub resource: String,
    pub actions: BTreeSet<String>,
}

impl IamStatement {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            actions: BTreeSet::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RenderedStatement {
    #[serde(rename = "Effect")]
    effect: String,
    #[serde(rename = "Action")]
    action: Vec<String>,
    #[serde(rename = "Resource")]
    resource: String,
}

impl From<IamStatement> for RenderedStatement {
    fn from(stmt: IamStatement) -> Self {
        Self {
            effect: "Allow".to_string(),
            action: stmt.actions.into_iter().collect(),
            resource: stmt.resource,
        }
    }
}

impl TryFrom<RenderedStatement> for IamStatement {
    type Error = String;

    fn try_from(raw: RenderedStatement) -> Result<Self, Self::Error> {
        if raw.effect != "Allow" {
            return Err(format!("unsupported statement effect '{}'", raw.effect));
        }
        Ok(Self {
            resource: raw.resource,
            actions: raw.action.into_iter().collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamPolicy {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statements: Vec<IamStatement>,
}

impl Default for IamPolicy {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl IamPolicy {
    pub fn new(statements: Vec<IamStatement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.iter().all(|stmt| stmt.actions.is_empty())
    }

    /// Every `service:action` string granted by the policy.
    pub fn actions(&self) -> BTreeSet<&str> {
        self.statements
            .iter()
            .flat_map(|stmt| stmt.actions.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_aws_policy_shape() {
        let mut stmt = IamStatement::new("arn:aws:s3:::assets/*");
        stmt.actions.insert("s3:PutObject".to_string());
        stmt.actions.insert("s3:GetObject".to_string());
        let policy = IamPolicy::new(vec![stmt]);

        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": ["s3:GetObject", "s3:PutObject"],
                    "Resource": "arn:aws:s3:::assets/*"
                }]
            })
        );
    }

    #[test]
    fn empty_policy_renders_empty_statement_list() {
        let value = serde_json::to_value(IamPolicy::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"Version": "2012-10-17", "Statement": []})
        );
    }

    #[test]
    fn deny_statements_are_rejected_on_parse() {
        let raw = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Deny","Action":[],"Resource":"*"}]}"#;
        assert!(serde_json::from_str::<IamPolicy>(raw).is_err());
    }
}
