use iam_protocol::{IamPolicy, IamStatement, SdkCallCandidate};
use std::collections::HashMap;

/// Folds validated calls into one statement per distinct resource.
///
/// Statements keep the order in which their resource was first seen; the
/// actions inside a statement are a sorted set.
#[derive(Debug, Clone, Default)]
pub struct StatementAggregator {
    statements: Vec<IamStatement>,
    by_resource: HashMap<String, usize>,
}

impl StatementAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, call: &SdkCallCandidate) {
        let idx = match self.by_resource.get(&call.resource) {
            Some(idx) => *idx,
            None => {
                self.statements.push(IamStatement::new(call.resource.clone()));
                let idx = self.statements.len() - 1;
                self.by_resource.insert(call.resource.clone(), idx);
                idx
            }
        };
        self.statements[idx].actions.insert(call.iam_action());
    }

    pub fn extend<'a>(&mut self, calls: impl IntoIterator<Item = &'a SdkCallCandidate>) {
        for call in calls {
            self.add(call);
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn into_policy(self) -> IamPolicy {
        IamPolicy::new(self.statements)
    }
}

pub fn aggregate<'a>(calls: impl IntoIterator<Item = &'a SdkCallCandidate>) -> IamPolicy {
    let mut aggregator = StatementAggregator::new();
    aggregator.extend(calls);
    aggregator.into_policy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn call(service: &str, action: &str, resource: &str) -> SdkCallCandidate {
        SdkCallCandidate {
            service: service.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            reasoning: "seen in code".to_string(),
        }
    }

    fn by_resource(policy: &IamPolicy) -> BTreeMap<String, Vec<String>> {
        policy
            .statements
            .iter()
            .map(|s| (s.resource.clone(), s.actions.iter().cloned().collect()))
            .collect()
    }

    #[test]
    fn merges_actions_sharing_a_resource() {
        let policy = aggregate(&[
            call("s3", "GetObject", "arn:aws:s3:::b/*"),
            call("s3", "PutObject", "arn:aws:s3:::b/*"),
            call("sqs", "SendMessage", "*"),
        ]);
        assert_eq!(policy.statements.len(), 2);
        assert_eq!(policy.statements[0].resource, "arn:aws:s3:::b/*");
        assert_eq!(
            policy.statements[0].actions.iter().collect::<Vec<_>>(),
            vec!["s3:GetObject", "s3:PutObject"]
        );
        assert_eq!(policy.statements[1].resource, "*");
    }

    #[test]
    fn duplicates_and_order_do_not_change_the_result() {
        let calls = vec![
            call("s3", "PutObject", "arn:aws:s3:::b/*"),
            call("sqs", "SendMessage", "*"),
            call("s3", "GetObject", "arn:aws:s3:::b/*"),
        ];
        let once = aggregate(&calls);

        let mut doubled = calls.clone();
        doubled.extend(calls.iter().cloned());
        assert_eq!(aggregate(&doubled), once);

        let reversed: Vec<_> = calls.iter().rev().cloned().collect();
        assert_eq!(by_resource(&aggregate(&reversed)), by_resource(&once));
    }

    #[test]
    fn nothing_in_gives_an_empty_policy() {
        let policy = aggregate(std::iter::empty::<&SdkCallCandidate>());
        assert!(policy.statements.is_empty());
        assert_eq!(policy.version, "2012-10-17");
    }

    #[test]
    fn incremental_and_batch_agree() {
        let calls = [
            call("ses", "SendEmail", "*"),
            call("ses", "ListTemplates", "*"),
        ];
        let mut aggregator = StatementAggregator::new();
        for c in &calls {
            aggregator.add(c);
        }
        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.into_policy(), aggregate(&calls));
    }
}
