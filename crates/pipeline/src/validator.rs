use iam_catalog::ActionCatalog;
use iam_protocol::SdkCallCandidate;
use serde::Serialize;

/// True iff `service` is in the catalog and lists `action`.
pub fn is_valid_action(catalog: &ActionCatalog, service: &str, action: &str) -> bool {
    catalog.contains(service, action)
}

/// A candidate dropped because the catalog does not grant it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedCall {
    pub file_path: String,
    pub service: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedCalls {
    pub accepted: Vec<SdkCallCandidate>,
    pub rejected: Vec<RejectedCall>,
}

/// Split the calls found in `file_path` into catalog-valid and rejected.
pub fn validate_calls(
    catalog: &ActionCatalog,
    file_path: &str,
    calls: Vec<SdkCallCandidate>,
) -> ValidatedCalls {
    let mut out = ValidatedCalls::default();
    for call in calls {
        if is_valid_action(catalog, &call.service, &call.action) {
            out.accepted.push(call);
        } else {
            log::warn!(
                "Dropping action not in catalog path={file_path} service={} action={}",
                call.service,
                call.action
            );
            out.rejected.push(RejectedCall {
                file_path: file_path.to_string(),
                service: call.service,
                action: call.action,
            });
        }
    }
    out
}
