//! Prompt templates for the completion model.

pub const SERVICE_NAMES_SHAPE: &str = "service_names";
pub const SDK_CALLS_SHAPE: &str = "sdk_calls";
pub const REFINED_POLICY_SHAPE: &str = "refined_policy";

fn input_block(file_path: &str, source_code: &str) -> String {
    format!("INPUT:\n\nFile Path: {file_path}\nSource Code:\n```\n{source_code}\n```\n")
}

pub fn service_discovery(file_path: &str, source_code: &str, service_names_yaml: &str) -> String {
    format!(
        "You are a code analysis assistant that finds AWS SDK usage in source code.

List every distinct AWS service name the file below uses through an AWS SDK.
Only count these patterns:
- direct client construction, e.g. `boto3.client(\"s3\")`, `new AWS.S3()`, `AWS.SQS()`
- method calls on an SDK client variable, e.g. `s3.getObject()`, `iam.createRole()`,
  `lambda.invoke()`, `dynamodb.query()`
- wrapper functions whose name implies an AWS action, e.g. `uploadToS3()`,
  `createIAMRole()`, `invokeLambdaFunction()`, even when the SDK call is hidden
  inside them

Context:
- The code may be Python, Java, JavaScript, TypeScript, Go or Ruby.
- Expect the standard SDKs: boto3, AWS SDK for Java, AWS SDK for JavaScript, aws-sdk-go.
- Use only service names from this list:
{service_names_yaml}
{}",
        input_block(file_path, source_code)
    )
}

pub fn sdk_call_discovery(file_path: &str, source_code: &str, services_yaml: &str) -> String {
    format!(
        "You are a code analysis assistant that extracts AWS SDK calls from source code.

Return every AWS SDK call made by the file below, with the IAM action it
needs, the resource it touches and why you picked it.

Rules:
- Report actions in AWS API naming such as ListTemplates, GetHostedZone or
  PassRole. SDK spellings like boto3's `list_templates` must become `ListTemplates`.
- Use the resource ARN when the code shows it; otherwise use `*` wildcards.
  Never use placeholders or example values.
- Ignore resource ARNs and names that come from test or mock files.
- Use only these services and actions:
{services_yaml}
{}",
        input_block(file_path, source_code)
    )
}

pub fn refine_policy(policy_json: &str) -> String {
    format!(
        "Clean up the AWS IAM policy below. Keep its intent and return it as a
JSON policy document string.

Rules:
1. ARNs must not contain placeholders or example values such as \"bucketName\"
   or \"objectName\".
2. ARNs must not contain templated variables such as ${{bucketName}} or
   <bucket-name>; replace them with \"*\" wildcards.
3. Remove duplicate actions and redundant statements.
4. If the policy has no actions, do not add any.

INPUT:
{policy_json}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_embed_path_and_source() {
        let prompt = service_discovery("app/s3.py", "import boto3", "- s3\n");
        assert!(prompt.contains("File Path: app/s3.py"));
        assert!(prompt.contains("```\nimport boto3\n```"));
        assert!(prompt.contains("- s3\n"));
    }

    #[test]
    fn refine_prompt_keeps_literal_template_example() {
        let prompt = refine_policy("{}");
        assert!(prompt.contains("${bucketName}"));
        assert!(prompt.ends_with("{}\n"));
    }
}
