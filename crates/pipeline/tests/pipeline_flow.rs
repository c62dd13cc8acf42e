mod common;

use common::{service_names, sdk_calls, CannedModel, KeywordReranker};
use iam_catalog::ActionCatalog;
use iam_pipeline::{has_placeholder, PipelineConfig, PipelineError, PolicyPipeline};
use iam_protocol::SourceFile;
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn catalog() -> Arc<ActionCatalog> {
    Arc::new(ActionCatalog::from_services([
        ("s3", vec!["GetObject", "PutObject", "ListBucket"]),
        ("sqs", vec!["SendMessage", "ReceiveMessage"]),
        ("ses", vec!["SendEmail"]),
    ]))
}

fn aws_file(path: &str) -> SourceFile {
    SourceFile::new(path, format!("https://example.test/{path}")).with_content("import boto3")
}

fn pipeline(reranker: Arc<KeywordReranker>, model: Arc<CannedModel>) -> PolicyPipeline {
    PolicyPipeline::new(catalog(), reranker, model)
}

#[tokio::test]
async fn repository_without_files_yields_empty_policy_and_no_calls() {
    let reranker = Arc::new(KeywordReranker::new("boto3"));
    let model = Arc::new(CannedModel::default());
    let outcome = pipeline(reranker.clone(), model.clone())
        .run(Vec::new())
        .await
        .unwrap();

    assert_eq!(
        outcome.to_pretty_json().unwrap(),
        "{\n    \"Version\": \"2012-10-17\",\n    \"Statement\": []\n}"
    );
    assert_eq!(reranker.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.shapes.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn irrelevant_files_never_reach_the_model() {
    let reranker = Arc::new(KeywordReranker::new("boto3"));
    let model = Arc::new(CannedModel::default());
    let files = vec![SourceFile::new("README.md", "u").with_content("# hello")];
    let outcome = pipeline(reranker.clone(), model.clone())
        .run(files)
        .await
        .unwrap();

    assert!(outcome.policy.is_empty());
    assert_eq!(outcome.report.files_considered, 1);
    assert_eq!(outcome.report.files_relevant, 0);
    assert_eq!(reranker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(model.shapes.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn calls_from_several_files_merge_by_resource() {
    let mut model = CannedModel::default();
    for path in ["app/upload.py", "app/download.py"] {
        model
            .services
            .insert(path.to_string(), service_names(&["s3", "sqs"]));
    }
    model.calls.insert(
        "app/upload.py".to_string(),
        sdk_calls(&[
            ("s3", "PutObject", "arn:aws:s3:::assets/*"),
            ("sqs", "SendMessage", "*"),
        ]),
    );
    model.calls.insert(
        "app/download.py".to_string(),
        sdk_calls(&[
            ("s3", "GetObject", "arn:aws:s3:::assets/*"),
            ("s3", "DeleteEverything", "*"),
        ]),
    );
    let model = Arc::new(model);
    let reranker = Arc::new(KeywordReranker::new("boto3"));

    let outcome = pipeline(reranker, model.clone())
        .run(vec![aws_file("app/upload.py"), aws_file("app/download.py")])
        .await
        .unwrap();

    let draft: Vec<(String, Vec<String>)> = outcome
        .draft
        .statements
        .iter()
        .map(|s| (s.resource.clone(), s.actions.iter().cloned().collect()))
        .collect();
    assert_eq!(
        draft,
        vec![
            (
                "arn:aws:s3:::assets/*".to_string(),
                vec!["s3:GetObject".to_string(), "s3:PutObject".to_string()]
            ),
            ("*".to_string(), vec!["sqs:SendMessage".to_string()]),
        ]
    );
    assert_eq!(outcome.report.candidates_extracted, 4);
    assert_eq!(outcome.report.candidates_accepted, 3);
    assert_eq!(outcome.report.rejected.len(), 1);
    assert_eq!(outcome.report.rejected[0].action, "DeleteEverything");
    assert_eq!(
        outcome.policy.actions().into_iter().collect::<Vec<_>>(),
        vec!["s3:GetObject", "s3:PutObject", "sqs:SendMessage"]
    );
    assert_eq!(model.calls_for("refined_policy"), 1);
}

#[tokio::test]
async fn one_failing_file_fails_the_run() {
    let mut model = CannedModel::default();
    for i in 0..5 {
        let path = format!("src/f{i}.py");
        model.services.insert(path.clone(), service_names(&["s3"]));
        model
            .calls
            .insert(path, sdk_calls(&[("s3", "GetObject", "*")]));
    }
    model.failing_path = Some("src/f3.py".to_string());
    let model = Arc::new(model);
    let files = (0..5).map(|i| aws_file(&format!("src/f{i}.py"))).collect();

    let err = pipeline(Arc::new(KeywordReranker::new("boto3")), model.clone())
        .run(files)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Client(_)));
    assert_eq!(model.calls_for("refined_policy"), 0);
}

#[tokio::test]
async fn malformed_extraction_fails_the_run() {
    let mut model = CannedModel::default();
    model
        .services
        .insert("src/app.py".to_string(), "s3, sqs".to_string());
    let err = pipeline(Arc::new(KeywordReranker::new("boto3")), Arc::new(model))
        .run(vec![aws_file("src/app.py")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MalformedCompletion {
            stage: "service_names",
            ..
        }
    ));
}

#[tokio::test]
async fn extraction_respects_the_concurrency_bound() {
    let mut model = CannedModel {
        delay: Some(Duration::from_millis(20)),
        ..CannedModel::default()
    };
    for i in 0..6 {
        model
            .services
            .insert(format!("src/f{i}.py"), service_names(&["ses"]));
    }
    let model = Arc::new(model);
    let files = (0..6).map(|i| aws_file(&format!("src/f{i}.py"))).collect();

    let config = PipelineConfig {
        concurrency: 2,
        ..PipelineConfig::default()
    };
    pipeline(Arc::new(KeywordReranker::new("boto3")), model.clone())
        .with_config(config)
        .run(files)
        .await
        .unwrap();

    assert!(model.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(model.calls_for("service_names"), 6);
}

#[tokio::test]
async fn refined_placeholders_are_replaced() {
    let mut model = CannedModel::default();
    model
        .services
        .insert("src/app.py".to_string(), service_names(&["s3"]));
    model.calls.insert(
        "src/app.py".to_string(),
        sdk_calls(&[("s3", "ListBucket", "arn:aws:s3:::${BUCKET}")]),
    );
    let refined = serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{"Effect": "Allow", "Action": ["s3:ListBucket"], "Resource": "arn:aws:s3:::<bucket-name>"}]
    });
    model.refined = Some(serde_json::json!({ "policy_document": refined.to_string() }).to_string());

    let outcome = pipeline(Arc::new(KeywordReranker::new("boto3")), Arc::new(model))
        .run(vec![aws_file("src/app.py")])
        .await
        .unwrap();

    let json = outcome.to_pretty_json().unwrap();
    assert!(!has_placeholder(&json), "placeholder left in {json}");
    assert!(json.contains("\"arn:aws:s3:::*\""));
}

#[tokio::test]
async fn top_n_limits_extraction_work() {
    let model = Arc::new(CannedModel::default());
    let files = (0..10).map(|i| aws_file(&format!("src/f{i}.py"))).collect();
    let config = PipelineConfig {
        top_n: Some(3),
        ..PipelineConfig::default()
    };
    let outcome = pipeline(Arc::new(KeywordReranker::new("boto3")), model.clone())
        .with_config(config)
        .run(files)
        .await
        .unwrap();

    assert_eq!(outcome.report.files_relevant, 3);
    assert_eq!(model.calls_for("service_names"), 3);
    assert_eq!(model.calls_for("sdk_calls"), 0);
}
