mod aggregator;
mod certificates;
mod config;
mod error;
mod functions;
mod handler;
mod iam;
mod idle;
mod inventory;
mod logging;
mod metrics;
mod normalize;
mod report;
mod resource;
mod sink;
mod tagging;
mod time_range;

use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use lambda_runtime::{handler_fn, Context, Error};
use rusoto_acm::AcmClient;
use rusoto_cloudwatch::CloudWatchClient;
use rusoto_core::Region;
use rusoto_ec2::Ec2Client;
use rusoto_iam::IamClient;
use rusoto_lambda::LambdaClient;
use rusoto_s3::S3Client;
use rusoto_sns::SnsClient;
use serde_json::{json, Value};
use tracing::info;

use crate::certificates::AcmCertificateClient;
use crate::config::AuditConfig;
use crate::functions::LambdaFunctionClient;
use crate::handler::{App, Clients};
use crate::iam::IamDirectoryClient;
use crate::inventory::Ec2InventoryClient;
use crate::metrics::CloudWatchMetricsClient;
use crate::sink::{Notifier, ReportSink, S3ReportSink, SnsNotifier};

const RUNTIME_API_VAR: &str = "AWS_LAMBDA_RUNTIME_API";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AuditConfig::from_env()?;
    logging::init_tracing(&config)?;

    let app = Arc::new(build_app(config));

    if std::env::var_os(RUNTIME_API_VAR).is_none() {
        info!("running a single local audit");
        let response = app.handle(json!({}), Utc::now()).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    lambda_runtime::run(handler_fn(move |event: Value, _: Context| {
        let app = app.clone();
        async move { report_handler(&app, event).await }
    }))
    .await
    .map_err(|e| anyhow!("lambda runtime failed: {}", e))?;
    Ok(())
}

async fn report_handler(app: &App, event: Value) -> Result<Value, Error> {
    Ok(app.handle(event, Utc::now()).await?)
}

fn build_app(config: AuditConfig) -> App {
    let ec2 = Arc::new(Ec2InventoryClient::new_with_client(Ec2Client::new(
        Region::default(),
    )));
    let report_sink = config.bucket_name.clone().map(|bucket| {
        Arc::new(S3ReportSink::new_with_client(
            S3Client::new(Region::default()),
            bucket,
        )) as Arc<dyn ReportSink>
    });
    let notifier = config.sns_topic_arn.clone().map(|topic_arn| {
        Arc::new(SnsNotifier::new_with_client(
            SnsClient::new(Region::default()),
            topic_arn,
        )) as Arc<dyn Notifier>
    });
    let clients = Clients {
        inventory: ec2.clone(),
        tagger: ec2,
        iam: Arc::new(IamDirectoryClient::new_with_client(IamClient::new(
            Region::UsEast1,
        ))),
        functions: Arc::new(LambdaFunctionClient::new_with_client(LambdaClient::new(
            Region::default(),
        ))),
        metrics: Arc::new(CloudWatchMetricsClient::new_with_client(
            CloudWatchClient::new(Region::default()),
        )),
        certificates: Arc::new(AcmCertificateClient::new_with_client(AcmClient::new(
            Region::default(),
        ))),
        report_sink,
        notifier,
    };
    App::new(config, clients)
}
