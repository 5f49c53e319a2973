// AWS Lambda entry point for the snapshot scheduler.
//
// Invoked on a schedule (or by hand) with an event such as
// { "RequestType": "Create", "StackName": "EBS-SnapShot-Scheduler" }

use ebs_snapshot_scheduler::aws::AwsProvider;
use ebs_snapshot_scheduler::{ScheduleRequest, ScheduleResponse, Scheduler};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(non_blocking)
        .init();

    let scheduler = Scheduler::new(AwsProvider::from_env().await);
    let scheduler = &scheduler;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle(event, scheduler).await
    }))
    .await
}

async fn handle(
    event: LambdaEvent<Value>,
    scheduler: &Scheduler<AwsProvider>,
) -> Result<ScheduleResponse, Error> {
    let (event, _context) = event.into_parts();

    let outcome = match ScheduleRequest::from_event(event.clone()) {
        Ok(request) => scheduler.run(&request).await,
        Err(err) => Err(err),
    };
    Ok(match outcome {
        Ok(report) => report.response(),
        Err(err) => {
            tracing::error!("FAILED event: {event} | message: {err}");
            ScheduleResponse::aborted(event, &err)
        }
    })
}
