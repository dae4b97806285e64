use crate::handler::UploadHandler;
use crate::response::ApiResponse;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Serve invocations from the Lambda runtime API until the process exits
pub async fn run_lambda(handler: UploadHandler) -> Result<(), Error> {
    let handler = Arc::new(handler);

    let func = service_fn(move |event: LambdaEvent<Value>| {
        let handler = handler.clone();

        async move { handle_event(&handler, event).await }
    });

    run(func).await
}

/// Handle one invocation.
///
/// Upload failures are reported in the response envelope, so the invocation
/// itself always succeeds.
#[instrument(skip_all, fields(aws_request_id = %event.context.request_id))]
pub async fn handle_event(
    handler: &UploadHandler,
    event: LambdaEvent<Value>,
) -> Result<ApiResponse, Error> {
    debug!("Processing upload invocation");

    let response = handler.handle(&event.payload).await;

    Ok(response)
}
