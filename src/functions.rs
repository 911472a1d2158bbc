use crate::error::AuditError;
use async_trait::async_trait;
use rusoto_lambda::{FunctionConfiguration, Lambda, LambdaClient, ListFunctionsRequest};
use tracing::debug;

const PAGE_SIZE: i64 = 50;

#[async_trait]
pub trait FunctionDirectory: Send + Sync {
    async fn list_functions(&self) -> Result<Vec<FunctionConfiguration>, AuditError>;
}

pub struct LambdaFunctionClient {
    client: LambdaClient,
}

impl LambdaFunctionClient {
    pub fn new_with_client(client: LambdaClient) -> Self {
        LambdaFunctionClient { client }
    }
}

#[async_trait]
impl FunctionDirectory for LambdaFunctionClient {
    async fn list_functions(&self) -> Result<Vec<FunctionConfiguration>, AuditError> {
        let mut functions = vec![];
        let mut marker = None;
        loop {
            let result = self
                .client
                .list_functions(ListFunctionsRequest {
                    marker: marker.take(),
                    max_items: Some(PAGE_SIZE),
                    ..Default::default()
                })
                .await
                .map_err(|e| AuditError::api("ListFunctions", e))?;
            functions.extend(result.functions.unwrap_or_default());
            marker = result.next_marker.filter(|marker| !marker.is_empty());
            if marker.is_none() {
                break;
            }
        }
        debug!(count = functions.len(), "listed functions");
        Ok(functions)
    }
}
