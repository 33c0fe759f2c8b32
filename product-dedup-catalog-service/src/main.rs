use product_dedup_service::catalog::HttpProductRepository;
use product_dedup_service::check::check_candidates;
use product_dedup_service::config::MatchSettings;
use product_dedup_service::dto::{CheckRequest, MergeRequest};
use product_dedup_service::error::ServiceError;
use product_dedup_service::merge::merge_products;
use product_dedup_service::repository::ProductRepository;
use product_dedup_service::response::make_response_payload;
use product_dedup_service::util::{self, init_logging, parse_payload};

use bytes::Bytes;
use lambda_runtime::{run, service_fn, Context, Error, LambdaEvent};
use lazy_static::lazy_static;
use log::info;
use rusoto_core::{Client, Region};
use rusoto_kms::{DecryptRequest, Kms, KmsClient};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

lazy_static! {
    // AWS Region
    static ref REGION: Result<Region, ServiceError> = util::get_region();
    // Catalog API base URL
    static ref ENDPOINT: Result<String, ServiceError> = util::get_env_var("ENDPOINT");
    // Encrypted Api Key
    static ref API_KEY: Result<String, ServiceError> = util::get_env_var("API_KEY");
    // Symmetric encryption key ID stored in AWS KMS
    static ref KEY_ID: Result<String, ServiceError> = util::get_env_var("KEY_ID");
}

/// Requests served by this function, selected by their `action` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum CatalogRequest {
    Check(CheckRequest),
    Merge(MergeRequest),
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();
    run(service_fn(process)).await?;
    Ok(())
}

async fn process(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let (payload, context) = event.into_parts();
    let result = serve(payload, &context).await;
    make_response_payload(result)
}

async fn serve(payload: Value, context: &Context) -> Result<Value, ServiceError> {
    let request: CatalogRequest = parse_payload(payload)?;
    let settings = MatchSettings::from_env()?;
    let key = decrypt_api_key(function_name(&context.invoked_function_arn)?).await?;
    let repository = HttpProductRepository::new(ENDPOINT.clone()?.as_str(), key)?;
    handle(request, &repository, &settings).await
}

async fn handle<R: ProductRepository>(
    request: CatalogRequest,
    repository: &R,
    settings: &MatchSettings,
) -> Result<Value, ServiceError> {
    match request {
        CatalogRequest::Check(CheckRequest { products }) => {
            let existing = repository.list_active().await?;
            let report = check_candidates(&products, &existing, settings);
            info!(
                "Checked {} candidates against {} products: {} duplicates",
                report.statistics.total,
                existing.len(),
                report.statistics.duplicates
            );
            serde_json::to_value(report).map_err(ServiceError::internal_server_error)
        }
        CatalogRequest::Merge(request) => {
            let response = merge_products(repository, request).await?;
            serde_json::to_value(response).map_err(ServiceError::internal_server_error)
        }
    }
}

fn ise(msg: &str) -> ServiceError {
    ServiceError::internal_server_error(msg)
}

async fn decrypt_api_key(function_name: &str) -> Result<String, ServiceError> {
    let client = KmsClient::new_with_client(Client::shared(), REGION.clone()?);
    let context = HashMap::from([(
        String::from("LambdaFunctionName"),
        String::from(function_name),
    )]);
    let ciphertext =
        base64::decode(API_KEY.clone()?.as_bytes()).map_err(|err| ise(&err.to_string()))?;
    let request = DecryptRequest {
        ciphertext_blob: Bytes::from(ciphertext),
        key_id: Some(KEY_ID.clone()?),
        encryption_context: Some(context),
        ..Default::default()
    };
    let response = client
        .decrypt(request)
        .await
        .map_err(|err| ise(&err.to_string()))?;
    if let Some(bytes) = response.plaintext {
        String::from_utf8(bytes.into_iter().collect()).map_err(|err| ise(&err.to_string()))
    } else {
        Err(ServiceError::internal_server_error(
            "Unable to decode api key",
        ))
    }
}

fn function_name(arn: &str) -> Result<&str, ServiceError> {
    arn.split(':')
        .last()
        .ok_or_else(|| ise("Unable to extract function name"))
}
