use crate::error::ServiceError;
use crate::response::Status;
use futures::stream::TryStreamExt;
use rusoto_core::Region;
use rusoto_s3::{GetObjectRequest, PutObjectRequest, S3Client, S3};
use std::env;
use std::str::FromStr;

pub fn get_region() -> Result<Region, ServiceError> {
    match env::var("REGION") {
        Ok(val) => Region::from_str(val.as_str()).map_err(|_| ServiceError {
            msg: format!("Unable to parse region {}", val),
            status: Status::InternalServerError,
        }),
        _ => Err(ServiceError::internal_server_error(
            "Environment variable 'REGION' not found",
        )),
    }
}

pub fn get_env_var(name: &str) -> Result<String, ServiceError> {
    env::var(name).map_err(|_| {
        ServiceError::internal_server_error(&format!("Environment variable '{}' not found", name))
    })
}

/// Initialises `env_logger`, defaulting to `info` when `RUST_LOG` is unset.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Parses a handler payload, reporting shape errors as client errors.
pub fn parse_payload<T: serde::de::DeserializeOwned>(
    payload: serde_json::Value,
) -> Result<T, ServiceError> {
    serde_json::from_value(payload)
        .map_err(|err| ServiceError::bad_request(format!("Invalid request: {}", err)))
}

pub async fn download_object_from_s3(
    client: &S3Client,
    bucket: String,
    key: String,
) -> Result<Vec<u8>, ServiceError> {
    let request = GetObjectRequest {
        bucket,
        key,
        ..Default::default()
    };
    let mut object = client
        .get_object(request)
        .await
        .map_err(ServiceError::internal_server_error)?;
    let body = object
        .body
        .take()
        .ok_or(ServiceError::internal_server_error(
            "Unable to extract body",
        ))?;
    body.map_ok(|b| b.to_vec())
        .try_concat()
        .await
        .map_err(ServiceError::internal_server_error)
}

pub async fn upload_object_to_s3(
    client: &S3Client,
    object: Vec<u8>,
    bucket: String,
    key: String,
) -> Result<(), ServiceError> {
    let request = PutObjectRequest {
        bucket,
        key,
        body: Some(object.into()),
        ..Default::default()
    };
    client
        .put_object(request)
        .await
        .map(|_| ())
        .map_err(ServiceError::internal_server_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::MergeRequest;
    use serde_json::json;

    #[test]
    fn malformed_payloads_are_client_errors() {
        let err = parse_payload::<MergeRequest>(json!({ "removeProductIds": ["2"] })).unwrap_err();
        assert!(matches!(err.status, Status::BadRequest));
        assert!(err.msg.contains("keepProductId"));
    }

    #[test]
    fn missing_env_var_is_internal_error() {
        let err = get_env_var("DEDUP_TEST_NEVER_SET").unwrap_err();
        assert!(matches!(err.status, Status::InternalServerError));
    }
}
