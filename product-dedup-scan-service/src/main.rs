mod util;

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use lazy_static::lazy_static;
use log::info;
use product_dedup_service::cluster::{ensure_unique_ids, find_duplicate_groups};
use product_dedup_service::config::MatchSettings;
use product_dedup_service::dto::{
    DuplicateGroup, ProductRecord, ScanRequest, ScanResponse, ScanStatistics,
};
use product_dedup_service::error::ServiceError;
use product_dedup_service::response::make_response_payload;
use product_dedup_service::util::{get_region, init_logging, parse_payload};
use rusoto_core::{Client, Region};
use rusoto_s3::S3Client;
use serde_json::{json, Value};
use std::time::Instant;

lazy_static! {
    // AWS Region, only needed for catalog exports in S3
    static ref REGION: Result<Region, ServiceError> = get_region();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logging();
    run(service_fn(process)).await?;
    Ok(())
}

async fn process(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let (payload, _context) = event.into_parts();
    let result = scan(payload).await;
    make_response_payload(result)
}

async fn scan(payload: Value) -> Result<Value, ServiceError> {
    let request: ScanRequest = parse_payload(payload)?;
    let settings = MatchSettings::from_env()?
        .with_scan_overrides(request.similarity_threshold, request.price_tolerance)?;
    match (request.products, request.data) {
        (Some(products), None) => {
            let (groups, statistics) = group_products(&products, &settings)?;
            serde_json::to_value(ScanResponse {
                success: true,
                duplicate_groups: groups,
                statistics,
            })
            .map_err(ServiceError::internal_server_error)
        }
        (None, Some(data)) => {
            let start = Instant::now();
            let client = S3Client::new_with_client(Client::shared(), REGION.clone()?);
            let products = util::pull_data_file(&client, &data).await?;
            info!(
                "Catalog with {} products downloaded in {:.4} secs",
                products.len(),
                start.elapsed().as_secs_f64()
            );
            let (groups, statistics) = group_products(&products, &settings)?;
            let start = Instant::now();
            let location = util::push_result_file(&client, &data, &groups).await?;
            info!(
                "Group report uploaded in {:.4} secs",
                start.elapsed().as_secs_f64()
            );
            Ok(json!({
                "success": true,
                "report": location,
                "statistics": statistics,
            }))
        }
        (Some(_), Some(_)) => Err(ServiceError::bad_request(
            "Provide either 'products' or 'data', not both",
        )),
        (None, None) => Err(ServiceError::bad_request("'products' is required")),
    }
}

fn group_products(
    products: &[ProductRecord],
    settings: &MatchSettings,
) -> Result<(Vec<DuplicateGroup>, ScanStatistics), ServiceError> {
    ensure_unique_ids(products)?;
    let start = Instant::now();
    let groups = find_duplicate_groups(products, settings);
    let statistics = ScanStatistics::from_groups(products.len(), &groups);
    info!(
        "Scanned {} products into {} duplicate groups in {:.4} secs",
        statistics.total_products,
        statistics.duplicate_groups,
        start.elapsed().as_secs_f64()
    );
    Ok((groups, statistics))
}
