use chrono::{DateTime, Utc};
use csv::{Reader, Writer};
use product_dedup_service::dto::{DataFile, DuplicateGroup, ProductRecord};
use product_dedup_service::error::ServiceError;
use product_dedup_service::util::{download_object_from_s3, upload_object_to_s3};
use rusoto_s3::S3Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// One row of the catalog export.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: String,
    name: String,
    price: f64,
    description: Option<String>,
    stock: Option<u64>,
    created_at: Option<DateTime<Utc>>,
}

impl From<CatalogRow> for ProductRecord {
    fn from(row: CatalogRow) -> Self {
        ProductRecord {
            id: row.id,
            name: row.name,
            price: row.price,
            description: row.description,
            stock: row.stock,
            created_at: row.created_at,
            active: true,
        }
    }
}

pub async fn pull_data_file(
    client: &S3Client,
    data: &DataFile,
) -> Result<Vec<ProductRecord>, ServiceError> {
    let bytes = download_object_from_s3(client, data.bucket.clone(), data.key.clone()).await?;
    parse_catalog(bytes.as_slice())
}

pub fn parse_catalog(bytes: &[u8]) -> Result<Vec<ProductRecord>, ServiceError> {
    let mut reader = Reader::from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(ServiceError::internal_server_error)?
        .clone();
    reader
        .records()
        .map(|record| match record {
            Ok(rec) => rec
                .deserialize::<CatalogRow>(Some(&headers))
                .map(ProductRecord::from)
                .map_err(|_| {
                    ServiceError::bad_request(String::from(
                        "file must contain columns 'id', 'name' and 'price'",
                    ))
                }),
            Err(err) => Err(ServiceError::internal_server_error(err)),
        })
        .collect()
}

/// Rows of `product_id, group_id, anchor_id`, one per grouped product.
pub fn write_group_report(groups: &[DuplicateGroup]) -> Result<Vec<u8>, ServiceError> {
    let mut writer = Writer::from_writer(vec![]);
    writer
        .write_record(["product_id", "group_id", "anchor_id"])
        .map_err(ServiceError::internal_server_error)?;
    for (idx, group) in groups.iter().enumerate() {
        let group_id = format!("{idx}-{}", group.products.len());
        let anchor_id = group
            .products
            .first()
            .map(|p| p.id.as_str())
            .unwrap_or_default();
        for product in &group.products {
            writer
                .write_record([product.id.as_str(), group_id.as_str(), anchor_id])
                .map_err(ServiceError::internal_server_error)?;
        }
    }
    writer
        .into_inner()
        .map_err(ServiceError::internal_server_error)
}

pub fn report_key(key: &str) -> String {
    format!("{}.duplicates.csv", key.trim_end_matches(".csv"))
}

pub async fn push_result_file(
    client: &S3Client,
    data: &DataFile,
    groups: &[DuplicateGroup],
) -> Result<Value, ServiceError> {
    let object = write_group_report(groups)?;
    let key = report_key(&data.key);
    upload_object_to_s3(client, object, data.bucket.clone(), key.clone()).await?;
    Ok(json!({ "bucket": data.bucket, "key": key }))
}
