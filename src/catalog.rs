use crate::dto::ProductRecord;
use crate::error::ServiceError;
use crate::repository::{MergeUpdate, ProductRepository};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::json;

///
/// Product storage backed by the storefront's catalog API.
///
/// The API owns the relational store; `POST /products/merge` applies a whole
/// [`MergeUpdate`] inside one database transaction.
///
#[derive(Debug)]
pub struct HttpProductRepository {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl HttpProductRepository {
    pub fn new(endpoint: &str, api_key: String) -> Result<Self, ServiceError> {
        let endpoint = Url::parse(endpoint).map_err(|err| {
            ServiceError::internal_server_error(format!("Invalid endpoint {}: {}", endpoint, err))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(ServiceError::internal_server_error(format!(
                "Invalid endpoint {}: not a base URL",
                endpoint
            )));
        }
        let client = Client::builder()
            .build()
            .map_err(ServiceError::internal_server_error)?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Endpoint URL extended by `segments`, each percent-encoded as one path
    /// segment so ids cannot add segments, queries or fragments.
    fn url(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::internal_server_error(format!(
                    "Invalid endpoint {}: not a base URL",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-API-KEY", self.api_key.as_str())
            .header("CONTENT-TYPE", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(ServiceError::internal_server_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(response);
        }
        response
            .error_for_status()
            .map_err(ServiceError::internal_server_error)
    }

    async fn send_expecting(&self, request: RequestBuilder, id: &str) -> Result<(), ServiceError> {
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::not_found(format!("Product {} not found", id)));
        }
        Ok(())
    }
}

impl ProductRepository for HttpProductRepository {
    async fn get_by_id(&self, id: &str) -> Result<Option<ProductRecord>, ServiceError> {
        let response = self
            .send(self.client.get(self.url(&["products", id])?))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(ServiceError::internal_server_error)
    }

    async fn list_active(&self) -> Result<Vec<ProductRecord>, ServiceError> {
        self.send(
            self.client
                .get(self.url(&["products"])?)
                .query(&[("active", "true")]),
        )
        .await?
        .json()
        .await
        .map_err(ServiceError::internal_server_error)
    }

    async fn update_stock_and_description(
        &self,
        id: &str,
        stock: u64,
        description: Option<&str>,
    ) -> Result<(), ServiceError> {
        let request = self
            .client
            .patch(self.url(&["products", id])?)
            .json(&json!({ "stock": stock, "description": description }));
        self.send_expecting(request, id).await
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<(), ServiceError> {
        let request = self
            .client
            .patch(self.url(&["products", id])?)
            .json(&json!({ "active": active }));
        self.send_expecting(request, id).await
    }

    async fn apply_merge(&self, update: &MergeUpdate) -> Result<(), ServiceError> {
        let request = self.client.post(self.url(&["products", "merge"])?).json(&json!({
            "keepProductId": update.keep_id,
            "stock": update.stock,
            "description": update.description,
            "deactivateProductIds": update.deactivate_ids,
        }));
        self.send_expecting(request, &update.keep_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::MergeRequest;
    use crate::merge::merge_products;
    use mockito::{Matcher, Server};

    const PRODUCT: &str = r#"{"id": 7, "name": "Crema Hidratante", "price": 1800, "stock": 4}"#;

    fn repository(endpoint: &str) -> HttpProductRepository {
        HttpProductRepository::new(endpoint, "secret".into()).unwrap()
    }

    #[test]
    fn urls_keep_base_path_and_encode_ids() {
        let repo = repository("https://shop.example/api/");
        assert_eq!(
            repo.url(&["products", "merge"]).unwrap().as_str(),
            "https://shop.example/api/products/merge"
        );
        assert_eq!(
            repo.url(&["products", "1?active=false"]).unwrap().as_str(),
            "https://shop.example/api/products/1%3Factive=false"
        );
        assert_eq!(
            repo.url(&["products", "x#"]).unwrap().as_str(),
            "https://shop.example/api/products/x%23"
        );
        assert_eq!(
            repo.url(&["products", "../admin/users"]).unwrap().as_str(),
            "https://shop.example/api/products/..%2Fadmin%2Fusers"
        );
    }

    #[test]
    fn unusable_endpoints_are_rejected() {
        for endpoint in ["not a url", "mailto:catalog@shop.example"] {
            let err = HttpProductRepository::new(endpoint, "secret".into()).unwrap_err();
            assert!(matches!(err.status, crate::response::Status::InternalServerError));
        }
    }

    #[tokio::test]
    async fn get_by_id_sends_api_key_and_parses_record() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/products/7")
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(PRODUCT)
            .create_async()
            .await;

        let product = repository(&server.url())
            .get_by_id("7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.id, "7");
        assert_eq!(product.stock, Some(4));
        assert!(product.active);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/products/404")
            .with_status(404)
            .create_async()
            .await;

        let product = repository(&server.url()).get_by_id("404").await.unwrap();
        assert!(product.is_none());
    }

    #[tokio::test]
    async fn list_active_filters_on_the_server() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/products?active=true")
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{}]", PRODUCT))
            .create_async()
            .await;

        let products = repository(&server.url()).list_active().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Crema Hidratante");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn writes_to_missing_records_are_not_found() {
        let mut server = Server::new_async().await;
        let _patch = server
            .mock("PATCH", "/products/9")
            .with_status(404)
            .create_async()
            .await;
        let _merge = server
            .mock("POST", "/products/merge")
            .with_status(404)
            .create_async()
            .await;
        let repo = repository(&server.url());

        let err = repo.set_active("9", false).await.unwrap_err();
        assert!(err.is_not_found());
        let err = repo
            .update_stock_and_description("9", 3, Some("A"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let update = MergeUpdate {
            keep_id: "9".into(),
            stock: 3,
            description: None,
            deactivate_ids: vec!["10".into()],
        };
        let err = repo.apply_merge(&update).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.msg.contains("Product 9"));
    }

    #[tokio::test]
    async fn server_errors_are_internal() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/products/7")
            .with_status(500)
            .create_async()
            .await;

        let err = repository(&server.url()).get_by_id("7").await.unwrap_err();
        assert!(matches!(err.status, crate::response::Status::InternalServerError));
    }

    #[tokio::test]
    async fn apply_merge_posts_one_update() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/products/merge")
            .match_header("x-api-key", "secret")
            .match_body(Matcher::Json(json!({
                "keepProductId": "7",
                "stock": 12,
                "description": "A\n\nB",
                "deactivateProductIds": ["8", "9"],
            })))
            .with_status(204)
            .create_async()
            .await;

        let update = MergeUpdate {
            keep_id: "7".into(),
            stock: 12,
            description: Some("A\n\nB".into()),
            deactivate_ids: vec!["8".into(), "9".into()],
        };
        repository(&server.url()).apply_merge(&update).await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn fragment_in_remove_id_cannot_reach_the_kept_record() {
        let mut server = Server::new_async().await;
        let _keep = server
            .mock("GET", "/products/x")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "x", "name": "Crema", "price": 1800, "stock": 5}"#)
            .create_async()
            .await;
        let encoded = server
            .mock("GET", "/products/x%23")
            .with_status(404)
            .create_async()
            .await;
        let merge = server
            .mock("POST", "/products/merge")
            .match_body(Matcher::PartialJson(json!({
                "keepProductId": "x",
                "stock": 5,
                "deactivateProductIds": [],
            })))
            .with_status(204)
            .create_async()
            .await;

        let request = MergeRequest {
            keep_product_id: "x".into(),
            remove_product_ids: vec!["x#".into()],
        };
        let response = merge_products(&repository(&server.url()), request)
            .await
            .unwrap();
        assert_eq!(response.removed_count, 0);
        assert_eq!(response.merged_product.stock, 5);
        encoded.assert_async().await;
        merge.assert_async().await;
    }
}
