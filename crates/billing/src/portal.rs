//! Customer portal sessions

use std::sync::Arc;

use crate::client::PolarClient;
use crate::error::{BillingError, BillingResult};
use crate::profiles::ProfileStore;

/// Mints Polar customer-portal links.
pub struct PortalService {
    polar: PolarClient,
    store: Arc<dyn ProfileStore>,
}

impl PortalService {
    pub fn new(polar: PolarClient, store: Arc<dyn ProfileStore>) -> Self {
        Self { polar, store }
    }

    /// Create a customer-portal session URL for the user. Requires a stored
    /// billing customer id.
    pub async fn portal_url(&self, clerk_user_id: &str) -> BillingResult<String> {
        let profile = self.store.get_or_create(clerk_user_id).await?;

        let customer_id = profile
            .polar_customer_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(BillingError::NoBillingCustomer)?;

        let session = self.polar.create_customer_session(customer_id).await?;
        session.customer_portal_url.ok_or(BillingError::Provider {
            status: 502,
            message: "customer session has no portal URL".to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::PolarConfig;
    use crate::testing::MemoryProfileStore;

    const USER: &str = "user_portal_test";

    fn service(api_base: String, store: Arc<MemoryProfileStore>) -> PortalService {
        let config = PolarConfig {
            access_token: "polar_test".to_string(),
            webhook_secret: "secret".to_string(),
            pro_product_id: "prod_pro".to_string(),
            api_base,
            app_url: "http://localhost:3000".to_string(),
        };
        PortalService::new(PolarClient::new(config), store)
    }

    #[tokio::test]
    async fn portal_requires_billing_customer() {
        let store = Arc::new(MemoryProfileStore::new());
        let service = service("http://127.0.0.1:1".to_string(), store);

        let err = service.portal_url(USER).await.unwrap_err();
        assert!(matches!(err, BillingError::NoBillingCustomer));
    }

    #[tokio::test]
    async fn portal_mints_session_for_stored_customer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/customer-sessions")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "customer_id": "cus_1"
            })))
            .with_status(201)
            .with_body(
                serde_json::json!({
                    "customer_portal_url": "https://sandbox.polar.sh/portal/session_1"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let store = Arc::new(MemoryProfileStore::new());
        store
            .seed(USER, |p| {
                p.polar_customer_id = Some("cus_1".to_string());
            })
            .await;
        let service = service(server.url(), store);

        let url = service.portal_url(USER).await.unwrap();
        mock.assert_async().await;
        assert_eq!(url, "https://sandbox.polar.sh/portal/session_1");
    }
}
