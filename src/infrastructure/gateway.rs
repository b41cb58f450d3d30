use async_trait::async_trait;
use log::*;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::domain::errors::DomainError;
use crate::domain::money::Money;
use crate::domain::payment::{GatewayPayment, GatewayPaymentRequest, PaymentStatus};
use crate::domain::ports::PaymentGateway;

impl From<reqwest::Error> for DomainError {
    fn from(e: reqwest::Error) -> Self {
        DomainError::Gateway(e.to_string())
    }
}

pub const IDEMPOTENCE_KEY_HEADER: &str = "Idempotence-Key";

#[derive(Debug, Serialize, Deserialize)]
struct AmountBody {
    value: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct ConfirmationRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    return_url: &'a str,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    amount: AmountBody,
    capture: bool,
    confirmation: ConfirmationRequest<'a>,
    description: &'a str,
    metadata: Value,
}

#[derive(Debug, Deserialize)]
struct ConfirmationResponse {
    confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    status: String,
    amount: AmountBody,
    description: Option<String>,
    confirmation: Option<ConfirmationResponse>,
    #[serde(default)]
    metadata: Value,
}

impl TryFrom<PaymentResponse> for GatewayPayment {
    type Error = DomainError;

    fn try_from(r: PaymentResponse) -> Result<Self, Self::Error> {
        let status: PaymentStatus = r.status.parse().map_err(|_| {
            DomainError::Gateway(format!("unexpected payment status '{}'", r.status))
        })?;
        let amount: Money = r
            .amount
            .value
            .parse()
            .map_err(|e| DomainError::Gateway(format!("unreadable amount: {e}")))?;
        Ok(GatewayPayment {
            id: r.id,
            status,
            amount,
            currency: r.amount.currency,
            description: r.description,
            confirmation_url: r.confirmation.and_then(|c| c.confirmation_url),
            metadata: r.metadata,
        })
    }
}

/// REST client for the payment gateway, authenticated with the shop id and secret key.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    config: GatewayConfig,
    client: Client,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                DomainError::Internal(format!("could not initialise gateway client: {e}"))
            })?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// `…/payments/{gateway_id}` with the id percent-encoded as one path segment.
    fn payment_url(&self, gateway_id: &str) -> Result<Url, DomainError> {
        let mut url = Url::parse(&self.url("/payments"))
            .map_err(|e| DomainError::Internal(format!("invalid gateway base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| DomainError::Internal("gateway base url cannot carry a path".into()))?
            .push(gateway_id);
        Ok(url)
    }

    fn authorised(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.config.shop_id, Some(self.config.secret_key.reveal()))
    }

    async fn read_payment(response: Response) -> Result<GatewayPayment, DomainError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DomainError::Gateway(format!("gateway answered {status}: {message}")));
        }
        let body = response
            .json::<PaymentResponse>()
            .await
            .map_err(|e| DomainError::Gateway(format!("could not read gateway response: {e}")))?;
        GatewayPayment::try_from(body)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment(
        &self,
        request: &GatewayPaymentRequest,
        idempotency_key: &str,
    ) -> Result<GatewayPayment, DomainError> {
        let metadata = serde_json::to_value(&request.metadata)
            .map_err(|e| DomainError::Internal(format!("could not encode metadata: {e}")))?;
        let body = CreatePaymentBody {
            amount: AmountBody {
                value: request.amount.to_string(),
                currency: request.currency.clone(),
            },
            capture: true,
            confirmation: ConfirmationRequest {
                kind: "redirect",
                return_url: &request.return_url,
            },
            description: &request.description,
            metadata,
        };
        debug!("Creating gateway payment for order {}", request.metadata.order_id);
        let response = self
            .authorised(self.client.post(self.url("/payments")))
            .header(IDEMPOTENCE_KEY_HEADER, idempotency_key)
            .json(&body)
            .send()
            .await?;
        let payment = Self::read_payment(response).await?;
        info!("Gateway created payment {} ({})", payment.id, payment.status);
        Ok(payment)
    }

    async fn get_payment(&self, gateway_id: &str) -> Result<GatewayPayment, DomainError> {
        trace!("Fetching gateway payment {gateway_id}");
        let response = self
            .authorised(self.client.get(self.payment_url(gateway_id)?))
            .send()
            .await?;
        Self::read_payment(response).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use serde_json::{json, Value};
    use uuid::Uuid;

    use super::*;
    use crate::config::Secret;
    use crate::domain::payment::PaymentMetadata;

    #[derive(Default)]
    struct Seen {
        authorization: Option<String>,
        idempotence_key: Option<String>,
        body: Option<Value>,
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .expect("bind failed")
            .local_addr()
            .expect("addr failed")
            .port()
    }

    fn header(req: &HttpRequest, name: &str) -> Option<String> {
        req.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    }

    async fn create(
        req: HttpRequest,
        body: web::Json<Value>,
        seen: web::Data<Arc<Mutex<Seen>>>,
    ) -> HttpResponse {
        let body = body.into_inner();
        let mut seen = seen.lock().unwrap();
        seen.authorization = header(&req, "Authorization");
        seen.idempotence_key = header(&req, IDEMPOTENCE_KEY_HEADER);
        seen.body = Some(body.clone());
        HttpResponse::Ok().json(json!({
            "id": "2d9f-gw",
            "status": "pending",
            "paid": false,
            "amount": body["amount"],
            "description": body["description"],
            "confirmation": {
                "type": "redirect",
                "confirmation_url": "https://pay.example/2d9f-gw"
            },
            "metadata": body["metadata"],
        }))
    }

    async fn fetch(path: web::Path<String>) -> HttpResponse {
        match path.as_str() {
            "2d9f-gw" => HttpResponse::Ok().json(json!({
                "id": "2d9f-gw",
                "status": "succeeded",
                "amount": { "value": "24.00", "currency": "RUB" },
                "metadata": {},
            })),
            _ => HttpResponse::InternalServerError()
                .json(json!({ "type": "error", "code": "internal_server_error" })),
        }
    }

    async fn fake_gateway() -> (String, Arc<Mutex<Seen>>) {
        let port = free_port();
        let seen = Arc::new(Mutex::new(Seen::default()));
        let data = web::Data::new(seen.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/v3/payments", web::post().to(create))
                .route("/v3/payments/{id}", web::get().to(fetch))
        })
        .workers(1)
        .bind(("127.0.0.1", port))
        .expect("bind fake gateway")
        .run();
        tokio::spawn(server);
        (format!("http://127.0.0.1:{port}/v3"), seen)
    }

    fn gateway(base_url: String) -> HttpPaymentGateway {
        HttpPaymentGateway::new(GatewayConfig {
            base_url,
            shop_id: "123456".into(),
            secret_key: Secret::new("test_secret".into()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn create_sends_credentials_idempotence_key_and_amount_string() {
        let (url, seen) = fake_gateway().await;
        let order_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let request = GatewayPaymentRequest {
            amount: "24.00".parse().unwrap(),
            currency: "RUB".into(),
            description: "Order payment".into(),
            return_url: "https://shop.example/return".into(),
            metadata: PaymentMetadata { order_id, user_id },
        };

        let payment = gateway(url).create_payment(&request, "key-1").await.unwrap();

        assert_eq!(payment.id, "2d9f-gw");
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount.to_string(), "24.00");
        assert_eq!(payment.confirmation_url.as_deref(), Some("https://pay.example/2d9f-gw"));
        assert_eq!(payment.order_id(), Some(order_id));

        let seen = seen.lock().unwrap();
        // base64("123456:test_secret")
        assert_eq!(seen.authorization.as_deref(), Some("Basic MTIzNDU2OnRlc3Rfc2VjcmV0"));
        assert_eq!(seen.idempotence_key.as_deref(), Some("key-1"));
        let body = seen.body.as_ref().unwrap();
        assert_eq!(body["amount"]["value"], "24.00");
        assert_eq!(body["amount"]["currency"], "RUB");
        assert_eq!(body["capture"], true);
        assert_eq!(body["confirmation"]["type"], "redirect");
        assert_eq!(body["confirmation"]["return_url"], "https://shop.example/return");
        assert_eq!(body["metadata"]["user_id"], user_id.to_string());
    }

    #[tokio::test]
    async fn get_payment_reads_remote_status() {
        let (url, _) = fake_gateway().await;

        let payment = gateway(url).get_payment("2d9f-gw").await.unwrap();

        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert_eq!(payment.order_id(), None);
    }

    #[tokio::test]
    async fn error_status_becomes_gateway_error() {
        let (url, _) = fake_gateway().await;

        let err = gateway(url).get_payment("missing").await.unwrap_err();

        assert!(matches!(err, DomainError::Gateway(_)));
    }

    #[test]
    fn payment_id_cannot_escape_its_path_segment() {
        let gateway = gateway("http://127.0.0.1:9/v3".into());

        let url = gateway.payment_url("2d9f-gw").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/v3/payments/2d9f-gw");

        let url = gateway.payment_url("../refunds?limit=100#x").unwrap();
        assert_eq!(url.path(), "/v3/payments/..%2Frefunds%3Flimit=100%23x");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_gateway_error() {
        let url = format!("http://127.0.0.1:{}/v3", free_port());

        let err = gateway(url).get_payment("2d9f-gw").await.unwrap_err();

        assert!(matches!(err, DomainError::Gateway(_)));
    }
}
