//! Remote API gateway: typed HTTP calls to the CRM backend.
//!
//! The [`RemoteApi`] trait is the seam the facade and the sync queue talk
//! through; [`ApiGateway`] is its `reqwest` implementation.

use core::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crm_core::EntityKind;

use crate::config::StoreConfig;

/// Remote resource collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Endpoint {
    Contacts,
    Quotes,
    Invoices,
    BonLivraison,
    Products,
    Services,
    Tasks,
    Events,
    Users,
    /// Singleton company settings document.
    CompanySettings,
    /// Integration configurations, keyed by their `type`.
    IntegrationSettings,
}

impl Endpoint {
    pub const ALL: [Endpoint; 11] = [
        Endpoint::Contacts,
        Endpoint::Quotes,
        Endpoint::Invoices,
        Endpoint::BonLivraison,
        Endpoint::Products,
        Endpoint::Services,
        Endpoint::Tasks,
        Endpoint::Events,
        Endpoint::Users,
        Endpoint::CompanySettings,
        Endpoint::IntegrationSettings,
    ];

    /// Logical name, used as the entity half of sync action keys.
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::CompanySettings => "settings",
            Endpoint::IntegrationSettings => "integrations",
            other => other.kind().map(EntityKind::name).unwrap_or_default(),
        }
    }

    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Contact => Endpoint::Contacts,
            EntityKind::Product => Endpoint::Products,
            EntityKind::Service => Endpoint::Services,
            EntityKind::Quote => Endpoint::Quotes,
            EntityKind::Invoice => Endpoint::Invoices,
            EntityKind::BonLivraison => Endpoint::BonLivraison,
            EntityKind::Task => Endpoint::Tasks,
            EntityKind::CalendarEvent => Endpoint::Events,
            EntityKind::User => Endpoint::Users,
        }
    }

    pub fn kind(self) -> Option<EntityKind> {
        match self {
            Endpoint::Contacts => Some(EntityKind::Contact),
            Endpoint::Quotes => Some(EntityKind::Quote),
            Endpoint::Invoices => Some(EntityKind::Invoice),
            Endpoint::BonLivraison => Some(EntityKind::BonLivraison),
            Endpoint::Products => Some(EntityKind::Product),
            Endpoint::Services => Some(EntityKind::Service),
            Endpoint::Tasks => Some(EntityKind::Task),
            Endpoint::Events => Some(EntityKind::CalendarEvent),
            Endpoint::Users => Some(EntityKind::User),
            Endpoint::CompanySettings | Endpoint::IntegrationSettings => None,
        }
    }

    pub fn is_settings(self) -> bool {
        self.kind().is_none()
    }

    /// Path of the collection, relative to the API base URL.
    pub fn collection_path(self) -> String {
        match self {
            Endpoint::CompanySettings => "/settings/company".to_string(),
            Endpoint::IntegrationSettings => "/settings/integrations".to_string(),
            other => format!("/{}", other.name()),
        }
    }

    /// Route template of a single record, e.g. `/invoices/:id`.
    pub fn item_template(self) -> String {
        if self.is_settings() {
            self.collection_path()
        } else {
            format!("{}/:id", self.collection_path())
        }
    }

    /// Path of a single record. Settings documents are addressed without an ID.
    pub fn item_path(self, id: &str) -> String {
        if self.is_settings() {
            self.collection_path()
        } else {
            format!("{}/{}", self.collection_path(), id)
        }
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|endpoint| endpoint.name() == s)
            .ok_or_else(|| GatewayError::InvalidPayload(format!("unknown endpoint '{s}'")))
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.name().to_string()
    }
}

impl TryFrom<String> for Endpoint {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind of remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

impl MutationOp {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationOp::Create => "create",
            MutationOp::Update => "update",
            MutationOp::Delete => "delete",
        }
    }

    pub fn method(self) -> Method {
        match self {
            MutationOp::Create => Method::POST,
            MutationOp::Update => Method::PUT,
            MutationOp::Delete => Method::DELETE,
        }
    }
}

impl core::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationOp {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(MutationOp::Create),
            "update" => Ok(MutationOp::Update),
            "delete" => Ok(MutationOp::Delete),
            other => Err(GatewayError::InvalidPayload(format!(
                "unknown operation '{other}'"
            ))),
        }
    }
}

/// Failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The server answered with a non-2xx status.
    #[error("API error {status}: {status_text}")]
    Status { status: u16, status_text: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid response body: {0}")]
    Decode(String),

    /// The mutation cannot be sent as-is (missing ID, unknown endpoint).
    #[error("invalid request: {0}")]
    InvalidPayload(String),

    /// Remote calls are disabled or the facade was disposed.
    #[error("remote API is unavailable")]
    Disabled,
}

impl GatewayError {
    /// HTTP status of the failure, 0 when no response was received.
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Status { status, .. } => *status,
            _ => 0,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::Timeout | GatewayError::Disabled => true,
            GatewayError::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            GatewayError::Decode(_) | GatewayError::InvalidPayload(_) => false,
        }
    }

    /// The remote API could not be reached at all, as opposed to answering
    /// with an error.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_) | GatewayError::Timeout | GatewayError::Disabled
        )
    }

    fn from_status(status: StatusCode) -> Self {
        GatewayError::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

/// Query parameters of a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ListParams {
    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedList<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

impl<T> PagedList<T> {
    /// Slice `items` according to `params`; without a limit the whole list is
    /// a single page.
    pub fn paginate(items: Vec<T>, params: &ListParams) -> Self {
        let total = items.len();
        let page = params.page.unwrap_or(1).max(1);
        match params.limit.filter(|limit| *limit > 0) {
            None => Self {
                data: items,
                total,
                page: 1,
                limit: u32::try_from(total).unwrap_or(u32::MAX),
            },
            Some(limit) => {
                let skip = (page as usize - 1).saturating_mul(limit as usize);
                let data = items.into_iter().skip(skip).take(limit as usize).collect();
                Self { data, total, page, limit }
            }
        }
    }
}

/// List payload as the backend may return it: paged envelope or bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody {
    Bare(Vec<Value>),
    Paged {
        data: Vec<Value>,
        total: Option<usize>,
        page: Option<u32>,
        limit: Option<u32>,
    },
}

impl ListBody {
    fn into_page(self, params: &ListParams) -> PagedList<Value> {
        match self {
            ListBody::Bare(items) => PagedList::paginate(items, &ListParams {
                page: None,
                limit: None,
                ..params.clone()
            }),
            ListBody::Paged { data, total, page, limit } => PagedList {
                total: total.unwrap_or(data.len()),
                page: page.or(params.page).unwrap_or(1),
                limit: limit
                    .or(params.limit)
                    .unwrap_or_else(|| u32::try_from(data.len()).unwrap_or(u32::MAX)),
                data,
            },
        }
    }
}

/// Operations the persistence layer needs from the backend.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `GET {base}/health`.
    async fn health(&self) -> Result<(), GatewayError>;

    async fn list(&self, endpoint: Endpoint, params: &ListParams) -> Result<PagedList<Value>, GatewayError>;

    async fn create(&self, endpoint: Endpoint, body: &Value) -> Result<Value, GatewayError>;

    async fn update(&self, endpoint: Endpoint, id: &str, body: &Value) -> Result<Value, GatewayError>;

    async fn delete(&self, endpoint: Endpoint, id: &str) -> Result<(), GatewayError>;
}

/// HTTP client of the CRM backend.
#[derive(Debug, Clone)]
pub struct ApiGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiGateway {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.api_url.clone(),
            config.api_token.clone(),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn builder(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send a request and decode its JSON body. An empty body decodes as `null`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, GatewayError> {
        let mut req = self.builder(method.clone(), path);
        if let Some(body) = body {
            req = req.json(body);
        }
        send_json(req, &method, path).await
    }
}

async fn send_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
    method: &Method,
    path: &str,
) -> Result<T, GatewayError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        tracing::debug!("{method} {path} failed with {status}");
        return Err(GatewayError::from_status(status));
    }

    let bytes = resp.bytes().await?;
    let value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).map_err(|err| GatewayError::Decode(err.to_string()))?
    };
    serde_json::from_value(value).map_err(|err| GatewayError::Decode(err.to_string()))
}

#[async_trait]
impl RemoteApi for ApiGateway {
    /// Only the status matters; the body may be anything.
    async fn health(&self) -> Result<(), GatewayError> {
        let status = self.builder(Method::GET, "/health").send().await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GatewayError::from_status(status))
        }
    }

    async fn list(&self, endpoint: Endpoint, params: &ListParams) -> Result<PagedList<Value>, GatewayError> {
        let path = endpoint.collection_path();
        let req = self.builder(Method::GET, &path).query(params);
        let body: ListBody = send_json(req, &Method::GET, &path).await?;
        Ok(body.into_page(params))
    }

    async fn create(&self, endpoint: Endpoint, body: &Value) -> Result<Value, GatewayError> {
        // Settings documents are upserted in place.
        let method = if endpoint.is_settings() {
            Method::PUT
        } else {
            Method::POST
        };
        self.request(method, &endpoint.collection_path(), Some(body)).await
    }

    async fn update(&self, endpoint: Endpoint, id: &str, body: &Value) -> Result<Value, GatewayError> {
        self.request(Method::PUT, &endpoint.item_path(id), Some(body)).await
    }

    async fn delete(&self, endpoint: Endpoint, id: &str) -> Result<(), GatewayError> {
        self.request::<Value>(Method::DELETE, &endpoint.item_path(id), None)
            .await?;
        Ok(())
    }
}

/// Send one mutation through `remote`.
///
/// Update and delete address the record by the payload's `id` field, which is
/// required except for settings documents.
pub async fn push_mutation(
    remote: &dyn RemoteApi,
    op: MutationOp,
    endpoint: Endpoint,
    payload: &Value,
) -> Result<Option<Value>, GatewayError> {
    let id = payload.get("id").and_then(Value::as_str).unwrap_or_default();
    if op != MutationOp::Create && id.is_empty() && !endpoint.is_settings() {
        return Err(GatewayError::InvalidPayload(format!(
            "{op} on '{endpoint}' requires an 'id' field"
        )));
    }

    match op {
        MutationOp::Create => remote.create(endpoint, payload).await.map(Some),
        MutationOp::Update => remote.update(endpoint, id, payload).await.map(Some),
        MutationOp::Delete => remote.delete(endpoint, id).await.map(|()| None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_paths_follow_the_route_table() {
        assert_eq!(Endpoint::Invoices.collection_path(), "/invoices");
        assert_eq!(Endpoint::BonLivraison.item_template(), "/bonLivraison/:id");
        assert_eq!(Endpoint::Events.item_path("EVT-001"), "/events/EVT-001");
        assert_eq!(Endpoint::CompanySettings.item_path("ignored"), "/settings/company");
        assert_eq!(Endpoint::IntegrationSettings.collection_path(), "/settings/integrations");
    }

    #[test]
    fn endpoint_names_parse_back() {
        for endpoint in Endpoint::ALL {
            assert_eq!(endpoint.name().parse::<Endpoint>().unwrap(), endpoint);
        }
        assert!("bonlivraison".parse::<Endpoint>().is_err());
        for kind in EntityKind::ALL {
            assert_eq!(Endpoint::for_kind(kind).kind(), Some(kind));
        }
    }

    #[test]
    fn transient_classification() {
        let status = |status| GatewayError::Status {
            status,
            status_text: String::new(),
        };
        assert!(GatewayError::Timeout.is_transient());
        assert!(GatewayError::Network("reset".into()).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(status(408).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(404).is_transient());
        assert!(!GatewayError::Decode("eof".into()).is_transient());
        assert_eq!(status(404).status(), 404);
        assert_eq!(GatewayError::Timeout.status(), 0);

        assert!(GatewayError::Timeout.is_connectivity());
        assert!(GatewayError::Network("refused".into()).is_connectivity());
        assert!(!status(503).is_connectivity());
        assert!(!status(429).is_connectivity());
    }

    #[test]
    fn paginate_slices_pages() {
        let items: Vec<u32> = (1..=25).collect();
        let page = PagedList::paginate(items.clone(), &ListParams::default().page(3, 10));
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total, 25);
        assert_eq!(page.page, 3);

        let all = PagedList::paginate(items, &ListParams::default());
        assert_eq!(all.data.len(), 25);
        assert_eq!(all.page, 1);
    }

    #[test]
    fn list_body_accepts_bare_arrays_and_envelopes() {
        let bare: ListBody = serde_json::from_value(json!([{ "id": "A" }])).unwrap();
        let page = bare.into_page(&ListParams::default());
        assert_eq!(page.total, 1);

        let paged: ListBody =
            serde_json::from_value(json!({ "data": [{ "id": "A" }], "total": 40, "page": 2, "limit": 1 }))
                .unwrap();
        let page = paged.into_page(&ListParams::default());
        assert_eq!((page.total, page.page, page.limit), (40, 2, 1));
    }

    struct Unreachable;

    #[async_trait]
    impl RemoteApi for Unreachable {
        async fn health(&self) -> Result<(), GatewayError> {
            unreachable!()
        }
        async fn list(&self, _: Endpoint, _: &ListParams) -> Result<PagedList<Value>, GatewayError> {
            unreachable!()
        }
        async fn create(&self, _: Endpoint, _: &Value) -> Result<Value, GatewayError> {
            unreachable!()
        }
        async fn update(&self, _: Endpoint, _: &str, _: &Value) -> Result<Value, GatewayError> {
            unreachable!()
        }
        async fn delete(&self, _: Endpoint, _: &str) -> Result<(), GatewayError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn update_without_id_is_rejected_before_sending() {
        let err = push_mutation(&Unreachable, MutationOp::Update, Endpoint::Invoices, &json!({ "amount": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidPayload(_)));
        assert!(!err.is_transient());
    }
}
