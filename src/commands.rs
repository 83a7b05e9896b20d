// Backoffice business operations
// Picklist creation, order export and customer email over the authenticated API

use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::CredentialSource;
use crate::error::GuardError;
use crate::http_client::{ApiResponse, BackofficeClient};
use crate::week::{default_picklist_name, parse_date, WeekWindow};

/// Order statuses included when generating vendor picklists
const PICKLIST_STATUSES: [&str; 4] = ["OPEN", "NEEDS_APPROVAL", "CANCELLED", "CLOSED"];

const PAGE_SIZE: &str = "500";

/// API response annotated with how the call was authenticated
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    #[serde(flatten)]
    pub response: ApiResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_ids_count: Option<usize>,
    pub auth_source: CredentialSource,
}

impl CommandOutput {
    pub fn new(response: ApiResponse, auth_source: CredentialSource) -> Self {
        Self {
            response,
            status: None,
            vendor_ids_count: None,
            auth_source,
        }
    }
}

/// Picklist batch parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PicklistRequest {
    pub start_date: String,
    pub end_date: String,
    pub name: String,
    pub note: Option<String>,
}

impl PicklistRequest {
    /// Validate dates against the fulfillment week and fill in defaults.
    /// A blank name becomes the end date's delivery name; a blank note is dropped.
    pub fn prepare(
        start_date: &str,
        end_date: &str,
        name: &str,
        note: &str,
        window: Option<&WeekWindow>,
    ) -> Result<Self, GuardError> {
        let start_date = start_date.trim();
        let end_date = end_date.trim();
        parse_date(start_date)?;
        parse_date(end_date)?;

        if let Some(window) = window {
            window.guard(start_date, end_date)?;
        }

        let name = match name.trim() {
            "" => default_picklist_name(end_date)?,
            given => given.to_string(),
        };
        let note = Some(note.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(Self {
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            name,
            note,
        })
    }
}

/// Picklist output; a 401 from the API is reported as an auth failure
pub fn picklist_output(
    response: ApiResponse,
    vendor_ids_count: usize,
    auth_source: CredentialSource,
) -> CommandOutput {
    let unauthorized = response.status_code == Some(401);
    let mut output = CommandOutput::new(response, auth_source);
    output.vendor_ids_count = Some(vendor_ids_count);
    if unauthorized {
        output.status = Some("AUTH_FAILED");
    }
    output
}

/// Business endpoints under the backoffice API base
pub struct Backoffice<'a> {
    client: &'a BackofficeClient,
    api_base: String,
    token: &'a str,
}

impl<'a> Backoffice<'a> {
    pub fn new(client: &'a BackofficeClient, api_base: &str, token: &'a str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// Ids of vendors the hub manages itself (connected vendors excluded)
    pub async fn managed_vendor_ids(&self) -> Vec<i64> {
        let response = self
            .client
            .get_json(
                &self.url("vendors/"),
                Some(self.token),
                &[("page_size", PAGE_SIZE.to_string())],
            )
            .await;

        if !response.ok {
            tracing::warn!(
                status = ?response.status_code,
                "Vendor lookup failed, creating picklists without vendor ids"
            );
            return Vec::new();
        }

        response
            .data
            .as_ref()
            .map(managed_vendor_ids_from)
            .unwrap_or_default()
    }

    /// Create vendor picklists for a fulfillment range
    pub async fn create_picklists(&self, request: &PicklistRequest) -> (ApiResponse, usize) {
        let vendor_ids = self.managed_vendor_ids().await;
        tracing::info!(
            vendors = vendor_ids.len(),
            "Creating picklists '{}' for {}..{}",
            request.name,
            request.start_date,
            request.end_date
        );

        let payload = json!({
            "name": request.name,
            "hub_note": request.note,
            "send_to_all": true,
            "vendor_ids": vendor_ids,
            "copy_on_emails": false,
        });

        let mut query = vec![
            ("fulfillment_date_start", request.start_date.clone()),
            ("fulfillment_date_end", request.end_date.clone()),
        ];
        query.extend(PICKLIST_STATUSES.iter().map(|s| ("status", s.to_string())));

        let response = self
            .client
            .post_json(
                &self.url("orders/create-vendor-picklists/"),
                Some(self.token),
                &payload,
                &query,
            )
            .await;

        (response, vendor_ids.len())
    }

    /// Orders for a date range with package price entries expanded
    pub async fn export_orders(&self, start_date: &str, end_date: &str) -> ApiResponse {
        self.client
            .get_json(
                &self.url("orders/"),
                Some(self.token),
                &[
                    ("start_date", start_date.to_string()),
                    ("end_date", end_date.to_string()),
                    ("expand", "order_entries.package_price_list_entry".to_string()),
                    ("page_size", PAGE_SIZE.to_string()),
                ],
            )
            .await
    }

    /// Send a proof email to a single customer
    pub async fn email_customer_proof(
        &self,
        subject: &str,
        body: &str,
        customer_id: &str,
    ) -> ApiResponse {
        self.client
            .post_form(
                &self.url("customers/email"),
                Some(self.token),
                &[("id", customer_id.to_string())],
                &[("subject", subject), ("body", body), ("send_to_all", "false")],
            )
            .await
    }

    /// Send an email to every customer
    pub async fn email_all_customers(&self, subject: &str, body: &str) -> ApiResponse {
        self.client
            .post_form(
                &self.url("customers/email"),
                Some(self.token),
                &[],
                &[("subject", subject), ("body", body), ("send_to_all", "true")],
            )
            .await
    }
}

/// Vendor ids from a list or paginated `results`, skipping connected vendors
fn managed_vendor_ids_from(data: &Value) -> Vec<i64> {
    let items = match data {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .filter(|vendor| vendor.get("connected") != Some(&Value::Bool(true)))
        .filter_map(|vendor| vendor.get("id").and_then(Value::as_i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_vendor_ids_from_paginated_results() {
        let data = json!({
            "count": 4,
            "results": [
                {"id": 1, "connected": false},
                {"id": 2, "connected": true},
                {"id": "3"},
                {"id": 4},
                "junk"
            ]
        });
        assert_eq!(managed_vendor_ids_from(&data), vec![1, 4]);
    }

    #[test]
    fn test_vendor_ids_from_bare_list() {
        let data = json!([{"id": 7}, {"id": 8, "connected": null}]);
        assert_eq!(managed_vendor_ids_from(&data), vec![7, 8]);
    }

    #[test]
    fn test_vendor_ids_from_unexpected_shape() {
        assert!(managed_vendor_ids_from(&json!({"detail": "x"})).is_empty());
        assert!(managed_vendor_ids_from(&json!("text")).is_empty());
    }

    #[tokio::test]
    async fn test_create_picklists_payload() {
        let mut server = mockito::Server::new_async().await;
        let vendors = server
            .mock("GET", "/vendors/")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"results":[{"id":11},{"id":12,"connected":true}]}"#)
            .create_async()
            .await;
        let picklists = server
            .mock("POST", "/orders/create-vendor-picklists/")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("fulfillment_date_start".into(), "2026-10-09".into()),
                Matcher::UrlEncoded("fulfillment_date_end".into(), "2026-10-15".into()),
                Matcher::Regex(
                    "status=OPEN&status=NEEDS_APPROVAL&status=CANCELLED&status=CLOSED".into(),
                ),
            ]))
            .match_body(Matcher::Json(json!({
                "name": "Thursday, Oct 15th Deliveries",
                "hub_note": null,
                "send_to_all": true,
                "vendor_ids": [11],
                "copy_on_emails": false
            })))
            .with_status(200)
            .with_body(r#"{"id":99}"#)
            .create_async()
            .await;

        let client = BackofficeClient::new(5).unwrap();
        let api = Backoffice::new(&client, &server.url(), "tok");
        let (response, vendor_count) = api
            .create_picklists(&PicklistRequest {
                start_date: "2026-10-09".to_string(),
                end_date: "2026-10-15".to_string(),
                name: "Thursday, Oct 15th Deliveries".to_string(),
                note: None,
            })
            .await;

        vendors.assert_async().await;
        picklists.assert_async().await;
        assert!(response.ok);
        assert_eq!(vendor_count, 1);
    }

    #[tokio::test]
    async fn test_vendor_lookup_failure_yields_no_ids() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/vendors/")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = BackofficeClient::new(5).unwrap();
        let api = Backoffice::new(&client, &server.url(), "tok");
        assert!(api.managed_vendor_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_email_proof_targets_customer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/customers/email")
            .match_query(Matcher::UrlEncoded("id".into(), "744150".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("subject".into(), "Hello".into()),
                Matcher::UrlEncoded("body".into(), "Pickup moved".into()),
                Matcher::UrlEncoded("send_to_all".into(), "false".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"sent":1}"#)
            .create_async()
            .await;

        let client = BackofficeClient::new(5).unwrap();
        let api = Backoffice::new(&client, &server.url(), "tok");
        let response = api
            .email_customer_proof("Hello", "Pickup moved", "744150")
            .await;

        mock.assert_async().await;
        assert_eq!(response.data, Some(json!({"sent": 1})));
    }

    #[test]
    fn test_prepare_fills_defaults() {
        let window = WeekWindow {
            start: parse_date("2026-10-09").unwrap(),
            end: parse_date("2026-10-15").unwrap(),
        };
        let request =
            PicklistRequest::prepare("2026-10-09", "2026-10-15", " ", "  ", Some(&window))
                .unwrap();

        assert_eq!(request.name, "Thursday, Oct 15th Deliveries");
        assert_eq!(request.note, None);
    }

    #[test]
    fn test_prepare_keeps_given_name_and_note() {
        let request = PicklistRequest::prepare(
            "2026-10-16",
            "2026-10-22",
            "Holiday run",
            " Pack early ",
            None,
        )
        .unwrap();

        assert_eq!(request.name, "Holiday run");
        assert_eq!(request.note.as_deref(), Some("Pack early"));
    }

    #[test]
    fn test_prepare_guard_blocks_other_weeks() {
        let window = WeekWindow {
            start: parse_date("2026-10-09").unwrap(),
            end: parse_date("2026-10-15").unwrap(),
        };
        let err = PicklistRequest::prepare("2026-10-16", "2026-10-22", "", "", Some(&window))
            .unwrap_err();

        assert!(matches!(err, GuardError::OutsideCurrentWeek { .. }));
    }

    #[test]
    fn test_prepare_rejects_malformed_dates() {
        let err = PicklistRequest::prepare("10/09/2026", "2026-10-15", "", "", None).unwrap_err();
        assert_eq!(err, GuardError::InvalidDate("10/09/2026".to_string()));
    }

    #[test]
    fn test_picklist_output_flags_unauthorized() {
        let response = ApiResponse {
            status_code: Some(401),
            ok: false,
            url: "http://api/orders/create-vendor-picklists/".to_string(),
            data: None,
            error: Some("Given token not valid".to_string()),
            error_kind: None,
        };
        let output = picklist_output(response, 2, CredentialSource::StoreAccess);

        assert_eq!(output.status, Some("AUTH_FAILED"));
        assert_eq!(output.vendor_ids_count, Some(2));
    }

    #[test]
    fn test_command_output_serialization() {
        let response = ApiResponse {
            status_code: Some(200),
            ok: true,
            url: "http://api/orders/".to_string(),
            data: Some(json!([])),
            error: None,
            error_kind: None,
        };
        let mut output = CommandOutput::new(response, CredentialSource::StoreRefresh);
        output.vendor_ids_count = Some(3);

        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["auth_source"], "store-refresh");
        assert_eq!(value["vendor_ids_count"], 3);
        assert_eq!(value["status_code"], 200);
        assert!(value.get("status").is_none());
    }
}
