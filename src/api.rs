//! Transport-agnostic HTTP surface.
//!
//! `Router::handle` maps a method, a path (with optional query string), the
//! authenticated principal and a JSON body onto `IncidentStore` operations.
//! Embedding services plug it into whatever HTTP server they run.
//!
//! | Method | Path                                  | Operation             |
//! |--------|---------------------------------------|-----------------------|
//! | POST   | `/incidents`                          | create                |
//! | GET    | `/incidents?status=..&page=..`        | list                  |
//! | GET    | `/incidents/:id`                      | get                   |
//! | PATCH  | `/incidents/:id`                      | update                |
//! | DELETE | `/incidents/:id`                      | delete                |
//! | POST   | `/incidents/:id/attachments`          | add attachments       |
//! | GET    | `/incidents/:id/attachments/:aid`     | download attachment   |
//! | POST   | `/incidents/:id/export`               | export                |
//! | GET    | `/incidents/:id/audit-log`            | audit log             |

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::form_urlencoded;

use crate::error::{IncidentError, Result};
use crate::incident::IncidentStore;
use crate::model::{AttachmentUpload, IncidentFilters, IncidentPatch, NewIncident, Principal};
use crate::schema::ValidationErrors;

/// Status code and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, body: &T) -> Result<Self> {
        Ok(Self {
            status,
            body: serde_json::to_value(body)?,
        })
    }

    fn message(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }

    /// Error body for `err`. Server-side failures are logged and reported
    /// with a generic message so internals never reach the caller.
    pub fn from_error(err: &IncidentError) -> Self {
        let status = err.status_code();
        let body = match err {
            IncidentError::Validation(errors) => {
                json!({ "error": "validation failed", "fields": errors.issues })
            }
            _ if status >= 500 => {
                tracing::error!(error = %err, "request failed");
                json!({ "error": "internal error" })
            }
            _ => json!({ "error": err.to_string() }),
        };
        Self { status, body }
    }
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    files: Vec<AttachmentUpload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportBody {
    anonymize: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Incidents,
    Incident(&'a str),
    Attachments(&'a str),
    Attachment(&'a str, &'a str),
    Export(&'a str),
    AuditLog(&'a str),
}

fn parse_route(path: &str) -> Option<Route<'_>> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    match segments[..] {
        ["incidents"] => Some(Route::Incidents),
        ["incidents", id] => Some(Route::Incident(id)),
        ["incidents", id, "attachments"] => Some(Route::Attachments(id)),
        ["incidents", id, "attachments", aid] => Some(Route::Attachment(id, aid)),
        ["incidents", id, "export"] => Some(Route::Export(id)),
        ["incidents", id, "audit-log"] => Some(Route::AuditLog(id)),
        _ => None,
    }
}

fn parse_body<T: DeserializeOwned>(body: Option<Value>) -> Result<T> {
    let body = body.ok_or_else(|| {
        IncidentError::Validation(ValidationErrors::single("body", "request body is required"))
    })?;
    serde_json::from_value(body)
        .map_err(|e| IncidentError::Validation(ValidationErrors::single("body", e.to_string())))
}

fn invalid_param(name: &str, value: &str) -> IncidentError {
    IncidentError::Validation(ValidationErrors::single(
        name,
        format!("invalid value {:?}", value),
    ))
}

fn parse_enum<T: DeserializeOwned>(name: &str, value: &str) -> Result<T> {
    serde_json::from_value(Value::String(value.to_string())).map_err(|_| invalid_param(name, value))
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid_param(name, value))
}

fn parse_number(name: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| invalid_param(name, value))
}

/// List filters and paging from a query string. Unknown keys are ignored.
fn parse_list_query(query: &str) -> Result<(IncidentFilters, Option<usize>, Option<usize>)> {
    let mut filters = IncidentFilters::default();
    let mut page = None;
    let mut page_size = None;

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "status" => filters.status = Some(parse_enum("status", &value)?),
            "incidentType" => filters.incident_type = Some(parse_enum("incidentType", &value)?),
            "severity" => filters.severity = Some(parse_enum("severity", &value)?),
            "dateFrom" => filters.date_from = Some(parse_date("dateFrom", &value)?),
            "dateTo" => filters.date_to = Some(parse_date("dateTo", &value)?),
            "youthId" => filters.youth_id = Some(value.into_owned()),
            "search" => filters.search = Some(value.into_owned()),
            "page" => page = Some(parse_number("page", &value)?),
            "pageSize" => page_size = Some(parse_number("pageSize", &value)?),
            _ => {}
        }
    }
    Ok((filters, page, page_size))
}

/// Dispatches requests to an `IncidentStore`.
#[derive(Clone)]
pub struct Router {
    store: Arc<IncidentStore>,
}

impl Router {
    pub fn new(store: Arc<IncidentStore>) -> Self {
        Self { store }
    }

    pub fn handle(
        &self,
        method: &str,
        path_and_query: &str,
        principal: Option<&Principal>,
        body: Option<Value>,
    ) -> ApiResponse {
        let principal = match principal {
            Some(p) => p,
            None => return ApiResponse::from_error(&IncidentError::AuthenticationMissing),
        };

        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        let route = match parse_route(path) {
            Some(route) => route,
            None => return ApiResponse::message(404, "route not found"),
        };

        let method = method.to_ascii_uppercase();
        let result = match (method.as_str(), route) {
            ("POST", Route::Incidents) => self.create(principal, body),
            ("GET", Route::Incidents) => self.list(principal, query),
            ("GET", Route::Incident(id)) => self
                .store
                .get(id, principal)
                .and_then(|incident| ApiResponse::json(200, &incident)),
            ("PATCH", Route::Incident(id)) => parse_body::<IncidentPatch>(body)
                .and_then(|patch| self.store.update(id, patch, principal))
                .and_then(|incident| ApiResponse::json(200, &incident)),
            ("DELETE", Route::Incident(id)) => self.store.delete(id, principal).map(|()| ApiResponse {
                status: 204,
                body: Value::Null,
            }),
            ("POST", Route::Attachments(id)) => parse_body::<UploadBody>(body)
                .and_then(|upload| self.store.add_attachments(id, upload.files, principal))
                .and_then(|added| ApiResponse::json(201, &json!({ "attachments": added }))),
            ("GET", Route::Attachment(id, attachment_id)) => self
                .store
                .download_attachment(id, attachment_id, principal)
                .and_then(|(attachment, bytes)| {
                    ApiResponse::json(
                        200,
                        &json!({ "attachment": attachment, "data": STANDARD.encode(bytes) }),
                    )
                }),
            ("POST", Route::Export(id)) => {
                let options = match body {
                    Some(Value::Null) | None => Ok(ExportBody::default()),
                    body => parse_body::<ExportBody>(body),
                };
                options
                    .and_then(|opts| self.store.export(id, principal, opts.anonymize))
                    .and_then(|view| ApiResponse::json(200, &view))
            }
            ("GET", Route::AuditLog(id)) => self
                .store
                .audit_log(id, principal)
                .and_then(|entries| ApiResponse::json(200, &entries)),
            _ => return ApiResponse::message(405, "method not allowed"),
        };

        result.unwrap_or_else(|err| ApiResponse::from_error(&err))
    }

    fn create(&self, principal: &Principal, body: Option<Value>) -> Result<ApiResponse> {
        let payload = parse_body::<NewIncident>(body)?;
        let incident = self.store.create(payload, principal)?;
        ApiResponse::json(201, &incident)
    }

    fn list(&self, principal: &Principal, query: &str) -> Result<ApiResponse> {
        let (filters, page, page_size) = parse_list_query(query)?;
        let page = self.store.list(filters, principal, page, page_size)?;
        ApiResponse::json(200, &page)
    }
}
