// Multipart proxy dispatcher: rebuilds inbound multipart/form-data bodies
// and forwards them to the backend.

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::proxy::common::body::read_body;
use crate::proxy::server::AppState;
use crate::proxy::session;

const ALLOWED_METHODS: [Method; 3] = [Method::POST, Method::PUT, Method::PATCH];
const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// One uploaded file, buffered for relay. Bytes are read once and dropped
/// with the request scope.
struct FilePart {
    name: String,
    filename: String,
    content_type: String,
    data: Bytes,
}

/// Parsed form: ordered text fields (repeated keys allowed) and file parts.
#[derive(Default)]
struct FormPayload {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

pub(super) async fn handle(state: AppState, path: String, request: Request) -> Response {
    let method = request.method().clone();
    if !ALLOWED_METHODS.contains(&method) {
        return fail(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("Method {} not allowed for FormData requests", method),
            None,
        );
    }

    let (record, reissued) =
        match session::authorize(&state.upstream, &state.sessions, request.headers()).await {
            Ok(authorized) => authorized,
            Err(ProxyError::Unauthorized) => {
                return fail(
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized - No access token".to_string(),
                    None,
                );
            }
            Err(err) => return fail(err.status(), err.to_string(), Some(err.detail())),
        };

    let Some(api_path) = super::normalize_path(&path) else {
        return fail(StatusCode::BAD_REQUEST, "Invalid API path".to_string(), None);
    };

    let multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(err) => {
            return fail(
                StatusCode::BAD_REQUEST,
                "Malformed multipart body".to_string(),
                Some(json!(err.to_string())),
            );
        }
    };

    let payload = match collect_form(multipart).await {
        Ok(payload) => payload,
        Err(err) => {
            return fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal proxy server error".to_string(),
                Some(err.detail()),
            );
        }
    };

    let form = build_form(payload);

    let response = match state
        .upstream
        .send_multipart(method, &api_path, &record.access_token, form)
        .await
    {
        Ok(response) => response,
        Err(ProxyError::GatewayTimeout) => {
            return fail(
                StatusCode::GATEWAY_TIMEOUT,
                "Request timeout".to_string(),
                None,
            );
        }
        Err(err) => {
            return fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal proxy server error".to_string(),
                Some(err.detail()),
            );
        }
    };

    let status = response.status();
    let payload = match read_body(response).await {
        Ok(payload) => payload,
        Err(err) => {
            return fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal proxy server error".to_string(),
                Some(err.detail()),
            );
        }
    };

    let mut reply = if status.is_success() {
        (
            status,
            Json(json!({ "success": true, "data": payload.into_value() })),
        )
            .into_response()
    } else {
        let value = payload.into_value();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("API request failed")
            .to_string();
        (
            status,
            Json(json!({ "success": false, "message": message, "error": value })),
        )
            .into_response()
    };

    super::attach_session_token(&mut reply, reissued);
    reply
}

/// Drains the inbound multipart stream into memory. Parts with a filename
/// are files, everything else is a text field; repeated keys are kept in
/// arrival order.
async fn collect_form(mut multipart: Multipart) -> Result<FormPayload, ProxyError> {
    let mut payload = FormPayload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::Internal(format!("multipart parse error: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(filename) = field.file_name().map(str::to_string) {
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_FILE_MIME.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ProxyError::Internal(format!("failed to read file part: {}", e)))?;
            payload.files.push(FilePart {
                name,
                filename,
                content_type,
                data,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ProxyError::Internal(format!("failed to read form field: {}", e)))?;
            payload.fields.push((name, value));
        }
    }

    Ok(payload)
}

/// Rebuilds the outgoing form. Array-valued fields are appended once per
/// value under the same key; files keep their original filename and mime.
fn build_form(payload: FormPayload) -> reqwest::multipart::Form {
    let mut form = reqwest::multipart::Form::new();

    for (name, value) in payload.fields {
        form = form.text(name, value);
    }
    for file in payload.files {
        let name = file.name.clone();
        form = form.part(name, file_part(file));
    }

    form
}

fn file_part(file: FilePart) -> reqwest::multipart::Part {
    let FilePart {
        filename,
        content_type,
        data,
        ..
    } = file;

    match reqwest::multipart::Part::bytes(data.to_vec())
        .file_name(filename.clone())
        .mime_str(&content_type)
    {
        Ok(part) => part,
        // The declared mime type did not parse; fall back to a plain
        // binary part.
        Err(_) => reqwest::multipart::Part::bytes(data.to_vec()).file_name(filename),
    }
}

fn fail(status: StatusCode, message: String, error: Option<Value>) -> Response {
    let mut body = json!({ "success": false, "message": message });
    if let Some(error) = error {
        body["error"] = error;
    }
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::config::ProxyConfig;
    use crate::proxy::session::{make_access_token, sample_record, TokenRecord};
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use chrono::Utc;

    const SECRET: &str = "test-secret";
    const BOUNDARY: &str = "test-boundary-42";

    fn state_for(server: &mockito::Server) -> AppState {
        AppState::from_config(&ProxyConfig {
            allow_lan_access: false,
            port: 0,
            backend_base_url: server.url(),
            session_secret: SECRET.to_string(),
            session_ttl_secs: 3600,
            request_timeout_secs: 5,
        })
    }

    fn fresh_record() -> TokenRecord {
        let exp = Utc::now().timestamp() + 3600;
        sample_record(&make_access_token(exp), exp * 1000)
    }

    fn text_part(name: &str, value: &str) -> String {
        format!(
            "--{}\r\ncontent-disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        )
    }

    fn file_part_raw(name: &str, filename: &str, content_type: Option<&str>, data: &str) -> String {
        let type_header = content_type
            .map(|ct| format!("content-type: {}\r\n", ct))
            .unwrap_or_default();
        format!(
            "--{}\r\ncontent-disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n{}\r\n{}\r\n",
            BOUNDARY, name, filename, type_header, data
        )
    }

    fn multipart_request(uri: &str, method: &str, session: Option<&str>, body: String) -> Request {
        let mut builder = HttpRequest::builder().method(method).uri(uri).header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
        if let Some(token) = session {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder
            .body(Body::from(format!("{}--{}--\r\n", body, BOUNDARY)))
            .unwrap()
    }

    async fn response_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_disallowed_method_envelope() {
        let server = mockito::Server::new_async().await;
        let state = state_for(&server);
        let request = multipart_request("/proxy/upload", "GET", None, String::new());

        let response = handle(state, "upload".to_string(), request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = response_json(response).await;
        assert_eq!(
            body,
            json!({
                "success": false,
                "message": "Method GET not allowed for FormData requests",
            })
        );
    }

    #[tokio::test]
    async fn test_missing_session_envelope() {
        let server = mockito::Server::new_async().await;
        let state = state_for(&server);
        let request = multipart_request("/proxy/upload", "POST", None, String::new());

        let response = handle(state, "upload".to_string(), request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Unauthorized - No access token"));
    }

    #[tokio::test]
    async fn test_success_wrapped_in_data_envelope() {
        let mut server = mockito::Server::new_async().await;
        let record = fresh_record();
        let mock = server
            .mock("POST", "/api/documents/")
            .match_header("authorization", format!("Bearer {}", record.access_token).as_str())
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":9}"#)
            .create_async()
            .await;

        let state = state_for(&server);
        let token = state.sessions.issue(&record).unwrap();
        let body = text_part("title", "Quarterly report")
            + &file_part_raw("attachment", "report.pdf", Some("application/pdf"), "PDFDATA");
        let request = multipart_request("/proxy/documents", "POST", Some(&token), body);

        let response = handle(state, "documents".to_string(), request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response_json(response).await;
        assert_eq!(body, json!({ "success": true, "data": { "id": 9 } }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_backend_failure_envelope_extracts_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/documents/")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":"title required"}"#)
            .create_async()
            .await;

        let state = state_for(&server);
        let token = state.sessions.issue(&fresh_record()).unwrap();
        let request = multipart_request(
            "/proxy/documents",
            "POST",
            Some(&token),
            text_part("title", ""),
        );

        let response = handle(state, "documents".to_string(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response_json(response).await;
        assert_eq!(
            body,
            json!({
                "success": false,
                "message": "title required",
                "error": { "message": "title required" },
            })
        );
    }

    #[tokio::test]
    async fn test_collect_form_keeps_repeated_fields() {
        let body = text_part("tags", "a") + &text_part("tags", "b") + &text_part("tags", "c");
        let request = multipart_request("/proxy/x", "POST", None, body);
        let multipart = Multipart::from_request(request, &()).await.unwrap();

        let payload = collect_form(multipart).await.unwrap();

        assert_eq!(
            payload.fields,
            vec![
                ("tags".to_string(), "a".to_string()),
                ("tags".to_string(), "b".to_string()),
                ("tags".to_string(), "c".to_string()),
            ]
        );
        assert!(payload.files.is_empty());
    }

    #[tokio::test]
    async fn test_collect_form_defaults_file_mime() {
        let body = file_part_raw("upload", "raw.bin", None, "BYTES");
        let request = multipart_request("/proxy/x", "POST", None, body);
        let multipart = Multipart::from_request(request, &()).await.unwrap();

        let payload = collect_form(multipart).await.unwrap();

        assert_eq!(payload.files.len(), 1);
        let file = &payload.files[0];
        assert_eq!(file.filename, "raw.bin");
        assert_eq!(file.content_type, DEFAULT_FILE_MIME);
        assert_eq!(&file.data[..], b"BYTES");
    }
}
