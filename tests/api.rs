//! End-to-end tests against a mocked platform.

use std::io::Write;

use serde_json::json;
use trackvia_api::{
    api::model::{Paging, Record, RecordUpdate, UserInfo},
    auth::SessionState,
    ClientConfig, Error, TrackviaApi,
};
use wiremock::matchers::{
    any, body_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_KEY: &str = "b12bf2f4f034885d";

fn token_body(access_token: &str, refresh_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "expires_in": 3600,
        "token_type": "bearer",
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(query_param("user_key", USER_KEY))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-1", "refresh-1")))
        .mount(server)
        .await;
}

fn api(server: &MockServer) -> TrackviaApi {
    let config = ClientConfig::new(USER_KEY).with_environment(server.uri());
    TrackviaApi::new(config).unwrap()
}

async fn logged_in(server: &MockServer) -> TrackviaApi {
    mount_login(server).await;
    let api = api(server);
    api.login("user@example.com", "Test1234").await.unwrap();
    api
}

#[tokio::test]
async fn login_stores_tokens_and_schedules_refresh() {
    let server = MockServer::start().await;
    let api = logged_in(&server).await;

    assert_eq!(api.access_token().as_deref(), Some("access-1"));
    assert_eq!(api.refresh_token().as_deref(), Some("refresh-1"));
    assert_eq!(api.session_state(), SessionState::Authenticated);
    assert!(api.token_manager().has_pending_refresh());
}

#[tokio::test]
async fn login_with_bad_password_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad credentials",
        })))
        .mount(&server)
        .await;

    let api = api(&server);
    let err = api.login("user@example.com", "notmypassword").await.unwrap_err();

    assert!(err.is_auth());
    assert!(!err.is_validation());
    assert_eq!(
        err.platform_error().and_then(|e| e.message.as_deref()),
        Some("Bad credentials")
    );
    assert_eq!(api.access_token(), None);
    assert_eq!(api.session_state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn refresh_rotates_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2")))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let before = api.access_token().unwrap();
    let tokens = api.token_manager().do_refresh_token().await.unwrap();

    assert_ne!(tokens.access_token, before);
    assert_eq!(api.access_token().as_deref(), Some("access-2"));
    assert_eq!(api.refresh_token().as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn requests_carry_bearer_token_and_user_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi/apps"))
        .and(header("authorization", "Bearer access-1"))
        .and(query_param("user_key", USER_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 4, "name": "TEST APP"},
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let apps = api.get_apps().await.unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].id, 4);
    assert_eq!(apps[0].name, "TEST APP");
}

#[tokio::test]
async fn preexisting_access_token_skips_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi/views"))
        .and(query_param("name", "Default TEST TABLE View"))
        .and(header("authorization", "Bearer given-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "29", "name": "Default TEST TABLE View", "applicationName": "TEST APP"},
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let config = ClientConfig::new(USER_KEY)
        .with_environment(server.uri())
        .with_access_token("given-token");
    let api = TrackviaApi::new(config).unwrap();

    let views = api.get_view_by_name("Default TEST TABLE View").await.unwrap();
    assert_eq!(views[0].id, 29);
}

#[tokio::test]
async fn get_view_with_query_uses_find() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi/views/29/find"))
        .and(query_param("q", "hello"))
        .and(query_param("start", "10"))
        .and(query_param("max", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "structure": [{"name": "SINGLE LINE TEST", "type": "shortAnswer", "canRead": true}],
            "data": [{"id": 1, "SINGLE LINE TEST": "hello"}],
            "totalCount": 1,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let paging = Paging { start: 10, max: 5 };
    let records = api.get_view(29, Some(paging), Some("hello")).await.unwrap();
    assert_eq!(records.total_count, 1);
    assert_eq!(records.structure[0].field_type, "shortAnswer");
    assert_eq!(records.data[0]["SINGLE LINE TEST"], "hello");
}

#[tokio::test]
async fn add_record_posts_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openapi/views/29/records"))
        .and(body_json(json!({"data": [{"SINGLE LINE TEST": "created"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "structure": [],
            "data": [{"id": 12, "SINGLE LINE TEST": "created"}],
            "totalCount": 1,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let mut data = Record::new();
    data.insert("SINGLE LINE TEST".into(), "created".into());
    let created = api.add_record(29, data).await.unwrap();
    assert_eq!(created.data[0]["id"], 12);
}

#[tokio::test]
async fn platform_error_carries_server_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi/views/29/records/999"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Record not found",
            "name": "NotFoundException",
            "code": "404",
        })))
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let err = api.get_record(29, 999).await.unwrap_err();
    match err {
        Error::Platform(err) => {
            assert_eq!(err.status_code, 404);
            assert_eq!(err.message.as_deref(), Some("Record not found"));
            assert_eq!(err.name.as_deref(), Some("NotFoundException"));
        }
        other => panic!("expected a platform error, got {other:?}"),
    }
}

#[tokio::test]
async fn delete_all_records_in_view() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/openapi/views/29/records/all"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    api.delete_all_records_in_view(29).await.unwrap();
}

#[tokio::test]
async fn attach_and_fetch_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openapi/views/29/records/4/files/DOCUMENT%20TEST"))
        .and(body_string_contains("filename=\"notes.txt\""))
        .and(body_string_contains("file contents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "structure": [],
            "data": {"id": 4, "DOCUMENT TEST": 81},
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/openapi/views/29/records/4/files/DOCUMENT%20TEST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"file contents".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("notes.txt");
    std::fs::File::create(&file_path)
        .unwrap()
        .write_all(b"file contents")
        .unwrap();

    let record = api
        .attach_file(29, 4, "DOCUMENT TEST", Some(file_path.as_path()))
        .await
        .unwrap();
    assert_eq!(record.data["id"], 4);

    let contents = api.get_file(29, 4, "DOCUMENT TEST").await.unwrap();
    assert_eq!(contents, b"file contents");
}

#[tokio::test]
async fn validation_errors_never_reach_the_network() {
    let server = MockServer::start().await;
    let api = logged_in(&server).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let err = api.get_record(0, 4).await.unwrap_err();
    assert!(matches!(err, Error::Validation("view id")));

    let err = api.attach_file(29, 4, "DOCUMENT TEST", None).await.unwrap_err();
    assert!(matches!(err, Error::Validation("file path")));

    let err = api.delete_file(29, 4, " ").await.unwrap_err();
    assert!(matches!(err, Error::Validation("field name")));

    let err = api.update_records(29, Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Validation("records")));
}

#[tokio::test]
async fn get_app_by_name_filters_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi/apps"))
        .and(query_param("name", "TEST APP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "4", "name": "TEST APP"},
        ])))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let apps = api.get_app_by_name("TEST APP").await.unwrap();
    assert_eq!(apps[0].id, 4);
}

#[tokio::test]
async fn get_users_sends_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi/users"))
        .and(query_param("start", "20"))
        .and(query_param("max", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "structure": [{"name": "Email", "type": "email"}],
            "data": [{"Email": "someone@example.test"}],
            "totalCount": 21,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let users = api
        .get_users(Some(Paging { start: 20, max: 10 }))
        .await
        .unwrap();
    assert_eq!(users.total_count, 21);
    assert_eq!(users.data[0]["Email"], "someone@example.test");
}

#[tokio::test]
async fn add_user_posts_user_fields_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openapi/users"))
        .and(query_param("email", "someone@example.test"))
        .and(query_param("firstName", "Some"))
        .and(query_param("lastName", "One"))
        .and(query_param("timeZone", "America/Denver"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "structure": [],
            "data": [{"Email": "someone@example.test", "First Name": "Some"}],
            "totalCount": 1,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let info = UserInfo {
        email: "someone@example.test".into(),
        first_name: "Some".into(),
        last_name: "One".into(),
        time_zone: Some("America/Denver".into()),
    };
    let added = api.add_user(&info).await.unwrap();
    assert_eq!(added.data[0]["First Name"], "Some");
}

#[tokio::test]
async fn update_record_puts_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/openapi/views/29/records/4"))
        .and(body_json(json!({"data": [{"SINGLE LINE TEST": "changed"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "structure": [],
            "data": [{"id": 4, "SINGLE LINE TEST": "changed"}],
            "totalCount": 1,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let mut data = Record::new();
    data.insert("SINGLE LINE TEST".into(), "changed".into());
    let updated = api.update_record(29, 4, data).await.unwrap();
    assert_eq!(updated.data[0]["SINGLE LINE TEST"], "changed");
}

#[tokio::test]
async fn update_records_puts_ids_with_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/openapi/views/29/records"))
        .and(body_json(json!({"data": [
            {"id": 4, "SINGLE LINE TEST": "first"},
            {"id": 5, "SINGLE LINE TEST": "second"},
        ]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "structure": [],
            "data": [
                {"id": 4, "SINGLE LINE TEST": "first"},
                {"id": 5, "SINGLE LINE TEST": "second"},
            ],
            "totalCount": 2,
        })))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    let update = |id, value: &str| {
        let mut data = Record::new();
        data.insert("SINGLE LINE TEST".into(), value.into());
        RecordUpdate { id, data }
    };
    let updated = api
        .update_records(29, vec![update(4, "first"), update(5, "second")])
        .await
        .unwrap();
    assert_eq!(updated.total_count, 2);
}

#[tokio::test]
async fn delete_record_and_file() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/openapi/views/29/records/4"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/openapi/views/29/records/4/files/DOCUMENT%20TEST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let api = logged_in(&server).await;

    api.delete_file(29, 4, "DOCUMENT TEST").await.unwrap();
    api.delete_record(29, 4).await.unwrap();
}
