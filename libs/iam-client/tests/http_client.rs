//! Integration tests for the IAM HTTP client against a mock server.

use serde_json::json;
use warden_iam::{IamClient, IamConfig};
use warden_id::RemoteId;
use warden_reconcile::api::{ApiError, EmailTemplate, EmailTemplateApi, Person, Profile, UserApi};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> IamClient {
    IamClient::new(&IamConfig::new(server.uri(), "test-token").with_api_version("2")).unwrap()
}

fn id(s: &str) -> RemoteId {
    RemoteId::parse(s).unwrap()
}

fn person_json() -> serde_json::Value {
    json!({
        "id": "u-1",
        "resourceType": "Person",
        "loginId": "foo@x.com",
        "name": {"family": "Bar", "given": "Foo"},
        "telecom": [{"system": "email", "value": "foo@x.com"}],
        "managingOrganization": "org-1",
        "preferredLanguage": "en-US",
        "preferredCommunicationChannel": "email"
    })
}

#[tokio::test]
async fn test_requests_carry_auth_and_version_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/User/u-1"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Api-Version", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(person_json()))
        .expect(1)
        .mount(&server)
        .await;

    let person = client(&server).await.get_user_by_id(&id("u-1")).await.unwrap();

    assert_eq!(person.login_id, "foo@x.com");
    assert_eq!(person.email(), "foo@x.com");
    assert_eq!(person.managing_organization, "org-1");
}

#[tokio::test]
async fn test_lookup_by_login_with_no_match_is_empty_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/User"))
        .and(query_param("loginId", "nobody@x.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0, "entry": []})))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .get_user_by_login("nobody@x.com")
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::EmptyResults);
}

#[tokio::test]
async fn test_lookup_by_login_returns_first_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/User"))
        .and(query_param("loginId", "foo@x.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"total": 1, "entry": [{"resource": person_json()}]})),
        )
        .mount(&server)
        .await;

    let person = client(&server).await.get_user_by_login("foo@x.com").await.unwrap();
    assert_eq!(person.id, "u-1");
}

#[tokio::test]
async fn test_create_user_from_location_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/User"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", "https://iam.example.com/authorize/identity/User/u-9"),
        )
        .mount(&server)
        .await;

    let person = Person {
        login_id: "foo@x.com".to_string(),
        managing_organization: "org-1".to_string(),
        password: Some("s3cret".to_string()),
        ..Default::default()
    };
    let created = client(&server).await.create_user(&person).await.unwrap();

    assert_eq!(created.id, "u-9");
    assert_eq!(created.managing_organization, "org-1");
    assert_eq!(created.password, None);
}

#[tokio::test]
async fn test_change_login_id_posts_new_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/User/u-1/$change-loginid"))
        .and(body_json(json!({"loginId": "bar@x.com"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .await
        .change_login_id(&id("u-1"), "bar@x.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_legacy_profile_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/security/users/u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "exchange": {
                "id": "u-1",
                "givenName": "Foo",
                "familyName": "Bar",
                "contact": {"emailAddress": "foo@x.com"}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/security/users/u-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let mut profile: Profile = client.get_profile(&id("u-1")).await.unwrap();
    assert_eq!(profile.contact.email_address, "foo@x.com");

    profile.given_name = "Fred".to_string();
    client.update_profile(&profile).await.unwrap();
}

#[tokio::test]
async fn test_delete_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/authorize/identity/User/u-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/authorize/identity/User/u-2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client(&server).await;
    assert_eq!(client.delete_user(&id("u-1")).await.unwrap().status, 204);
    assert_eq!(client.delete_user(&id("u-2")).await.unwrap().status, 200);
}

#[tokio::test]
async fn test_structured_error_becomes_domain_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/authorize/identity/User/u-1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "code": "conflict", "diagnostics": "user owns devices"}]
        })))
        .mount(&server)
        .await;

    let err = client(&server).await.delete_user(&id("u-1")).await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Domain {
            status: 409,
            code: "conflict".to_string(),
            message: "user owns devices".to_string(),
        }
    );
}

#[tokio::test]
async fn test_unstructured_not_found_is_absence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authorize/identity/EmailTemplate/t-1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .get_template_by_id(&id("t-1"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(err.is_absence());
}

#[tokio::test]
async fn test_create_template_returns_encoded_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/authorize/identity/EmailTemplate"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "t-1",
            "type": "ACCOUNT_VERIFICATION",
            "format": "HTML",
            "subject": "default",
            "message": "PHA+aGk8L3A+",
            "managingOrganization": "org-1"
        })))
        .mount(&server)
        .await;

    let template = EmailTemplate {
        template_type: "ACCOUNT_VERIFICATION".to_string(),
        format: "HTML".to_string(),
        subject: "default".to_string(),
        message: "PHA+aGk8L3A+".to_string(),
        managing_organization: "org-1".to_string(),
        ..Default::default()
    };
    let created = client(&server).await.create_template(&template).await.unwrap();

    assert_eq!(created.id, "t-1");
    assert_eq!(created.message, "PHA+aGk8L3A+");
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let config = IamConfig::new("http://127.0.0.1:9", "t")
        .with_timeout(std::time::Duration::from_millis(500));
    let client = IamClient::new(&config).unwrap();

    let err = client.get_user_by_id(&id("u-1")).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}
