mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn root_reports_name_and_version() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(server.url("/")).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Sales API");
    Ok(())
}

#[tokio::test]
async fn health_is_degraded_without_database() -> Result<()> {
    let server = common::ensure_server().await?;
    let res = reqwest::get(server.url("/health")).await?;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["status"], "degraded");
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    for path in ["/customers", "/orders", "/employees/all"] {
        let res = client.get(server.url(path)).send().await?;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "GET {}", path);
        let body = res.json::<Value>().await?;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    let res = client
        .get(server.url("/orders/10100"))
        .header("authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let now = chrono::Utc::now().timestamp();
    let claims = sales_api::auth::Claims {
        username: "mallory".into(),
        role: 1,
        employee_number: Some(1002),
        office_code: Some("1".into()),
        customer_number: None,
        sales_rep_employee_number: None,
        exp: now + 3600,
        iat: now,
    };
    let forged = sales_api::auth::generate_jwt(&claims, "not-the-server-secret")?;

    let res = reqwest::Client::new()
        .get(server.url("/customers"))
        .bearer_auth(forged)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn role_guards_run_before_any_database_access() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let customer = common::customer_token("carine", 103, Some(1370));
    let staff = common::employee_token("lthompson", 3, 1166, "1");
    let manager = common::employee_token("wpatterson", 2, 1102, "4");

    let cases = [
        ("GET", "/customers", &customer),
        ("DELETE", "/customers/103", &customer),
        ("DELETE", "/orders/10100", &customer),
        ("GET", "/employees/all", &staff),
        ("GET", "/employees", &staff),
        ("DELETE", "/employees/1337", &manager),
        ("POST", "/employees", &manager),
    ];
    for (method, path, token) in cases {
        let res = client
            .request(method.parse()?, server.url(path))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "{} {}", method, path);
    }
    Ok(())
}

#[tokio::test]
async fn invalid_order_payloads_are_rejected_before_any_write() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();
    let customer = common::customer_token("carine", 103, Some(1370));

    let both_linkages = json!({
        "order": { "orderNumber": 10427, "requiredDate": "2021-12-30", "customerNumber": 103 },
        "orderDetails": [{ "productCode": "S10_1678", "quantityOrdered": 50, "priceEach": 48.81 }],
        "create": {
            "customerNumber": 500, "customerName": "Atelier", "contactLastName": "Schmitt",
            "contactFirstName": "Carine", "phone": "40.32.2555", "addressLine1": "54, rue Royale",
            "city": "Nantes", "country": "France"
        },
        "update": { "phone": "40.32.2556" }
    });
    let res = client.post(server.url("/orders")).bearer_auth(&customer).json(&both_linkages).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let unknown_field = json!({ "status": "Cancelled", "customerNumber": 112 });
    let res = client
        .patch(server.url("/orders/10100"))
        .bearer_auth(&customer)
        .json(&unknown_field)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.json::<Value>().await?;
    assert_eq!(body["error"]["code"], "INVALID_JSON");
    Ok(())
}
