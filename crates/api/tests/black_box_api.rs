use std::sync::Arc;

use imprint_infra::InMemoryLedgerStore;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over a fresh in-memory store, on an ephemeral port.
        let app = imprint_api::app::build_app(Arc::new(InMemoryLedgerStore::new()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const USER: &str = "12";

async fn post_json(
    client: &reqwest::Client,
    url: String,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let res = client
        .post(url)
        .header("x-user-id", USER)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}

async fn get_json(client: &reqwest::Client, url: String) -> (StatusCode, serde_json::Value) {
    let res = client
        .get(url)
        .header("x-user-id", USER)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}

async fn patch_json(
    client: &reqwest::Client,
    url: String,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let res = client
        .patch(url)
        .header("x-user-id", USER)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn money(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[tokio::test]
async fn health_is_public_but_routes_need_a_user() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(server.url("/invoices")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url("/invoices"))
        .header("x-user-id", "not-a-number")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_echoes_the_header() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, server.url("/whoami")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], json!(12));
}

#[tokio::test]
async fn invoice_totals_payments_and_child_flow() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, invoice) = post_json(
        &client,
        server.url("/invoices"),
        json!({
            "discount_percent": "10",
            "tax_percent": "5",
            "items": [
                {"quantity": 1, "unit_price": "60.00", "paid_amount": "60.00"},
                {"quantity": 2, "unit_price": "20.00"}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    assert_eq!(money(&invoice["subtotal_amount"]), "100.00");
    assert_eq!(money(&invoice["total_amount"]), "94.50");
    assert_eq!(invoice["meta"]["created_by"], json!(12));
    let id = invoice["id"].as_i64().unwrap();

    // Ledger payment.
    let (status, payment) = post_json(
        &client,
        server.url("/payments"),
        json!({
            "invoice_id": id,
            "amount": "25.00",
            "payment_date": "2024-05-01",
            "reference_number": "TX-1"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{payment}");
    assert_eq!(money(&payment["paid"]), "25.00");

    let (status, report) = get_json(&client, server.url(&format!("/invoices/{id}/payment-status"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&report["ledger_paid_total"]), "25.00");
    assert_eq!(money(&report["items_paid_total"]), "60.00");

    let (status, payments) = get_json(&client, server.url(&format!("/payments?invoice_id={id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payments["items"].as_array().unwrap().len(), 1);

    // Child invoice with the default body copies only the paid item.
    let (status, child) = post_json(
        &client,
        server.url(&format!("/invoices/{id}/generate-child")),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{child}");
    let child_id = child["id"].as_i64().unwrap();
    assert_eq!(child["main_invoice"], json!(id));
    assert_eq!(child["composite_id"], json!(format!("{id}_{child_id}")));
    assert_eq!(child["items"].as_array().unwrap().len(), 1);

    let (status, subs) = get_json(&client, server.url("/invoices?scope=sub")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subs["items"].as_array().unwrap().len(), 1);

    let (status, children) = get_json(&client, server.url(&format!("/invoices/{id}/children"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(children["items"][0]["id"], json!(child_id));
}

#[tokio::test]
async fn validation_errors_name_the_field() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        server.url("/invoices"),
        json!({"tax_percent": "140", "items": []}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("validation_error"));
    assert_eq!(body["field"], json!("tax_percent"));

    let (status, body) = get_json(&client, server.url("/invoices?scope=everything")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], json!("scope"));
}

#[tokio::test]
async fn bulk_inventory_reports_the_failing_row() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, warehouse) = post_json(
        &client,
        server.url("/warehouses"),
        json!({"name_en": "Riyadh Central"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{warehouse}");
    let warehouse_id = warehouse["id"].as_i64().unwrap();

    let (status, product) = post_json(
        &client,
        server.url("/products"),
        json!({"isbn": "978-0-306-40615-7", "title": "The Long Road", "price": "45.00"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    let product_id = product["id"].as_i64().unwrap();

    let (status, body) = post_json(
        &client,
        server.url("/inventory/bulk"),
        json!([
            {"product_id": product_id, "warehouse_id": warehouse_id, "quantity": 10},
            {"product_id": product_id, "warehouse_id": warehouse_id}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["index"], json!(1));

    let (status, stock) = get_json(
        &client,
        server.url(&format!("/inventory?warehouse_id={warehouse_id}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(stock["items"].as_array().unwrap().is_empty());

    let (status, _) = post_json(
        &client,
        server.url("/inventory/bulk"),
        json!([{"product_id": product_id, "warehouse_id": warehouse_id, "quantity": 10}]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Stocked warehouses cannot be removed.
    let res = client
        .delete(server.url(&format!("/warehouses/{warehouse_id}")))
        .header("x-user-id", USER)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("integrity_error"));
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, server.url("/invoices/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));

    let (status, _) = get_json(&client, server.url("/invoices/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let res = client
        .delete(server.url("/payments/999"))
        .header("x-user-id", USER)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_money_is_a_field_error_and_the_store_survives() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = post_json(
        &client,
        server.url("/invoices"),
        json!({"items": [{"quantity": 1, "unit_price": "99999999999999999999.00"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["field"], json!("unit_price"));
    assert_eq!(body["index"], json!(0));

    let (status, body) = post_json(
        &client,
        server.url("/invoices"),
        json!({"items": [{"quantity": 2000000000, "unit_price": "10.00"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["field"], json!("quantity"));

    let (status, invoice) = post_json(
        &client,
        server.url("/invoices"),
        json!({"items": [{"quantity": 1, "unit_price": "10.00"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    let id = invoice["id"].as_i64().unwrap();

    let (status, body) = post_json(
        &client,
        server.url("/payments"),
        json!({
            "invoice_id": id,
            "amount": "100000000000000000000.00",
            "payment_date": "2024-05-01"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["field"], json!("amount"));

    // Still serving after the rejected writes.
    let (status, list) = get_json(&client, server.url("/invoices")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn generate_child_reads_its_body() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, invoice) = post_json(
        &client,
        server.url("/invoices"),
        json!({
            "items": [
                {"quantity": 1, "unit_price": "40.00", "paid_amount": "40.00"},
                {"quantity": 1, "unit_price": "15.00"}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    let id = invoice["id"].as_i64().unwrap();
    let url = server.url(&format!("/invoices/{id}/generate-child"));

    let (status, child) = post_json(&client, url.clone(), json!({"paid_items_only": false})).await;
    assert_eq!(status, StatusCode::CREATED, "{child}");
    assert_eq!(child["items"].as_array().unwrap().len(), 2);

    // No body at all keeps the paid-only default.
    let res = client
        .post(url.clone())
        .header("x-user-id", USER)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let child: serde_json::Value = res.json().await.unwrap();
    assert_eq!(child["items"].as_array().unwrap().len(), 1);

    let res = client
        .post(url)
        .header("x-user-id", USER)
        .header("content-type", "application/json")
        .body("{\"paid_items_only\": nope")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("validation_error"));
}

#[tokio::test]
async fn customers_returns_and_clearing_references() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, customer) = post_json(
        &client,
        server.url("/customers"),
        json!({"institution_name": "Jarir Bookstore", "email": "orders@jarir.com"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{customer}");
    let customer_id = customer["id"].as_i64().unwrap();

    let (status, body) = post_json(
        &client,
        server.url("/invoices"),
        json!({"customer_id": 999, "items": []}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, invoice) = post_json(
        &client,
        server.url("/invoices"),
        json!({
            "customer_id": customer_id,
            "items": [{"quantity": 4, "unit_price": "12.50"}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{invoice}");
    let id = invoice["id"].as_i64().unwrap();
    let item_id = invoice["items"][0]["id"].as_i64().unwrap();

    let (status, ret) = post_json(
        &client,
        server.url("/returns"),
        json!({"invoice_item": item_id, "returned_quantity": 3, "return_date": "2024-06-10"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{ret}");
    assert_eq!(ret["invoice_id"], json!(id));

    let (status, body) = post_json(
        &client,
        server.url("/returns"),
        json!({"invoice_item": item_id, "returned_quantity": 2, "return_date": "2024-06-11"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["field"], json!("returned_quantity"));

    let (status, returns) = get_json(&client, server.url(&format!("/invoices/{id}/returns"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returns["items"].as_array().unwrap().len(), 1);

    let (status, updated) = patch_json(
        &client,
        server.url(&format!("/invoices/{id}")),
        json!({"customer_id": null, "is_returnable": false}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["customer_id"], serde_json::Value::Null);

    let (status, body) = post_json(
        &client,
        server.url("/returns"),
        json!({"invoice_item": item_id, "returned_quantity": 1, "return_date": "2024-06-12"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
}

#[tokio::test]
async fn contracts_resolve_their_party_by_kind() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, party) = post_json(
        &client,
        server.url("/parties"),
        json!({"type": "author", "name": "Ghada Al-Samman"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{party}");
    assert_eq!(party["party"]["type"], json!("author"));
    let party_id = party["party"]["id"].as_i64().unwrap();

    let contract = |kind: &str| {
        json!({
            "project_id": 1,
            "party": {"type": kind, "id": party_id},
            "commission_percent": "12.50",
            "duration_months": 36
        })
    };

    let (status, created) = post_json(&client, server.url("/contracts"), contract("author")).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let contract_id = created["id"].as_i64().unwrap();

    let (status, fetched) = get_json(&client, server.url(&format!("/contracts/{contract_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["party"], json!({"type": "author", "id": party_id}));

    let (status, _) = post_json(&client, server.url("/contracts"), contract("translator")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post_json(&client, server.url("/contracts"), contract("editor")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["field"], json!("party.type"));
}
