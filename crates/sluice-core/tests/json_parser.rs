//! Parser scenario tests: alias extraction, nested tables, wildcard
//! resolution, validation, and hashing.

use std::sync::Arc;

use serde_json::{json, Value};
use sluice_core::model::{DataModel, FieldDef, FieldType};
use sluice_core::parse::{JsonParser, TableBatch};
use sluice_core::source::{ApiEndpointConfig, TableConfig};
use xxhash_rust::xxh3::xxh3_128;

fn endpoint_with(models: Vec<Arc<DataModel>>) -> ApiEndpointConfig {
    let mut endpoint = ApiEndpointConfig::new();
    for model in models {
        endpoint = endpoint.table(TableConfig::new(model));
    }
    endpoint
}

fn batch_for<'a>(batches: &'a [TableBatch], model_name: &str) -> &'a TableBatch {
    batches
        .iter()
        .find(|b| b.model.name() == model_name)
        .expect("table batch present")
}

fn product_model() -> Arc<DataModel> {
    DataModel::new(
        "TestProduct",
        vec![
            FieldDef::new("id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("name", FieldType::Text, "root.name"),
            FieldDef::new("price", FieldType::Double, "root.price"),
            FieldDef::new("category", FieldType::Text, "root.category"),
        ],
    )
    .unwrap()
}

#[test]
fn simple_structure() {
    let endpoint = endpoint_with(vec![product_model()]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch = vec![
        json!({"id": 1, "name": "Product 1", "price": 19.99, "category": "Electronics"}),
        json!({"id": 2, "name": "Product 2", "price": 29.99, "category": "Clothing"}),
    ];
    let batches = parser.parse(&batch).unwrap();

    assert_eq!(batches.len(), 1);
    let records = &batches[0].records;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].values["id"], json!(1));
    assert_eq!(records[0].values["name"], json!("Product 1"));
    assert_eq!(records[0].values["price"], json!(19.99));
    assert_eq!(records[1].values["id"], json!(2));
}

#[test]
fn nested_objects_resolve_by_dotted_alias() {
    let model = DataModel::new(
        "TestProductWithNested",
        vec![
            FieldDef::new("id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("name", FieldType::Text, "root.name"),
            FieldDef::new("dimensions_width", FieldType::Double, "root.dimensions.width"),
            FieldDef::new("dimensions_height", FieldType::Double, "root.dimensions.height"),
            FieldDef::new("meta_created_at", FieldType::Timestamp, "root.meta.createdAt"),
        ],
    )
    .unwrap();
    let endpoint = endpoint_with(vec![model]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch = vec![
        json!({
            "id": 1, "name": "Product 1",
            "dimensions": {"width": 10.5, "height": 20.0},
            "meta": {"createdAt": "2024-01-01T00:00:00Z"},
        }),
        json!({
            "id": 2, "name": "Product 2",
            "dimensions": {"width": 15.0, "height": 25.0},
            "meta": {"createdAt": "2024-01-02T00:00:00Z"},
        }),
    ];
    let batches = parser.parse(&batch).unwrap();
    let records = &batches[0].records;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].values["dimensions_width"], json!(10.5));
    assert_eq!(records[0].values["meta_created_at"], json!("2024-01-01T00:00:00Z"));
    assert_eq!(records[1].values["dimensions_width"], json!(15.0));
}

#[test]
fn scalar_lists_serialize_as_json_strings() {
    let model = DataModel::new(
        "TestProductWithList",
        vec![
            FieldDef::new("id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("name", FieldType::Text, "root.name"),
            FieldDef::new("tags", FieldType::Text, "root.tags[*]"),
            FieldDef::new("images", FieldType::Text, "root.images[*]"),
        ],
    )
    .unwrap();
    let endpoint = endpoint_with(vec![model]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch = vec![
        json!({"id": 1, "name": "Product 1", "tags": ["electronics", "gadget", "new"], "images": ["image1.jpg", "image2.jpg"]}),
        json!({"id": 2, "name": "Product 2", "tags": ["clothing", "fashion"], "images": ["image3.jpg"]}),
    ];
    let batches = parser.parse(&batch).unwrap();
    let records = &batches[0].records;

    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0].values["tags"],
        json!(r#"["electronics","gadget","new"]"#)
    );
    assert_eq!(records[0].values["images"], json!(r#"["image1.jpg","image2.jpg"]"#));
    assert_eq!(records[1].values["tags"], json!(r#"["clothing","fashion"]"#));
}

#[test]
fn multiple_tables_with_inherited_parent_key() {
    let reviews = DataModel::new(
        "TestReview",
        vec![
            FieldDef::new("product_id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("reviewer_name", FieldType::Text, "root.reviews[*].reviewerName")
                .primary_key(),
            FieldDef::new("rating", FieldType::BigInt, "root.reviews[*].rating"),
            FieldDef::new("comment", FieldType::Text, "root.reviews[*].comment"),
        ],
    )
    .unwrap();
    let endpoint = endpoint_with(vec![product_model(), reviews]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch = vec![
        json!({
            "id": 1, "name": "Product 1", "price": 19.99, "category": "Electronics",
            "reviews": [
                {"reviewerName": "John Doe", "rating": 5, "comment": "Great"},
                {"reviewerName": "Jane Smith", "rating": 4, "comment": "Good"},
            ],
        }),
        json!({
            "id": 2, "name": "Product 2", "price": 29.99, "category": "Clothing",
            "reviews": [
                {"reviewerName": "Bob Wilson", "rating": 3, "comment": "Okay"},
            ],
        }),
    ];
    let batches = parser.parse(&batch).unwrap();
    assert_eq!(batches.len(), 2);

    let products = batch_for(&batches, "TestProduct");
    let reviews = batch_for(&batches, "TestReview");

    assert_eq!(products.records.len(), 2);
    assert_eq!(reviews.records.len(), 3);
    assert_eq!(reviews.records[0].values["product_id"], json!(1));
    assert_eq!(reviews.records[0].values["reviewer_name"], json!("John Doe"));
    assert_eq!(reviews.records[1].values["product_id"], json!(1));
    assert_eq!(reviews.records[2].values["product_id"], json!(2));
    assert_eq!(reviews.records[2].values["reviewer_name"], json!("Bob Wilson"));
}

fn invoice_fixture() -> Vec<Value> {
    vec![
        json!({
            "invoice_id": 1,
            "invoice_date": "2024-01-01",
            "customer_name": "John Doe",
            "total_amount": 150.0,
            "invoice_line_items": [
                {
                    "line_item_id": 1, "product_name": "Widget A", "quantity": 2, "unit_price": 50.0,
                    "transactions": [
                        {"txn_id": 1, "txn_date": "2024-01-01T10:00:00Z", "txn_amount": 50.0, "payment_method": "credit_card"},
                        {"txn_id": 2, "txn_date": "2024-01-01T11:00:00Z", "txn_amount": 50.0, "payment_method": "credit_card"},
                    ],
                },
                {
                    "line_item_id": 2, "product_name": "Widget B", "quantity": 1, "unit_price": 50.0,
                    "transactions": [
                        {"txn_id": 3, "txn_date": "2024-01-01T12:00:00Z", "txn_amount": 50.0, "payment_method": "paypal"},
                    ],
                },
            ],
        }),
        json!({
            "invoice_id": 2,
            "invoice_date": "2024-01-02",
            "customer_name": "Jane Smith",
            "total_amount": 75.0,
            "invoice_line_items": [
                {
                    "line_item_id": 3, "product_name": "Widget C", "quantity": 1, "unit_price": 75.0,
                    "transactions": [
                        {"txn_id": 4, "txn_date": "2024-01-02T09:00:00Z", "txn_amount": 75.0, "payment_method": "bank_transfer"},
                    ],
                },
            ],
        }),
    ]
}

fn invoice_models() -> (Arc<DataModel>, Arc<DataModel>, Arc<DataModel>) {
    let invoices = DataModel::new(
        "TestInvoice",
        vec![
            FieldDef::new("invoice_id", FieldType::BigInt, "root.invoice_id").primary_key(),
            FieldDef::new("invoice_date", FieldType::Date, "root.invoice_date"),
            FieldDef::new("customer_name", FieldType::Text, "root.customer_name"),
            FieldDef::new("total_amount", FieldType::Double, "root.total_amount"),
        ],
    )
    .unwrap();
    let line_items = DataModel::new(
        "TestInvoiceLineItem",
        vec![
            FieldDef::new("invoice_id", FieldType::BigInt, "root.invoice_id").primary_key(),
            FieldDef::new("line_item_id", FieldType::BigInt, "root.invoice_line_items[*].line_item_id")
                .primary_key(),
            FieldDef::new("product_name", FieldType::Text, "root.invoice_line_items[*].product_name"),
            FieldDef::new("quantity", FieldType::BigInt, "root.invoice_line_items[*].quantity"),
            FieldDef::new("unit_price", FieldType::Double, "root.invoice_line_items[*].unit_price"),
        ],
    )
    .unwrap();
    let transactions = DataModel::new(
        "TestTransaction",
        vec![
            FieldDef::new("invoice_id", FieldType::BigInt, "root.invoice_id").primary_key(),
            FieldDef::new("line_item_id", FieldType::BigInt, "root.invoice_line_items[*].line_item_id")
                .primary_key(),
            FieldDef::new(
                "txn_id",
                FieldType::BigInt,
                "root.invoice_line_items[*].transactions[*].txn_id",
            )
            .primary_key(),
            FieldDef::new(
                "txn_date",
                FieldType::Timestamp,
                "root.invoice_line_items[*].transactions[*].txn_date",
            ),
            FieldDef::new(
                "txn_amount",
                FieldType::Double,
                "root.invoice_line_items[*].transactions[*].txn_amount",
            ),
            FieldDef::new(
                "payment_method",
                FieldType::Text,
                "root.invoice_line_items[*].transactions[*].payment_method",
            ),
        ],
    )
    .unwrap();
    (invoices, line_items, transactions)
}

#[test]
fn deeply_nested_tables_inherit_ancestor_fields() {
    let (invoices, line_items, transactions) = invoice_models();
    let endpoint = endpoint_with(vec![invoices, line_items, transactions]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batches = parser.parse(&invoice_fixture()).unwrap();

    let invoices = batch_for(&batches, "TestInvoice");
    let line_items = batch_for(&batches, "TestInvoiceLineItem");
    let transactions = batch_for(&batches, "TestTransaction");

    assert_eq!(invoices.records.len(), 2);
    assert_eq!(line_items.records.len(), 3);
    assert_eq!(transactions.records.len(), 4);

    // Line items carry the parent invoice id.
    assert_eq!(line_items.records[0].values["invoice_id"], json!(1));
    assert_eq!(line_items.records[0].values["line_item_id"], json!(1));
    assert_eq!(line_items.records[2].values["invoice_id"], json!(2));
    assert_eq!(line_items.records[2].values["line_item_id"], json!(3));

    // Transactions carry both ancestor keys, resolved per index trail.
    let txn = &transactions.records[2];
    assert_eq!(txn.values["txn_id"], json!(3));
    assert_eq!(txn.values["invoice_id"], json!(1));
    assert_eq!(txn.values["line_item_id"], json!(2));
    assert_eq!(txn.values["payment_method"], json!("paypal"));

    let last = &transactions.records[3];
    assert_eq!(last.values["txn_id"], json!(4));
    assert_eq!(last.values["invoice_id"], json!(2));
    assert_eq!(last.values["line_item_id"], json!(3));
}

#[test]
fn record_count_matches_wildcard_paths() {
    let (invoices, line_items, transactions) = invoice_models();
    let endpoint = endpoint_with(vec![invoices, line_items, transactions]);
    let parser = JsonParser::new(&endpoint).unwrap();
    let batches = parser.parse(&invoice_fixture()).unwrap();

    // One row per distinct resolved wildcard path in the input.
    assert_eq!(batch_for(&batches, "TestInvoice").records.len(), 2);
    assert_eq!(batch_for(&batches, "TestInvoiceLineItem").records.len(), 3);
    assert_eq!(batch_for(&batches, "TestTransaction").records.len(), 4);
}

#[test]
fn empty_child_array_produces_no_rows() {
    let reviews = DataModel::new(
        "TestReview",
        vec![
            FieldDef::new("product_id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("reviewer_name", FieldType::Text, "root.reviews[*].reviewerName")
                .primary_key(),
        ],
    )
    .unwrap();
    let endpoint = endpoint_with(vec![product_model(), reviews]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch = vec![json!({
        "id": 1, "name": "P", "price": 1.0, "category": "c", "reviews": [],
    })];
    let batches = parser.parse(&batch).unwrap();

    assert_eq!(batch_for(&batches, "TestProduct").records.len(), 1);
    assert_eq!(batch_for(&batches, "TestReview").records.len(), 0);
}

#[test]
fn fixed_array_index_aliases_resolve_directly() {
    let snapshot = DataModel::new(
        "WeatherSnapshot",
        vec![
            FieldDef::new("lat", FieldType::Double, "root.lat").primary_key(),
            FieldDef::new("observed_at", FieldType::BigInt, "root.current.dt").primary_key(),
            FieldDef::new("conditions", FieldType::Text, "root.current.weather[0].main")
                .nullable(),
        ],
    )
    .unwrap();
    let minutes = DataModel::new(
        "WeatherMinute",
        vec![
            FieldDef::new("lat", FieldType::Double, "root.lat").primary_key(),
            FieldDef::new("minute_dt", FieldType::BigInt, "root.minutely[*].dt").primary_key(),
            FieldDef::new("precipitation", FieldType::Double, "root.minutely[*].precipitation"),
        ],
    )
    .unwrap();
    let endpoint = endpoint_with(vec![snapshot, minutes]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch = vec![json!({
        "lat": 37.77,
        "current": {
            "dt": 1_700_000_000,
            "weather": [{"main": "Clouds"}, {"main": "Mist"}],
        },
        "minutely": [
            {"dt": 1_700_000_000, "precipitation": 0.0},
            {"dt": 1_700_000_060, "precipitation": 0.4},
            {"dt": 1_700_000_120, "precipitation": 1.2},
        ],
    })];
    let batches = parser.parse(&batch).unwrap();

    let snapshots = batch_for(&batches, "WeatherSnapshot");
    assert_eq!(snapshots.records.len(), 1);
    // Fixed indices read exactly one element, no row explosion.
    assert_eq!(snapshots.records[0].values["conditions"], json!("Clouds"));

    let minutes = batch_for(&batches, "WeatherMinute");
    assert_eq!(minutes.records.len(), 3);
    assert_eq!(minutes.records[2].values["precipitation"], json!(1.2));
    assert_eq!(minutes.records[2].values["lat"], json!(37.77));
}

#[test]
fn max_length_violation_fails_the_batch() {
    let model = DataModel::new(
        "TestProductWithMaxLength",
        vec![
            FieldDef::new("id", FieldType::BigInt, "root.id").primary_key(),
            FieldDef::new("name", FieldType::Text, "root.name"),
            FieldDef::new("code", FieldType::Text, "root.code").max_length(3),
        ],
    )
    .unwrap();
    let endpoint = endpoint_with(vec![model]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch = vec![json!({"id": 1, "name": "P", "code": "ABCD"})];
    let error = parser.parse(&batch).unwrap_err();
    let message = error.to_string();
    assert!(message.contains("string_too_long"), "{message}");
    assert!(message.contains("root"), "{message}");
}

#[test]
fn row_hash_is_deterministic_and_matches_digest() {
    let endpoint = endpoint_with(vec![product_model()]);
    let parser = JsonParser::new(&endpoint).unwrap();
    let batch = vec![json!({"id": 1, "name": "Product 1", "price": 19.99, "category": "Electronics"})];

    let first = parser.parse(&batch).unwrap();
    let second = parser.parse(&batch).unwrap();
    assert_eq!(first[0].records[0].row_hash, second[0].records[0].row_hash);

    // Sorted keys: category, id, name, price, pipe-joined string values.
    let expected = xxh3_128("Electronics|1|Product 1|19.99".as_bytes()).to_be_bytes();
    assert_eq!(first[0].records[0].row_hash, expected);
}

#[test]
fn parse_clears_previous_cycle() {
    let endpoint = endpoint_with(vec![product_model()]);
    let parser = JsonParser::new(&endpoint).unwrap();

    let batch1 = vec![json!({"id": 1, "name": "A", "price": 1.0, "category": "x"})];
    let batch2 = vec![json!({"id": 2, "name": "B", "price": 2.0, "category": "y"})];

    assert_eq!(parser.parse(&batch1).unwrap()[0].records.len(), 1);
    let second = parser.parse(&batch2).unwrap();
    assert_eq!(second[0].records.len(), 1);
    assert_eq!(second[0].records[0].values["id"], json!(2));
}
