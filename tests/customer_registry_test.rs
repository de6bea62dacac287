mod common;

use common::{file_db, memory_db, services};
use sea_orm::EntityTrait;
use storefront_api::entities::Customer;

#[tokio::test]
async fn case_and_whitespace_variants_converge_on_one_row() {
    let db = memory_db().await;
    let svc = services(db.clone());

    let first = svc
        .customers
        .get_or_create("  Jane.Doe@Example.COM ", "Jane", "Doe")
        .await
        .expect("create");
    let second = svc
        .customers
        .get_or_create("jane.doe@example.com", "Janet", "Doe")
        .await
        .expect("reuse");
    let third = svc
        .customers
        .get_or_create("JANE.DOE@example.com", "J", "D")
        .await
        .expect("reuse again");

    assert_eq!(first.id, second.id);
    assert_eq!(first.id, third.id);
    assert_eq!(first.email, "jane.doe@example.com");
    // First writer wins the profile fields
    assert_eq!(second.first_name, "Jane");

    assert_eq!(Customer::find().all(&*db).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_get_or_create_converges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = file_db(&dir.path().join("customers.db")).await;
    let svc = services(db.clone());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let customers = svc.customers.clone();
        // Every task spells the email differently; all normalize to one key
        let email = if i % 2 == 0 {
            "Race@Example.com ".to_string()
        } else {
            " race@example.COM".to_string()
        };
        tasks.push(tokio::spawn(async move {
            customers.get_or_create(&email, "Race", "Er").await
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        let customer = task.await.expect("join").expect("get_or_create");
        ids.push(customer.id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1, "all callers must converge on one customer");
    assert_eq!(Customer::find().all(&*db).await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_email_is_rejected() {
    let svc = services(memory_db().await);

    let err = svc
        .customers
        .get_or_create("   ", "Jane", "Doe")
        .await
        .expect_err("blank email");
    assert!(matches!(
        err,
        storefront_api::errors::ServiceError::ValidationError(_)
    ));
}

#[tokio::test]
async fn payment_provider_link_is_one_way() {
    let svc = services(memory_db().await);

    let customer = svc
        .customers
        .get_or_create("jane@example.com", "Jane", "Doe")
        .await
        .expect("create");
    assert!(customer.payment_provider_ref.is_none());

    let linked = svc
        .customers
        .link_payment_provider_ref(customer.id, "cus_123")
        .await
        .expect("link");
    assert_eq!(linked.payment_provider_ref.as_deref(), Some("cus_123"));

    // A second link attempt is a no-op, not an overwrite
    let relinked = svc
        .customers
        .link_payment_provider_ref(customer.id, "cus_999")
        .await
        .expect("relink");
    assert_eq!(relinked.payment_provider_ref.as_deref(), Some("cus_123"));
}
