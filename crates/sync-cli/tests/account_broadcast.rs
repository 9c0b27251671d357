use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use sync_config::AppConfig;
use sync_core::record::{INDUSTRY, NAME, NUMBER_OF_EMPLOYEES};
use sync_core::{
    await_absent, find_converged, BackoffPolicy, CategoryTable, DestinationAdapter, Fields,
    SourceRecord, SourceSystem, SyncFlow, TriggerConfig, TriggerPolicy,
};
use sync_hr_destination::{category_id, CUSTOMER_NAME};
use sync_poll_trigger::MemorySource;
use sync_push_trigger::{sample_notification, SAMPLE_ACCOUNT_ID};

const BIOTECH_ID: &str = "CUSTOMER_CATEGORY-6-1";
const MANUFACTURING_ID: &str = "CUSTOMER_CATEGORY-6-3";

const FILTERED_1: &str = "X-DemoFilterIndustryAccount-1";
const FILTERED_2: &str = "X-DemoFilterIndustryAccount-2";
const CREATED: &str = "X-DemoCreate";
const UPDATED: &str = "X-DemoUpdate";

fn config(policy: TriggerPolicy) -> AppConfig {
    let mut config = AppConfig::default();
    config.flow.trigger = TriggerConfig {
        policy,
        config: json!({}),
    };
    config.flow.rules.categories = CategoryTable::new()
        .with("Biotechnology", BIOTECH_ID)
        .with("Manufacturing", MANUFACTURING_ID);
    config
}

fn account(name: &str, industry: &str, employees: i64) -> SourceRecord {
    SourceRecord::new()
        .with(NAME, name)
        .with(INDUSTRY, industry)
        .with(NUMBER_OF_EMPLOYEES, employees)
}

fn adapter(flow: &SyncFlow, name: &str) -> Arc<dyn DestinationAdapter> {
    flow.runner()
        .adapter(name)
        .unwrap_or_else(|| panic!("destination {} not configured", name))
}

fn backoff() -> BackoffPolicy {
    BackoffPolicy::constant(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_poll_flow_broadcasts_accounts() {
    let source = Arc::new(MemorySource::new());
    let flow = sync_cli::build_flow(&config(TriggerPolicy::Poll), source.clone()).unwrap();
    flow.connect().await.unwrap();

    let db = adapter(&flow, "database");
    let crm = adapter(&flow, "crm");
    let erp = adapter(&flow, "erp");
    let hr = adapter(&flow, "hr");

    // CRM already knows the account that is about to be updated
    let mut stale = Fields::new();
    stale.insert(NAME.to_string(), json!(UPDATED));
    stale.insert(INDUSTRY.to_string(), json!("Education"));
    stale.insert(NUMBER_OF_EMPLOYEES.to_string(), json!("17000"));
    let stale_id = crm.create(UPDATED, stale).await.unwrap();

    let ids = source
        .create(vec![
            account(FILTERED_1, "Hospitality", 1700),
            account(FILTERED_2, "Technology", 2500),
            account(CREATED, "Biotechnology", 18000),
            account(UPDATED, "Manufacturing", 12000),
        ])
        .await
        .unwrap();

    let result = flow.run_once().await.unwrap().expect("changes were pending");
    result.assert_successful().unwrap();
    assert_eq!(result.total, 4);
    assert_eq!(result.filtered, 2);
    assert_eq!(result.succeeded, 2);

    let crm_summary = result.adapter("crm").unwrap();
    assert_eq!((crm_summary.created, crm_summary.updated), (1, 1));
    let erp_summary = result.adapter("erp").unwrap();
    assert_eq!(erp_summary.created, 2);

    // Filtered accounts never reach any destination
    assert!(db.find_by_key(&ids[0]).await.unwrap().is_none());
    assert!(db.find_by_key(&ids[1]).await.unwrap().is_none());
    for name in [FILTERED_1, FILTERED_2] {
        assert!(crm.find_by_key(name).await.unwrap().is_none());
        assert!(erp.find_by_key(name).await.unwrap().is_none());
        assert!(hr.find_by_key(name).await.unwrap().is_none());
    }

    let row = db.find_by_key(&ids[2]).await.unwrap().unwrap();
    assert_eq!(row.get_str("salesforceId"), Some(ids[2].as_str()));
    assert_eq!(row.get_str("name"), Some(CREATED));

    let created = crm.find_by_key(CREATED).await.unwrap().unwrap();
    assert_eq!(created.get_str(INDUSTRY), Some("Biotechnology"));
    let updated = crm.find_by_key(UPDATED).await.unwrap().unwrap();
    assert_eq!(updated.id, stale_id);
    assert_eq!(updated.get_str(INDUSTRY), Some("Manufacturing"));
    assert_eq!(updated.get_str(NUMBER_OF_EMPLOYEES), Some("12000"));

    let timeout = Duration::from_secs(60);
    let customer = find_converged(erp.as_ref(), CREATED, timeout, &backoff())
        .await
        .unwrap();
    assert_eq!(customer.get_str(INDUSTRY), Some("Biotechnology"));

    for (name, category) in [(CREATED, BIOTECH_ID), (UPDATED, MANUFACTURING_ID)] {
        let customer = find_converged(hr.as_ref(), name, timeout, &backoff())
            .await
            .unwrap();
        assert_eq!(customer.get_str(CUSTOMER_NAME), Some(name));
        assert_eq!(category_id(&customer), Some(category));
    }

    // The cursor moved past every collected account
    assert!(flow.run_once().await.unwrap().is_none());

    // Cleanup: collect every synced id per destination, delete, wait for removal
    source.delete(&ids).await.unwrap();
    for destination in [&db, &crm, &erp, &hr] {
        let keys = if destination.name() == "database" {
            vec![ids[2].clone(), ids[3].clone()]
        } else {
            vec![CREATED.to_string(), UPDATED.to_string()]
        };

        let mut synced = Vec::new();
        for key in &keys {
            let record = find_converged(&**destination, key, timeout, &backoff())
                .await
                .unwrap();
            synced.push(record.id);
        }
        if destination.name() == "crm" {
            assert!(synced.contains(&stale_id));
        }

        destination.delete(&synced).await.unwrap();
        for key in &keys {
            await_absent(&**destination, key, timeout, &backoff())
                .await
                .unwrap();
        }
    }

    flow.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_poll_flow_updates_converged_accounts() {
    let source = Arc::new(MemorySource::new());
    let flow = sync_cli::build_flow(&config(TriggerPolicy::Poll), source.clone()).unwrap();
    flow.connect().await.unwrap();

    let ids = source
        .create(vec![account(CREATED, "Biotechnology", 18000)])
        .await
        .unwrap();
    flow.run_once().await.unwrap().unwrap().assert_successful().unwrap();

    // Change the industry while ERP and HR are still propagating the create
    let mut change = Fields::new();
    change.insert(INDUSTRY.to_string(), json!("Manufacturing"));
    source.update(&ids[0], change).await.unwrap();

    let result = flow.run_once().await.unwrap().unwrap();
    result.assert_successful().unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.adapter("erp").unwrap().updated, 1);
    assert_eq!(result.adapter("hr").unwrap().updated, 1);

    let hr = adapter(&flow, "hr");
    let customer = hr.find_by_key(CREATED).await.unwrap().unwrap();
    assert_eq!(category_id(&customer), Some(MANUFACTURING_ID));

    let erp = adapter(&flow, "erp");
    let customer = erp.find_by_key(CREATED).await.unwrap().unwrap();
    assert_eq!(customer.get_str(INDUSTRY), Some("Manufacturing"));
}

#[tokio::test(start_paused = true)]
async fn test_push_notification_broadcasts_account() {
    let source = Arc::new(MemorySource::new());
    let flow = sync_cli::build_flow(&config(TriggerPolicy::Push), source).unwrap();
    flow.connect().await.unwrap();

    let name = "X-DemoPush";
    let handle = flow.on_push(sample_notification(name)).await.unwrap();
    assert_eq!(handle.total, 1);

    let result = flow
        .runner()
        .await_completion(&handle, Duration::from_secs(600))
        .await
        .unwrap();
    result.assert_successful().unwrap();

    let row = adapter(&flow, "database")
        .find_by_key(SAMPLE_ACCOUNT_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_str("salesforceId"), Some(SAMPLE_ACCOUNT_ID));
    assert_eq!(row.get_str("name"), Some(name));

    assert!(adapter(&flow, "crm").find_by_key(name).await.unwrap().is_some());

    let hr = adapter(&flow, "hr");
    let customer = find_converged(hr.as_ref(), name, Duration::from_secs(60), &backoff())
        .await
        .unwrap();
    assert_eq!(category_id(&customer), Some(BIOTECH_ID));

    tokio::time::sleep(Duration::from_secs(15)).await;
    let customer = adapter(&flow, "erp").find_by_key(name).await.unwrap().unwrap();
    assert!(customer.get_str("CustomerNumber").is_some());

    // A push flow never polls
    assert!(flow.run_once().await.is_err());
}
