//! Duplicate suppression suite: the 30-day per-(phone, product, client)
//! window around its boundaries, per-client scoping, and the Pass 2 /
//! Pass 3 split over delivery history.

mod common;

use chrono::Duration;
use common::{client, lead, order, run_instant, Harness};
use leadflow_core::models::{
    BusinessEntity, ClientInfo, DeliveryMethod, DeliveryStatus, FreshnessTag, Lead, LeadStatus,
    NewDelivery,
};
use leadflow_core::storage::{DeliveryStore, LeadStore};
use uuid::Uuid;

/// Seed a sent-and-accepted delivery of `lead` to `client_info`,
/// `days_ago` days before the fixed run instant.
async fn seed_history(h: &Harness, l: &Lead, client_info: &ClientInfo, days_ago: i64) {
    let sent_at = run_instant() - Duration::days(days_ago);
    let d = h
        .store
        .create_delivery(
            NewDelivery {
                entity: l.entity,
                order_id: Uuid::new_v4(),
                client_id: client_info.client_id,
                client_name: client_info.name.clone(),
                product: l.product.clone(),
                method: DeliveryMethod::CsvExport,
                lead_ids: vec![l.lead_id],
                fresh_count: 0,
                backlog_count: 1,
            },
            sent_at,
        )
        .await
        .unwrap();
    h.store
        .transition_status(
            d.delivery_id,
            DeliveryStatus::PendingCsv,
            DeliveryStatus::Sent,
            sent_at,
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn same_phone_is_blocked_inside_the_window() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 20, 1))
        .await;

    // The phone went to Acme 29 days ago through another lead record.
    let old = lead("+33600000030", 40);
    h.store.insert_lead(old.clone()).await;
    seed_history(&h, &old, &acme, 29).await;
    // Keep the historical lead out of the pools.
    h.store
        .update_status_if(old.lead_id, LeadStatus::New, LeadStatus::Delivered, run_instant())
        .await
        .unwrap();

    let candidate = lead("+33600000030", 2);
    h.store.insert_lead(candidate.clone()).await;

    let report = h
        .engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.deliveries_sent, 0);
    // Blocked by suppression only, so the lead parks as duplicate, not
    // non_delivered.
    assert_eq!(
        h.store.lead(candidate.lead_id).await.unwrap().status,
        LeadStatus::Duplicate
    );
}

#[tokio::test]
async fn duplicate_parked_lead_is_retried_once_the_window_expires() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 20, 1))
        .await;

    let old = lead("+33600000037", 40);
    h.store.insert_lead(old.clone()).await;
    seed_history(&h, &old, &acme, 29).await;
    h.store
        .update_status_if(old.lead_id, LeadStatus::New, LeadStatus::Delivered, run_instant())
        .await
        .unwrap();

    let candidate = lead("+33600000037", 2);
    h.store.insert_lead(candidate.clone()).await;

    h.engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        h.store.lead(candidate.lead_id).await.unwrap().status,
        LeadStatus::Duplicate
    );

    // Two days later the 30-day window has expired; the parked lead
    // re-enters the pools and goes out.
    h.clock.advance(chrono::Duration::days(2));
    let report = h
        .engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.deliveries_sent, 1);
    assert_eq!(
        h.store.lead(candidate.lead_id).await.unwrap().status,
        LeadStatus::Delivered
    );
}

#[tokio::test]
async fn same_phone_is_allowed_once_the_window_expires() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 20, 1))
        .await;

    let old = lead("+33600000031", 40);
    h.store.insert_lead(old.clone()).await;
    seed_history(&h, &old, &acme, 31).await;
    h.store
        .update_status_if(old.lead_id, LeadStatus::New, LeadStatus::Delivered, run_instant())
        .await
        .unwrap();

    let candidate = lead("+33600000031", 2);
    h.store.insert_lead(candidate.clone()).await;

    let report = h
        .engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.deliveries_sent, 1);
    assert_eq!(
        h.store.lead(candidate.lead_id).await.unwrap().status,
        LeadStatus::Delivered
    );
}

#[tokio::test]
async fn window_is_scoped_per_client() {
    let h = Harness::new();
    let acme = client("Acme");
    let globex = client("Globex");
    h.store.insert_client(acme.clone()).await;
    h.store.insert_client(globex.clone()).await;
    // Only Globex has an open order.
    h.store
        .insert_order(order(BusinessEntity::EntityA, globex.client_id, 10, 20, 1))
        .await;

    let old = lead("+33600000032", 40);
    h.store.insert_lead(old.clone()).await;
    seed_history(&h, &old, &acme, 5).await;
    h.store
        .update_status_if(old.lead_id, LeadStatus::New, LeadStatus::Delivered, run_instant())
        .await
        .unwrap();

    let candidate = lead("+33600000032", 2);
    h.store.insert_lead(candidate.clone()).await;

    let report = h
        .engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();

    // Acme's fresh window does not block a delivery to Globex.
    assert_eq!(report.deliveries_sent, 1);
    assert_eq!(
        h.store.lead(candidate.lead_id).await.unwrap().delivered_to_client,
        Some(globex.client_id)
    );
}

#[tokio::test]
async fn previously_delivered_lead_returns_via_pass_three_after_expiry() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 20, 1))
        .await;

    // Same lead record went to Acme 35 days ago, then came back to the
    // routable pool (rejected batch); its tag is permanently Backlog.
    let mut l = lead("+33600000033", 50);
    l.freshness = FreshnessTag::Backlog;
    l.status = LeadStatus::NonDelivered;
    h.store.insert_lead(l.clone()).await;
    seed_history(&h, &l, &acme, 35).await;

    let report = h
        .engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.leads_matched_backlog, 1);
    assert_eq!(report.deliveries_sent, 1);
    assert_eq!(h.store.deliveries().await.len(), 2); // history + new send

    let routed = h.store.lead(l.lead_id).await.unwrap();
    assert_eq!(routed.status, LeadStatus::Delivered);
    assert_eq!(routed.freshness, FreshnessTag::Backlog);
}

#[tokio::test]
async fn previously_delivered_lead_stays_blocked_inside_the_window() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 20, 1))
        .await;

    let mut l = lead("+33600000034", 50);
    l.freshness = FreshnessTag::Backlog;
    l.status = LeadStatus::NonDelivered;
    h.store.insert_lead(l.clone()).await;
    seed_history(&h, &l, &acme, 20).await;

    let report = h
        .engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.deliveries_sent, 0);
    assert_eq!(
        h.store.lead(l.lead_id).await.unwrap().status,
        LeadStatus::Duplicate
    );
}

#[tokio::test]
async fn pass_two_prefers_never_delivered_backlog_over_expired_history() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    // One unit of quota: the pass order decides who gets it.
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 1, 100, 1))
        .await;

    // Older lead with expired history to Acme (Pass 3 material).
    let mut returning = lead("+33600000035", 60);
    returning.freshness = FreshnessTag::Backlog;
    returning.status = LeadStatus::NonDelivered;
    h.store.insert_lead(returning.clone()).await;
    seed_history(&h, &returning, &acme, 40).await;

    // Younger backlog lead never delivered anywhere (Pass 2 material).
    let mut untouched = lead("+33600000036", 10);
    untouched.freshness = FreshnessTag::Backlog;
    h.store.insert_lead(untouched.clone()).await;

    h.engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();

    // Pass 2 runs to completion before Pass 3 is entered, so the
    // never-delivered lead wins despite being younger.
    assert_eq!(
        h.store.lead(untouched.lead_id).await.unwrap().status,
        LeadStatus::Delivered
    );
    assert_eq!(
        h.store.lead(returning.lead_id).await.unwrap().status,
        LeadStatus::NonDelivered
    );
}
