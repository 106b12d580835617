//! Real-time routing suite: the on-ingestion single-lead path, its live
//! claim check, and its interaction with the fallback gates.

mod common;

use common::{client, lead, order, run_instant, Harness};
use leadflow_core::allocation::RouteOutcome;
use leadflow_core::models::{BusinessEntity, DeliveryStatus, LeadSource, LeadStatus};
use leadflow_core::storage::LeadStore;

#[tokio::test]
async fn fresh_lead_routes_immediately() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 0, 1))
        .await;

    let l = lead("+33600000080", 0);
    h.store.insert_lead(l.clone()).await;

    let outcome = h.engine.route_single(l.lead_id).await.unwrap();
    let delivery = match outcome {
        RouteOutcome::Routed(delivery) => delivery,
        other => panic!("expected routed outcome, got {other:?}"),
    };
    assert_eq!(delivery.status, DeliveryStatus::Sent);
    assert_eq!(delivery.lead_ids, vec![l.lead_id]);
    assert_eq!(delivery.fresh_count, 1);

    assert_eq!(
        h.store.lead(l.lead_id).await.unwrap().status,
        LeadStatus::Delivered
    );
}

#[tokio::test]
async fn no_open_orders_settles_the_lead() {
    let h = Harness::new();
    let l = lead("+33600000081", 0);
    h.store.insert_lead(l.clone()).await;

    let outcome = h.engine.route_single(l.lead_id).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::NoOpenOrders));
    assert_eq!(
        h.store.lead(l.lead_id).await.unwrap().status,
        LeadStatus::NonDelivered
    );
}

#[tokio::test]
async fn entity_locked_lead_reports_no_open_orders() {
    let h = Harness::new();
    let sibling_client = client("SiblingCo");
    h.store.insert_client(sibling_client.clone()).await;
    h.store
        .insert_order(order(
            BusinessEntity::EntityB,
            sibling_client.client_id,
            10,
            0,
            1,
        ))
        .await;

    let mut l = lead("+33600000082", 0);
    l.source = LeadSource::Partner;
    h.store.insert_lead(l.clone()).await;

    let outcome = h.engine.route_single(l.lead_id).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::NoOpenOrders));
    assert!(h.store.deliveries().await.is_empty());
}

#[tokio::test]
async fn fallback_applies_on_the_real_time_path() {
    let h = Harness::new();
    let sibling_client = client("SiblingCo");
    h.store.insert_client(sibling_client.clone()).await;
    h.store
        .insert_order(order(
            BusinessEntity::EntityB,
            sibling_client.client_id,
            10,
            0,
            1,
        ))
        .await;

    let l = lead("+33600000083", 0);
    h.store.insert_lead(l.clone()).await;

    let outcome = h.engine.route_single(l.lead_id).await.unwrap();
    let delivery = match outcome {
        RouteOutcome::Routed(delivery) => delivery,
        other => panic!("expected routed outcome, got {other:?}"),
    };
    assert_eq!(delivery.entity, BusinessEntity::EntityB);
}

#[tokio::test]
async fn already_claimed_lead_is_not_routed_twice() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 0, 1))
        .await;

    let l = lead("+33600000084", 0);
    h.store.insert_lead(l.clone()).await;
    // A concurrent path already took the lead.
    h.store
        .update_status_if(
            l.lead_id,
            LeadStatus::New,
            LeadStatus::Routed,
            common::run_instant(),
        )
        .await
        .unwrap();

    let outcome = h.engine.route_single(l.lead_id).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::AlreadyClaimed));
    assert!(h.store.deliveries().await.is_empty());
}

#[tokio::test]
async fn lead_without_timestamp_is_skipped_but_not_marked() {
    let h = Harness::new();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 0, 1))
        .await;

    let mut l = lead("+33600000085", 0);
    l.created_at = None;
    h.store.insert_lead(l.clone()).await;

    let outcome = h.engine.route_single(l.lead_id).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::NonRoutable));
    // Status stays untouched so a corrected timestamp restores the lead.
    assert_eq!(h.store.lead(l.lead_id).await.unwrap().status, LeadStatus::New);

    let mut corrected = l;
    corrected.created_at = Some(run_instant());
    h.store.insert_lead(corrected.clone()).await;

    let outcome = h.engine.route_single(corrected.lead_id).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::Routed(_)));
}
