//! Delivery lifecycle suite: transport failure and retry, outcome
//! transitions (idempotent reject/remove, mutual exclusion), and the
//! billable rule.

mod common;

use common::{client, lead, order, Harness};
use leadflow_core::allocation::RouteOutcome;
use leadflow_core::models::{
    BusinessEntity, Delivery, DeliveryOutcome, DeliveryStatus, LeadStatus,
};
use leadflow_core::state_machine::StateMachineError;
use leadflow_core::LeadflowError;

async fn run_one_delivery(h: &Harness) -> Delivery {
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 0, 1))
        .await;
    h.store.insert_lead(lead("+33600000020", 2)).await;

    h.engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();
    h.store.deliveries().await.into_iter().next().unwrap()
}

#[tokio::test]
async fn transport_failure_leaves_a_retryable_failed_delivery() {
    let h = Harness::new();
    h.transport.fail_next(1).await;

    let delivery = run_one_delivery(&h).await;
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.attempt_count, 1);
    assert!(delivery
        .last_error
        .as_deref()
        .unwrap()
        .contains("simulated transport outage"));
    assert!(!delivery.is_billable());

    // The lead stays routed, not delivered: attribution happens only on
    // the sent transition.
    let l = h.store.lead(delivery.lead_ids[0]).await.unwrap();
    assert_eq!(l.status, LeadStatus::Routed);
    assert!(l.delivered_to_client.is_none());

    // Retry succeeds once the transport recovers.
    let retried = h
        .packager()
        .retry_send(delivery.delivery_id)
        .await
        .unwrap();
    assert_eq!(retried.status, DeliveryStatus::Sent);
    assert_eq!(retried.attempt_count, 2);
    assert!(retried.is_billable());

    let l = h.store.lead(delivery.lead_ids[0]).await.unwrap();
    assert_eq!(l.status, LeadStatus::Delivered);
    assert_eq!(h.transport.sent_messages().await.len(), 1);
}

#[tokio::test]
async fn retry_is_only_legal_from_failed() {
    let h = Harness::new();
    let delivery = run_one_delivery(&h).await;
    assert_eq!(delivery.status, DeliveryStatus::Sent);

    let result = h.packager().retry_send(delivery.delivery_id).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn reject_resets_leads_and_is_idempotent() {
    let h = Harness::new();
    let delivery = run_one_delivery(&h).await;
    assert_eq!(delivery.status, DeliveryStatus::Sent);
    let lead_id = delivery.lead_ids[0];

    let sm = h.state_machine(delivery.delivery_id);
    let first = sm.reject().await.unwrap();
    assert_eq!(first.outcome, DeliveryOutcome::Rejected);
    assert!(!first.already_applied);

    // Lead is re-routable with delivery linkage cleared; the delivery
    // record keeps its sent status and artifact for audit.
    let l = h.store.lead(lead_id).await.unwrap();
    assert_eq!(l.status, LeadStatus::New);
    assert!(l.delivered_to_client.is_none());
    assert!(l.delivery_id.is_none());

    let d = h
        .store
        .deliveries()
        .await
        .into_iter()
        .find(|d| d.delivery_id == delivery.delivery_id)
        .unwrap();
    assert_eq!(d.status, DeliveryStatus::Sent);
    assert_eq!(d.outcome, DeliveryOutcome::Rejected);
    assert!(!d.is_billable());

    let second = sm.reject().await.unwrap();
    assert!(second.already_applied);
}

#[tokio::test]
async fn remove_after_reject_is_a_conflict() {
    let h = Harness::new();
    let delivery = run_one_delivery(&h).await;

    let sm = h.state_machine(delivery.delivery_id);
    sm.reject().await.unwrap();

    let err = sm.remove().await.unwrap_err();
    assert!(matches!(
        err,
        StateMachineError::OutcomeConflict {
            current: DeliveryOutcome::Rejected,
            requested: DeliveryOutcome::Removed,
            ..
        }
    ));
}

#[tokio::test]
async fn outcomes_are_only_legal_from_sent() {
    let h = Harness::new();
    h.transport.fail_next(1).await;
    let delivery = run_one_delivery(&h).await;
    assert_eq!(delivery.status, DeliveryStatus::Failed);

    let sm = h.state_machine(delivery.delivery_id);
    let err = sm.reject().await.unwrap_err();
    assert!(matches!(
        err,
        StateMachineError::OutcomeNotAllowed {
            status: DeliveryStatus::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn rejected_lead_is_routable_again_on_the_next_run() {
    let h = Harness::new();
    let delivery = run_one_delivery(&h).await;

    let sm = h.state_machine(delivery.delivery_id);
    sm.reject().await.unwrap();

    // Next day: the lead re-enters the pools and is matched again. The
    // rejected delivery does not count as delivery history.
    h.clock.advance(chrono::Duration::days(1));
    let report = h
        .engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.deliveries_sent, 1);

    let l = h.store.lead(delivery.lead_ids[0]).await.unwrap();
    assert_eq!(l.status, LeadStatus::Delivered);
}

#[tokio::test]
async fn delivered_but_unrecorded_lead_is_never_resent() {
    let (h, fault) = Harness::with_sent_write_fault();
    let acme = client("Acme");
    h.store.insert_client(acme.clone()).await;
    h.store
        .insert_order(order(BusinessEntity::EntityA, acme.client_id, 10, 0, 1))
        .await;
    let l = lead("+33600000027", 1);
    h.store.insert_lead(l.clone()).await;

    // Transport accepts the hand-off, then the sent write dies.
    fault.fail_next_sent_writes(1);
    let err = h.engine.route_single(l.lead_id).await.unwrap_err();
    assert!(matches!(err, LeadflowError::DeliveredUnrecorded { .. }));
    assert_eq!(h.transport.sent_messages().await.len(), 1);

    // The lead already reached the client, so it must stay held in
    // routed, not become re-routable.
    let held = h.store.lead(l.lead_id).await.unwrap();
    assert_eq!(held.status, LeadStatus::Routed);

    // The delivery is stuck short of sent, awaiting reconciliation.
    let delivery = h.store.deliveries().await.into_iter().next().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Sending);

    // Storage recovered: neither path may send the lead a second time.
    let outcome = h.engine.route_single(l.lead_id).await.unwrap();
    assert!(matches!(outcome, RouteOutcome::AlreadyClaimed));
    h.engine
        .run_entity(BusinessEntity::EntityA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.transport.sent_messages().await.len(), 1);
}
