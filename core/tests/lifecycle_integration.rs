//! Integration tests for the shipment lifecycle.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use shiptrack_core::{
    ShipmentError, ShipmentLifecycle,
    config::{AppConfig, LifecycleConfig},
    environment::{Clock, FixedClock},
    mocks::{
        InMemoryStore, MockCodeStore, MockTransport, RecordingSink, sample_partner, sample_seller,
    },
    notification::NotificationTrigger,
    providers::{
        NotificationSink, OutboundMessage, PartnerRepository, SellerRepository,
        VerificationCodeStore,
    },
    queue::{NotificationQueue, notification_queue},
    token::TokenCodec,
    types::{
        CreateShipment, DeliveryPartner, ReviewRequest, Seller, ShipmentPatch, ShipmentStatus,
        Tag, TagName,
    },
};

type Lifecycle<N> = ShipmentLifecycle<InMemoryStore, MockCodeStore, N>;

struct World<N> {
    store: InMemoryStore,
    codes: MockCodeStore,
    sink: N,
    clock: FixedClock,
    lifecycle: Lifecycle<N>,
    seller: Seller,
}

// Honors RUST_LOG; the first test to run installs the subscriber
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn world_with_sink<N: NotificationSink + Clone>(sink: N) -> World<N> {
    init_tracing();
    let store = InMemoryStore::new();
    let codes = MockCodeStore::new();
    let clock = FixedClock::new(Utc::now());
    let seller = sample_seller("Acme", 22002);
    store.insert_seller(&seller).await.unwrap();

    let trigger = NotificationTrigger::new(
        codes.clone(),
        sink.clone(),
        TokenCodec::new("integration-secret"),
        AppConfig::default(),
    );
    let lifecycle = ShipmentLifecycle::new(
        store.clone(),
        trigger,
        Arc::new(clock.clone()),
        LifecycleConfig::default(),
    );

    World {
        store,
        codes,
        sink,
        clock,
        lifecycle,
        seller,
    }
}

async fn world() -> World<RecordingSink> {
    world_with_sink(RecordingSink::new()).await
}

async fn add_partner<N>(world: &World<N>, name: &str, capacity: u32) -> DeliveryPartner {
    let partner = sample_partner(name, &[11001], capacity);
    world.store.insert_partner(&partner).await.unwrap();
    partner
}

fn request() -> CreateShipment {
    CreateShipment {
        content: "Books and notes".into(),
        weight: 2.5,
        destination: 11001,
        client_contact_email: "client@example.com".into(),
        client_contact_phone: None,
    }
}

fn to_status(status: ShipmentStatus) -> ShipmentPatch {
    ShipmentPatch {
        status: Some(status),
        ..ShipmentPatch::default()
    }
}

fn with_code(status: ShipmentStatus, code: &str) -> ShipmentPatch {
    ShipmentPatch {
        verification_code: Some(code.to_string()),
        ..to_status(status)
    }
}

async fn deliver<N: NotificationSink>(
    world: &World<N>,
    partner: &DeliveryPartner,
) -> shiptrack_core::Shipment {
    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();
    world
        .lifecycle
        .update(shipment.id, to_status(ShipmentStatus::OutForDelivery), partner)
        .await
        .unwrap();
    world
        .lifecycle
        .update(shipment.id, to_status(ShipmentStatus::Delivered), partner)
        .await
        .unwrap()
}

fn review_token_from(messages: &[OutboundMessage]) -> String {
    let url = messages
        .iter()
        .rev()
        .find_map(|message| match message {
            OutboundMessage::TemplatedEmail { context, .. } => context.get("review_url"),
            _ => None,
        })
        .and_then(|url| url.as_str())
        .unwrap();
    url.split_once("token=").unwrap().1.to_string()
}

// ═══════════════════════════════════════════════════════════════════════
// Derived status and timeline
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_status_always_matches_latest_event() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 5).await;

    let mut shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();
    assert_eq!(shipment.status(), Some(shipment.timeline[0].status));

    for status in [ShipmentStatus::InTransit, ShipmentStatus::OutForDelivery] {
        world.clock.advance(Duration::minutes(5));
        let before = shipment.timeline.clone();

        shipment = world
            .lifecycle
            .update(shipment.id, to_status(status), &partner)
            .await
            .unwrap();

        assert_eq!(shipment.timeline.len(), before.len() + 1);
        assert_eq!(&shipment.timeline[..before.len()], &before[..]);
        assert_eq!(shipment.status(), Some(status));
        assert_eq!(shipment.latest_event().unwrap().status, status);
    }

    let stored = world.lifecycle.get(shipment.id).await.unwrap();
    assert_eq!(stored.timeline, shipment.timeline);
}

// ═══════════════════════════════════════════════════════════════════════
// Assignment
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_no_serviceable_partner() {
    let world = world().await;

    let err = world
        .lifecycle
        .create(request(), &world.seller)
        .await
        .unwrap_err();

    assert_eq!(err, ShipmentError::NoCapacityAvailable { destination: 11001 });
    assert!(world.lifecycle.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_partner_at_zero_capacity() {
    let world = world().await;
    add_partner(&world, "Full", 0).await;

    let err = world
        .lifecycle
        .create(request(), &world.seller)
        .await
        .unwrap_err();

    assert_eq!(err, ShipmentError::NoCapacityAvailable { destination: 11001 });
}

#[tokio::test]
async fn test_capacity_one_is_used_up() {
    let world = world().await;
    let partner = add_partner(&world, "Solo", 1).await;

    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();
    assert_eq!(shipment.partner_id, Some(partner.id()));

    let capacity = world
        .lifecycle
        .assignment()
        .index()
        .capacity_of(partner.id())
        .await
        .unwrap();
    assert_eq!(capacity.current_capacity(), 0);

    let err = world
        .lifecycle
        .create(request(), &world.seller)
        .await
        .unwrap_err();
    assert_eq!(err, ShipmentError::NoCapacityAvailable { destination: 11001 });
}

#[tokio::test]
async fn test_finished_shipments_free_capacity() {
    let world = world().await;
    let partner = add_partner(&world, "Solo", 1).await;

    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();
    world
        .lifecycle
        .cancel(shipment.id, &world.seller)
        .await
        .unwrap();

    let next = world.lifecycle.create(request(), &world.seller).await.unwrap();
    assert_eq!(next.partner_id, Some(partner.id()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creations_never_overcommit() {
    let world = world().await;
    let partner = add_partner(&world, "Solo", 1).await;
    let lifecycle = Arc::new(world.lifecycle);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = Arc::clone(&lifecycle);
            let seller = world.seller.clone();
            tokio::spawn(async move { lifecycle.create(request(), &seller).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let created = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(created, 1);
    for result in results.iter().filter(|result| result.is_err()) {
        assert_eq!(
            result.as_ref().unwrap_err(),
            &ShipmentError::NoCapacityAvailable { destination: 11001 }
        );
    }

    let capacity = world.store.partner_capacity(partner.id()).await.unwrap().unwrap();
    assert_eq!(capacity.active_shipments, 1);
}

// ═══════════════════════════════════════════════════════════════════════
// Verification gate
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_delivered_requires_code_for_any_update() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 5).await;
    let shipment = deliver(&world, &partner).await;
    let code = world.codes.get_code(shipment.id).await.unwrap().unwrap();

    let attempts = [
        to_status(ShipmentStatus::InTransit),
        ShipmentPatch {
            description: Some("Left at the door".into()),
            ..ShipmentPatch::default()
        },
        ShipmentPatch {
            estimated_delivery: Some(Utc::now()),
            ..ShipmentPatch::default()
        },
        with_code(ShipmentStatus::InTransit, "000000"),
    ];
    for patch in attempts {
        let err = world
            .lifecycle
            .update(shipment.id, patch, &partner)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::Forbidden(_)), "{err:?}");
    }

    // Rejected attempts leave the code in place
    assert_eq!(
        world.codes.get_code(shipment.id).await.unwrap(),
        Some(code.clone())
    );
    assert_eq!(world.lifecycle.get(shipment.id).await.unwrap().timeline.len(), 3);

    let updated = world
        .lifecycle
        .update(
            shipment.id,
            ShipmentPatch {
                description: Some("Signed by neighbour".into()),
                verification_code: Some(code.clone()),
                ..ShipmentPatch::default()
            },
            &partner,
        )
        .await
        .unwrap();
    assert_eq!(updated.timeline.len(), 4);

    // One-time: the same code does not work twice
    let err = world
        .lifecycle
        .update(shipment.id, with_code(ShipmentStatus::InTransit, &code), &partner)
        .await
        .unwrap_err();
    assert!(matches!(err, ShipmentError::Forbidden(_)));
}

// ═══════════════════════════════════════════════════════════════════════
// Cancel and tags
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_cancel_placed_and_delivered() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 5).await;

    let placed = world.lifecycle.create(request(), &world.seller).await.unwrap();
    let cancelled = world
        .lifecycle
        .cancel(placed.id, &world.seller)
        .await
        .unwrap();
    assert_eq!(cancelled.timeline.len(), placed.timeline.len() + 1);
    let cancellations = cancelled
        .timeline
        .iter()
        .filter(|event| event.status == ShipmentStatus::Cancelled)
        .count();
    assert_eq!(cancellations, 1);

    let delivered = deliver(&world, &partner).await;
    let err = world
        .lifecycle
        .cancel(delivered.id, &world.seller)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShipmentError::InvalidState {
            status: Some(ShipmentStatus::Delivered),
            ..
        }
    ));
}

#[tokio::test]
async fn test_tag_added_twice_conflicts() {
    let world = world().await;
    add_partner(&world, "FastShip", 5).await;
    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();

    world
        .lifecycle
        .add_tag(shipment.id, Tag::new(TagName::Perishable))
        .await
        .unwrap();
    let err = world
        .lifecycle
        .add_tag(shipment.id, Tag::new(TagName::Perishable))
        .await
        .unwrap_err();

    assert!(matches!(err, ShipmentError::Conflict(_)));
    let stored = world.lifecycle.get(shipment.id).await.unwrap();
    assert_eq!(stored.tags.len(), 1);
    assert_eq!(
        stored.tags[0].instruction,
        TagName::Perishable.default_instruction()
    );
}

// ═══════════════════════════════════════════════════════════════════════
// End to end
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_end_to_end_delivery() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 1).await;

    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();
    assert_eq!(shipment.partner_id, Some(partner.id()));
    assert_eq!(shipment.timeline.len(), 1);
    assert_eq!(shipment.timeline[0].status, ShipmentStatus::Placed);
    assert_eq!(shipment.timeline[0].location, world.seller.zip_code);

    let out = world
        .lifecycle
        .update(
            shipment.id,
            ShipmentPatch {
                location: Some(11001),
                status: Some(ShipmentStatus::OutForDelivery),
                ..ShipmentPatch::default()
            },
            &partner,
        )
        .await
        .unwrap();
    assert_eq!(out.timeline.len(), 2);
    let code = world.codes.get_code(shipment.id).await.unwrap().unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let delivered = world
        .lifecycle
        .update(
            shipment.id,
            with_code(ShipmentStatus::Delivered, &code),
            &partner,
        )
        .await
        .unwrap();
    assert_eq!(delivered.timeline.len(), 3);
    assert_eq!(delivered.status(), Some(ShipmentStatus::Delivered));

    let err = world
        .lifecycle
        .update(shipment.id, to_status(ShipmentStatus::InTransit), &partner)
        .await
        .unwrap_err();
    assert!(matches!(err, ShipmentError::Forbidden(_)));

    let templates: Vec<String> = world
        .sink
        .messages()
        .into_iter()
        .filter_map(|message| match message {
            OutboundMessage::TemplatedEmail { template, .. } => Some(template),
            _ => None,
        })
        .collect();
    assert_eq!(
        templates,
        vec![
            "mail_placed.html",
            "mail_out_for_delivery.html",
            "mail_delivered.html"
        ]
    );
}

#[tokio::test]
async fn test_in_transit_sends_nothing() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 5).await;
    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();
    world.sink.clear();

    world
        .lifecycle
        .update(shipment.id, to_status(ShipmentStatus::InTransit), &partner)
        .await
        .unwrap();

    assert!(world.sink.messages().is_empty());
    assert!(world.codes.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
// Reviews
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_review_flow_accepts_exactly_one_review() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 5).await;
    let shipment = deliver(&world, &partner).await;
    let token = review_token_from(&world.sink.messages());

    let err = world
        .lifecycle
        .rate(
            &token,
            ReviewRequest {
                rating: 6,
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShipmentError::ValidationError(_)));

    let err = world
        .lifecycle
        .rate(
            &token,
            ReviewRequest {
                rating: 4,
                comment: Some("x".repeat(501)),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShipmentError::ValidationError(_)));

    let review = world
        .lifecycle
        .rate(
            &token,
            ReviewRequest {
                rating: 5,
                comment: Some("Quick and careful".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(review.shipment_id, shipment.id);
    assert_eq!(review.rating, 5);

    let err = world
        .lifecycle
        .rate(
            &token,
            ReviewRequest {
                rating: 1,
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ShipmentError::Conflict(_)));

    let stored = world.lifecycle.get(shipment.id).await.unwrap();
    assert_eq!(stored.review, Some(review));
}

#[tokio::test]
async fn test_review_token_rejections() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 5).await;

    let err = world
        .lifecycle
        .rate(
            "not-a-token",
            ReviewRequest {
                rating: 5,
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, ShipmentError::Unauthorized);

    let shipment = deliver(&world, &partner).await;
    let token = world.lifecycle.review_token_for(shipment.id).await.unwrap();

    world.clock.advance(Duration::days(31));
    let err = world
        .lifecycle
        .rate(
            &token,
            ReviewRequest {
                rating: 5,
                comment: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, ShipmentError::Unauthorized);
}

#[tokio::test]
async fn test_review_before_delivery_is_invalid() {
    let world = world().await;
    add_partner(&world, "FastShip", 5).await;
    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();

    let token = world
        .lifecycle
        .trigger()
        .review_token(shipment.id, world.clock.now())
        .unwrap();
    let err = world
        .lifecycle
        .rate(
            &token,
            ReviewRequest {
                rating: 5,
                comment: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ShipmentError::InvalidState {
            status: Some(ShipmentStatus::Placed),
            ..
        }
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// Notification failures
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_transport_failures_never_fail_lifecycle_calls() {
    let transport = MockTransport::new();
    transport.fail_for("client@example.com");
    let (queue, worker) = notification_queue(transport.clone());
    let handle = worker.spawn();

    let world: World<NotificationQueue> = world_with_sink(queue).await;
    let partner = add_partner(&world, "FastShip", 5).await;

    let shipment = deliver(&world, &partner).await;
    assert_eq!(shipment.status(), Some(ShipmentStatus::Delivered));

    drop(world);
    let stats = handle.await.unwrap();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.failed, 3);
    assert!(transport.delivered().is_empty());
}

#[tokio::test]
async fn test_code_store_failure_does_not_fail_update() {
    let world = world().await;
    let partner = add_partner(&world, "FastShip", 5).await;
    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();

    world.codes.fail_with("redis unavailable");
    let updated = world
        .lifecycle
        .update(
            shipment.id,
            to_status(ShipmentStatus::OutForDelivery),
            &partner,
        )
        .await
        .unwrap();

    assert_eq!(updated.status(), Some(ShipmentStatus::OutForDelivery));
}

#[tokio::test]
async fn test_closed_queue_does_not_fail_create() {
    let sink = RecordingSink::new();
    sink.fail_with("queue closed");
    let world = world_with_sink(sink).await;
    add_partner(&world, "FastShip", 5).await;

    let shipment = world.lifecycle.create(request(), &world.seller).await.unwrap();

    assert_eq!(shipment.status(), Some(ShipmentStatus::Placed));
}
