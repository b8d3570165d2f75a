//! End-to-end repository tests on an in-memory database.

#[path = "test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;

use serde_json::json;
use tms_persistence::ErrorKind;
use tms_persistence::crypto::{Credentials, EncryptionService};
use tms_persistence::models::consolidation_group::GroupStatus;
use tms_persistence::models::document;
use tms_persistence::models::email_queue::{EmailPriority, QueueStatus};
use tms_persistence::models::notification::NotificationStatus;
use tms_persistence::models::shipment::ShipmentStatus;
use tms_persistence::models::shipment_move::MoveStatus;
use tms_persistence::models::stop::{StopStatus, StopType};
use tms_persistence::models::{comment_mention, dedicated_lane, shipment_comment, tractor};
use tms_persistence::optimistic::{UpdateMode, update_with_version};
use tms_persistence::pulid::Pulid;
use tms_persistence::query::{FieldFilter, FilterOperator, ListRequest, SortField, TenantInfo};
use tms_persistence::record::{insert_record, now_unix, stamp_new};
use tms_persistence::repositories::consolidation::ConsolidationOptions;
use tms_persistence::repositories::dedicated_lane::FindDedicatedLaneByShipmentRequest;
use tms_persistence::repositories::email_profile::EmailProfileInput;
use tms_persistence::repositories::shipment::{ShipmentDetails, ShipmentOptions};
use tms_persistence::repositories::shipment_comment::CommentDetails;
use tms_persistence::repositories::shipment_move::{
    MoveDetails, SplitMoveRequest, SplitQuantities, StopTimes,
};
use tms_persistence::repositories::worker::WorkerDetails;
use tms_persistence::repositories::{
    ConsolidationRepository, CustomerRepository, DedicatedLaneRepository, DocumentRepository,
    EmailProfileRepository, EmailQueueRepository, NotificationRepository,
    ShipmentCommentRepository, ShipmentMoveRepository, ShipmentRepository, TractorRepository,
    WorkerRepository,
};

use test_utils::*;

const HOUR: i64 = 3600;

async fn shipment_repo() -> anyhow::Result<ShipmentRepository> {
    let db = setup_connections().await?;
    Ok(ShipmentRepository::new(Arc::clone(&db), sequence_generator(db)))
}

fn one_move_shipment(bol: &str) -> ShipmentDetails {
    let (origin, destination) = (Pulid::new("loc_"), Pulid::new("loc_"));
    let mut details = ShipmentDetails::new(shipment(bol));
    details.moves.push(MoveDetails {
        shipment_move: shipment_move(0),
        stops: vec![
            stop(StopType::Pickup, &origin, 100, 10 * HOUR),
            stop(StopType::Delivery, &destination, 100, 30 * HOUR),
        ],
    });
    details
}

#[tokio::test]
async fn shipments_are_isolated_by_tenant() -> anyhow::Result<()> {
    let repo = shipment_repo().await?;
    let bu = Pulid::new("bu_");
    let tenant_a = TenantInfo::new(Pulid::new("org_"), bu.clone());
    let tenant_b = TenantInfo::new(Pulid::new("org_"), bu);

    let s1 = repo.create(&tenant_a, one_move_shipment("BOL-1")).await?;
    let s2 = repo.create(&tenant_b, one_move_shipment("BOL-2")).await?;

    let listed = repo.list(&ListRequest::new(tenant_a.clone())).await?;
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].id, s1.shipment.id);

    let err = repo
        .get_by_id(&s2.shipment.id, &tenant_a, ShipmentOptions::full())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn created_shipment_round_trips_with_children() -> anyhow::Result<()> {
    let repo = shipment_repo().await?;
    let tenant = tenant();

    let mut input = one_move_shipment("BOL-7");
    input.additional_charges = vec![charge(2_500), charge(7_500)];
    let created = repo.create(&tenant, input).await?;

    assert!(created.shipment.pro_number.starts_with('S'));
    assert_eq!(created.shipment.version, 1);
    assert!(created.shipment.created_at > 0);
    assert!(created.shipment.id.as_str().starts_with("shp_"));

    let loaded = repo
        .get_by_id(&created.shipment.id, &tenant, ShipmentOptions::full())
        .await?;
    assert_eq!(loaded.shipment, created.shipment);
    assert_eq!(loaded.moves.len(), 1);
    let stops = &loaded.moves[0].stops;
    assert_eq!(
        stops.iter().map(|s| (s.sequence, s.stop_type)).collect::<Vec<_>>(),
        [(1, StopType::Pickup), (2, StopType::Delivery)]
    );
    assert_eq!(loaded.additional_charges.len(), 2);

    let bare = repo
        .get_by_id(&created.shipment.id, &tenant, ShipmentOptions::default())
        .await?;
    assert!(bare.moves.is_empty() && bare.additional_charges.is_empty());
    Ok(())
}

#[tokio::test]
async fn shipment_update_reconciles_charges() -> anyhow::Result<()> {
    let repo = shipment_repo().await?;
    let tenant = tenant();

    let mut input = one_move_shipment("BOL-9");
    input.additional_charges = vec![charge(1_000), charge(2_000)];
    let created = repo.create(&tenant, input).await?;
    let (a, b) = (
        created.additional_charges[0].clone(),
        created.additional_charges[1].clone(),
    );

    let mut changed_a = a.clone();
    changed_a.amount_cents = 1_500;
    let c = charge(3_000);
    let mut update = created.clone();
    update.additional_charges = vec![changed_a, c];
    let updated = repo.update(&tenant, update).await?;

    assert_eq!(updated.shipment.version, 2);
    let charges = &updated.additional_charges;
    assert_eq!(charges.len(), 2);
    assert_eq!(charges[0].id, a.id);
    assert_eq!(charges[0].version, 2);
    assert_eq!(charges[0].amount_cents, 1_500);
    assert_eq!(charges[1].version, 1);
    assert_eq!(charges[1].amount_cents, 3_000);

    let loaded = repo
        .get_by_id(&created.shipment.id, &tenant, ShipmentOptions::full())
        .await?;
    assert!(loaded.additional_charges.iter().all(|ch| ch.id != b.id));
    assert_eq!(loaded.additional_charges.len(), 2);

    // Resubmitting the canonical set writes no child rows.
    let again = repo.update(&tenant, updated.clone()).await?;
    assert_eq!(again.shipment.version, 3);
    let versions: Vec<i64> = again.additional_charges.iter().map(|c| c.version).collect();
    assert_eq!(versions, [2, 1]);
    Ok(())
}

#[tokio::test]
async fn concurrent_update_loses_with_version_mismatch() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = CustomerRepository::new(db);
    let tenant = tenant();

    let mut current = repo.create(&tenant, customer("ACME", "Acme Freight")).await?;
    for name in ["Acme Freight Co", "Acme Freight Inc"] {
        current.name = name.to_string();
        current = repo.update(&tenant, current).await?;
    }
    assert_eq!(current.version, 3);

    let mut first = current.clone();
    let mut second = current.clone();
    first.name = "First writer".to_string();
    second.name = "Second writer".to_string();

    let first = repo.update(&tenant, first).await?;
    assert_eq!(first.version, 4);

    let err = repo.update(&tenant, second).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);
    assert_eq!(err.field(), Some("version"));

    let stored = repo.get_by_id(&current.id, &tenant).await?;
    assert_eq!(stored.name, "First writer");

    let mut ghost = current.clone();
    ghost.id = Pulid::new("cus_");
    let err = repo.update(&tenant, ghost).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn customer_codes_are_unique_per_tenant() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = CustomerRepository::new(db);
    let tenant = tenant();

    repo.create(&tenant, customer("ACME", "Acme")).await?;
    let err = repo
        .create(&tenant, customer("ACME", "Other Acme"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.field(), Some("code"));

    repo.create(&test_utils::tenant(), customer("ACME", "Acme elsewhere"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn omit_zero_update_keeps_unset_columns() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = CustomerRepository::new(Arc::clone(&db));
    let tenant = tenant();
    let created = repo
        .create(&tenant, customer("ACME", "Acme Freight"))
        .await?;

    let mut patch = created.clone();
    patch.code = "ACME-EAST".to_string();
    patch.name = String::new();
    patch.city = None;

    let txn = db.begin_write().await?;
    update_with_version(&txn, &mut patch, UpdateMode::OmitZero).await?;
    txn.commit().await?;

    assert_eq!(patch.name, "Acme Freight");
    assert_eq!(patch.code, "ACME-EAST");
    assert_eq!(patch.version, 2);

    let stored = repo.get_by_id(&created.id, &tenant).await?;
    assert_eq!(stored.name, "Acme Freight");
    assert_eq!(stored.city.as_deref(), Some("Dayton"));
    assert_eq!(stored.code, "ACME-EAST");
    assert_eq!(stored.version, 2);
    Ok(())
}

#[tokio::test]
async fn pages_concatenate_to_the_full_list() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = CustomerRepository::new(db);
    let tenant = tenant();
    for n in 0..7 {
        repo.create(&tenant, customer(&format!("C{n:02}"), &format!("Customer {n}")))
            .await?;
    }

    let base = ListRequest::new(tenant.clone()).sort_by(SortField::asc("code"));
    let full = repo.list(&base.clone().page(100, 0)).await?;
    assert_eq!(full.total, 7);

    let mut paged = Vec::new();
    for offset in [0, 3, 6] {
        let page = repo.list(&base.clone().page(3, offset)).await?;
        assert_eq!(page.total, 7);
        paged.extend(page.items);
    }
    assert_eq!(paged, full.items);

    let beyond = repo.list(&base.clone().page(3, 30)).await?;
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 7);
    Ok(())
}

#[tokio::test]
async fn list_rejects_unknown_fields_and_searches() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = CustomerRepository::new(db);
    let tenant = tenant();
    repo.create(&tenant, customer("ACME", "Acme Freight")).await?;
    repo.create(&tenant, customer("BOLT", "Bolt Logistics")).await?;

    let found = repo
        .list(&ListRequest::new(tenant.clone()).search("bolt"))
        .await?;
    assert_eq!(found.total, 1);
    assert_eq!(found.items[0].code, "BOLT");

    let err = repo
        .list(&ListRequest::new(tenant.clone()).filter(FieldFilter::new(
            "password",
            FilterOperator::Eq,
            "x",
        )))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.user_message(), "An internal error occurred");
    Ok(())
}

#[tokio::test]
async fn split_move_divides_stops_between_two_moves() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let shipments = ShipmentRepository::new(Arc::clone(&db), sequence_generator(Arc::clone(&db)));
    let moves = ShipmentMoveRepository::new(db);
    let tenant = tenant();

    let created = shipments.create(&tenant, one_move_shipment("BOL-S")).await?;
    let original = created.moves[0].clone();
    let destination = original.stops[1].location_id.clone();
    let split_location = Pulid::new("loc_");

    let response = moves
        .split_move(&SplitMoveRequest {
            move_id: original.shipment_move.id.clone(),
            tenant: tenant.clone(),
            split_location_id: split_location.clone(),
            split_pickup_times: StopTimes {
                planned_arrival: 22 * HOUR,
                planned_departure: 23 * HOUR,
            },
            split_delivery_times: StopTimes {
                planned_arrival: 20 * HOUR,
                planned_departure: 21 * HOUR,
            },
            split_quantities: SplitQuantities {
                pieces: Some(40),
                weight: Some(800),
            },
        })
        .await?;

    assert_eq!(
        response.original_move.shipment_move.version,
        original.shipment_move.version + 1
    );

    let stored = moves
        .get_moves_by_shipment_id(&created.shipment.id, &tenant)
        .await?;
    assert_eq!(stored.len(), 2);

    let first = &stored[0];
    assert_eq!(first.shipment_move.id, original.shipment_move.id);
    let first_stops: Vec<_> = first
        .stops
        .iter()
        .map(|s| (s.stop_type, s.location_id.clone(), s.pieces))
        .collect();
    assert_eq!(
        first_stops,
        [
            (StopType::Pickup, original.stops[0].location_id.clone(), Some(100)),
            (StopType::SplitDelivery, split_location.clone(), Some(40)),
        ]
    );

    let second = &stored[1];
    assert_eq!(second.shipment_move.id, response.new_move.shipment_move.id);
    assert_eq!(second.shipment_move.sequence, 2);
    let second_stops: Vec<_> = second
        .stops
        .iter()
        .map(|s| (s.sequence, s.stop_type, s.location_id.clone(), s.pieces))
        .collect();
    assert_eq!(
        second_stops,
        [
            (1, StopType::SplitPickup, split_location, Some(40)),
            (2, StopType::Delivery, destination, Some(60)),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn move_status_update_is_version_guarded() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let shipments = ShipmentRepository::new(Arc::clone(&db), sequence_generator(Arc::clone(&db)));
    let moves = ShipmentMoveRepository::new(db);
    let tenant = tenant();

    let created = shipments.create(&tenant, one_move_shipment("BOL-M")).await?;
    let move_id = created.moves[0].shipment_move.id.clone();

    let updated = moves
        .update_status(&move_id, &tenant, 1, MoveStatus::Assigned)
        .await?;
    assert_eq!(updated.status, MoveStatus::Assigned);
    assert_eq!(updated.version, 2);

    let err = moves
        .update_status(&move_id, &tenant, 1, MoveStatus::InTransit)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);

    let loaded = moves.get_by_id(&move_id, &tenant, true).await?;
    assert_eq!(loaded.shipment_move.status, MoveStatus::Assigned);
    assert_eq!(loaded.stops.len(), 2);
    Ok(())
}

#[tokio::test]
async fn only_one_default_email_profile_per_org() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let encryption = encryption();
    let repo = EmailProfileRepository::new(db, encryption.clone());
    let tenant = tenant();

    let p1 = repo
        .create(
            &tenant,
            EmailProfileInput {
                profile: email_profile("dispatch", true),
                credentials: Credentials {
                    password: Some("hunter2".to_string()),
                    api_key: None,
                    oauth2_client_secret: None,
                },
            },
        )
        .await?;
    let p2 = repo
        .create(
            &tenant,
            EmailProfileInput {
                profile: email_profile("billing", false),
                credentials: Credentials {
                    password: Some("s3cret".to_string()),
                    api_key: Some("key-123".to_string()),
                    oauth2_client_secret: None,
                },
            },
        )
        .await?;

    let stored = p1.encrypted_password.clone().unwrap();
    assert_ne!(stored.as_slice(), b"hunter2");
    assert_eq!(encryption.decrypt_string(&stored)?, "hunter2");

    let mut promoted = p2.clone();
    promoted.is_default = true;
    let promoted = repo
        .update(
            &tenant,
            EmailProfileInput {
                profile: promoted,
                credentials: Credentials::default(),
            },
        )
        .await?;
    assert!(promoted.is_default);

    let defaults = repo
        .list(&ListRequest::new(tenant.clone()).filter(FieldFilter::new(
            "isDefault",
            FilterOperator::Eq,
            true,
        )))
        .await?;
    assert_eq!(defaults.total, 1);
    assert_eq!(defaults.items[0].id, p2.id);

    let demoted = repo.get_by_id(&p1.id, &tenant).await?;
    assert!(!demoted.profile.is_default);
    assert_eq!(demoted.profile.version, 2);

    let default = repo.get_default(&tenant).await?;
    assert_eq!(default.profile.id, p2.id);
    assert_eq!(default.credentials.password.as_deref(), Some("s3cret"));
    assert_eq!(default.credentials.api_key.as_deref(), Some("key-123"));
    Ok(())
}

#[tokio::test]
async fn database_allows_one_default_profile_per_org() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = EmailProfileRepository::new(Arc::clone(&db), encryption());
    let tenant = tenant();

    repo.create(
        &tenant,
        EmailProfileInput {
            profile: email_profile("dispatch", true),
            credentials: Credentials::default(),
        },
    )
    .await?;

    // A second default written around the repository hits the unique index.
    let mut second = email_profile("billing", true);
    stamp_new(&mut second, &tenant.org_id, &tenant.bu_id, now_unix());
    let err = insert_record(db.write(), &second).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut plain = email_profile("billing", false);
    stamp_new(&mut plain, &tenant.org_id, &tenant.bu_id, now_unix());
    insert_record(db.write(), &plain).await?;

    let other = TenantInfo::new(Pulid::new("org_"), tenant.bu_id.clone());
    repo.create(
        &other,
        EmailProfileInput {
            profile: email_profile("dispatch", true),
            credentials: Credentials::default(),
        },
    )
    .await?;

    let defaults = repo
        .list(&ListRequest::new(tenant.clone()).filter(FieldFilter::new(
            "isDefault",
            FilterOperator::Eq,
            true,
        )))
        .await?;
    assert_eq!(defaults.total, 1);
    Ok(())
}

#[tokio::test]
async fn worker_pto_is_reconciled_and_foreign_ids_rejected() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = WorkerRepository::new(db);
    let tenant = tenant();

    let created = repo
        .create(
            &tenant,
            WorkerDetails {
                worker: worker("Ana", &["H", "N"]),
                pto: vec![pto(1_000_000), pto(2_000_000)],
            },
        )
        .await?;
    repo.create(
        &tenant,
        WorkerDetails {
            worker: worker("Ben", &["T"]),
            pto: Vec::new(),
        },
    )
    .await?;

    let hazmat = repo
        .list(&ListRequest::new(tenant.clone()).filter(FieldFilter::new(
            "endorsements",
            FilterOperator::Overlaps,
            json!(["H", "X"]),
        )))
        .await?;
    assert_eq!(hazmat.total, 1);
    assert_eq!(hazmat.items[0].first_name, "Ana");

    let mut update = created.clone();
    update.pto.truncate(1);
    let updated = repo.update(&tenant, update).await?;
    assert_eq!(updated.pto.len(), 1);

    let loaded = repo.get_by_id(&created.worker.id, &tenant, true).await?;
    assert_eq!(loaded.pto, updated.pto);

    let mut foreign = updated.clone();
    let mut stray = pto(3_000_000);
    stray.id = Pulid::new("wpto_");
    foreign.pto.push(stray);
    let err = repo.update(&tenant, foreign).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.field(), Some("id"));

    // The rejected update rolled back entirely.
    let after = repo.get_by_id(&created.worker.id, &tenant, false).await?;
    assert_eq!(after.worker.version, updated.worker.version);
    Ok(())
}

#[tokio::test]
async fn comment_mentions_follow_the_comment() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = ShipmentCommentRepository::new(db);
    let tenant = tenant();
    let shipment_id = Pulid::new("shp_");

    let mention = |user: &Pulid| comment_mention::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        comment_id: Pulid::nil(),
        shipment_id: Pulid::nil(),
        mentioned_user_id: user.clone(),
        version: 0,
        created_at: 0,
        updated_at: 0,
    };
    let (u1, u2, u3) = (Pulid::new("usr_"), Pulid::new("usr_"), Pulid::new("usr_"));

    let created = repo
        .create(
            &tenant,
            CommentDetails {
                comment: shipment_comment::Model {
                    id: Pulid::nil(),
                    organization_id: Pulid::nil(),
                    business_unit_id: Pulid::nil(),
                    shipment_id: shipment_id.clone(),
                    user_id: u1.clone(),
                    comment: "@u2 @u3 please check the seal".to_string(),
                    is_high_priority: false,
                    version: 0,
                    created_at: 0,
                    updated_at: 0,
                },
                mentioned_users: vec![mention(&u2), mention(&u3)],
            },
        )
        .await?;
    assert!(
        created
            .mentioned_users
            .iter()
            .all(|m| m.shipment_id == shipment_id && m.comment_id == created.comment.id)
    );

    let mut update = created.clone();
    update.comment.comment = "@u2 please check the seal".to_string();
    update.mentioned_users.retain(|m| m.mentioned_user_id == u2);
    repo.update(&tenant, update).await?;

    let listed = repo.list_by_shipment(&shipment_id, &tenant).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].comment.version, 2);
    let users: Vec<_> = listed[0]
        .mentioned_users
        .iter()
        .map(|m| m.mentioned_user_id.clone())
        .collect();
    assert_eq!(users, [u2]);
    Ok(())
}

#[tokio::test]
async fn notifications_respect_targets_and_expiry() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = NotificationRepository::new(db);
    let tenant = tenant();
    let (me, someone_else) = (Pulid::new("usr_"), Pulid::new("usr_"));

    let mine = repo
        .create(&tenant, notification(Some(me.clone()), None))
        .await?;
    repo.create(&tenant, notification(None, Some(100))).await?;
    repo.create(&tenant, notification(Some(someone_else), Some(100)))
        .await?;

    let visible = repo
        .list(&ListRequest::new(tenant.clone()), Some(&me))
        .await?;
    assert_eq!(visible.total, 2);

    let read = repo.mark_read(&mine.id, &tenant, 1).await?;
    assert_eq!(read.status, NotificationStatus::Read);
    assert!(read.read_at.is_some());
    assert_eq!(read.version, 2);

    let err = repo.mark_dismissed(&mine.id, &tenant, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);

    let expired = repo.expire_stale(&tenant, 200).await?;
    assert_eq!(expired, 2);
    assert_eq!(repo.expire_stale(&tenant, 200).await?, 0);
    Ok(())
}

#[tokio::test]
async fn documents_attach_to_resources() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = DocumentRepository::new(db);
    let tenant = tenant();
    let resource_id = Pulid::new("shp_");

    let doc = |name: &str| document::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        resource_id: resource_id.clone(),
        resource_type: "shipment".to_string(),
        file_name: name.to_string(),
        file_type: "application/pdf".to_string(),
        file_size: 2048,
        status: document::DocumentStatus::Active,
        version: 0,
        created_at: 0,
        updated_at: 0,
    };

    let bol = repo.create(&tenant, doc("bol.pdf")).await?;
    repo.create(&tenant, doc("pod.pdf")).await?;
    assert_eq!(repo.find_by_resource_id(&resource_id, &tenant).await?.len(), 2);

    let mut orphan = doc("orphan.pdf");
    orphan.resource_id = Pulid::nil();
    let err = repo.create(&tenant, orphan).await.unwrap_err();
    assert_eq!(err.field(), Some("resourceId"));

    repo.delete(&bol.id, &tenant).await?;
    let err = repo.delete(&bol.id, &tenant).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(repo.find_by_resource_id(&resource_id, &tenant).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn dedicated_lane_matches_shipment_equipment_exactly() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = DedicatedLaneRepository::new(db);
    let tenant = tenant();
    let (customer_id, origin, destination) =
        (Pulid::new("cus_"), Pulid::new("loc_"), Pulid::new("loc_"));

    let lane = repo
        .create(
            &tenant,
            dedicated_lane::Model {
                id: Pulid::nil(),
                organization_id: Pulid::nil(),
                business_unit_id: Pulid::nil(),
                name: "Dayton to Columbus".to_string(),
                status: dedicated_lane::LaneStatus::Active,
                customer_id: customer_id.clone(),
                origin_location_id: origin.clone(),
                destination_location_id: destination.clone(),
                tractor_type_id: None,
                trailer_type_id: None,
                primary_worker_id: Some(Pulid::new("wrk_")),
                secondary_worker_id: None,
                auto_assign: true,
                version: 0,
                created_at: 0,
                updated_at: 0,
            },
        )
        .await?;

    let mut request = FindDedicatedLaneByShipmentRequest {
        tenant: tenant.clone(),
        customer_id,
        origin_location_id: origin,
        destination_location_id: destination,
        tractor_type_id: None,
        trailer_type_id: None,
    };
    assert_eq!(repo.find_by_shipment(&request).await?.id, lane.id);

    request.tractor_type_id = Some(Pulid::new("eqt_"));
    let err = repo.find_by_shipment(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn tractor_lookup_by_primary_worker() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = TractorRepository::new(db);
    let tenant = tenant();
    let worker_id = Pulid::new("wrk_");

    let created = repo
        .create(
            &tenant,
            tractor::Model {
                id: Pulid::nil(),
                organization_id: Pulid::nil(),
                business_unit_id: Pulid::nil(),
                status: tractor::EquipmentStatus::Available,
                code: "TRK-001".to_string(),
                equipment_type_id: Pulid::new("eqt_"),
                primary_worker_id: worker_id.clone(),
                secondary_worker_id: None,
                make: Some("Freightliner".to_string()),
                year: Some(2022),
                version: 0,
                created_at: 0,
                updated_at: 0,
            },
        )
        .await?;

    let found = repo.get_by_primary_worker_id(&worker_id, &tenant).await?;
    assert_eq!(found.id, created.id);

    let err = repo
        .get_by_primary_worker_id(&Pulid::new("wrk_"), &tenant)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.user_message().starts_with("No tractor is assigned"));
    Ok(())
}

#[tokio::test]
async fn email_queue_serves_pending_by_priority_and_tracks_delivery() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let repo = EmailQueueRepository::new(db);
    let tenant = tenant();

    let low = repo
        .create(&tenant, queued_email("Weekly digest", EmailPriority::Low, QueueStatus::Pending))
        .await?;
    let high = repo
        .create(&tenant, queued_email("Load tendered", EmailPriority::High, QueueStatus::Pending))
        .await?;
    let medium = repo
        .create(&tenant, queued_email("POD received", EmailPriority::Medium, QueueStatus::Pending))
        .await?;

    let now = now_unix();
    let mut due = queued_email("Invoice due", EmailPriority::Low, QueueStatus::Scheduled);
    due.scheduled_at = Some(now - 60);
    let due = repo.create(&tenant, due).await?;
    let mut later = queued_email("Invoice reminder", EmailPriority::High, QueueStatus::Scheduled);
    later.scheduled_at = Some(now + HOUR);
    repo.create(&tenant, later).await?;

    let sent = repo
        .create(&tenant, queued_email("Already out", EmailPriority::Low, QueueStatus::Sent))
        .await?;
    assert!(sent.sent_at.is_some());

    let pending = repo.get_pending(&tenant, 10).await?;
    assert_eq!(
        pending.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
        [high.id.clone(), medium.id.clone(), low.id.clone()]
    );
    assert_eq!(repo.get_pending(&tenant, 2).await?.len(), 2);
    assert!(repo.get_pending(&test_utils::tenant(), 10).await?.is_empty());

    let scheduled = repo.get_scheduled(&tenant, now, 10).await?;
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].id, due.id);

    repo.mark_as_sent(&high.id, &tenant, "msg-001").await?;
    let delivered = repo.get_by_id(&high.id, &tenant).await?;
    assert_eq!(delivered.status, QueueStatus::Sent);
    assert_eq!(delivered.message_id.as_deref(), Some("msg-001"));
    assert!(delivered.sent_at.is_some());
    assert_eq!(delivered.version, 2);

    repo.mark_as_failed(&medium.id, &tenant, "smtp timeout").await?;
    repo.increment_retry_count(&medium.id, &tenant).await?;
    repo.increment_retry_count(&medium.id, &tenant).await?;
    let failed = repo.get_by_id(&medium.id, &tenant).await?;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.retry_count, 2);
    assert_eq!(failed.version, 4);

    let found = repo
        .list(&ListRequest::new(tenant.clone()).search("timeout"))
        .await?;
    assert_eq!(found.total, 1);
    assert_eq!(found.items[0].id, medium.id);

    let err = repo
        .mark_as_sent(&low.id, &test_utils::tenant(), "msg-002")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(repo.get_by_id(&low.id, &tenant).await?.status, QueueStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn consolidation_groups_gather_and_cancel_shipments() -> anyhow::Result<()> {
    let db = setup_connections().await?;
    let sequences = sequence_generator(Arc::clone(&db));
    let shipments = ShipmentRepository::new(Arc::clone(&db), Arc::clone(&sequences));
    let repo = ConsolidationRepository::new(db, sequences);
    let tenant = tenant();

    let group = repo.create(&tenant, consolidation_group("")).await?;
    assert!(group.consolidation_number.starts_with('C'));
    assert!(group.id.as_str().starts_with("cg_"));

    assert!(
        repo.next_consolidation_numbers(&tenant.org_id, &tenant.bu_id, 0)
            .await?
            .is_empty()
    );
    let batch = repo
        .next_consolidation_numbers(&tenant.org_id, &tenant.bu_id, 3)
        .await?;
    assert_eq!(batch.len(), 3);
    assert!(!batch.contains(&group.consolidation_number));

    let s1 = shipments.create(&tenant, one_move_shipment("BOL-C1")).await?;
    let s2 = shipments.create(&tenant, one_move_shipment("BOL-C2")).await?;
    let (s1, s2) = (s1.shipment.id, s2.shipment.id);

    repo.add_shipment(&group.id, &s1, &tenant).await?;
    repo.add_shipment(&group.id, &s2, &tenant).await?;
    let err = repo.add_shipment(&group.id, &s1, &tenant).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.field(), Some("shipmentId"));

    let other = repo.create(&tenant, consolidation_group("")).await?;
    let err = repo.add_shipment(&other.id, &s2, &tenant).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let loaded = repo.get_by_id(&group.id, &tenant).await?;
    assert_eq!(loaded.shipments.len(), 2);
    let by_number = repo
        .get_by_consolidation_number(&group.consolidation_number, &tenant)
        .await?;
    assert_eq!(by_number.group.id, group.id);
    let err = repo
        .get_by_consolidation_number("C-MISSING", &tenant)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let members = repo.group_shipments(&group.id, &tenant).await?;
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m.moves.len() == 1 && m.moves[0].stops.len() == 2));

    repo.remove_shipment(&group.id, &s2, &tenant).await?;
    let err = repo.remove_shipment(&group.id, &s2, &tenant).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut patch = group.clone();
    patch.consolidation_number = String::new();
    patch.description = Some("Ohio pool".to_string());
    let updated = repo.update(&tenant, patch).await?;
    assert_eq!(updated.consolidation_number, group.consolidation_number);
    assert_eq!(updated.description.as_deref(), Some("Ohio pool"));
    assert_eq!(updated.version, 2);

    let listed = repo
        .list(
            &ListRequest::new(tenant.clone()).sort_by(SortField::asc("createdAt")),
            ConsolidationOptions {
                expand_details: true,
            },
        )
        .await?;
    assert_eq!(listed.total, 2);
    let listed_group = listed
        .items
        .iter()
        .find(|d| d.group.id == group.id)
        .unwrap();
    assert_eq!(listed_group.shipments.len(), 1);

    repo.cancel(&group.id, &tenant).await?;
    let canceled = repo.get_by_id(&group.id, &tenant).await?;
    assert_eq!(canceled.group.status, GroupStatus::Canceled);
    assert_eq!(canceled.group.version, 3);

    let member = shipments
        .get_by_id(&s1, &tenant, ShipmentOptions::full())
        .await?;
    assert_eq!(member.shipment.status, ShipmentStatus::Canceled);
    assert_eq!(member.moves[0].shipment_move.status, MoveStatus::Canceled);
    assert!(member.moves[0].stops.iter().all(|s| s.status == StopStatus::Canceled));

    let removed = shipments
        .get_by_id(&s2, &tenant, ShipmentOptions::default())
        .await?;
    assert_eq!(removed.shipment.status, ShipmentStatus::New);
    assert_eq!(removed.shipment.consolidation_group_id, None);

    let err = repo.cancel(&group.id, &tenant).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}
