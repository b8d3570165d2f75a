//! Test utilities for database testing.
//!
//! Sets up in-memory SQLite databases with every migration applied and
//! builds fixture rows for the repositories under test.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::json;
use tms_persistence::config::SequenceConfig;
use tms_persistence::crypto::{AesGcmEncryption, CryptoKey};
use tms_persistence::db::DbConnections;
use tms_persistence::models::{
    additional_charge, consolidation_group, customer, email_profile, email_queue, notification,
    shipment, shipment_move, stop, worker, worker_pto,
};
use tms_persistence::pulid::Pulid;
use tms_persistence::query::TenantInfo;
use tms_persistence::sequence::SequenceGenerator;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // Fixtures reference customers, locations and users that are not seeded.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Connection selector over a fresh test database without replicas.
pub async fn setup_connections() -> Result<Arc<DbConnections>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(DbConnections::from_parts(db, Vec::new())))
}

/// Sequence generator with short backoffs for tests.
pub fn sequence_generator(db: Arc<DbConnections>) -> Arc<SequenceGenerator> {
    let config = SequenceConfig {
        max_attempts: 20,
        base_backoff_ms: 1,
        max_backoff_ms: 20,
        ..SequenceConfig::default()
    };
    Arc::new(SequenceGenerator::with_default_formats(db, config))
}

pub fn encryption() -> Arc<AesGcmEncryption> {
    let key = CryptoKey::new(vec![42u8; 32]).expect("32 byte key");
    Arc::new(AesGcmEncryption::new(key))
}

pub fn tenant() -> TenantInfo {
    TenantInfo::new(Pulid::new("org_"), Pulid::new("bu_"))
}

pub fn customer(code: &str, name: &str) -> customer::Model {
    customer::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        status: customer::CustomerStatus::Active,
        code: code.to_string(),
        name: name.to_string(),
        address_line: None,
        city: Some("Dayton".to_string()),
        postal_code: None,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn shipment(bol: &str) -> shipment::Model {
    shipment::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        status: shipment::ShipmentStatus::New,
        pro_number: String::new(),
        bol: bol.to_string(),
        customer_id: Pulid::new("cus_"),
        tractor_type_id: None,
        trailer_type_id: None,
        pieces: Some(100),
        weight: Some(2000),
        freight_charge_cents: 150_000,
        total_charge_cents: 150_000,
        consolidation_group_id: None,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn shipment_move(sequence: i32) -> shipment_move::Model {
    shipment_move::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        shipment_id: Pulid::nil(),
        status: shipment_move::MoveStatus::New,
        sequence,
        loaded: true,
        distance: Some(412.5),
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn stop(stop_type: stop::StopType, location_id: &Pulid, pieces: i64, at: i64) -> stop::Model {
    stop::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        shipment_move_id: Pulid::nil(),
        location_id: location_id.clone(),
        stop_type,
        status: stop::StopStatus::New,
        sequence: 0,
        pieces: Some(pieces),
        weight: Some(pieces * 20),
        planned_arrival: at,
        planned_departure: at + 3600,
        actual_arrival: None,
        actual_departure: None,
        address_line: Some("1 Dock Rd".to_string()),
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn charge(amount_cents: i64) -> additional_charge::Model {
    additional_charge::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        shipment_id: Pulid::nil(),
        accessorial_charge_id: Pulid::new("acc_"),
        method: additional_charge::ChargeMethod::Flat,
        unit: 1,
        amount_cents,
        is_system_generated: false,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn worker(first_name: &str, endorsements: &[&str]) -> worker::Model {
    worker::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        status: worker::WorkerStatus::Active,
        first_name: first_name.to_string(),
        last_name: "Driver".to_string(),
        worker_type: "Employee".to_string(),
        endorsements: json!(endorsements),
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn pto(start_date: i64) -> worker_pto::Model {
    worker_pto::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        worker_id: Pulid::nil(),
        status: worker_pto::PtoStatus::Requested,
        pto_type: "Vacation".to_string(),
        start_date,
        end_date: start_date + 86_400,
        reason: None,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn email_profile(name: &str, is_default: bool) -> email_profile::Model {
    email_profile::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        name: name.to_string(),
        status: email_profile::EmailProfileStatus::Active,
        provider_type: email_profile::ProviderType::Smtp,
        auth_type: email_profile::AuthType::Plain,
        host: Some("smtp.example.com".to_string()),
        port: Some(587),
        username: Some("dispatch".to_string()),
        encrypted_password: None,
        encrypted_api_key: None,
        oauth2_client_id: None,
        encrypted_oauth2_client_secret: None,
        from_address: format!("{name}@example.com"),
        from_name: None,
        is_default,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn notification(target_user_id: Option<Pulid>, expires_at: Option<i64>) -> notification::Model {
    notification::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        target_user_id,
        event_type: "shipment.delayed".to_string(),
        priority: notification::NotificationPriority::High,
        title: "Shipment delayed".to_string(),
        message: "Pickup window missed".to_string(),
        status: notification::NotificationStatus::Pending,
        read_at: None,
        expires_at,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn queued_email(
    subject: &str,
    priority: email_queue::EmailPriority,
    status: email_queue::QueueStatus,
) -> email_queue::Model {
    email_queue::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        profile_id: Pulid::new("ep_"),
        template_id: None,
        to_addresses: "dispatch@example.com".to_string(),
        cc_addresses: None,
        subject: subject.to_string(),
        html_body: None,
        text_body: Some("Rate confirmation attached".to_string()),
        priority,
        status,
        scheduled_at: None,
        sent_at: None,
        message_id: None,
        error_message: None,
        retry_count: 0,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}

pub fn consolidation_group(number: &str) -> consolidation_group::Model {
    consolidation_group::Model {
        id: Pulid::nil(),
        organization_id: Pulid::nil(),
        business_unit_id: Pulid::nil(),
        consolidation_number: number.to_string(),
        status: consolidation_group::GroupStatus::New,
        description: None,
        version: 0,
        created_at: 0,
        updated_at: 0,
    }
}
