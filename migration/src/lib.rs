//! Schema migrations for the TMS persistence kernel.
//!
//! Used to provision databases for tests and local development. The kernel
//! itself never alters the schema at run time.

pub use sea_orm_migration::prelude::*;

mod common;
mod m2025_01_01_000001_create_sequences;
mod m2025_01_01_000002_create_fleet;
mod m2025_01_01_000003_create_shipments;
mod m2025_01_01_000004_create_profiles_and_lanes;
mod m2025_01_01_000005_add_shipment_search_vector;
mod m2025_01_01_000006_unique_default_email_profile;
mod m2025_01_01_000007_create_email_queues_and_consolidations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_01_000001_create_sequences::Migration),
            Box::new(m2025_01_01_000002_create_fleet::Migration),
            Box::new(m2025_01_01_000003_create_shipments::Migration),
            Box::new(m2025_01_01_000004_create_profiles_and_lanes::Migration),
            Box::new(m2025_01_01_000005_add_shipment_search_vector::Migration),
            Box::new(m2025_01_01_000006_unique_default_email_profile::Migration),
            Box::new(m2025_01_01_000007_create_email_queues_and_consolidations::Migration),
        ]
    }
}
