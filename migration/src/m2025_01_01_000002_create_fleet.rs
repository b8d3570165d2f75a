//! Migration to create customers, workers, worker PTO and tractors.

use sea_orm_migration::prelude::*;

use crate::common::{Envelope, tenant_index, tenant_table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                tenant_table(Customers::Table)
                    .col(ColumnDef::new(Customers::Status).text().not_null())
                    .col(ColumnDef::new(Customers::Code).text().not_null())
                    .col(ColumnDef::new(Customers::Name).text().not_null())
                    .col(ColumnDef::new(Customers::AddressLine).text().null())
                    .col(ColumnDef::new(Customers::City).text().null())
                    .col(ColumnDef::new(Customers::PostalCode).text().null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(tenant_index("idx_customers_tenant", Customers::Table))
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uq_customers_tenant_code")
                    .table(Customers::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(Customers::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(Workers::Table)
                    .col(ColumnDef::new(Workers::Status).text().not_null())
                    .col(ColumnDef::new(Workers::FirstName).text().not_null())
                    .col(ColumnDef::new(Workers::LastName).text().not_null())
                    .col(ColumnDef::new(Workers::WorkerType).text().not_null())
                    .col(ColumnDef::new(Workers::Endorsements).json_binary().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(tenant_index("idx_workers_tenant", Workers::Table))
            .await?;

        manager
            .create_table(
                tenant_table(WorkerPto::Table)
                    .col(ColumnDef::new(WorkerPto::WorkerId).string().not_null())
                    .col(ColumnDef::new(WorkerPto::Status).text().not_null())
                    .col(ColumnDef::new(WorkerPto::Type).text().not_null())
                    .col(ColumnDef::new(WorkerPto::StartDate).big_integer().not_null())
                    .col(ColumnDef::new(WorkerPto::EndDate).big_integer().not_null())
                    .col(ColumnDef::new(WorkerPto::Reason).text().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_worker_pto_worker_id")
                            .from(WorkerPto::Table, WorkerPto::WorkerId)
                            .to(Workers::Table, Envelope::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_worker_pto_worker")
                    .table(WorkerPto::Table)
                    .col(WorkerPto::WorkerId)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(Tractors::Table)
                    .col(ColumnDef::new(Tractors::Status).text().not_null())
                    .col(ColumnDef::new(Tractors::Code).text().not_null())
                    .col(ColumnDef::new(Tractors::EquipmentTypeId).string().not_null())
                    .col(ColumnDef::new(Tractors::PrimaryWorkerId).string().not_null())
                    .col(ColumnDef::new(Tractors::SecondaryWorkerId).string().null())
                    .col(ColumnDef::new(Tractors::Make).text().null())
                    .col(ColumnDef::new(Tractors::Year).integer().null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(tenant_index("idx_tractors_tenant", Tractors::Table))
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uq_tractors_tenant_code")
                    .table(Tractors::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(Tractors::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_tractors_primary_worker")
                    .table(Tractors::Table)
                    .col(Tractors::PrimaryWorkerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tractors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkerPto::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Workers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Status,
    Code,
    Name,
    AddressLine,
    City,
    PostalCode,
}

#[derive(DeriveIden)]
enum Workers {
    Table,
    Status,
    FirstName,
    LastName,
    WorkerType,
    Endorsements,
}

#[derive(DeriveIden)]
enum WorkerPto {
    Table,
    WorkerId,
    Status,
    Type,
    StartDate,
    EndDate,
    Reason,
}

#[derive(DeriveIden)]
enum Tractors {
    Table,
    Status,
    Code,
    EquipmentTypeId,
    PrimaryWorkerId,
    SecondaryWorkerId,
    Make,
    Year,
}
