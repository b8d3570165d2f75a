//! Column helpers shared by every tenant-scoped table.

use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub enum Envelope {
    Id,
    OrganizationId,
    BusinessUnitId,
    Version,
    CreatedAt,
    UpdatedAt,
}

/// `CREATE TABLE` with the id, tenant, version and timestamp columns.
pub fn tenant_table<T: IntoIden + 'static>(table: T) -> TableCreateStatement {
    Table::create()
        .table(table)
        .if_not_exists()
        .col(ColumnDef::new(Envelope::Id).string().not_null().primary_key())
        .col(ColumnDef::new(Envelope::OrganizationId).string().not_null())
        .col(ColumnDef::new(Envelope::BusinessUnitId).string().not_null())
        .col(
            ColumnDef::new(Envelope::Version)
                .big_integer()
                .not_null()
                .default(1),
        )
        .col(ColumnDef::new(Envelope::CreatedAt).big_integer().not_null())
        .col(ColumnDef::new(Envelope::UpdatedAt).big_integer().not_null())
        .to_owned()
}

/// Index on `(organization_id, business_unit_id, id)`.
pub fn tenant_index<T: IntoIden + 'static>(name: &str, table: T) -> IndexCreateStatement {
    Index::create()
        .name(name)
        .table(table)
        .col(Envelope::OrganizationId)
        .col(Envelope::BusinessUnitId)
        .col(Envelope::Id)
        .to_owned()
}
