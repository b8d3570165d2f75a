//! Migration to create shipments and the tables they own.

use sea_orm_migration::prelude::*;

use crate::common::{Envelope, tenant_index, tenant_table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                tenant_table(Shipments::Table)
                    .col(ColumnDef::new(Shipments::Status).text().not_null())
                    .col(ColumnDef::new(Shipments::ProNumber).text().not_null())
                    .col(ColumnDef::new(Shipments::Bol).text().not_null())
                    .col(ColumnDef::new(Shipments::CustomerId).string().not_null())
                    .col(ColumnDef::new(Shipments::TractorTypeId).string().null())
                    .col(ColumnDef::new(Shipments::TrailerTypeId).string().null())
                    .col(ColumnDef::new(Shipments::Pieces).big_integer().null())
                    .col(ColumnDef::new(Shipments::Weight).big_integer().null())
                    .col(
                        ColumnDef::new(Shipments::FreightChargeCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Shipments::TotalChargeCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(tenant_index("idx_shipments_tenant", Shipments::Table))
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_shipments_status")
                    .table(Shipments::Table)
                    .col(Envelope::OrganizationId)
                    .col(Envelope::BusinessUnitId)
                    .col(Shipments::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(ShipmentMoves::Table)
                    .col(ColumnDef::new(ShipmentMoves::ShipmentId).string().not_null())
                    .col(ColumnDef::new(ShipmentMoves::Status).text().not_null())
                    .col(ColumnDef::new(ShipmentMoves::Sequence).integer().not_null())
                    .col(
                        ColumnDef::new(ShipmentMoves::Loaded)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(ShipmentMoves::Distance).double().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shipment_moves_shipment_id")
                            .from(ShipmentMoves::Table, ShipmentMoves::ShipmentId)
                            .to(Shipments::Table, Envelope::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_shipment_moves_shipment")
                    .table(ShipmentMoves::Table)
                    .col(ShipmentMoves::ShipmentId)
                    .col(ShipmentMoves::Sequence)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(Stops::Table)
                    .col(ColumnDef::new(Stops::ShipmentMoveId).string().not_null())
                    .col(ColumnDef::new(Stops::LocationId).string().not_null())
                    .col(ColumnDef::new(Stops::Type).text().not_null())
                    .col(ColumnDef::new(Stops::Status).text().not_null())
                    .col(ColumnDef::new(Stops::Sequence).integer().not_null())
                    .col(ColumnDef::new(Stops::Pieces).big_integer().null())
                    .col(ColumnDef::new(Stops::Weight).big_integer().null())
                    .col(ColumnDef::new(Stops::PlannedArrival).big_integer().not_null())
                    .col(ColumnDef::new(Stops::PlannedDeparture).big_integer().not_null())
                    .col(ColumnDef::new(Stops::ActualArrival).big_integer().null())
                    .col(ColumnDef::new(Stops::ActualDeparture).big_integer().null())
                    .col(ColumnDef::new(Stops::AddressLine).text().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stops_shipment_move_id")
                            .from(Stops::Table, Stops::ShipmentMoveId)
                            .to(ShipmentMoves::Table, Envelope::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_stops_move")
                    .table(Stops::Table)
                    .col(Stops::ShipmentMoveId)
                    .col(Stops::Sequence)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(AdditionalCharges::Table)
                    .col(ColumnDef::new(AdditionalCharges::ShipmentId).string().not_null())
                    .col(
                        ColumnDef::new(AdditionalCharges::AccessorialChargeId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AdditionalCharges::Method).text().not_null())
                    .col(ColumnDef::new(AdditionalCharges::Unit).big_integer().not_null())
                    .col(
                        ColumnDef::new(AdditionalCharges::AmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AdditionalCharges::IsSystemGenerated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_additional_charges_shipment_id")
                            .from(AdditionalCharges::Table, AdditionalCharges::ShipmentId)
                            .to(Shipments::Table, Envelope::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_additional_charges_shipment")
                    .table(AdditionalCharges::Table)
                    .col(AdditionalCharges::ShipmentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(ShipmentCommodities::Table)
                    .col(
                        ColumnDef::new(ShipmentCommodities::ShipmentId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShipmentCommodities::CommodityId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShipmentCommodities::Pieces)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShipmentCommodities::Weight)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shipment_commodities_shipment_id")
                            .from(ShipmentCommodities::Table, ShipmentCommodities::ShipmentId)
                            .to(Shipments::Table, Envelope::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_shipment_commodities_shipment")
                    .table(ShipmentCommodities::Table)
                    .col(ShipmentCommodities::ShipmentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(ShipmentComments::Table)
                    .col(ColumnDef::new(ShipmentComments::ShipmentId).string().not_null())
                    .col(ColumnDef::new(ShipmentComments::UserId).string().not_null())
                    .col(ColumnDef::new(ShipmentComments::Comment).text().not_null())
                    .col(
                        ColumnDef::new(ShipmentComments::IsHighPriority)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shipment_comments_shipment_id")
                            .from(ShipmentComments::Table, ShipmentComments::ShipmentId)
                            .to(Shipments::Table, Envelope::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                tenant_table(ShipmentCommentMentions::Table)
                    .col(
                        ColumnDef::new(ShipmentCommentMentions::CommentId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShipmentCommentMentions::ShipmentId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShipmentCommentMentions::MentionedUserId)
                            .string()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shipment_comment_mentions_comment_id")
                            .from(
                                ShipmentCommentMentions::Table,
                                ShipmentCommentMentions::CommentId,
                            )
                            .to(ShipmentComments::Table, Envelope::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ShipmentCommentMentions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShipmentComments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShipmentCommodities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AdditionalCharges::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Stops::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShipmentMoves::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Shipments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Shipments {
    Table,
    Status,
    ProNumber,
    Bol,
    CustomerId,
    TractorTypeId,
    TrailerTypeId,
    Pieces,
    Weight,
    FreightChargeCents,
    TotalChargeCents,
}

#[derive(DeriveIden)]
enum ShipmentMoves {
    Table,
    ShipmentId,
    Status,
    Sequence,
    Loaded,
    Distance,
}

#[derive(DeriveIden)]
enum Stops {
    Table,
    ShipmentMoveId,
    LocationId,
    Type,
    Status,
    Sequence,
    Pieces,
    Weight,
    PlannedArrival,
    PlannedDeparture,
    ActualArrival,
    ActualDeparture,
    AddressLine,
}

#[derive(DeriveIden)]
enum AdditionalCharges {
    Table,
    ShipmentId,
    AccessorialChargeId,
    Method,
    Unit,
    AmountCents,
    IsSystemGenerated,
}

#[derive(DeriveIden)]
enum ShipmentCommodities {
    Table,
    ShipmentId,
    CommodityId,
    Pieces,
    Weight,
}

#[derive(DeriveIden)]
enum ShipmentComments {
    Table,
    ShipmentId,
    UserId,
    Comment,
    IsHighPriority,
}

#[derive(DeriveIden)]
enum ShipmentCommentMentions {
    Table,
    CommentId,
    ShipmentId,
    MentionedUserId,
}
