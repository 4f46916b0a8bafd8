#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_parts_table::Migration),
            Box::new(m20240101_000002_create_bom_lines_table::Migration),
            Box::new(m20240101_000003_create_stock_tables::Migration),
            Box::new(m20240101_000004_create_build_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_parts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_parts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Parts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Parts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Parts::Name).string().not_null())
                        .col(ColumnDef::new(Parts::Description).string().null())
                        .col(
                            ColumnDef::new(Parts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Parts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Parts::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub(super) enum Parts {
        Table,
        Id,
        Name,
        Description,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_bom_lines_table {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_parts_table::Parts;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_bom_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BomLines::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BomLines::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(BomLines::PartId).uuid().not_null())
                        .col(ColumnDef::new(BomLines::SubPartId).uuid().not_null())
                        .col(
                            ColumnDef::new(BomLines::QuantityPerUnit)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomLines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_lines_part")
                                .from(BomLines::Table, BomLines::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_lines_sub_part")
                                .from(BomLines::Table, BomLines::SubPartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One BOM line per (parent part, sub-part) pair
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_lines_part_sub_part")
                        .table(BomLines::Table)
                        .col(BomLines::PartId)
                        .col(BomLines::SubPartId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomLines::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum BomLines {
        Table,
        Id,
        PartId,
        SubPartId,
        QuantityPerUnit,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_stock_tables {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_parts_table::Parts;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockItems::PartId).uuid().not_null())
                        .col(ColumnDef::new(StockItems::Location).string().not_null())
                        .col(
                            ColumnDef::new(StockItems::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockItems::Batch).string().null())
                        .col(ColumnDef::new(StockItems::Notes).string().null())
                        .col(
                            ColumnDef::new(StockItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_items_part")
                                .from(StockItems::Table, StockItems::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_items_part_id")
                        .table(StockItems::Table)
                        .col(StockItems::PartId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::StockItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::QuantityDelta)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).string().not_null())
                        .col(ColumnDef::new(StockMovements::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movements_stock_item")
                                .from(StockMovements::Table, StockMovements::StockItemId)
                                .to(StockItems::Table, StockItems::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_stock_item_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::StockItemId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub(super) enum StockItems {
        Table,
        Id,
        PartId,
        Location,
        Quantity,
        Batch,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum StockMovements {
        Table,
        Id,
        StockItemId,
        QuantityDelta,
        Reason,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000004_create_build_tables {

    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_parts_table::Parts;
    use super::m20240101_000003_create_stock_tables::StockItems;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_build_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BuildOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BuildOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BuildOrders::PartId).uuid().not_null())
                        .col(ColumnDef::new(BuildOrders::Title).string().not_null())
                        .col(ColumnDef::new(BuildOrders::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(BuildOrders::Status)
                                .integer()
                                .not_null()
                                .default(10),
                        )
                        .col(ColumnDef::new(BuildOrders::Batch).string().null())
                        .col(ColumnDef::new(BuildOrders::Link).string().null())
                        .col(ColumnDef::new(BuildOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(BuildOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BuildOrders::CompletionDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(BuildOrders::CompletedBy).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_build_orders_part")
                                .from(BuildOrders::Table, BuildOrders::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_build_orders_status")
                        .table(BuildOrders::Table)
                        .col(BuildOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BuildItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BuildItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BuildItems::BuildId).uuid().not_null())
                        .col(ColumnDef::new(BuildItems::StockItemId).uuid().not_null())
                        .col(ColumnDef::new(BuildItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(BuildItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_build_items_build")
                                .from(BuildItems::Table, BuildItems::BuildId)
                                .to(BuildOrders::Table, BuildOrders::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_build_items_stock_item")
                                .from(BuildItems::Table, BuildItems::StockItemId)
                                .to(StockItems::Table, StockItems::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // At most one allocation per (build, stock item) pair
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_build_items_build_stock_item")
                        .table(BuildItems::Table)
                        .col(BuildItems::BuildId)
                        .col(BuildItems::StockItemId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BuildItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BuildOrders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum BuildOrders {
        Table,
        Id,
        PartId,
        Title,
        Quantity,
        Status,
        Batch,
        Link,
        Notes,
        CreatedAt,
        CompletionDate,
        CompletedBy,
    }

    #[derive(Iden)]
    enum BuildItems {
        Table,
        Id,
        BuildId,
        StockItemId,
        Quantity,
        CreatedAt,
    }
}
