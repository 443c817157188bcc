use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScrapeJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapeJobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapeJobs::Kind).string().not_null())
                    .col(ColumnDef::new(ScrapeJobs::Payload).text().not_null())
                    .col(ColumnDef::new(ScrapeJobs::Fingerprint).string().not_null())
                    .col(ColumnDef::new(ScrapeJobs::Priority).integer().not_null())
                    .col(
                        ColumnDef::new(ScrapeJobs::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ScrapeJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScrapeJobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(ScrapeJobs::LastError).text().null())
                    .col(ColumnDef::new(ScrapeJobs::RunAfter).string().not_null())
                    .col(ColumnDef::new(ScrapeJobs::CreatedAt).string().not_null())
                    .col(ColumnDef::new(ScrapeJobs::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_jobs_dequeue")
                    .table(ScrapeJobs::Table)
                    .col(ScrapeJobs::Status)
                    .col(ScrapeJobs::Priority)
                    .col(ScrapeJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_jobs_fingerprint")
                    .table(ScrapeJobs::Table)
                    .col(ScrapeJobs::Fingerprint)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapeJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapeJobs {
    Table,
    Id,
    Kind,
    Payload,
    Fingerprint,
    Priority,
    Status,
    Attempts,
    MaxAttempts,
    LastError,
    RunAfter,
    CreatedAt,
    UpdatedAt,
}
