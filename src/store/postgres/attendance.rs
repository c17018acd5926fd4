use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::*;

use super::PostgresGateway;
use crate::error::AppError;
use crate::models::attendance::{self, AttendanceKind};
use crate::store::AttendanceStore;

#[async_trait]
impl AttendanceStore for PostgresGateway {
    /// INSERT ... ON CONFLICT (employee_id, type, work_date) DO NOTHING
    async fn append_unique(
        &self,
        employee_id: i32,
        kind: AttendanceKind,
        timestamp: DateTime<Utc>,
        work_date: NaiveDate,
    ) -> Result<Option<attendance::Model>, AppError> {
        let record = attendance::ActiveModel {
            employee_id: Set(employee_id),
            kind: Set(kind),
            timestamp: Set(timestamp),
            work_date: Set(work_date),
            ..Default::default()
        };

        let inserted = attendance::Entity::insert(record)
            .on_conflict(
                OnConflict::columns([
                    attendance::Column::EmployeeId,
                    attendance::Column::Kind,
                    attendance::Column::WorkDate,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await;

        match inserted {
            Ok(record) => Ok(Some(record)),
            Err(DbErr::RecordNotInserted) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn day_records(
        &self,
        employee_id: i32,
        day: NaiveDate,
    ) -> Result<Vec<attendance::Model>, AppError> {
        Ok(attendance::Entity::find()
            .filter(attendance::Column::EmployeeId.eq(employee_id))
            .filter(attendance::Column::WorkDate.eq(day))
            .order_by_asc(attendance::Column::Timestamp)
            .all(&self.db)
            .await?)
    }

    async fn records_on(&self, day: NaiveDate) -> Result<Vec<attendance::Model>, AppError> {
        Ok(attendance::Entity::find()
            .filter(attendance::Column::WorkDate.eq(day))
            .order_by_asc(attendance::Column::EmployeeId)
            .order_by_asc(attendance::Column::Timestamp)
            .all(&self.db)
            .await?)
    }

    async fn records_for(&self, employee_id: i32) -> Result<Vec<attendance::Model>, AppError> {
        Ok(attendance::Entity::find()
            .filter(attendance::Column::EmployeeId.eq(employee_id))
            .order_by_desc(attendance::Column::Timestamp)
            .all(&self.db)
            .await?)
    }
}
