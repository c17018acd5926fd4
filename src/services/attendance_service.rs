// ============================================================================
// ATTENDANCE : one entry and one exit per employee per calendar day
// ============================================================================
//
// Calendar day = date of the instant in the configured fixed offset
// (ATTENDANCE_UTC_OFFSET_MINUTES). The day is computed once, when the record
// is written, and stored as `work_date`.
//
// A duplicate entry/exit is an expected outcome, not an error: the register
// calls answer `false` and write nothing.
//
// ============================================================================

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::attendance::{self, AttendanceKind};
use crate::models::users;
use crate::store::AttendanceStore;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PresenceStatus {
    #[serde(rename = "Ausente")]
    Absent,
    #[serde(rename = "En trabajo")]
    AtWork,
    #[serde(rename = "Completado")]
    Completed,
}

/// One line of the attendance page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySheetRow {
    pub employee_id: i32,
    pub name: String,
    pub entry: Option<DateTime<Utc>>,
    pub exit: Option<DateTime<Utc>>,
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub day: NaiveDate,
    pub present: usize,
    pub completed: usize,
}

pub struct AttendanceTracker {
    store: Arc<dyn AttendanceStore>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl AttendanceTracker {
    pub fn new(store: Arc<dyn AttendanceStore>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self {
            store,
            clock,
            offset,
        }
    }

    /// Calendar day of `instant` in the attendance timezone
    pub fn work_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.work_date(self.clock.now())
    }

    #[tracing::instrument(skip(self))]
    pub async fn register_entry(&self, employee_id: i32) -> Result<bool, AppError> {
        let now = self.clock.now();
        let recorded = self
            .store
            .append_unique(employee_id, AttendanceKind::Entry, now, self.work_date(now))
            .await?
            .is_some();
        if recorded {
            tracing::info!("entry registered");
        } else {
            tracing::debug!("entry already registered today");
        }
        Ok(recorded)
    }

    #[tracing::instrument(skip(self))]
    pub async fn register_exit(&self, employee_id: i32) -> Result<bool, AppError> {
        let now = self.clock.now();
        let day = self.work_date(now);
        let records = self.store.day_records(employee_id, day).await?;
        let has = |kind| records.iter().any(|record| record.kind == kind);
        if !has(AttendanceKind::Entry) || has(AttendanceKind::Exit) {
            tracing::debug!("exit refused: no entry today, or exit already registered");
            return Ok(false);
        }

        let recorded = self
            .store
            .append_unique(employee_id, AttendanceKind::Exit, now, day)
            .await?
            .is_some();
        if recorded {
            tracing::info!("exit registered");
        }
        Ok(recorded)
    }

    pub async fn today_records(&self, employee_id: i32) -> Result<Vec<attendance::Model>, AppError> {
        self.store.day_records(employee_id, self.today()).await
    }

    pub async fn records_on(&self, day: NaiveDate) -> Result<Vec<attendance::Model>, AppError> {
        self.store.records_on(day).await
    }

    /// Every record of one employee, newest first
    pub async fn records_for(&self, employee_id: i32) -> Result<Vec<attendance::Model>, AppError> {
        let mut records = self.store.records_for(employee_id).await?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Entry, exit and status of each employee on `day`
    pub async fn day_sheet(
        &self,
        day: NaiveDate,
        employees: &[users::Model],
    ) -> Result<Vec<DaySheetRow>, AppError> {
        let mut by_employee: HashMap<i32, (Option<DateTime<Utc>>, Option<DateTime<Utc>>)> =
            HashMap::new();
        for record in self.store.records_on(day).await? {
            let slot = by_employee.entry(record.employee_id).or_default();
            match record.kind {
                AttendanceKind::Entry => slot.0 = Some(record.timestamp),
                AttendanceKind::Exit => slot.1 = Some(record.timestamp),
            }
        }

        Ok(employees
            .iter()
            .map(|employee| {
                let (entry, exit) = by_employee.get(&employee.id).copied().unwrap_or_default();
                let status = match (entry, exit) {
                    (Some(_), Some(_)) => PresenceStatus::Completed,
                    (Some(_), None) => PresenceStatus::AtWork,
                    _ => PresenceStatus::Absent,
                };
                DaySheetRow {
                    employee_id: employee.id,
                    name: employee.name.clone(),
                    entry,
                    exit,
                    status,
                }
            })
            .collect())
    }

    /// Distinct employees who came in on `day`, and how many already left
    pub async fn stats(&self, day: NaiveDate) -> Result<AttendanceStats, AppError> {
        let records = self.store.records_on(day).await?;
        let employees_with = |kind| {
            records
                .iter()
                .filter(|record| record.kind == kind)
                .map(|record| record.employee_id)
                .collect::<BTreeSet<_>>()
                .len()
        };
        Ok(AttendanceStats {
            day,
            present: employees_with(AttendanceKind::Entry),
            completed: employees_with(AttendanceKind::Exit),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedClock;
    use super::*;
    use crate::store::memory::MemoryGateway;
    use crate::utils::jwt::TokenIssuer;

    fn tracker(clock: Arc<FixedClock>, offset_hours: i32) -> AttendanceTracker {
        let gateway = MemoryGateway::new(Arc::new(TokenIssuer::new("test-secret", 1)));
        AttendanceTracker::new(
            Arc::new(gateway),
            clock,
            FixedOffset::east_opt(offset_hours * 3600).unwrap(),
        )
    }

    fn employee(id: i32, name: &str) -> users::Model {
        users::Model {
            id,
            username: name.to_lowercase(),
            email: format!("{}@obra.com", name.to_lowercase()),
            name: name.into(),
            role: "Trabajador".into(),
            auth_id: uuid::Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_entry_on_the_same_day_is_refused() -> anyhow::Result<()> {
        let clock = FixedClock::at("2026-03-10T07:58:00Z");
        let tracker = tracker(clock.clone(), 0);

        assert!(tracker.register_entry(4).await?);
        clock.set("2026-03-10T13:00:00Z");
        assert!(!tracker.register_entry(4).await?);

        let entries: Vec<_> = tracker
            .today_records(4)
            .await?
            .into_iter()
            .filter(|r| r.kind == AttendanceKind::Entry)
            .collect();
        assert_eq!(entries.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn exit_needs_an_entry_first() -> anyhow::Result<()> {
        let clock = FixedClock::at("2026-03-10T08:00:00Z");
        let tracker = tracker(clock.clone(), 0);

        assert!(!tracker.register_exit(4).await?);
        assert!(tracker.records_for(4).await?.is_empty());

        assert!(tracker.register_entry(4).await?);
        clock.set("2026-03-10T17:00:00Z");
        assert!(tracker.register_exit(4).await?);
        assert!(!tracker.register_exit(4).await?);
        assert_eq!(tracker.records_for(4).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn a_new_day_allows_a_new_entry() -> anyhow::Result<()> {
        let clock = FixedClock::at("2026-03-10T08:00:00Z");
        let tracker = tracker(clock.clone(), 0);
        assert!(tracker.register_entry(4).await?);
        clock.set("2026-03-11T08:00:00Z");
        assert!(tracker.register_entry(4).await?);
        Ok(())
    }

    #[tokio::test]
    async fn day_boundary_follows_the_configured_offset() -> anyhow::Result<()> {
        // 23:30 in UTC-5 is already the next day in UTC
        let clock = FixedClock::at("2026-03-10T23:30:00-05:00");
        let tracker = tracker(clock.clone(), -5);
        assert_eq!(tracker.today(), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert!(tracker.register_entry(4).await?);

        // 00:30 local on the 11th
        clock.set("2026-03-11T00:30:00-05:00");
        assert!(!tracker.register_exit(4).await?);
        assert!(tracker.register_entry(4).await?);
        Ok(())
    }

    #[tokio::test]
    async fn day_sheet_and_stats() -> anyhow::Result<()> {
        let clock = FixedClock::at("2026-03-10T08:00:00Z");
        let tracker = tracker(clock.clone(), 0);
        let staff = [employee(1, "Ana"), employee(2, "Luis"), employee(3, "Marta")];

        tracker.register_entry(1).await?;
        tracker.register_entry(2).await?;
        clock.set("2026-03-10T16:00:00Z");
        tracker.register_exit(2).await?;

        let day = tracker.today();
        let sheet = tracker.day_sheet(day, &staff).await?;
        let statuses: Vec<_> = sheet.iter().map(|row| row.status).collect();
        assert_eq!(
            statuses,
            vec![PresenceStatus::AtWork, PresenceStatus::Completed, PresenceStatus::Absent]
        );

        let stats = tracker.stats(day).await?;
        assert_eq!(stats.present, 2);
        assert_eq!(stats.completed, 1);
        Ok(())
    }
}
