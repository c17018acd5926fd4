// Request bodies (drafts and patches) and their validation rules
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use super::inventory_movement::MovementKind;
use super::role::Role;
use super::task::{TaskPriority, TaskStatus};

// ---------------------------------------------------------------------------
// validation helpers
// ---------------------------------------------------------------------------

pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Largest value a NUMERIC(14, 2) money column holds
pub const MAX_MONEY: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);
/// Largest value a NUMERIC(14, 3) quantity column holds
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 3);

const MONEY_SCALE: u32 = 2;
const QUANTITY_SCALE: u32 = 3;

fn fits_column(value: &Decimal, scale: u32, max: Decimal) -> Result<(), ValidationError> {
    if value.normalize().scale() > scale {
        return Err(ValidationError::new("too_many_decimals"));
    }
    if value.abs() > max {
        return Err(ValidationError::new("too_large"));
    }
    Ok(())
}

/// Money strictly above zero, cents at most
pub fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("not_positive"));
    }
    fits_column(value, MONEY_SCALE, MAX_MONEY)
}

/// Money at or above zero, cents at most
pub fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative"));
    }
    fits_column(value, MONEY_SCALE, MAX_MONEY)
}

pub fn positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("not_positive"));
    }
    fits_column(value, QUANTITY_SCALE, MAX_QUANTITY)
}

pub fn non_negative_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative"));
    }
    fits_column(value, QUANTITY_SCALE, MAX_QUANTITY)
}

fn blank_if_set(value: &Option<String>) -> Result<(), ValidationError> {
    match value {
        Some(v) => not_blank(v),
        None => Ok(()),
    }
}

fn checked_if_set(
    value: &Option<Decimal>,
    check: fn(&Decimal) -> Result<(), ValidationError>,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => check(v),
        None => Ok(()),
    }
}

/// `missing` -> None, `null` -> Some(None), value -> Some(Some(value))
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn dates_in_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ValidationError::new("end_before_start"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// budgets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBudget {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(custom(function = "non_negative"))]
    pub allocation: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RenameBudget {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetAllocation {
    #[validate(custom(function = "non_negative"))]
    pub allocation: Decimal,
}

/// Body of an expense or income creation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewLedgerEntry {
    #[validate(custom(function = "not_blank"))]
    pub concept: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub date: NaiveDate,
}

/// Body of an expense or income edit. The budget of an entry never changes.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LedgerEntryEdit {
    #[validate(custom(function = "not_blank"))]
    pub concept: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub date: NaiveDate,
}

// ---------------------------------------------------------------------------
// tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewTask {
    #[validate(custom(function = "not_blank"))]
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<i32>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_task_patch"))]
pub struct TaskPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to: Option<Option<i32>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    /// Stored with the history row when the status changes
    pub comment: Option<String>,
}

fn validate_task_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
    blank_if_set(&patch.title)
}

// ---------------------------------------------------------------------------
// inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewInventoryItem {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    pub category: Option<String>,
    #[validate(custom(function = "non_negative_quantity"))]
    pub quantity: Decimal,
    #[validate(custom(function = "not_blank"))]
    pub unit: String,
    #[serde(default)]
    #[validate(custom(function = "non_negative"))]
    pub unit_cost: Decimal,
    #[serde(default)]
    #[validate(custom(function = "non_negative_quantity"))]
    pub minimum_stock: Decimal,
    pub project_id: Option<i32>,
    pub supplier: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_inventory_patch"))]
pub struct InventoryPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub minimum_stock: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub project_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub supplier: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

fn validate_inventory_patch(patch: &InventoryPatch) -> Result<(), ValidationError> {
    blank_if_set(&patch.name)?;
    blank_if_set(&patch.unit)?;
    checked_if_set(&patch.quantity, non_negative_quantity)?;
    checked_if_set(&patch.unit_cost, non_negative)?;
    checked_if_set(&patch.minimum_stock, non_negative_quantity)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMovement {
    #[serde(rename = "type")]
    pub kind: MovementKind,
    #[validate(custom(function = "positive_quantity"))]
    pub quantity: Decimal,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// projects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_new_project"))]
pub struct NewProject {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget_id: Option<i32>,
}

fn validate_new_project(project: &NewProject) -> Result<(), ValidationError> {
    dates_in_order(project.start_date, project.end_date)
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_project_patch"))]
pub struct ProjectPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub budget_id: Option<Option<i32>>,
}

fn validate_project_patch(patch: &ProjectPatch) -> Result<(), ValidationError> {
    blank_if_set(&patch.name)?;
    dates_in_order(patch.start_date.flatten(), patch.end_date.flatten())
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(custom(function = "not_blank"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    pub role: Role,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_user_patch"))]
pub struct UserPatch {
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
}

fn validate_user_patch(patch: &UserPatch) -> Result<(), ValidationError> {
    blank_if_set(&patch.username)?;
    blank_if_set(&patch.name)
}

// ---------------------------------------------------------------------------
// session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_amounts() {
        let entry = NewLedgerEntry {
            concept: "Cemento".into(),
            amount: Decimal::ZERO,
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        };
        let errors = entry.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("amount"));
    }

    #[test]
    fn money_fits_numeric_14_2() {
        assert_eq!(MAX_MONEY.to_string(), "999999999999.99");
        assert_eq!(MAX_QUANTITY.to_string(), "99999999999.999");

        let entry = |amount: &str| NewLedgerEntry {
            concept: "Cemento".into(),
            amount: amount.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        };
        assert!(entry("10.00").validate().is_ok());
        assert!(entry("999999999999.99").validate().is_ok());
        assert!(entry("10.005").validate().is_err());
        assert!(entry("0.001").validate().is_err());
        assert!(entry("1000000000000").validate().is_err());
        assert!(entry("79228162514264337593543950335").validate().is_err());
    }

    #[test]
    fn quantities_allow_three_decimals() {
        let movement = |quantity: &str| NewMovement {
            kind: MovementKind::Outbound,
            quantity: quantity.parse().unwrap(),
            description: None,
        };
        assert!(movement("2.125").validate().is_ok());
        assert!(movement("2.1255").validate().is_err());

        let patch = InventoryPatch {
            unit_cost: Some("3.333".parse().unwrap()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn rejects_blank_titles() {
        let task = NewTask {
            title: "   ".into(),
            ..Default::default()
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn rejects_negative_stock_in_patches() {
        let patch = InventoryPatch {
            quantity: Some(Decimal::NEGATIVE_ONE),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(InventoryPatch::default().validate().is_ok());
    }

    #[test]
    fn nullable_fields_distinguish_null_from_missing() {
        let patch: ProjectPatch = serde_json::from_str(r#"{"budget_id": null}"#).unwrap();
        assert_eq!(patch.budget_id, Some(None));
        let patch: ProjectPatch = serde_json::from_str(r#"{"name": "Torre B"}"#).unwrap();
        assert_eq!(patch.budget_id, None);
    }

    #[test]
    fn project_end_date_cannot_precede_start() {
        let project = NewProject {
            name: "Puente".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 4, 1),
            ..Default::default()
        };
        assert!(project.validate().is_err());
    }

    #[test]
    fn new_task_defaults_to_pending_medium() {
        let task: NewTask = serde_json::from_str(r#"{"title": "Encofrado"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
    }
}
