use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

/// Task lifecycle. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TaskStatus {
    #[default]
    #[sea_orm(string_value = "pendiente")]
    #[serde(rename = "pendiente")]
    Pending,
    #[sea_orm(string_value = "en_progreso")]
    #[serde(rename = "en_progreso")]
    InProgress,
    #[sea_orm(string_value = "completada")]
    #[serde(rename = "completada")]
    Completed,
    #[sea_orm(string_value = "cancelada")]
    #[serde(rename = "cancelada")]
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// pendiente -> en_progreso -> completada, cancelada from any non-terminal state.
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            TaskStatus::Pending => true,
            TaskStatus::InProgress => next.is_terminal(),
            TaskStatus::Completed | TaskStatus::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pendiente",
            TaskStatus::InProgress => "en_progreso",
            TaskStatus::Completed => "completada",
            TaskStatus::Cancelled => "cancelada",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TaskPriority {
    #[sea_orm(string_value = "baja")]
    #[serde(rename = "baja")]
    Low,
    #[default]
    #[sea_orm(string_value = "media")]
    #[serde(rename = "media")]
    Medium,
    #[sea_orm(string_value = "alta")]
    #[serde(rename = "alta")]
    High,
    #[sea_orm(string_value = "urgente")]
    #[serde(rename = "urgente")]
    Urgent,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<i32>,   // users.id, weak reference
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<Date>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::task_history::Entity")]
    TaskHistory,
}

impl Related<super::task_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        for next in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Cancelled] {
            assert!(!TaskStatus::Completed.can_transition_to(next));
        }
        for next in [TaskStatus::Pending, TaskStatus::InProgress, TaskStatus::Completed] {
            assert!(!TaskStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::InProgress.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn wire_names_are_spanish() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"en_progreso\""
        );
        let priority: TaskPriority = serde_json::from_str("\"urgente\"").unwrap();
        assert_eq!(priority, TaskPriority::Urgent);
    }
}
