// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée pour tous les modèles de données.
//   Chaque modèle correspond à une table PostgreSQL avec SeaORM.
//   The in-memory gateway (store::memory) stores the same Model structs.
//
// Liste des modules:
//   - health : Health check API
//   - budget : Budgets with their live running balance
//   - expense / income : Ledger entries owned by exactly one budget
//   - project : Construction projects, optional weak link to a budget
//   - task / task_history : Site tasks and their status changes
//   - inventory_item / inventory_movement : Stock and stock movements
//   - attendance : Daily entry/exit records
//   - users : User profiles (role stored in its wire format)
//   - auth_account : Credentials owned by the identity adapter
//   - revoked_token : Signed-out tokens kept until they expire
//   - role : Canonical roles, route and menu tables
//   - dto : Request bodies and validation rules
//
// Points d'attention:
//   - Money and quantities are rust_decimal::Decimal, never f64
//   - Timestamps are UTC (TIMESTAMPTZ); dates are NaiveDate
//   - The schema lives in migrations/ (run by sqlx at startup)
//
// ============================================================================

pub mod health;
pub mod budget;
pub mod expense;
pub mod income;
pub mod project;
pub mod task;
pub mod task_history;
pub mod inventory_item;
pub mod inventory_movement;
pub mod attendance;
pub mod users;
pub mod auth_account;
pub mod revoked_token;
pub mod role;
pub mod dto;
