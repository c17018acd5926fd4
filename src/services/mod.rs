pub mod attendance_service;
pub mod collection;
pub mod dashboard_service;
pub mod ledger_service;
pub mod session;
