// ============================================================================
// ROLES, ROUTES, MENUS
// ============================================================================
//
// Role strings reach the backend in three shapes: numeric codes ("1".."4"),
// Spanish display names ("Jefe de Obra") and lowercase names ("jefe de obra",
// "jefe_de_obra"). `Role::from_str` is the only place that reads them; the rest
// of the crate matches on the enum.
//
// Serialisation always writes the Spanish display name.
//
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Administrador
    Admin,
    /// Jefe de Obra
    SiteManager,
    /// Gerente de Proyecto
    ProjectManager,
    /// Encargado de Suministros
    SupplyOfficer,
    /// Director de Obra
    WorksDirector,
    /// Trabajador
    Worker,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::SiteManager,
        Role::ProjectManager,
        Role::SupplyOfficer,
        Role::WorksDirector,
        Role::Worker,
        Role::SuperAdmin,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Role::Admin => "Administrador",
            Role::SiteManager => "Jefe de Obra",
            Role::ProjectManager => "Gerente de Proyecto",
            Role::SupplyOfficer => "Encargado de Suministros",
            Role::WorksDirector => "Director de Obra",
            Role::Worker => "Trabajador",
            Role::SuperAdmin => "SuperAdmin",
        }
    }

    /// Routes this role may open (and call the API behind)
    pub fn allowed_routes(self) -> &'static [AppRoute] {
        use AppRoute::*;
        match self {
            Role::SuperAdmin => &AppRoute::ALL,
            Role::Admin => &[
                Dashboard, Personnel, Reports, Projects, Tasks, Inventory, Budget, Attendance,
            ],
            Role::SiteManager => &[Dashboard, Tasks, Attendance],
            Role::ProjectManager => &[Dashboard, Budget, Expenses, Projects],
            Role::SupplyOfficer => &[Dashboard, Inventory, Orders],
            Role::WorksDirector => &[Dashboard, Reports, Progress, Projects],
            Role::Worker => &[WorkerDashboard],
        }
    }

    pub fn can_access(self, route: AppRoute) -> bool {
        self.allowed_routes().contains(&route)
    }

    /// Sidebar entries, in display order
    pub fn menu_items(self) -> Vec<MenuItem> {
        use AppRoute::*;
        let routes: &[AppRoute] = match self {
            Role::Admin => &[Dashboard, Personnel, Reports],
            Role::SiteManager => &[Dashboard, Tasks, Attendance],
            Role::ProjectManager => &[Dashboard, Budget, Expenses],
            Role::SupplyOfficer => &[Dashboard, Inventory, Orders],
            Role::WorksDirector => &[Dashboard, Reports, Progress],
            Role::Worker => &[WorkerDashboard],
            Role::SuperAdmin => &[Dashboard, Users, Projects, Budget, Tasks, Inventory, Attendance],
        };
        routes.iter().map(|route| route.menu_item()).collect()
    }

    /// Landing page after login
    pub fn home(self) -> AppRoute {
        match self {
            Role::Worker => AppRoute::WorkerDashboard,
            _ => AppRoute::Dashboard,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase().replace(['_', '-'], " ");
        let role = match normalized.as_str() {
            "1" | "administrador" | "admin" => Role::Admin,
            "2" | "jefe de obra" | "site manager" => Role::SiteManager,
            "3" | "gerente de proyecto" | "project manager" => Role::ProjectManager,
            "4" | "trabajador" | "worker" => Role::Worker,
            "encargado de suministros" | "supply officer" => Role::SupplyOfficer,
            "director de obra" | "works director" => Role::WorksDirector,
            "superadmin" | "super admin" => Role::SuperAdmin,
            _ => return Err(UnknownRole(raw.to_string())),
        };
        Ok(role)
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Client-side pages, one per permission boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppRoute {
    Dashboard,
    WorkerDashboard,
    Personnel,
    Reports,
    Projects,
    Tasks,
    Inventory,
    Orders,
    Budget,
    Expenses,
    Attendance,
    Progress,
    Users,
}

impl AppRoute {
    pub const ALL: [AppRoute; 13] = [
        AppRoute::Dashboard,
        AppRoute::WorkerDashboard,
        AppRoute::Personnel,
        AppRoute::Reports,
        AppRoute::Projects,
        AppRoute::Tasks,
        AppRoute::Inventory,
        AppRoute::Orders,
        AppRoute::Budget,
        AppRoute::Expenses,
        AppRoute::Attendance,
        AppRoute::Progress,
        AppRoute::Users,
    ];

    pub fn path(self) -> &'static str {
        match self {
            AppRoute::Dashboard => "/",
            AppRoute::WorkerDashboard => "/worker",
            AppRoute::Personnel => "/personal",
            AppRoute::Reports => "/informes",
            AppRoute::Projects => "/projects",
            AppRoute::Tasks => "/tasks",
            AppRoute::Inventory => "/inventory",
            AppRoute::Orders => "/pedidos",
            AppRoute::Budget => "/budget",
            AppRoute::Expenses => "/gastos",
            AppRoute::Attendance => "/asistencia",
            AppRoute::Progress => "/progreso",
            AppRoute::Users => "/users",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AppRoute::Dashboard => "Dashboard",
            AppRoute::WorkerDashboard => "Mi Jornada",
            AppRoute::Personnel => "Gestión de Personal",
            AppRoute::Reports => "Informes",
            AppRoute::Projects => "Proyectos",
            AppRoute::Tasks => "Tareas",
            AppRoute::Inventory => "Inventario",
            AppRoute::Orders => "Pedidos",
            AppRoute::Budget => "Presupuestos",
            AppRoute::Expenses => "Gastos",
            AppRoute::Attendance => "Asistencia",
            AppRoute::Progress => "Progreso",
            AppRoute::Users => "Usuarios",
        }
    }

    pub fn menu_item(self) -> MenuItem {
        MenuItem {
            route: self,
            label: self.label(),
            href: self.path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub route: AppRoute,
    pub label: &'static str,
    pub href: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_legacy_spelling() {
        assert_eq!("1".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Jefe de Obra".parse::<Role>().unwrap(), Role::SiteManager);
        assert_eq!("jefe_de_obra".parse::<Role>().unwrap(), Role::SiteManager);
        assert_eq!("gerente de proyecto".parse::<Role>().unwrap(), Role::ProjectManager);
        assert_eq!("4".parse::<Role>().unwrap(), Role::Worker);
        assert_eq!("Encargado de Suministros".parse::<Role>().unwrap(), Role::SupplyOfficer);
        assert_eq!("SuperAdmin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert!("capataz".parse::<Role>().is_err());
    }

    #[test]
    fn display_name_round_trips() {
        for role in Role::ALL {
            assert_eq!(role.display_name().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn serializes_as_display_name() {
        assert_eq!(
            serde_json::to_string(&Role::ProjectManager).unwrap(),
            "\"Gerente de Proyecto\""
        );
        let role: Role = serde_json::from_str("\"3\"").unwrap();
        assert_eq!(role, Role::ProjectManager);
    }

    #[test]
    fn workers_only_see_their_dashboard() {
        assert_eq!(Role::Worker.home(), AppRoute::WorkerDashboard);
        assert!(!Role::Worker.can_access(AppRoute::Budget));
        assert_eq!(Role::Worker.menu_items().len(), 1);
    }

    #[test]
    fn user_management_is_super_admin_only() {
        for role in Role::ALL {
            assert_eq!(role.can_access(AppRoute::Users), role == Role::SuperAdmin);
        }
    }

    #[test]
    fn menu_items_are_reachable_routes() {
        for role in Role::ALL {
            for item in role.menu_items() {
                assert!(role.can_access(item.route), "{role} menu links to {:?}", item.route);
            }
        }
    }

    #[test]
    fn project_manager_menu_matches_sidebar() {
        let hrefs: Vec<&str> = Role::ProjectManager
            .menu_items()
            .iter()
            .map(|item| item.href)
            .collect();
        assert_eq!(hrefs, vec!["/", "/budget", "/gastos"]);
    }
}
