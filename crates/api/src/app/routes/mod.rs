use axum::{
    Router,
    routing::{get, post, put},
};

pub mod organizations;
pub mod role_permissions;
pub mod system;
pub mod tenant;

/// Router for every context-bound endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .route("/tenant", post(tenant::create_tenant))
        .route(
            "/organizations",
            get(organizations::list_organizations).post(organizations::create_organization),
        )
        .route(
            "/organizations/:id",
            get(organizations::get_organization)
                .put(organizations::update_organization)
                .delete(organizations::remove_organization),
        )
        .route("/organizations/:id/recover", put(organizations::recover_organization))
        .route(
            "/role-permissions",
            get(role_permissions::list_role_permissions).post(role_permissions::create_role_permission),
        )
        .route("/role-permissions/me", get(role_permissions::my_permissions))
        .route(
            "/role-permissions/:id",
            put(role_permissions::update_role_permission)
                .delete(role_permissions::delete_role_permission),
        )
}
