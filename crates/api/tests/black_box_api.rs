use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use worklane_api::ApiConfig;
use worklane_api::app::{self, AppServices, errors::NOT_FOUND_MESSAGE, services};
use worklane_auth::CredentialClaims;
use worklane_core::{Predicate, StorageQuery, TenantScopedEntity, UserId};
use worklane_tenancy::{Role, RolePermission, UserRecord};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let config = ApiConfig::for_tests(SECRET);
        let services = Arc::new(services::build_services(&config).await.unwrap());
        let app = app::router(Arc::clone(&services));

        let listener = tokio::net::TcpListener::bind(config.bind_addr)
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A registered user without a tenant, plus a token for it.
    async fn register(&self, email: &str) -> (UserId, String) {
        let user = self
            .services
            .users
            .register_user(UserRecord::new(email))
            .await
            .unwrap();
        (user.user_id(), mint_jwt(user.user_id()))
    }

    /// A user that bootstrapped its own tenant; returns its token and tenant id.
    async fn owner(&self, email: &str, tenant_name: &str) -> (String, String) {
        let (_, token) = self.register(email).await;
        let res = self
            .client
            .post(self.url("/tenant"))
            .bearer_auth(&token)
            .json(&json!({ "name": tenant_name }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let tenant: Value = res.json().await.unwrap();
        (token, tenant["id"].as_str().unwrap().to_string())
    }

    async fn role_id(&self, tenant: &str, role: &str) -> String {
        let filter = Predicate::eq("tenant_id", tenant).and(Predicate::eq("name", role));
        let rows = self
            .services
            .storage
            .find(Role::COLLECTION, &StorageQuery::matching(filter))
            .await
            .unwrap();
        rows[0]["id"].as_str().unwrap().to_string()
    }

    async fn grant_id(&self, role_id: &str, permission: &str) -> String {
        let filter = Predicate::eq("role_id", role_id).and(Predicate::eq("permission", permission));
        let rows = self
            .services
            .storage
            .find(RolePermission::COLLECTION, &StorageQuery::matching(filter))
            .await
            .unwrap();
        rows[0]["id"].as_str().unwrap().to_string()
    }

    /// A user holding `role` in `tenant`.
    async fn member(&self, email: &str, tenant: &str, role: &str) -> String {
        let (user, token) = self.register(email).await;
        let role_id = self.role_id(tenant, role).await;
        self.services
            .users
            .assign_tenant_role(user, tenant.parse().unwrap(), role_id.parse().unwrap())
            .await
            .unwrap();
        token
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let res = req.send().await.unwrap();
        let status = res.status();
        let body = res.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user: UserId) -> String {
    let now = Utc::now();
    let claims = CredentialClaims {
        sub: user,
        tenant_id: None,
        role_id: None,
        role: None,
        permissions: Vec::new(),
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_open_and_me_requires_a_credential() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = srv.send(srv.client.get(srv.url("/me"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = srv
        .send(srv.client.get(srv.url("/me")).bearer_auth("not-a-token"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (user, token) = srv.register("ada@example.com").await;
    let (status, body) = srv
        .send(
            srv.client
                .get(srv.url("/me"))
                .bearer_auth(&token)
                .header("Language", "de"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user.to_string());
    assert!(body["tenant_id"].is_null());
    assert_eq!(body["language"], "de");
}

#[tokio::test]
async fn bootstrap_promotes_the_caller_once() {
    let srv = TestServer::spawn().await;
    let (token, tenant) = srv.owner("owner@example.com", "Acme").await;

    let (status, body) = srv.send(srv.client.get(srv.url("/me")).bearer_auth(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], tenant);
    assert_eq!(body["role"], "SUPER_ADMIN");

    let (status, body) = srv
        .send(
            srv.client
                .post(srv.url("/tenant"))
                .bearer_auth(&token)
                .json(&json!({ "name": "Second" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, grants) = srv
        .send(srv.client.get(srv.url("/role-permissions/me")).bearer_auth(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grants.as_array().unwrap().len(), 13);
}

#[tokio::test]
async fn organization_lifecycle_is_tenant_stamped() {
    let srv = TestServer::spawn().await;
    let (token, tenant) = srv.owner("owner@example.com", "Acme").await;

    let foreign_tenant = uuid::Uuid::new_v4().to_string();
    let (status, org) = srv
        .send(
            srv.client
                .post(srv.url("/organizations"))
                .bearer_auth(&token)
                .json(&json!({ "name": "HQ", "tenant_id": foreign_tenant })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(org["tenant_id"], tenant);
    let id = org["id"].as_str().unwrap().to_string();

    let (status, page) = srv
        .send(srv.client.get(srv.url("/organizations?take=500")).bearer_auth(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (status, org) = srv
        .send(
            srv.client
                .put(srv.url(&format!("/organizations/{id}")))
                .bearer_auth(&token)
                .json(&json!({ "name": "Head Office", "id": "ignored" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(org["name"], "Head Office");
    assert_eq!(org["id"], id);

    let (status, org) = srv
        .send(srv.client.delete(srv.url(&format!("/organizations/{id}"))).bearer_auth(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(org["is_archived"], true);

    let (status, body) = srv
        .send(srv.client.get(srv.url(&format!("/organizations/{id}"))).bearer_auth(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], NOT_FOUND_MESSAGE);

    let (status, org) = srv
        .send(
            srv.client
                .put(srv.url(&format!("/organizations/{id}/recover")))
                .bearer_auth(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(org["is_archived"], false);

    let (status, _) = srv
        .send(srv.client.get(srv.url(&format!("/organizations/{id}"))).bearer_auth(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn tenants_cannot_see_each_others_rows() {
    let srv = TestServer::spawn().await;
    let (alice, _) = srv.owner("alice@example.com", "Alpha").await;
    let (bob, _) = srv.owner("bob@example.com", "Beta").await;

    let (_, org) = srv
        .send(
            srv.client
                .post(srv.url("/organizations"))
                .bearer_auth(&alice)
                .json(&json!({ "name": "Alpha HQ" })),
        )
        .await;
    let id = org["id"].as_str().unwrap().to_string();

    let (status, foreign) = srv
        .send(srv.client.get(srv.url(&format!("/organizations/{id}"))).bearer_auth(&bob))
        .await;
    let (_, missing) = srv
        .send(
            srv.client
                .get(srv.url(&format!("/organizations/{}", uuid::Uuid::now_v7())))
                .bearer_auth(&bob),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(foreign, missing);

    let (_, page) = srv
        .send(srv.client.get(srv.url("/organizations")).bearer_auth(&bob))
        .await;
    assert_eq!(page["total"], 0);

    for req in [
        srv.client
            .put(srv.url(&format!("/organizations/{id}")))
            .json(&json!({ "name": "pwned" })),
        srv.client.delete(srv.url(&format!("/organizations/{id}"))),
    ] {
        let (status, _) = srv.send(req.bearer_auth(&bob)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let (_, org) = srv
        .send(srv.client.get(srv.url(&format!("/organizations/{id}"))).bearer_auth(&alice))
        .await;
    assert_eq!(org["name"], "Alpha HQ");
}

#[tokio::test]
async fn route_guards_follow_role_grants() {
    let srv = TestServer::spawn().await;
    let (owner, tenant) = srv.owner("owner@example.com", "Acme").await;
    let viewer = srv.member("viewer@example.com", &tenant, "VIEWER").await;

    let (status, _) = srv
        .send(srv.client.get(srv.url("/organizations")).bearer_auth(&viewer))
        .await;
    assert_eq!(status, StatusCode::OK);

    let create = || {
        srv.client
            .post(srv.url("/organizations"))
            .bearer_auth(&viewer)
            .json(&json!({ "name": "Branch" }))
    };
    let (status, body) = srv.send(create()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (_, grants) = srv
        .send(srv.client.get(srv.url("/role-permissions/me")).bearer_auth(&viewer))
        .await;
    let mut names: Vec<_> = grants
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["permission"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["ALL_ORG_VIEW", "ORG_EMPLOYEES_VIEW", "ORG_USERS_VIEW"]);

    // Owner enables ALL_ORG_EDIT for viewers; the next request sees it.
    let viewer_role = srv.role_id(&tenant, "VIEWER").await;
    let grant = srv.grant_id(&viewer_role, "ALL_ORG_EDIT").await;
    let (status, body) = srv
        .send(
            srv.client
                .put(srv.url(&format!("/role-permissions/{grant}")))
                .bearer_auth(&owner)
                .json(&json!({ "enabled": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);

    let (status, _) = srv.send(create()).await;
    assert_eq!(status, StatusCode::CREATED);

    // Viewers cannot change grants at all.
    let (status, _) = srv
        .send(
            srv.client
                .delete(srv.url(&format!("/role-permissions/{grant}")))
                .bearer_auth(&viewer),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .send(
            srv.client
                .delete(srv.url(&format!("/role-permissions/{grant}")))
                .bearer_auth(&owner),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn privileged_role_grants_are_locked() {
    let srv = TestServer::spawn().await;
    let (owner, tenant) = srv.owner("owner@example.com", "Acme").await;
    let admin = srv.member("admin@example.com", &tenant, "ADMIN").await;

    let super_role = srv.role_id(&tenant, "SUPER_ADMIN").await;
    let super_grant = srv.grant_id(&super_role, "TENANT_SETTING").await;
    let admin_role = srv.role_id(&tenant, "ADMIN").await;
    let admin_grant = srv.grant_id(&admin_role, "ACCESS_DELETE_ALL_DATA").await;

    let disable = |token: &str, grant: &str| {
        srv.client
            .put(srv.url(&format!("/role-permissions/{grant}")))
            .bearer_auth(token)
            .json(&json!({ "enabled": false }))
    };

    let (status, _) = srv.send(disable(&owner, &super_grant)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.send(disable(&admin, &admin_grant)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.send(disable(&owner, &admin_grant)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = srv
        .send(
            srv.client
                .post(srv.url("/role-permissions"))
                .bearer_auth(&owner)
                .json(&json!({
                    "role_id": admin_role,
                    "permission": "ACCESS_DELETE_ALL_DATA",
                    "enabled": true,
                })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn grant_listing_is_filtered_by_role() {
    let srv = TestServer::spawn().await;
    let (owner, tenant) = srv.owner("owner@example.com", "Acme").await;
    let admin = srv.member("admin@example.com", &tenant, "ADMIN").await;
    let viewer = srv.member("viewer@example.com", &tenant, "VIEWER").await;
    let super_role = srv.role_id(&tenant, "SUPER_ADMIN").await;
    let viewer_role = srv.role_id(&tenant, "VIEWER").await;

    let list = |token: &str, query: &str| {
        srv.client
            .get(srv.url(&format!("/role-permissions{query}")))
            .bearer_auth(token)
    };
    let roles_in = |page: &Value| {
        let mut ids: Vec<String> = page["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["role_id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    };

    let (status, all) = srv.send(list(&owner, "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["total"], 7 * 13);

    let (_, listed) = srv.send(list(&admin, "")).await;
    assert_eq!(listed["total"], 6 * 13);
    assert!(!roles_in(&listed).contains(&super_role));

    let (_, own) = srv.send(list(&viewer, &format!("?role_id={super_role}"))).await;
    assert_eq!(roles_in(&own), vec![viewer_role]);

    let (status, _) = srv.send(list(&viewer, "?role_id=not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = srv.send(srv.client.get(srv.url("/role-permissions"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn organization_header_is_honoured_only_within_the_tenant() {
    let srv = TestServer::spawn().await;
    let (mine, _) = srv.owner("mine@example.com", "Acme").await;
    let (theirs, _) = srv.owner("theirs@example.com", "Globex").await;

    let create = |token: &str, name: &str| {
        srv.client
            .post(srv.url("/organizations"))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
    };
    let (_, own_org) = srv.send(create(&mine, "HQ")).await;
    let (_, foreign_org) = srv.send(create(&theirs, "Lab")).await;

    let me = |org: &Value| {
        srv.client
            .get(srv.url("/me"))
            .bearer_auth(&mine)
            .header("Organization-Id", org["id"].as_str().unwrap())
    };
    let (status, body) = srv.send(me(&own_org)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organization_id"], own_org["id"]);

    let (status, body) = srv.send(me(&foreign_org)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["organization_id"].is_null());
}
