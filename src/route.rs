//! Route definitions for the card platform API
//!
//! This module configures all HTTP routes and maps them to their respective handlers.

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;

use crate::database::AppState;
use crate::handler::{account, admin, cards, links};
use crate::middleware::require_admin;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `POST /api/register`, `/api/login`, `/api/logout`, `GET /api/user` - accounts
/// - `/api/business-cards/...` - card CRUD and device auto-save
/// - `/api/public-links/...` - share links; `GET /api/public-links/{slug}` is the public view
/// - `/api/nfc-links/{slug}` - claim status and `POST .../claim`
/// - `/api/admin/...` - admin-only, behind [`require_admin`]
///
/// # Example Usage
///
/// ```no_run
/// # use cardfolio::config::Config;
/// # use cardfolio::database::{init_db, AppState};
/// # use cardfolio::route::create_app;
/// # let db = init_db("data.db").unwrap();
/// let state = AppState::new(db, Config::default());
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/generate-links", post(admin::generate_links))
        .route("/unassigned-links", get(admin::unassigned_links))
        .route("/public-links", get(admin::list_links))
        .route(
            "/public-links/{id}",
            patch(admin::toggle_link).delete(admin::delete_link),
        )
        .route(
            "/template-cards",
            get(admin::list_templates).post(admin::create_template),
        )
        .route("/business-cards", get(admin::list_cards))
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            patch(admin::update_user_role).delete(admin::delete_user),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api_routes = Router::new()
        .route("/register", post(account::register))
        .route("/login", post(account::login))
        .route("/logout", post(account::logout))
        .route("/user", get(account::current_user))
        .route(
            "/business-cards",
            get(cards::list_cards).post(cards::create_card),
        )
        .route("/business-cards/auto-save", post(cards::auto_save))
        .route(
            "/business-cards/{id}",
            get(cards::get_card)
                .put(cards::update_card)
                .delete(cards::delete_card),
        )
        .route("/public-links", post(links::create_link))
        .route("/public-links/by-card/{card_id}", get(links::list_card_links))
        // GET resolves a slug for viewing, DELETE takes a link id
        .route(
            "/public-links/{slug}",
            get(links::view_link).delete(links::delete_link),
        )
        .route("/nfc-links/{slug}", get(links::claim_status))
        .route("/nfc-links/{slug}/claim", post(links::claim_link))
        .nest("/admin", admin_routes);

    Router::new().nest("/api", api_routes).with_state(state)
}
