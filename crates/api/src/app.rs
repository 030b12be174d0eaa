use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::Notifier;
use shared::jwt::{JwtConfig, JwtError};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, require_user_auth, trace_id};
use crate::routes::{admin, billing, group_batches, groups, health, invites, registrations};
use crate::services::billing::BillingSettings;
use crate::services::{
    BillingService, EmailService, GroupBatchService, GroupService, InviteService,
    RegistrationService, UserService,
};

/// Shared handler state. Services are cheap to clone (pool handles plus
/// `Arc`ed settings).
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub registrations: RegistrationService,
    pub groups: GroupService,
    pub group_batches: GroupBatchService,
    pub invites: InviteService,
    pub billing: BillingService,
    pub users: UserService,
}

impl AppState {
    /// Wires every service from configuration.
    ///
    /// `notifier` is injected so tests can capture outgoing emails.
    pub fn new(
        config: Config,
        pool: PgPool,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, JwtError> {
        let jwt = JwtConfig::from_secret(
            &config.jwt.secret,
            config.jwt.access_token_expiry_secs,
            config.jwt.leeway_secs,
        )?;
        let hold_policy = config.registration.hold_policy();
        let fee_bps = config.registration.fee_basis_points;

        let billing = BillingService::new(
            pool.clone(),
            Arc::clone(&notifier),
            BillingSettings {
                trial_days: config.billing.trial_days,
                pending_grant_default_days: config.billing.pending_grant_default_days,
                pro_features: config.pro_features.clone(),
            },
        );

        Ok(Self {
            registrations: RegistrationService::new(pool.clone(), hold_policy, fee_bps),
            groups: GroupService::new(pool.clone()),
            group_batches: GroupBatchService::new(
                pool.clone(),
                hold_policy,
                fee_bps,
                config.limits.max_batch_rows,
            ),
            invites: InviteService::new(
                pool.clone(),
                notifier,
                config.registration.invite_claim_base_url.clone(),
            ),
            billing,
            users: UserService::new(pool.clone()),
            jwt: Arc::new(jwt),
            config: Arc::new(config),
            pool,
        })
    }

    /// State with email delivery configured from `config.email`.
    pub fn with_email(config: Config, pool: PgPool) -> Result<Self, JwtError> {
        let notifier: Arc<dyn Notifier> = Arc::new(EmailService::new(config.email.clone()));
        Self::new(config, pool, notifier)
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let cors = if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let authenticated = Router::new()
        // Registrations
        .route(
            "/api/v1/registrations",
            post(registrations::start_registration).get(registrations::list_my_registrations),
        )
        .route(
            "/api/v1/registrations/:registration_id",
            get(registrations::get_registration),
        )
        .route(
            "/api/v1/registrations/:registration_id/submit",
            post(registrations::submit_registration),
        )
        .route(
            "/api/v1/registrations/:registration_id/payment",
            post(registrations::begin_payment),
        )
        .route(
            "/api/v1/registrations/:registration_id/demo-complete",
            post(registrations::complete_demo_payment),
        )
        .route(
            "/api/v1/registrations/:registration_id/cancel",
            post(registrations::cancel_registration),
        )
        .route(
            "/api/v1/registrations/:registration_id/sync-discount",
            post(groups::sync_registration_discount),
        )
        .route(
            "/api/v1/registrations/:registration_id/invites",
            get(invites::list_for_registration),
        )
        // Groups
        .route("/api/v1/groups", post(groups::create_group))
        .route("/api/v1/groups/:group_id/join", post(groups::join_group))
        .route("/api/v1/groups/:group_id/leave", post(groups::leave_group))
        .route(
            "/api/v1/groups/:group_id/discount",
            get(groups::discount_status),
        )
        // Group batches
        .route(
            "/api/v1/editions/:edition_id/group-batches",
            post(group_batches::create_batch),
        )
        .route(
            "/api/v1/group-batches/:batch_id",
            get(group_batches::get_batch),
        )
        .route(
            "/api/v1/group-batches/:batch_id/process",
            post(group_batches::process_batch),
        )
        .route(
            "/api/v1/group-batches/:batch_id/invites",
            post(group_batches::issue_invites),
        )
        // Invites
        .route("/api/v1/invites/claim", post(invites::claim_invite))
        .route(
            "/api/v1/invites/:invite_id/resend",
            post(invites::resend_invite),
        )
        .route(
            "/api/v1/invites/:invite_id/cancel",
            post(invites::cancel_invite),
        )
        // Billing
        .route("/api/v1/billing/status", get(billing::pro_status))
        .route(
            "/api/v1/billing/features/:feature_key",
            get(billing::feature_decision),
        )
        .route("/api/v1/billing/trial", post(billing::start_trial))
        .route(
            "/api/v1/billing/promotions/redeem",
            post(billing::redeem_promotion),
        )
        .route(
            "/api/v1/billing/grants/claim",
            post(billing::claim_pending_grants),
        )
        .route("/api/v1/billing/cancel", post(billing::schedule_cancel))
        .route("/api/v1/billing/resume", post(billing::resume_subscription))
        // Admin
        .route(
            "/api/v1/admin/billing/promotions",
            post(admin::create_promotion),
        )
        .route(
            "/api/v1/admin/billing/grants",
            post(admin::create_pending_grant),
        )
        .route(
            "/api/v1/admin/users/:user_id/email-verified",
            post(admin::mark_email_verified),
        )
        .route(
            "/api/v1/admin/users/cleanup-unverified",
            post(admin::cleanup_unverified_users),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    let public = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/v1/editions/:edition_id/availability",
            get(registrations::edition_availability),
        )
        .route(
            "/api/v1/editions/:edition_id/group-batches/template",
            get(group_batches::template),
        );

    Router::new()
        .merge(public)
        .merge(authenticated)
        // Bottom layers run first
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
