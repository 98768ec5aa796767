//! Current-user endpoint

use crate::middleware::AuthenticatedUser;
use crate::response::ApiResponse;
use axum::Json;
use serde::Serialize;

/// Profile derived from the bearer token's claims.
#[derive(Debug, Serialize)]
pub struct Profile {
    /// User ID
    pub id: i32,

    /// Email address
    pub email: String,

    /// Username
    pub username: String,

    /// OIDC subject
    pub oidc_sub: String,

    /// Active flag at token issuance
    pub is_active: bool,
}

/// `GET /api/v1/me` (alias `GET /user`)
pub async fn me(AuthenticatedUser(claims): AuthenticatedUser) -> Json<ApiResponse<Profile>> {
    ApiResponse::ok(Profile {
        id: claims.user_id,
        email: claims.email,
        username: claims.username,
        oidc_sub: claims.oidc_sub,
        is_active: claims.is_active,
    })
}
