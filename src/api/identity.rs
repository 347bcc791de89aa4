use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use uuid::Uuid;

use super::errors::ApiError;
use crate::domain::order::{Caller, Role};

// ============================================================================
// Caller identity
// ============================================================================
//
// Authentication happens at the gateway, which forwards the resolved user
// as headers. A request without a valid user id is unauthenticated; a
// missing role means an ordinary customer.
//
// ============================================================================

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn parse_role(raw: &str) -> Option<Role> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "customer" => Some(Role::Customer),
        "seller" => Some(Role::Seller),
        "admin" => Some(Role::Admin),
        _ => None,
    }
}

fn caller_from(req: &HttpRequest) -> Result<Caller, ApiError> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| ApiError::Unauthenticated("Authentication required".to_string()))?;

    let role = match req.headers().get(USER_ROLE_HEADER) {
        None => Role::Customer,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(parse_role)
            .ok_or_else(|| ApiError::Unauthenticated("Unknown user role".to_string()))?,
    };

    Ok(Caller::new(user_id, role))
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(caller_from(req))
    }
}
