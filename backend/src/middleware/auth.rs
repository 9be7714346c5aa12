//! Authentication middleware
//!
//! Verifies bearer tokens issued by the identity provider and gates
//! operations by role.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, ErrorDetail, ErrorResponse};
use crate::AppState;

/// Operator role carried in the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Office,
    Warehouse,
    Admin,
}

/// Authenticated operator; stamped on every carton, movement, verification
/// and session it touches.
#[derive(Clone, Debug)]
pub struct Operator {
    pub user_id: Uuid,
    pub role: Role,
}

impl Operator {
    fn require(&self, allowed: &[Role], action: &str) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermissions(format!(
                "{:?} role cannot {}",
                self.role, action
            )))
        }
    }

    /// Scanning, repacking, stocktakes and confirming verifications
    pub fn require_warehouse(&self, action: &str) -> Result<(), AppError> {
        self.require(&[Role::Warehouse, Role::Admin], action)
    }

    /// Approving and rejecting orders
    pub fn require_office(&self, action: &str) -> Result<(), AppError> {
        self.require(&[Role::Office, Role::Admin], action)
    }

    /// Adjustments, thresholds and expiring verifications
    pub fn require_admin(&self, action: &str) -> Result<(), AppError> {
        self.require(&[Role::Admin], action)
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) => token,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let operator = match decode_operator(token, &state.config.jwt.secret) {
        Ok(operator) => operator,
        Err(msg) => return unauthorized_response(&msg),
    };

    request.extensions_mut().insert(operator);

    next.run(request).await
}

/// Decode and validate a token into the operator it names
pub fn decode_operator(token: &str, secret: &str) -> Result<Operator, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token".to_string())?;

    Ok(Operator {
        user_id,
        role: claims.role,
    })
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            field: None,
        },
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for the authenticated operator
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Operator);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Operator>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, role: Role, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role,
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_decode_operator() {
        let id = Uuid::new_v4();
        let operator = decode_operator(&token(&id.to_string(), Role::Warehouse, "s3cret"), "s3cret").unwrap();
        assert_eq!(operator.user_id, id);
        assert_eq!(operator.role, Role::Warehouse);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let t = token(&Uuid::new_v4().to_string(), Role::Admin, "s3cret");
        assert!(decode_operator(&t, "other").is_err());
    }

    #[test]
    fn test_bad_subject_rejected() {
        let t = token("not-a-uuid", Role::Admin, "s3cret");
        assert_eq!(decode_operator(&t, "s3cret").unwrap_err(), "Invalid user ID in token");
    }

    #[test]
    fn test_role_gates() {
        let warehouse = Operator { user_id: Uuid::new_v4(), role: Role::Warehouse };
        assert!(warehouse.require_warehouse("scan").is_ok());
        assert!(warehouse.require_admin("adjust stock").is_err());
        assert!(warehouse.require_office("approve orders").is_err());

        let admin = Operator { user_id: Uuid::new_v4(), role: Role::Admin };
        assert!(admin.require_warehouse("scan").is_ok());
        assert!(admin.require_office("approve orders").is_ok());
        assert!(admin.require_admin("adjust stock").is_ok());
    }
}
