/// Authentication extractors and utilities
use crate::{api::middleware::extract_bearer_token, context::AppContext, error::LmsError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};

/// Caller roles, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, LmsError> {
        match s.to_lowercase().as_str() {
            "learner" | "student" => Ok(Role::Learner),
            "teacher" | "instructor" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(LmsError::Authentication(format!("Unknown role: {}", s))),
        }
    }

    /// Check if this role has at least the privileges of `required`
    pub fn can_act_as(&self, required: Role) -> bool {
        *self >= required
    }
}

/// JWT claims issued by the platform's identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject: String,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = LmsError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| LmsError::Authentication("Missing authorization header".to_string()))?;

        authenticate(
            &token,
            &state.config.authentication.jwt_secret,
            &state.config.authentication.admin_ids,
        )
    }
}

/// Operator authentication context - requires teacher role or higher
#[derive(Debug, Clone)]
pub struct OperatorAuth {
    pub subject: String,
    pub role: Role,
}

impl OperatorAuth {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OperatorAuth {
    type Rejection = LmsError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        if !auth.role.can_act_as(Role::Teacher) {
            tracing::warn!("OperatorAuth: {} is not an operator", auth.subject);
            return Err(LmsError::Authorization(
                "Teacher or admin role required".to_string(),
            ));
        }

        Ok(OperatorAuth {
            subject: auth.subject,
            role: auth.role,
        })
    }
}

/// Resolve a bearer token into an authenticated caller
///
/// Subjects listed in `admin_ids` are promoted to admin.
pub fn authenticate(token: &str, jwt_secret: &str, admin_ids: &[String]) -> Result<AuthContext, LmsError> {
    let token_data = verify_jwt_token(token, jwt_secret)?;
    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(LmsError::Authentication(
            "Invalid JWT: missing 'sub' claim".to_string(),
        ));
    }

    let role = if admin_ids.iter().any(|id| id == &claims.sub) {
        Role::Admin
    } else {
        match claims.role.as_deref() {
            Some(role) => Role::from_str(role)?,
            None => Role::Learner,
        }
    };

    tracing::debug!("Authenticated {} as {}", claims.sub, role.as_str());

    Ok(AuthContext {
        subject: claims.sub,
        role,
    })
}

/// Verify a JWT token with full validation
///
/// This performs:
/// 1. JWT signature verification
/// 2. Expiration checking
/// 3. Claims validation
pub fn verify_jwt_token(
    token: &str,
    jwt_secret: &str,
) -> Result<jsonwebtoken::TokenData<Claims>, LmsError> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                LmsError::Authentication("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                LmsError::Authentication("Invalid token signature".to_string())
            }
            _ => LmsError::Authentication(format!("Invalid token: {}", e)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn token(sub: &str, role: Option<&str>, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.map(str::to_string),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::Admin > Role::Teacher);
        assert!(Role::Teacher > Role::Learner);

        assert!(Role::Admin.can_act_as(Role::Teacher));
        assert!(Role::Teacher.can_act_as(Role::Learner));
        assert!(!Role::Learner.can_act_as(Role::Teacher));
        assert!(!Role::Teacher.can_act_as(Role::Admin));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("teacher").unwrap(), Role::Teacher);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert!(Role::from_str("janitor").is_err());
    }

    #[test]
    fn test_authenticate_defaults_to_learner() {
        let auth = authenticate(&token("learner-1", None, 3600), SECRET, &[]).unwrap();
        assert_eq!(auth.subject, "learner-1");
        assert_eq!(auth.role, Role::Learner);
    }

    #[test]
    fn test_configured_admin_is_promoted() {
        let admins = vec!["ops-1".to_string()];
        let auth = authenticate(&token("ops-1", Some("teacher"), 3600), SECRET, &admins).unwrap();
        assert!(auth.is_admin());
    }

    #[test]
    fn test_expired_token_rejected() {
        let result = authenticate(&token("learner-1", None, -3600), SECRET, &[]);
        assert!(matches!(result, Err(LmsError::Authentication(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let result = authenticate(
            &token("learner-1", None, 3600),
            "ffffffffffffffffffffffffffffffff",
            &[],
        );
        assert!(result.is_err());
    }
}
