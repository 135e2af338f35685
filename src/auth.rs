use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use crate::models::models::{TokenData, User, UserView};
use crate::core::db::{self, KeyValue};
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, json_response, now_iso, store, verify_password};
use crate::config::*;
use crate::users::find_by_username;

pub fn issue_token(store: &impl KeyValue, user_id: &str) -> anyhow::Result<String> {
    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: now_iso(),
    };
    db::set_json(store, &token_key(&token), &data)?;

    let mut tokens: Vec<String> = db::get_json(store, TOKENS_LIST_KEY)?.unwrap_or_default();
    tokens.push(token.clone());
    db::set_json(store, TOKENS_LIST_KEY, &tokens)?;

    Ok(token)
}

/// Delete every token issued to a user. Called when the password changes.
pub fn revoke_user_tokens(store: &impl KeyValue, user_id: &str) -> anyhow::Result<()> {
    let tokens: Vec<String> = db::get_json(store, TOKENS_LIST_KEY)?.unwrap_or_default();

    let mut kept = Vec::new();
    for token in tokens {
        match db::get_json::<TokenData>(store, &token_key(&token))? {
            Some(data) if data.user_id == user_id => {
                store.delete(&token_key(&token))?;
            }
            _ => kept.push(token),
        }
    }
    db::set_json(store, TOKENS_LIST_KEY, &kept)?;

    Ok(())
}

/// Resolve a token to its user id. Expired tokens and tokens whose account
/// no longer exists resolve to None.
pub fn token_user(store: &impl KeyValue, token: &str) -> anyhow::Result<Option<String>> {
    let data = match db::get_json::<TokenData>(store, &token_key(token))? {
        Some(data) => data,
        None => return Ok(None),
    };

    if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&data.created_at) {
        let age_hours = (chrono::Utc::now() - created.with_timezone(&chrono::Utc)).num_hours();
        if age_hours > token_expiration_hours() {
            return Ok(None);
        }
    }

    let user: Option<User> = db::get_json(store, &user_key(&data.user_id))?;
    Ok(user.map(|u| u.id))
}

pub fn login(store: &impl KeyValue, username: &str, password: &str) -> Result<(String, User), ApiError> {
    let user = match find_by_username(store, username)? {
        Some(user) => user,
        None => return Err(ApiError::NotFound("User doesn't exist".to_string())),
    };

    let hash = match &user.password {
        Some(hash) => hash.clone(),
        None => {
            return Err(ApiError::Forbidden(
                "Please set a password for your account!!".to_string(),
            ))
        }
    };

    if !verify_password(password, &hash) {
        return Err(ApiError::Unauthorized);
    }

    let token = issue_token(store, &user.id)?;
    Ok((token, user))
}

pub fn logout(store: &impl KeyValue, token: &str) -> Result<(), ApiError> {
    store.delete(&token_key(token))?;

    let tokens: Vec<String> = db::get_json(store, TOKENS_LIST_KEY)?.unwrap_or_default();
    let kept: Vec<String> = tokens.into_iter().filter(|t| t != token).collect();
    db::set_json(store, TOKENS_LIST_KEY, &kept)?;

    Ok(())
}

/// The one place a password hash is computed. Existing sessions die with it.
pub fn set_password(store: &impl KeyValue, username: &str, password: &str) -> Result<User, ApiError> {
    let mut user = match find_by_username(store, username)? {
        Some(user) => user,
        None => return Err(ApiError::NotFound("User doesn't exist".to_string())),
    };

    if password.len() < MIN_PASSWORD_LENGTH {
        let mut errors = std::collections::BTreeMap::new();
        errors.insert(
            "password".to_string(),
            "Password must be at least 3 characters.".to_string(),
        );
        return Err(ApiError::Validation(errors));
    }

    user.password = Some(hash_password(password)?);
    user.updated_at = now_iso();
    db::set_json(store, &user_key(&user.id), &user)?;

    revoke_user_tokens(store, &user.id)?;

    Ok(user)
}

// === HTTP handlers ===

pub fn bearer_token(req: &Request) -> Option<String> {
    let auth_header = req.header("Authorization")?.as_str().unwrap_or_default();
    if !auth_header.starts_with("Bearer ") {
        return None;
    }
    auth_header.strip_prefix("Bearer ").map(|t| t.to_string())
}

pub fn validate_token(store: &impl KeyValue, req: &Request) -> Option<String> {
    let token = bearer_token(req)?;
    token_user(store, &token).ok()?
}

/// Mutating routes act on behalf of a specific user: the bearer token must
/// resolve to exactly that user.
pub fn require_actor(store: &impl KeyValue, req: &Request, user_id: &str) -> Result<(), ApiError> {
    match validate_token(store, req) {
        Some(actor) if actor == user_id => Ok(()),
        Some(_) => Err(ApiError::not_permitted()),
        None => Err(ApiError::Unauthorized),
    }
}

pub fn handle_login(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let creds: serde_json::Value = serde_json::from_slice(req.body())?;
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    match login(&store, username, password) {
        Ok((token, user)) => json_response(
            200,
            &serde_json::json!({
                "message": "User logged in successfully",
                "token": token,
                "user": UserView::from(&user),
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_logout(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let token = match bearer_token(&req) {
        Some(token) => token,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    match logout(&store, &token) {
        Ok(()) => json_response(200, &serde_json::json!({"message": "Logged out successfully"})),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_set_password(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let body: serde_json::Value = serde_json::from_slice(req.body())?;
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    match set_password(&store, username, password) {
        Ok(user) => json_response(
            201,
            &serde_json::json!({
                "message": "Password set successfully.",
                "user": UserView::from(&user),
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}
