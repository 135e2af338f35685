use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use crate::models::models::{User, UserView};
use crate::core::db::{self, KeyValue};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso, sanitize_text, store, validate_uuid};
use crate::core::query_params::{get_string, parse_query_params};
use crate::auth::require_actor;
use crate::config::*;

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^\w+([\.-]?\w+)*@\w+([\.-]?\w+)*(\.\w{2,3})+$").expect("Regex should compile")
    })
}

fn phone_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[7-9][0-9]{9}$").expect("Regex should compile"))
}

fn website_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^https?://[^\s]+$").expect("Regex should compile"))
}

#[derive(Deserialize, Default)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ProfileUpdate {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar: Option<String>,
}

pub fn find_by_username(store: &impl KeyValue, username: &str) -> anyhow::Result<Option<User>> {
    let users: Vec<String> = db::get_json(store, USERS_LIST_KEY)?.unwrap_or_default();
    for id in users {
        if let Some(user) = db::get_json::<User>(store, &user_key(&id))? {
            if user.username == username {
                return Ok(Some(user));
            }
        }
    }
    Ok(None)
}

pub fn username_available(store: &impl KeyValue, username: &str) -> anyhow::Result<bool> {
    Ok(find_by_username(store, username)?.is_none())
}

fn check_email(email: &str, errors: &mut BTreeMap<String, String>) {
    if email.is_empty() {
        errors.insert("email".to_string(), "Email is required.".to_string());
    } else if !email_regex().is_match(email) {
        errors.insert(
            "email".to_string(),
            "Please fill a valid email address".to_string(),
        );
    }
}

fn check_phone(phone: &str, errors: &mut BTreeMap<String, String>) {
    if phone.is_empty() {
        errors.insert(
            "phone_number".to_string(),
            "Phone number is required".to_string(),
        );
    } else if !phone_regex().is_match(phone) {
        errors.insert(
            "phone_number".to_string(),
            "Please fill a valid phone number".to_string(),
        );
    }
}

fn check_bio(bio: &str, errors: &mut BTreeMap<String, String>) {
    if bio.chars().count() > MAX_BIO_LENGTH {
        errors.insert(
            "bio".to_string(),
            "Bio exceeds 250 characters length limit.".to_string(),
        );
    }
}

fn check_website(website: &str, errors: &mut BTreeMap<String, String>) {
    if !website_regex().is_match(website) {
        errors.insert(
            "website".to_string(),
            "Please fill a valid website link".to_string(),
        );
    }
}

pub fn create_user(store: &impl KeyValue, new_user: SignupRequest) -> Result<User, ApiError> {
    let mut errors = BTreeMap::new();

    let username = sanitize_text(new_user.username.trim());
    if username.is_empty() {
        errors.insert("username".to_string(), "Username is required.".to_string());
    } else if username.chars().count() < MIN_USERNAME_LENGTH
        || username.chars().count() > MAX_USERNAME_LENGTH
    {
        errors.insert(
            "username".to_string(),
            "Username must be 3-50 characters.".to_string(),
        );
    }

    let fullname = sanitize_text(new_user.fullname.trim());
    if fullname.is_empty() {
        errors.insert("fullname".to_string(), "Full name is required.".to_string());
    }

    check_email(&new_user.email, &mut errors);
    check_phone(&new_user.phone_number, &mut errors);

    let bio = new_user.bio.map(|b| sanitize_text(b.trim()));
    if let Some(bio) = &bio {
        check_bio(bio, &mut errors);
    }
    let website = new_user.website.filter(|w| !w.is_empty());
    if let Some(website) = &website {
        check_website(website, &mut errors);
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let existing_users: Vec<String> = db::get_json(store, USERS_LIST_KEY)?.unwrap_or_default();
    for id in &existing_users {
        if let Some(user) = db::get_json::<User>(store, &user_key(id))? {
            if user.username == username {
                return Err(ApiError::Conflict("Username exists".to_string()));
            }
        }
    }

    let id = Uuid::new_v4().to_string();
    let now = now_iso();
    let user = User {
        id: id.clone(),
        username,
        fullname,
        password: None,
        email: new_user.email,
        phone_number: new_user.phone_number,
        bio: bio.filter(|b| !b.is_empty()),
        website,
        avatar: new_user.avatar,
        followers: Vec::new(),
        following: Vec::new(),
        bookmarked_posts: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
    };

    db::set_json(store, &user_key(&id), &user)?;

    let mut users = existing_users;
    users.push(id);
    db::set_json(store, USERS_LIST_KEY, &users)?;

    Ok(user)
}

pub fn fetch_profile(store: &impl KeyValue, profile_id: &str) -> Result<Option<User>, ApiError> {
    Ok(db::get_json(store, &user_key(profile_id))?)
}

pub fn update_profile(
    store: &impl KeyValue,
    user_id: &str,
    fields: ProfileUpdate,
) -> Result<User, ApiError> {
    let mut user = match db::get_json::<User>(store, &user_key(user_id))? {
        Some(user) => user,
        None => return Err(ApiError::NotFound("User not found!".to_string())),
    };

    let mut errors = BTreeMap::new();

    if let Some(fullname) = fields.fullname {
        let fullname = sanitize_text(fullname.trim());
        if fullname.is_empty() {
            errors.insert("fullname".to_string(), "Full name is required.".to_string());
        } else {
            user.fullname = fullname;
        }
    }
    if let Some(email) = fields.email {
        check_email(&email, &mut errors);
        user.email = email;
    }
    if let Some(phone) = fields.phone_number {
        check_phone(&phone, &mut errors);
        user.phone_number = phone;
    }
    if let Some(bio) = fields.bio {
        let bio = sanitize_text(bio.trim());
        check_bio(&bio, &mut errors);
        user.bio = if bio.is_empty() { None } else { Some(bio) };
    }
    if let Some(website) = fields.website {
        if website.is_empty() {
            user.website = None;
        } else {
            check_website(&website, &mut errors);
            user.website = Some(website);
        }
    }
    if let Some(avatar) = fields.avatar {
        user.avatar = if avatar.is_empty() { None } else { Some(avatar) };
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    user.updated_at = now_iso();
    db::set_json(store, &user_key(user_id), &user)?;

    Ok(user)
}

// === HTTP handlers ===

pub fn handle_signup(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let new_user: SignupRequest = serde_json::from_slice(req.body())?;

    match create_user(&store, new_user) {
        Ok(user) => json_response(
            201,
            &serde_json::json!({
                "message": "User registered successfully.",
                "user": UserView::from(&user),
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_check_username(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let params = parse_query_params(req.uri());
    let username = match get_string(&params, "username", None) {
        Some(username) if !username.is_empty() => username,
        _ => return Ok(ApiError::BadRequest("Username is required.".to_string()).into()),
    };

    let available = username_available(&store, &username)?;
    let message = if available {
        format!("{} is available", username)
    } else {
        format!("{} is already taken.", username)
    };
    json_response(
        200,
        &serde_json::json!({"message": message, "available_status": available}),
    )
}

pub fn handle_get_profile(profile_id: &str) -> anyhow::Result<Response> {
    if profile_id.is_empty() || !validate_uuid(profile_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    let store = store();
    match fetch_profile(&store, profile_id) {
        Ok(Some(user)) => json_response(
            200,
            &serde_json::json!({
                "message": "User profile fetched successfully.",
                "profile": UserView::from(&user),
            }),
        ),
        Ok(None) => Ok(ApiError::NotFound("User not found!".to_string()).into()),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_update_profile(req: Request, user_id: &str) -> anyhow::Result<Response> {
    let store = store();
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    let fields: ProfileUpdate = serde_json::from_slice(req.body())?;
    match update_profile(&store, user_id, fields) {
        Ok(user) => json_response(
            200,
            &serde_json::json!({
                "message": "Profile updated successfully.",
                "user": UserView::from(&user),
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::core::db::MemStore;

    pub fn signup(username: &str) -> SignupRequest {
        SignupRequest {
            username: username.to_string(),
            fullname: format!("{} Example", username),
            email: format!("{}@example.com", username),
            phone_number: "9876543210".to_string(),
            bio: None,
            website: None,
            avatar: None,
        }
    }

    pub fn seed_user(store: &impl KeyValue, username: &str) -> User {
        create_user(store, signup(username)).expect("seed user")
    }

    #[test]
    fn signup_reports_every_violated_field() {
        let store = MemStore::new();
        let request = SignupRequest {
            username: String::new(),
            fullname: String::new(),
            email: "not-an-email".to_string(),
            phone_number: "12345".to_string(),
            bio: Some("x".repeat(MAX_BIO_LENGTH + 1)),
            website: Some("ftp://example.com".to_string()),
            avatar: None,
        };

        match create_user(&store, request) {
            Err(ApiError::Validation(errors)) => {
                for field in ["username", "fullname", "email", "phone_number", "bio", "website"] {
                    assert!(errors.contains_key(field), "missing field {}", field);
                }
            }
            other => panic!("expected validation error, got {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn signup_rejects_duplicate_username() {
        let store = MemStore::new();
        seed_user(&store, "dana");

        match create_user(&store, signup("dana")) {
            Err(ApiError::Conflict(_)) => {}
            other => panic!("expected conflict, got {:?}", other.map(|u| u.id)),
        }
    }

    #[test]
    fn signup_accepts_valid_optional_fields() {
        let store = MemStore::new();
        let mut request = signup("dana");
        request.bio = Some("  likes birds  ".to_string());
        request.website = Some("https://dana.example.com".to_string());

        let user = create_user(&store, request).unwrap();
        assert_eq!(user.bio.as_deref(), Some("likes birds"));
        assert_eq!(user.website.as_deref(), Some("https://dana.example.com"));
        assert!(user.password.is_none());
    }

    #[test]
    fn empty_bio_collapses_to_absent() {
        let store = MemStore::new();
        let mut request = signup("dana");
        request.bio = Some("   ".to_string());

        let user = create_user(&store, request).unwrap();
        assert!(user.bio.is_none());
    }

    #[test]
    fn profile_update_revalidates_fields() {
        let store = MemStore::new();
        let user = seed_user(&store, "dana");

        let bad = ProfileUpdate {
            email: Some("broken".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            update_profile(&store, &user.id, bad),
            Err(ApiError::Validation(_))
        ));

        let good = ProfileUpdate {
            bio: Some("new bio".to_string()),
            website: Some("https://example.org".to_string()),
            ..Default::default()
        };
        let updated = update_profile(&store, &user.id, good).unwrap();
        assert_eq!(updated.bio.as_deref(), Some("new bio"));
        assert_eq!(updated.website.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn views_never_carry_the_password() {
        let store = MemStore::new();
        let mut user = seed_user(&store, "dana");
        user.password = Some("hash".to_string());

        let serialized = serde_json::to_value(UserView::from(&user)).unwrap();
        assert!(serialized.get("password").is_none());

        let profile = serde_json::to_string(&UserView::from(&user)).unwrap();
        assert!(!profile.contains("password"));
    }

    #[test]
    fn username_availability_probe() {
        let store = MemStore::new();
        assert!(username_available(&store, "dana").unwrap());
        seed_user(&store, "dana");
        assert!(!username_available(&store, "dana").unwrap());
    }
}
