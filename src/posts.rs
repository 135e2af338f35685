use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use std::collections::BTreeMap;
use crate::models::models::{AuthorView, Post, PostCategory, PostView, User};
use crate::core::db::{self, KeyValue, Txn};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso, sanitize_text, store, validate_uuid};
use crate::auth::require_actor;
use crate::config::*;

/// Expansion step for referenced authors: a separate fetch after the
/// primary read, never an implicit join.
pub fn author_view(store: &impl KeyValue, user_id: &str) -> anyhow::Result<Option<AuthorView>> {
    let user: Option<User> = db::get_json(store, &user_key(user_id))?;
    Ok(user.map(|u| AuthorView::from(&u)))
}

/// A post whose author document has vanished is unrenderable and treated as
/// absent.
pub fn expand(store: &impl KeyValue, post: &Post) -> anyhow::Result<Option<PostView>> {
    Ok(author_view(store, &post.posted_by)?.map(|author| PostView::from(post, author)))
}

fn check_post_text(text: &str, errors: &mut BTreeMap<String, String>) {
    if text.is_empty() {
        errors.insert(
            "text".to_string(),
            "Post text can't be an empty string.".to_string(),
        );
    } else if text.chars().count() > MAX_POST_LENGTH {
        errors.insert(
            "text".to_string(),
            "Post text exceeds 500 characters limit".to_string(),
        );
    }
}

pub fn create_post(
    store: &impl KeyValue,
    owner_id: &str,
    text: &str,
    category: &str,
    image: Option<String>,
) -> Result<Post, ApiError> {
    let mut errors = BTreeMap::new();

    let text = sanitize_text(text);
    let text = text.trim();
    check_post_text(text, &mut errors);

    let category = match PostCategory::parse(category) {
        Some(category) => category,
        None => {
            errors.insert("category".to_string(), "Invalid post category.".to_string());
            return Err(ApiError::Validation(errors));
        }
    };

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    if db::get_json::<User>(store, &user_key(owner_id))?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let post = Post {
        id: id.clone(),
        posted_by: owner_id.to_string(),
        text: text.to_string(),
        category,
        image,
        liked_by: Vec::new(),
        created_at: now_iso(),
        updated_at: None,
    };

    db::set_json(store, &post_key(&id), &post)?;

    // Newest first, like every listing built on this index.
    let mut posts: Vec<String> = db::get_json(store, POSTS_LIST_KEY)?.unwrap_or_default();
    posts.insert(0, id);
    db::set_json(store, POSTS_LIST_KEY, &posts)?;

    Ok(post)
}

/// `Ok(None)` means the caller is not the owner; the stored post is left
/// untouched and the API layer maps it to a not-permitted response.
pub fn update_post(
    store: &impl KeyValue,
    owner_id: &str,
    post_id: &str,
    text: &str,
) -> Result<Option<Post>, ApiError> {
    let mut post = match db::get_json::<Post>(store, &post_key(post_id))? {
        Some(post) => post,
        None => return Err(ApiError::NotFound("Post does not exist.".to_string())),
    };

    if post.posted_by != owner_id {
        return Ok(None);
    }

    let mut errors = BTreeMap::new();
    let text = sanitize_text(text);
    let text = text.trim();
    check_post_text(text, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    post.text = text.to_string();
    post.updated_at = Some(now_iso());
    db::set_json(store, &post_key(post_id), &post)?;

    Ok(Some(post))
}

/// Deletes the post and scrubs its id from every user's bookmarks in one
/// transaction; a failure part-way restores everything.
pub fn delete_post(
    store: &impl KeyValue,
    owner_id: &str,
    post_id: &str,
) -> Result<Option<Post>, ApiError> {
    let post = match db::get_json::<Post>(store, &post_key(post_id))? {
        Some(post) => post,
        None => return Err(ApiError::NotFound("Post does not exist.".to_string())),
    };

    if post.posted_by != owner_id {
        return Ok(None);
    }

    let posts: Vec<String> = db::get_json(store, POSTS_LIST_KEY)?.unwrap_or_default();
    let remaining: Vec<String> = posts.into_iter().filter(|id| id != post_id).collect();
    let users: Vec<String> = db::get_json(store, USERS_LIST_KEY)?.unwrap_or_default();

    let mut txn = Txn::begin(store);
    let written = (|| {
        txn.delete(&post_key(post_id))?;
        txn.set_json(POSTS_LIST_KEY, &remaining)?;
        for user_id in &users {
            if let Some(mut user) = db::get_json::<User>(store, &user_key(user_id))? {
                if db::set_remove(&mut user.bookmarked_posts, post_id) {
                    txn.set_json(&user_key(user_id), &user)?;
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })();

    match written {
        Ok(()) => {
            txn.commit();
            Ok(Some(post))
        }
        Err(err) => {
            log::error!("delete transaction failed, rolling back: {}", err);
            txn.rollback();
            Err(ApiError::Transient(
                "Could not delete the post. Please retry.".to_string(),
            ))
        }
    }
}

pub fn like_post(store: &impl KeyValue, post_id: &str, user_id: &str) -> Result<PostView, ApiError> {
    let mut post = match db::get_json::<Post>(store, &post_key(post_id))? {
        Some(post) => post,
        None => return Err(ApiError::NotFound("Post does not exist.".to_string())),
    };

    if db::set_insert(&mut post.liked_by, user_id) {
        db::set_json(store, &post_key(post_id), &post)?;
    }

    match expand(store, &post)? {
        Some(view) => Ok(view),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

pub fn unlike_post(store: &impl KeyValue, post_id: &str, user_id: &str) -> Result<PostView, ApiError> {
    let mut post = match db::get_json::<Post>(store, &post_key(post_id))? {
        Some(post) => post,
        None => return Err(ApiError::NotFound("Post does not exist.".to_string())),
    };

    if db::set_remove(&mut post.liked_by, user_id) {
        db::set_json(store, &post_key(post_id), &post)?;
    }

    match expand(store, &post)? {
        Some(view) => Ok(view),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

pub fn fetch_post(store: &impl KeyValue, post_id: &str) -> Result<Option<PostView>, ApiError> {
    let post = match db::get_json::<Post>(store, &post_key(post_id))? {
        Some(post) => post,
        None => return Ok(None),
    };
    Ok(expand(store, &post)?)
}

pub fn user_posts(store: &impl KeyValue, user_id: &str) -> Result<Vec<PostView>, ApiError> {
    let post_ids: Vec<String> = db::get_json(store, POSTS_LIST_KEY)?.unwrap_or_default();

    let mut posts: Vec<Post> = Vec::new();
    for id in post_ids {
        if let Some(post) = db::get_json::<Post>(store, &post_key(&id))? {
            if post.posted_by == user_id {
                posts.push(post);
            }
        }
    }
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut views = Vec::new();
    for post in &posts {
        if let Some(view) = expand(store, post)? {
            views.push(view);
        }
    }
    Ok(views)
}

// === HTTP handlers ===

pub fn handle_create_post(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let posted_by = value["posted_by"].as_str().unwrap_or_default();
    let text = value["text"].as_str().unwrap_or_default();
    let category = value["category"].as_str().unwrap_or_default();
    let image = value["image"].as_str().map(|s| s.to_string());

    if posted_by.is_empty() || !validate_uuid(posted_by) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }
    if let Err(e) = require_actor(&store, &req, posted_by) {
        return Ok(e.into());
    }

    match create_post(&store, posted_by, text, category, image) {
        Ok(post) => {
            let view = expand(&store, &post)?;
            json_response(
                201,
                &serde_json::json!({"message": "Post created successfully", "post": view}),
            )
        }
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_get_post(post_id: &str) -> anyhow::Result<Response> {
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();
    match fetch_post(&store, post_id) {
        Ok(Some(post)) => json_response(
            200,
            &serde_json::json!({"message": "Post fetched successfully.", "post": post}),
        ),
        Ok(None) => Ok(ApiError::NotFound("Post does not exist.".to_string()).into()),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_user_posts(user_id: &str) -> anyhow::Result<Response> {
    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    let store = store();
    match user_posts(&store, user_id) {
        Ok(posts) if posts.is_empty() => {
            Ok(ApiError::NotFound("Nothing posted yet.".to_string()).into())
        }
        Ok(posts) => json_response(
            200,
            &serde_json::json!({"message": "Posts fetched successfully.", "posts": posts}),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_update_post(req: Request, user_id: &str, post_id: &str) -> anyhow::Result<Response> {
    let store = store();
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let text = value["text"].as_str().unwrap_or_default();

    match update_post(&store, user_id, post_id, text) {
        Ok(Some(post)) => json_response(
            201,
            &serde_json::json!({"message": "Post upadated successfully", "post": post}),
        ),
        Ok(None) => Ok(ApiError::not_permitted().into()),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_delete_post(req: Request, user_id: &str, post_id: &str) -> anyhow::Result<Response> {
    let store = store();
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    match delete_post(&store, user_id, post_id) {
        Ok(Some(post)) => json_response(
            201,
            &serde_json::json!({"message": "Post deleted successfully.", "post": post}),
        ),
        Ok(None) => Ok(ApiError::not_permitted().into()),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_like_post(req: Request, post_id: &str) -> anyhow::Result<Response> {
    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let user_id = value["user_id"].as_str().unwrap_or_default();

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    match like_post(&store, post_id, user_id) {
        Ok(post) => json_response(200, &serde_json::json!({"message": "Post liked", "post": post})),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_unlike_post(req: Request, post_id: &str) -> anyhow::Result<Response> {
    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let user_id = value["user_id"].as_str().unwrap_or_default();

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    match unlike_post(&store, post_id, user_id) {
        Ok(post) => {
            json_response(200, &serde_json::json!({"message": "Post unliked", "post": post}))
        }
        Err(e) => Ok(e.into()),
    }
}
