use spin_sdk::http::{Request, Response};
use uuid::Uuid;
use std::collections::BTreeMap;
use crate::models::models::{Comment, CommentView, Post, User};
use crate::core::db::{self, KeyValue};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso, sanitize_text, store, validate_uuid};
use crate::auth::require_actor;
use crate::posts::author_view;
use crate::config::*;

fn expand(store: &impl KeyValue, comment: &Comment) -> anyhow::Result<Option<CommentView>> {
    Ok(author_view(store, &comment.comment_by)?.map(|author| CommentView::from(comment, author)))
}

pub fn post_comment(
    store: &impl KeyValue,
    post_id: &str,
    author_id: &str,
    text: &str,
) -> Result<Comment, ApiError> {
    let text = sanitize_text(text);
    let text = text.trim();

    let mut errors = BTreeMap::new();
    if text.is_empty() {
        errors.insert("text".to_string(), "Comment text is required.".to_string());
    } else if text.chars().count() > MAX_COMMENT_LENGTH {
        errors.insert(
            "text".to_string(),
            "Comment can't have a length more than 500 characters".to_string(),
        );
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    if db::get_json::<Post>(store, &post_key(post_id))?.is_none() {
        return Err(ApiError::NotFound("Post does not exist.".to_string()));
    }
    if db::get_json::<User>(store, &user_key(author_id))?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let comment = Comment {
        id: id.clone(),
        post_id: post_id.to_string(),
        comment_by: author_id.to_string(),
        text: text.to_string(),
        liked_by: Vec::new(),
        created_at: now_iso(),
    };

    db::set_json(store, &comment_key(&id), &comment)?;

    let mut comments: Vec<String> =
        db::get_json(store, &post_comments_key(post_id))?.unwrap_or_default();
    comments.insert(0, id);
    db::set_json(store, &post_comments_key(post_id), &comments)?;

    Ok(comment)
}

pub fn post_comments(store: &impl KeyValue, post_id: &str) -> Result<Vec<CommentView>, ApiError> {
    let comment_ids: Vec<String> =
        db::get_json(store, &post_comments_key(post_id))?.unwrap_or_default();

    let mut comments: Vec<Comment> = Vec::new();
    for id in comment_ids {
        if let Some(comment) = db::get_json::<Comment>(store, &comment_key(&id))? {
            comments.push(comment);
        }
    }
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut views = Vec::new();
    for comment in &comments {
        if let Some(view) = expand(store, comment)? {
            views.push(view);
        }
    }
    Ok(views)
}

pub fn like_comment(
    store: &impl KeyValue,
    comment_id: &str,
    user_id: &str,
) -> Result<CommentView, ApiError> {
    let mut comment = match db::get_json::<Comment>(store, &comment_key(comment_id))? {
        Some(comment) => comment,
        None => return Err(ApiError::NotFound("Comment does not exist.".to_string())),
    };

    if db::set_insert(&mut comment.liked_by, user_id) {
        db::set_json(store, &comment_key(comment_id), &comment)?;
    }

    match expand(store, &comment)? {
        Some(view) => Ok(view),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

pub fn unlike_comment(
    store: &impl KeyValue,
    comment_id: &str,
    user_id: &str,
) -> Result<CommentView, ApiError> {
    let mut comment = match db::get_json::<Comment>(store, &comment_key(comment_id))? {
        Some(comment) => comment,
        None => return Err(ApiError::NotFound("Comment does not exist.".to_string())),
    };

    if db::set_remove(&mut comment.liked_by, user_id) {
        db::set_json(store, &comment_key(comment_id), &comment)?;
    }

    match expand(store, &comment)? {
        Some(view) => Ok(view),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

// === HTTP handlers ===

pub fn handle_post_comment(req: Request, post_id: &str) -> anyhow::Result<Response> {
    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let user_id = value["user_id"].as_str().unwrap_or_default();
    let text = value["text"].as_str().unwrap_or_default();

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    match post_comment(&store, post_id, user_id, text) {
        Ok(comment) => {
            let view = expand(&store, &comment)?;
            json_response(
                200,
                &serde_json::json!({"message": "Comment posted successfully.", "comment": view}),
            )
        }
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_post_comments(post_id: &str) -> anyhow::Result<Response> {
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    let store = store();
    match post_comments(&store, post_id) {
        Ok(comments) => json_response(
            200,
            &serde_json::json!({"message": "Comments fetched successfully", "comments": comments}),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_like_comment(req: Request, comment_id: &str) -> anyhow::Result<Response> {
    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let user_id = value["user_id"].as_str().unwrap_or_default();

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    match like_comment(&store, comment_id, user_id) {
        Ok(comment) => json_response(
            200,
            &serde_json::json!({"message": "Liked comment", "comment": comment}),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_unlike_comment(req: Request, comment_id: &str) -> anyhow::Result<Response> {
    let store = store();
    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let user_id = value["user_id"].as_str().unwrap_or_default();

    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    match unlike_comment(&store, comment_id, user_id) {
        Ok(comment) => json_response(
            200,
            &serde_json::json!({"message": "Unliked comment", "comment": comment}),
        ),
        Err(e) => Ok(e.into()),
    }
}
