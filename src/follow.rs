use spin_sdk::http::{Request, Response};
use crate::models::models::{AuthorView, User, UserView};
use crate::core::db::{self, KeyValue, Txn};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso, store, validate_uuid};
use crate::auth::require_actor;
use crate::config::*;

fn load_user(store: &impl KeyValue, id: &str, missing: &str) -> Result<User, ApiError> {
    match db::get_json::<User>(store, &user_key(id))? {
        Some(user) => Ok(user),
        None => Err(ApiError::NotFound(missing.to_string())),
    }
}

/// Record the relationship on both user documents. Following someone puts
/// them in the actor's `following` set and the actor in their `followers`
/// set; both writes land or neither does.
pub fn follow_user(
    store: &impl KeyValue,
    actor_id: &str,
    target_id: &str,
) -> Result<User, ApiError> {
    if actor_id == target_id {
        return Err(ApiError::BadRequest("Invalid target user".to_string()));
    }

    let mut actor = load_user(store, actor_id, "User not found")?;
    let mut target = load_user(store, target_id, "Target user not found")?;

    let added_following = db::set_insert(&mut actor.following, target_id);
    let added_follower = db::set_insert(&mut target.followers, actor_id);
    if !added_following && !added_follower {
        // Already following: a repeat call is a no-op success.
        return Ok(actor);
    }

    let now = now_iso();
    actor.updated_at = now.clone();
    target.updated_at = now;

    let mut txn = Txn::begin(store);
    let written = (|| {
        txn.set_json(&user_key(actor_id), &actor)?;
        txn.set_json(&user_key(target_id), &target)
    })();

    match written {
        Ok(()) => {
            txn.commit();
            Ok(actor)
        }
        Err(err) => {
            log::error!("follow transaction failed, rolling back: {}", err);
            txn.rollback();
            Err(ApiError::Transient(
                "Could not update follow relationship. Please retry.".to_string(),
            ))
        }
    }
}

pub fn unfollow_user(
    store: &impl KeyValue,
    actor_id: &str,
    target_id: &str,
) -> Result<User, ApiError> {
    let mut actor = load_user(store, actor_id, "User not found")?;
    let mut target = load_user(store, target_id, "Target user not found")?;

    let removed_following = db::set_remove(&mut actor.following, target_id);
    let removed_follower = db::set_remove(&mut target.followers, actor_id);
    if !removed_following && !removed_follower {
        return Ok(actor);
    }

    let now = now_iso();
    actor.updated_at = now.clone();
    target.updated_at = now;

    let mut txn = Txn::begin(store);
    let written = (|| {
        txn.set_json(&user_key(actor_id), &actor)?;
        txn.set_json(&user_key(target_id), &target)
    })();

    match written {
        Ok(()) => {
            txn.commit();
            Ok(actor)
        }
        Err(err) => {
            log::error!("unfollow transaction failed, rolling back: {}", err);
            txn.rollback();
            Err(ApiError::Transient(
                "Could not update follow relationship. Please retry.".to_string(),
            ))
        }
    }
}

/// Up to `limit` accounts the user does not already follow, most-followed
/// first. Ties keep their registration order (stable sort).
pub fn follow_suggestions(
    store: &impl KeyValue,
    user_id: &str,
    limit: usize,
) -> Result<Vec<AuthorView>, ApiError> {
    let user = load_user(store, user_id, "User not found")?;

    let users: Vec<String> = db::get_json(store, USERS_LIST_KEY)?.unwrap_or_default();
    let mut candidates: Vec<User> = Vec::new();
    for id in users {
        if id == user_id || user.following.iter().any(|followed| *followed == id) {
            continue;
        }
        if let Some(candidate) = db::get_json::<User>(store, &user_key(&id))? {
            candidates.push(candidate);
        }
    }

    candidates.sort_by(|a, b| b.followers.len().cmp(&a.followers.len()));

    Ok(candidates
        .iter()
        .take(limit)
        .map(AuthorView::from)
        .collect())
}

// === HTTP handlers ===

pub fn handle_follow(req: Request, user_id: &str) -> anyhow::Result<Response> {
    let store = store();
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let follow_id = value["follow_id"].as_str().unwrap_or_default();
    if follow_id.is_empty() || !validate_uuid(follow_id) {
        return Ok(ApiError::BadRequest("Invalid target user".to_string()).into());
    }

    match follow_user(&store, user_id, follow_id) {
        Ok(user) => json_response(
            200,
            &serde_json::json!({"message": "Started following", "user": UserView::from(&user)}),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_unfollow(req: Request, user_id: &str) -> anyhow::Result<Response> {
    let store = store();
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }

    let value: serde_json::Value = serde_json::from_slice(req.body())?;
    let unfollow_id = value["unfollow_id"].as_str().unwrap_or_default();
    if unfollow_id.is_empty() || !validate_uuid(unfollow_id) {
        return Ok(ApiError::BadRequest("Invalid target user".to_string()).into());
    }

    match unfollow_user(&store, user_id, unfollow_id) {
        Ok(user) => json_response(
            200,
            &serde_json::json!({"message": "Unfollowed", "user": UserView::from(&user)}),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_suggestions(user_id: &str) -> anyhow::Result<Response> {
    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    let store = store();
    match follow_suggestions(&store, user_id, SUGGESTION_LIMIT) {
        Ok(users) if users.is_empty() => {
            json_response(200, &serde_json::json!({"message": "No users to follow."}))
        }
        Ok(users) => json_response(
            200,
            &serde_json::json!({
                "message": "Follow suggestions fetched successfully.",
                "users": users,
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemStore;
    use crate::users::tests::seed_user;

    fn reload(store: &impl KeyValue, id: &str) -> User {
        db::get_json(store, &user_key(id)).unwrap().expect("user exists")
    }

    #[test]
    fn follow_links_both_directions() {
        let store = MemStore::new();
        let a = seed_user(&store, "a");
        let b = seed_user(&store, "b");

        follow_user(&store, &a.id, &b.id).unwrap();

        let a = reload(&store, &a.id);
        let b = reload(&store, &b.id);
        assert!(a.following.contains(&b.id));
        assert!(b.followers.contains(&a.id));
        assert!(a.followers.is_empty());
        assert!(b.following.is_empty());
    }

    #[test]
    fn follow_twice_equals_follow_once() {
        let store = MemStore::new();
        let a = seed_user(&store, "a");
        let b = seed_user(&store, "b");

        follow_user(&store, &a.id, &b.id).unwrap();
        follow_user(&store, &a.id, &b.id).unwrap();

        let a = reload(&store, &a.id);
        let b = reload(&store, &b.id);
        assert_eq!(a.following.iter().filter(|id| **id == b.id).count(), 1);
        assert_eq!(b.followers.iter().filter(|id| **id == a.id).count(), 1);
    }

    #[test]
    fn unfollow_unlinks_both_directions() {
        let store = MemStore::new();
        let a = seed_user(&store, "a");
        let b = seed_user(&store, "b");

        follow_user(&store, &a.id, &b.id).unwrap();
        unfollow_user(&store, &a.id, &b.id).unwrap();

        let a = reload(&store, &a.id);
        let b = reload(&store, &b.id);
        assert!(!a.following.contains(&b.id));
        assert!(!b.followers.contains(&a.id));

        // Unfollowing again is still a success.
        unfollow_user(&store, &a.id, &b.id).unwrap();
    }

    #[test]
    fn cannot_follow_yourself() {
        let store = MemStore::new();
        let a = seed_user(&store, "a");

        assert!(matches!(
            follow_user(&store, &a.id, &a.id),
            Err(ApiError::BadRequest(_))
        ));
        assert!(reload(&store, &a.id).following.is_empty());
    }

    #[test]
    fn follow_missing_user_is_not_found() {
        let store = MemStore::new();
        let a = seed_user(&store, "a");

        assert!(matches!(
            follow_user(&store, &a.id, "missing"),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            follow_user(&store, "missing", &a.id),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn suggestions_exclude_self_and_followed() {
        let store = MemStore::new();
        let me = seed_user(&store, "me");
        let followed = seed_user(&store, "followed");
        let popular = seed_user(&store, "popular");
        let quiet = seed_user(&store, "quiet");

        follow_user(&store, &me.id, &followed.id).unwrap();
        // Give "popular" two followers so ordering is observable.
        follow_user(&store, &followed.id, &popular.id).unwrap();
        follow_user(&store, &quiet.id, &popular.id).unwrap();

        let suggestions = follow_suggestions(&store, &me.id, SUGGESTION_LIMIT).unwrap();
        let ids: Vec<&str> = suggestions.iter().map(|s| s.id.as_str()).collect();

        assert!(!ids.contains(&me.id.as_str()));
        assert!(!ids.contains(&followed.id.as_str()));
        assert_eq!(ids[0], popular.id.as_str());
        assert!(ids.contains(&quiet.id.as_str()));
    }

    #[test]
    fn suggestions_respect_the_limit() {
        let store = MemStore::new();
        let me = seed_user(&store, "me");
        for i in 0..8 {
            seed_user(&store, &format!("user{}", i));
        }

        let suggestions = follow_suggestions(&store, &me.id, 5).unwrap();
        assert_eq!(suggestions.len(), 5);
    }

    #[test]
    fn suggestions_empty_when_no_candidates() {
        let store = MemStore::new();
        let me = seed_user(&store, "me");
        let only = seed_user(&store, "only");
        follow_user(&store, &me.id, &only.id).unwrap();

        let suggestions = follow_suggestions(&store, &me.id, 5).unwrap();
        assert!(suggestions.is_empty());
    }
}
