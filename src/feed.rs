use spin_sdk::http::{Request, Response};
use serde::Serialize;
use std::collections::HashSet;
use crate::models::models::{Post, PostView, User, UserView};
use crate::core::db::{self, KeyValue};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, now_iso, store, validate_uuid};
use crate::core::query_params::{get_int, parse_query_params};
use crate::auth::require_actor;
use crate::posts::expand;
use crate::config::*;

#[derive(Serialize)]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_posts: usize,
}

fn load_user(store: &impl KeyValue, id: &str) -> Result<User, ApiError> {
    match db::get_json::<User>(store, &user_key(id))? {
        Some(user) => Ok(user),
        None => Err(ApiError::NotFound("User not found!".to_string())),
    }
}

/// Posts authored by anyone connected to the user in either direction,
/// followers as well as following. Newest first.
pub fn user_feed(store: &impl KeyValue, user_id: &str) -> Result<Vec<PostView>, ApiError> {
    let user = load_user(store, user_id)?;

    let mut connected: HashSet<&str> = HashSet::new();
    connected.extend(user.followers.iter().map(|id| id.as_str()));
    connected.extend(user.following.iter().map(|id| id.as_str()));

    let post_ids: Vec<String> = db::get_json(store, POSTS_LIST_KEY)?.unwrap_or_default();
    let mut posts: Vec<Post> = Vec::new();
    for id in &post_ids {
        if let Some(post) = db::get_json::<Post>(store, &post_key(id))? {
            if connected.contains(post.posted_by.as_str()) {
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

/// One page of all posts, newest first, with totals. `page` and `page_size`
/// are 1-indexed and trusted as given; the API layer clamps them.
pub fn list_posts(
    store: &impl KeyValue,
    page: usize,
    page_size: usize,
) -> Result<PostPage, ApiError> {
    let post_ids: Vec<String> = db::get_json(store, POSTS_LIST_KEY)?.unwrap_or_default();

    let mut posts: Vec<Post> = Vec::new();
    for id in &post_ids {
        if let Some(post) = db::get_json::<Post>(store, &post_key(id))? {
            posts.push(post);
        }
    }
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total_posts = posts.len();
    let total_pages = total_posts.div_ceil(page_size);
    let skip = (page - 1) * page_size;

    let mut views = Vec::new();
    for post in posts.iter().skip(skip).take(page_size) {
        if let Some(view) = expand(store, post)? {
            views.push(view);
        }
    }

    Ok(PostPage {
        posts: views,
        current_page: page,
        total_pages,
        total_posts,
    })
}

pub fn bookmark_post(
    store: &impl KeyValue,
    user_id: &str,
    post_id: &str,
) -> Result<User, ApiError> {
    let mut user = load_user(store, user_id)?;

    if db::get_json::<Post>(store, &post_key(post_id))?.is_none() {
        return Err(ApiError::NotFound("Post does not exist.".to_string()));
    }

    if db::set_insert(&mut user.bookmarked_posts, post_id) {
        user.updated_at = now_iso();
        db::set_json(store, &user_key(user_id), &user)?;
    }

    Ok(user)
}

pub fn unbookmark_post(
    store: &impl KeyValue,
    user_id: &str,
    post_id: &str,
) -> Result<User, ApiError> {
    let mut user = load_user(store, user_id)?;

    if db::set_remove(&mut user.bookmarked_posts, post_id) {
        user.updated_at = now_iso();
        db::set_json(store, &user_key(user_id), &user)?;
    }

    Ok(user)
}

pub fn bookmarked_posts(store: &impl KeyValue, user_id: &str) -> Result<Vec<PostView>, ApiError> {
    let user = load_user(store, user_id)?;

    let mut views = Vec::new();
    for post_id in &user.bookmarked_posts {
        if let Some(post) = db::get_json::<Post>(store, &post_key(post_id))? {
            if let Some(view) = expand(store, &post)? {
                views.push(view);
            }
        }
    }
    Ok(views)
}

// === HTTP handlers ===

pub fn handle_feed(user_id: &str) -> anyhow::Result<Response> {
    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    let store = store();
    match user_feed(&store, user_id) {
        Ok(posts) if posts.is_empty() => json_response(
            200,
            &serde_json::json!({"message": "Nothing in your feed.", "posts": posts}),
        ),
        Ok(posts) => json_response(
            200,
            &serde_json::json!({"message": "User feed fetched successfully.", "posts": posts}),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_list_posts(req: Request) -> anyhow::Result<Response> {
    let store = store();
    let params = parse_query_params(req.uri());
    let page = get_int(&params, "page", 1);
    let limit = get_int(&params, "limit", DEFAULT_PAGE_SIZE);

    match list_posts(&store, page, limit) {
        Ok(page) if page.total_posts == 0 => json_response(
            200,
            &serde_json::json!({"message": "No posts found.", "posts": page.posts}),
        ),
        Ok(page) => json_response(200, &page),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_bookmark(req: Request, user_id: &str, post_id: &str) -> anyhow::Result<Response> {
    let store = store();
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    match bookmark_post(&store, user_id, post_id) {
        Ok(user) => json_response(
            200,
            &serde_json::json!({
                "message": "Added to bookmarked posts.",
                "user": UserView::from(&user),
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_unbookmark(req: Request, user_id: &str, post_id: &str) -> anyhow::Result<Response> {
    let store = store();
    if let Err(e) = require_actor(&store, &req, user_id) {
        return Ok(e.into());
    }
    if post_id.is_empty() || !validate_uuid(post_id) {
        return Ok(ApiError::BadRequest("Post ID required".to_string()).into());
    }

    match unbookmark_post(&store, user_id, post_id) {
        Ok(user) => json_response(
            200,
            &serde_json::json!({
                "message": "Deleted from bookmarked posts.",
                "user": UserView::from(&user),
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}

pub fn handle_bookmarked_posts(user_id: &str) -> anyhow::Result<Response> {
    if user_id.is_empty() || !validate_uuid(user_id) {
        return Ok(ApiError::BadRequest("User ID required".to_string()).into());
    }

    let store = store();
    match bookmarked_posts(&store, user_id) {
        Ok(posts) if posts.is_empty() => json_response(
            200,
            &serde_json::json!({"message": "No posts bookmarked", "posts": posts}),
        ),
        Ok(posts) => json_response(
            200,
            &serde_json::json!({
                "message": "Bookmarked posts fetched successfully.",
                "posts": posts,
            }),
        ),
        Err(e) => Ok(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemStore;
    use crate::follow::follow_user;
    use crate::posts::tests::seed_post;
    use crate::users::tests::seed_user;

    #[test]
    fn feed_covers_both_directions_of_the_graph() {
        let store = MemStore::new();
        let me = seed_user(&store, "me");
        let followed = seed_user(&store, "followed");
        let admirer = seed_user(&store, "admirer");
        let stranger = seed_user(&store, "stranger");

        follow_user(&store, &me.id, &followed.id).unwrap();
        follow_user(&store, &admirer.id, &me.id).unwrap();

        seed_post(&store, &followed.id, "from someone I follow");
        seed_post(&store, &admirer.id, "from someone who follows me");
        seed_post(&store, &stranger.id, "unrelated");
        seed_post(&store, &me.id, "my own post");

        let feed = user_feed(&store, &me.id).unwrap();
        let authors: Vec<&str> = feed.iter().map(|p| p.posted_by.username.as_str()).collect();

        assert!(authors.contains(&"followed"));
        assert!(authors.contains(&"admirer"));
        assert!(!authors.contains(&"stranger"));
        assert!(!authors.contains(&"me"));
    }

    #[test]
    fn feed_is_newest_first() {
        let store = MemStore::new();
        let me = seed_user(&store, "me");
        let friend = seed_user(&store, "friend");
        follow_user(&store, &me.id, &friend.id).unwrap();

        seed_post(&store, &friend.id, "older");
        seed_post(&store, &friend.id, "newer");

        let feed = user_feed(&store, &me.id).unwrap();
        assert_eq!(feed.len(), 2);
        assert!(feed[0].created_at >= feed[1].created_at);
    }

    #[test]
    fn pagination_slices_and_counts() {
        let store = MemStore::new();
        let author = seed_user(&store, "author");
        for i in 0..25 {
            seed_post(&store, &author.id, &format!("post {}", i));
        }

        let page = list_posts(&store, 2, 10).unwrap();
        assert_eq!(page.posts.len(), 10);
        assert_eq!(page.total_posts, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 2);

        let all = list_posts(&store, 1, 25).unwrap();
        assert_eq!(all.posts[10].id, page.posts[0].id);
        assert_eq!(all.posts[19].id, page.posts[9].id);

        let last = list_posts(&store, 3, 10).unwrap();
        assert_eq!(last.posts.len(), 5);
    }

    #[test]
    fn pagination_beyond_the_end_is_empty() {
        let store = MemStore::new();
        let author = seed_user(&store, "author");
        seed_post(&store, &author.id, "only post");

        let page = list_posts(&store, 5, 10).unwrap();
        assert!(page.posts.is_empty());
        assert_eq!(page.total_posts, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn bookmarks_have_set_semantics() {
        let store = MemStore::new();
        let reader = seed_user(&store, "reader");
        let author = seed_user(&store, "author");
        let post = seed_post(&store, &author.id, "text");

        bookmark_post(&store, &reader.id, &post.id).unwrap();
        let user = bookmark_post(&store, &reader.id, &post.id).unwrap();
        assert_eq!(
            user.bookmarked_posts.iter().filter(|id| **id == post.id).count(),
            1
        );

        unbookmark_post(&store, &reader.id, &post.id).unwrap();
        let user = unbookmark_post(&store, &reader.id, &post.id).unwrap();
        assert!(user.bookmarked_posts.is_empty());
    }

    #[test]
    fn bookmarking_a_missing_post_is_not_found() {
        let store = MemStore::new();
        let reader = seed_user(&store, "reader");

        assert!(matches!(
            bookmark_post(&store, &reader.id, "missing"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn bookmarked_posts_come_back_expanded() {
        let store = MemStore::new();
        let reader = seed_user(&store, "reader");
        let author = seed_user(&store, "author");
        let post = seed_post(&store, &author.id, "text");

        assert!(bookmarked_posts(&store, &reader.id).unwrap().is_empty());

        bookmark_post(&store, &reader.id, &post.id).unwrap();
        let posts = bookmarked_posts(&store, &reader.id).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].posted_by.username, "author");
    }
}
