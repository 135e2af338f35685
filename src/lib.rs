use spin_sdk::http::{Request, Response};
#[cfg(target_arch = "wasm32")]
use spin_sdk::http::IntoResponse;
#[cfg(target_arch = "wasm32")]
use spin_sdk::http_component;

pub mod config;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod query_params;
}

pub mod models {
    pub mod models;
}

pub mod auth;
pub mod comments;
pub mod feed;
pub mod follow;
pub mod media;
pub mod posts;
pub mod users;

/// One route table for both entry points (the Spin component below and the
/// native adapter binary).
pub fn route(req: Request) -> anyhow::Result<Response> {
    let path = req.path().to_string();
    let method = req.method().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method.as_str(), segments.as_slice()) {
        ("POST", ["signup"]) => users::handle_signup(req),
        ("POST", ["login"]) => auth::handle_login(req),
        ("POST", ["logout"]) => auth::handle_logout(req),
        ("GET", ["users", "check-username"]) => users::handle_check_username(req),
        ("POST", ["users", "password"]) => auth::handle_set_password(req),
        ("GET", ["profile", profile_id]) => users::handle_get_profile(profile_id),

        ("GET", ["posts"]) => feed::handle_list_posts(req),
        ("POST", ["posts"]) => posts::handle_create_post(req),
        ("GET", ["posts", post_id]) => posts::handle_get_post(post_id),
        ("POST", ["posts", post_id, "like"]) => posts::handle_like_post(req, post_id),
        ("POST", ["posts", post_id, "unlike"]) => posts::handle_unlike_post(req, post_id),
        ("POST", ["posts", post_id, "comment"]) => comments::handle_post_comment(req, post_id),
        ("GET", ["posts", post_id, "comments"]) => comments::handle_post_comments(post_id),
        ("POST", ["comment", comment_id, "like"]) => comments::handle_like_comment(req, comment_id),
        ("POST", ["comment", comment_id, "unlike"]) => {
            comments::handle_unlike_comment(req, comment_id)
        }

        ("POST", ["users", user_id, "follow"]) => follow::handle_follow(req, user_id),
        ("POST", ["users", user_id, "unfollow"]) => follow::handle_unfollow(req, user_id),
        ("GET", ["users", user_id, "follow-suggestions"]) => follow::handle_suggestions(user_id),
        ("GET", ["users", user_id, "feed"]) => feed::handle_feed(user_id),
        ("GET", ["users", user_id, "posts"]) => posts::handle_user_posts(user_id),
        ("POST", ["users", user_id, "posts", post_id]) => {
            posts::handle_update_post(req, user_id, post_id)
        }
        ("DELETE", ["users", user_id, "posts", post_id]) => {
            posts::handle_delete_post(req, user_id, post_id)
        }
        ("POST", ["users", user_id, "bookmark", post_id]) => {
            feed::handle_bookmark(req, user_id, post_id)
        }
        ("POST", ["users", user_id, "unbookmark", post_id]) => {
            feed::handle_unbookmark(req, user_id, post_id)
        }
        ("GET", ["users", user_id, "bookmarked-posts"]) => {
            feed::handle_bookmarked_posts(user_id)
        }
        ("POST", ["users", user_id]) => users::handle_update_profile(req, user_id),

        ("PUT", ["media", key]) => media::handle_upload(req, key),
        ("GET", ["media", key]) => media::handle_serve(key),

        _ => Ok(Response::builder()
            .status(404)
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&serde_json::json!({"error": "No route found"}))?)
            .build()),
    }
}

#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    route(req)
}
