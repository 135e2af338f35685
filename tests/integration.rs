use truesocial::auth;
use truesocial::comments;
use truesocial::feed;
use truesocial::follow;
use truesocial::posts;
use truesocial::users::{self, SignupRequest};
use truesocial::core::db::MemStore;
use truesocial::core::errors::ApiError;
use truesocial::models::models::{User, UserView};

fn signup_request(username: &str) -> SignupRequest {
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

fn register(store: &MemStore, username: &str) -> User {
    users::create_user(store, signup_request(username)).expect("signup should succeed")
}

#[test]
fn test_full_account_flow() {
    let store = MemStore::new();

    // 1. Sign up
    let user = register(&store, "flow_user");
    assert!(user.password.is_none());

    // 2. Logging in before a password exists is refused with a hint
    assert!(matches!(
        auth::login(&store, "flow_user", "pass"),
        Err(ApiError::Forbidden(_))
    ));

    // 3. Set a password, then log in
    auth::set_password(&store, "flow_user", "pass123").unwrap();
    let (token, logged_in) = auth::login(&store, "flow_user", "pass123").unwrap();
    assert_eq!(logged_in.id, user.id);
    assert_eq!(auth::token_user(&store, &token).unwrap(), Some(user.id.clone()));

    // 4. Profile comes back without any trace of the hash
    let profile = users::fetch_profile(&store, &user.id).unwrap().unwrap();
    let rendered = serde_json::to_string(&UserView::from(&profile)).unwrap();
    assert!(!rendered.contains("password"));

    // 5. Log out kills the session
    auth::logout(&store, &token).unwrap();
    assert_eq!(auth::token_user(&store, &token).unwrap(), None);
}

#[test]
fn test_follow_graph_and_feed_flow() {
    let store = MemStore::new();
    let alice = register(&store, "alice");
    let bob = register(&store, "bob");
    let carol = register(&store, "carol");

    follow::follow_user(&store, &alice.id, &bob.id).unwrap();
    follow::follow_user(&store, &carol.id, &alice.id).unwrap();

    posts::create_post(&store, &bob.id, "bob writes", "general", None).unwrap();
    posts::create_post(&store, &carol.id, "carol writes", "music", None).unwrap();
    posts::create_post(&store, &alice.id, "alice writes", "tech", None).unwrap();

    // Alice sees bob (followed) and carol (follower), not herself.
    let feed = feed::user_feed(&store, &alice.id).unwrap();
    let authors: Vec<&str> = feed.iter().map(|p| p.posted_by.username.as_str()).collect();
    assert_eq!(feed.len(), 2);
    assert!(authors.contains(&"bob"));
    assert!(authors.contains(&"carol"));

    // After unfollowing bob, only the follower side remains.
    follow::unfollow_user(&store, &alice.id, &bob.id).unwrap();
    let feed = feed::user_feed(&store, &alice.id).unwrap();
    let authors: Vec<&str> = feed.iter().map(|p| p.posted_by.username.as_str()).collect();
    assert_eq!(authors, vec!["carol"]);

    // Bob never followed anyone and nobody follows him any more.
    let feed = feed::user_feed(&store, &bob.id).unwrap();
    assert!(feed.is_empty());
}

#[test]
fn test_post_lifecycle_with_cascade() {
    let store = MemStore::new();
    let author = register(&store, "author");
    let reader = register(&store, "reader");

    let post = posts::create_post(&store, &author.id, "hello world", "general", None).unwrap();

    // Engagement from the reader
    comments::post_comment(&store, &post.id, &reader.id, "nice one").unwrap();
    posts::like_post(&store, &post.id, &reader.id).unwrap();
    feed::bookmark_post(&store, &reader.id, &post.id).unwrap();

    // The reader cannot edit or delete someone else's post.
    assert!(posts::update_post(&store, &reader.id, &post.id, "mine now")
        .unwrap()
        .is_none());
    assert!(posts::delete_post(&store, &reader.id, &post.id)
        .unwrap()
        .is_none());

    // The author deletes it; the bookmark disappears with it.
    posts::delete_post(&store, &author.id, &post.id)
        .unwrap()
        .expect("owner can delete");

    assert!(posts::fetch_post(&store, &post.id).unwrap().is_none());
    let reader_after = users::fetch_profile(&store, &reader.id).unwrap().unwrap();
    assert!(reader_after.bookmarked_posts.is_empty());
    assert!(feed::bookmarked_posts(&store, &reader.id).unwrap().is_empty());

    // Comments are left behind on purpose; listing them still works.
    let comments = comments::post_comments(&store, &post.id).unwrap();
    assert_eq!(comments.len(), 1);
}

#[test]
fn test_listing_pagination_totals() {
    let store = MemStore::new();
    let author = register(&store, "author");
    for i in 0..25 {
        posts::create_post(&store, &author.id, &format!("post number {}", i), "general", None)
            .unwrap();
    }

    let page = feed::list_posts(&store, 2, 10).unwrap();
    assert_eq!(page.posts.len(), 10);
    assert_eq!(page.total_posts, 25);
    assert_eq!(page.total_pages, 3);

    let everything = feed::list_posts(&store, 1, 25).unwrap();
    let expected: Vec<&str> = everything.posts[10..20].iter().map(|p| p.id.as_str()).collect();
    let actual: Vec<&str> = page.posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_suggestions_track_popularity() {
    let store = MemStore::new();
    let me = register(&store, "me");
    let star = register(&store, "star");
    let niche = register(&store, "niche");
    let fan_one = register(&store, "fan_one");
    let fan_two = register(&store, "fan_two");

    follow::follow_user(&store, &fan_one.id, &star.id).unwrap();
    follow::follow_user(&store, &fan_two.id, &star.id).unwrap();
    follow::follow_user(&store, &fan_one.id, &niche.id).unwrap();
    follow::follow_user(&store, &me.id, &fan_one.id).unwrap();

    let suggestions = follow::follow_suggestions(&store, &me.id, 5).unwrap();
    let ids: Vec<&str> = suggestions.iter().map(|s| s.id.as_str()).collect();

    assert!(!ids.contains(&me.id.as_str()));
    assert!(!ids.contains(&fan_one.id.as_str()));
    assert_eq!(ids[0], star.id.as_str());
    assert_eq!(ids[1], niche.id.as_str());
}
