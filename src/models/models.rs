use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub fullname: String,
    /// Argon2 hash. Absent until the account sets one.
    pub password: Option<String>,
    pub email: String,
    pub phone_number: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    #[serde(default)]
    pub bookmarked_posts: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum PostCategory {
    General,
    Tech,
    Music,
    Sports,
    Travel,
    Food,
}

impl PostCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(PostCategory::General),
            "tech" => Some(PostCategory::Tech),
            "music" => Some(PostCategory::Music),
            "sports" => Some(PostCategory::Sports),
            "travel" => Some(PostCategory::Travel),
            "food" => Some(PostCategory::Food),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Post {
    pub id: String,
    pub posted_by: String,
    pub text: String,
    pub category: PostCategory,
    pub image: Option<String>,
    #[serde(default)]
    pub liked_by: Vec<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub comment_by: String,
    pub text: String,
    #[serde(default)]
    pub liked_by: Vec<String>,
    pub created_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: String,
}

// === Display views ===
//
// Responses carry these instead of the stored documents: the password hash
// stays out of every reply, and referenced user ids are expanded into the
// fields a client needs to render them.

#[derive(Serialize, Clone)]
pub struct AuthorView {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub avatar: Option<String>,
}

impl AuthorView {
    pub fn from(user: &User) -> Self {
        AuthorView {
            id: user.id.clone(),
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub phone_number: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar: Option<String>,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub bookmarked_posts: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserView {
    pub fn from(user: &User) -> Self {
        UserView {
            id: user.id.clone(),
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            bio: user.bio.clone(),
            website: user.website.clone(),
            avatar: user.avatar.clone(),
            followers: user.followers.clone(),
            following: user.following.clone(),
            bookmarked_posts: user.bookmarked_posts.clone(),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct PostView {
    pub id: String,
    pub posted_by: AuthorView,
    pub text: String,
    pub category: PostCategory,
    pub image: Option<String>,
    pub liked_by: Vec<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl PostView {
    pub fn from(post: &Post, author: AuthorView) -> Self {
        PostView {
            id: post.id.clone(),
            posted_by: author,
            text: post.text.clone(),
            category: post.category,
            image: post.image.clone(),
            liked_by: post.liked_by.clone(),
            created_at: post.created_at.clone(),
            updated_at: post.updated_at.clone(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub comment_by: AuthorView,
    pub text: String,
    pub liked_by: Vec<String>,
    pub created_at: String,
}

impl CommentView {
    pub fn from(comment: &Comment, author: AuthorView) -> Self {
        CommentView {
            id: comment.id.clone(),
            post_id: comment.post_id.clone(),
            comment_by: author,
            text: comment.text.clone(),
            liked_by: comment.liked_by.clone(),
            created_at: comment.created_at.clone(),
        }
    }
}
