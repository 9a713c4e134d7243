use log::{info, warn};
use rocket::{
    response::status::Created,
    serde::{
        json::{json, serde_json, Json, Value},
        Deserialize, Serialize,
    },
    State,
};
use rocket_db_pools::Connection;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::{
    auth::{self, AuthenticatedUser, Caller},
    config::AppConfig,
    db::{decode_json, Db},
    ids::UserId,
    social, ApiError, Result,
};

pub const DEFAULT_PROFILE_PICTURE: &str = "https://i.imgur.com/Wfv7adq.png";

/// How many users the explore page lists at once.
const EXPLORE_LIMIT: i64 = 10;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub name: String,
    pub bio: String,
    pub friends: Vec<UserId>,
    pub requests: Vec<UserId>,
    pub profile_picture: String,
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(r: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: UserId::from(r.try_get::<String, _>("id")?),
            name: r.try_get("name")?,
            bio: r.try_get("bio")?,
            friends: decode_json(r, "friends")?,
            requests: decode_json(r, "requests")?,
            profile_picture: r.try_get("profile_picture")?,
        })
    }
}

impl User {
    pub fn new(name: String) -> Self {
        Self {
            id: UserId::generate(),
            name,
            bio: String::new(),
            friends: vec![],
            requests: vec![],
            profile_picture: DEFAULT_PROFILE_PICTURE.to_string(),
        }
    }

    pub async fn find(conn: &mut SqliteConnection, id: &UserId) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(user)
    }

    pub async fn insert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, name, bio, friends, requests, profile_picture) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(&self.name)
        .bind(&self.bio)
        .bind(serde_json::to_string(&self.friends)?)
        .bind(serde_json::to_string(&self.requests)?)
        .bind(&self.profile_picture)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn save(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            "UPDATE users SET name = ?, bio = ?, friends = ?, requests = ?, profile_picture = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(&self.bio)
        .bind(serde_json::to_string(&self.friends)?)
        .bind(serde_json::to_string(&self.requests)?)
        .bind(&self.profile_picture)
        .bind(self.id.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// First `limit` users whose id is not in `exclude`.
    pub async fn explore(
        conn: &mut SqliteConnection,
        exclude: &[UserId],
        limit: i64,
    ) -> Result<Vec<Self>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM users");
        if !exclude.is_empty() {
            query.push(" WHERE id NOT IN (");
            let mut ids = query.separated(", ");
            for id in exclude {
                ids.push_bind(id.as_str().to_string());
            }
            ids.push_unseparated(")");
        }
        query.push(" ORDER BY rowid LIMIT ").push_bind(limit);
        let users = query
            .build_query_as::<User>()
            .fetch_all(&mut *conn)
            .await?;
        Ok(users)
    }
}

struct Credentials {
    user_id: UserId,
    password: String,
}

impl Credentials {
    async fn find(conn: &mut SqliteConnection, username: &str) -> Result<Option<Self>> {
        let row = sqlx::query("SELECT user_id, password FROM credentials WHERE username = ?")
            .bind(username)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|r| -> sqlx::Result<Self> {
            Ok(Self {
                user_id: UserId::from(r.try_get::<String, _>("user_id")?),
                password: r.try_get("password")?,
            })
        })
        .transpose()
        .map_err(Into::into)
    }

    async fn insert(conn: &mut SqliteConnection, user: &UserId, username: &str, hash: &str) -> Result<()> {
        sqlx::query("INSERT INTO credentials (user_id, username, password) VALUES (?, ?, ?)")
            .bind(user.as_str())
            .bind(username)
            .bind(hash)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct Registration {
    username: String,
    name: Option<String>,
    password: String,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Session {
    token: String,
    user: User,
}

#[post("/register", data = "<registration>")]
pub async fn register(
    mut db: Connection<Db>,
    config: &State<AppConfig>,
    registration: Json<Registration>,
) -> Result<Created<Json<Session>>> {
    let registration = registration.into_inner();
    let mut tx = sqlx::Connection::begin(&mut **db).await?;

    if Credentials::find(&mut tx, &registration.username).await?.is_some() {
        return Err(ApiError::Conflict("Username is already taken."));
    }

    let user = User::new(
        registration
            .name
            .unwrap_or_else(|| registration.username.clone()),
    );
    let hash = auth::hash_password(&registration.password)?;
    user.insert(&mut tx).await?;
    Credentials::insert(&mut tx, &user.id, &registration.username, &hash).await?;
    tx.commit().await?;

    info!("Registered user {} as {}", user.id, registration.username);
    let token = AuthenticatedUser::from_user(&user).to_token(config)?;
    Ok(Created::new("/api/whoami").body(Json(Session { token, user })))
}

#[post("/login", data = "<credentials>")]
pub async fn login(
    mut db: Connection<Db>,
    config: &State<AppConfig>,
    credentials: Json<LoginRequest>,
) -> Result<Json<Session>> {
    let Some(creds) = Credentials::find(&mut db, &credentials.username).await? else {
        return Err(ApiError::Unauthorized("Invalid login credentials."));
    };
    if !auth::verify_password(&credentials.password, &creds.password)? {
        warn!("Failed login for {}", credentials.username);
        return Err(ApiError::Unauthorized("Invalid login credentials."));
    }
    let user = User::find(&mut db, &creds.user_id)
        .await?
        .ok_or(ApiError::Unauthorized("Invalid login credentials."))?;

    let token = AuthenticatedUser::from_user(&user).to_token(config)?;
    Ok(Json(Session { token, user }))
}

/// Tokens are stateless; the client forgets its own.
#[post("/logout")]
pub fn logout() -> Json<Value> {
    Json(json!({}))
}

#[get("/whoami")]
pub async fn whoami(mut db: Connection<Db>, caller: Caller) -> Result<Json<Value>> {
    let Some(id) = caller.id() else {
        return Ok(Json(json!({})));
    };
    match User::find(&mut db, id).await? {
        Some(user) => Ok(Json(serde_json::to_value(user)?)),
        None => Ok(Json(json!({}))),
    }
}

#[get("/user/info?<creator_id>")]
pub async fn info(mut db: Connection<Db>, creator_id: UserId) -> Result<Json<Option<User>>> {
    Ok(Json(User::find(&mut db, &creator_id).await?))
}

#[get("/user/profile/<user_id>")]
pub async fn profile(mut db: Connection<Db>, user_id: UserId) -> Result<Json<Option<User>>> {
    Ok(Json(User::find(&mut db, &user_id).await?))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ProfileUpdate {
    name: String,
    #[serde(default)]
    bio: String,
}

#[post("/user/update", data = "<update>")]
pub async fn update(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    update: Json<ProfileUpdate>,
) -> Result<Json<User>> {
    let mut user = User::find(&mut db, caller.id())
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    let update = update.into_inner();
    user.name = update.name;
    user.bio = update.bio;
    user.save(&mut db).await?;
    Ok(Json(user))
}

/// `ids` may repeat (`?ids=a&ids=b`) or carry a comma separated list.
#[get("/users/explore?<ids>")]
pub async fn explore(
    mut db: Connection<Db>,
    caller: Caller,
    ids: Option<Vec<String>>,
) -> Result<Json<Vec<User>>> {
    let mut exclude: Vec<UserId> = caller.id().cloned().into_iter().collect();
    exclude.extend(
        ids.unwrap_or_default()
            .iter()
            .flat_map(|ids| ids.split(','))
            .filter(|id| !id.is_empty())
            .map(UserId::from),
    );
    Ok(Json(User::explore(&mut db, &exclude, EXPLORE_LIMIT).await?))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct FollowRequest {
    follow_id: UserId,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct Unfollowed {
    user: User,
    still_follows: bool,
}

async fn load_pair(
    conn: &mut SqliteConnection,
    caller: &UserId,
    target: &UserId,
) -> Result<(User, User)> {
    let target = User::find(conn, target)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    let user = User::find(conn, caller)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok((user, target))
}

#[post("/user/follow", data = "<request>")]
pub async fn follow(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    request: Json<FollowRequest>,
) -> Result<Json<User>> {
    let mut tx = sqlx::Connection::begin(&mut **db).await?;
    let (mut user, mut target) = load_pair(&mut tx, caller.id(), &request.follow_id).await?;

    social::follow(&mut user, &mut target);

    target.save(&mut tx).await?;
    user.save(&mut tx).await?;
    tx.commit().await?;

    info!("{} follows {}", user.id, target.id);
    Ok(Json(target))
}

#[post("/user/unfollow", data = "<request>")]
pub async fn unfollow(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    request: Json<FollowRequest>,
) -> Result<Json<Unfollowed>> {
    let mut tx = sqlx::Connection::begin(&mut **db).await?;
    let (mut user, mut target) = load_pair(&mut tx, caller.id(), &request.follow_id).await?;

    let still_follows = social::unfollow(&mut user, &mut target);

    target.save(&mut tx).await?;
    user.save(&mut tx).await?;
    tx.commit().await?;

    info!("{} unfollowed {} (still followed back: {})", user.id, target.id, still_follows);
    Ok(Json(Unfollowed {
        user: target,
        still_follows,
    }))
}

