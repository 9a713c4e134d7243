//! Workouts and their publishing lifecycle.
//!
//! A workout is a draft while `current` is set. Saving clears `current`;
//! posting additionally sets `posted`, which is what puts it in the feed.
//! Both copy `posted = true` onto the child exercises; toggling visibility
//! later does not touch them.

use chrono::{DateTime, Utc};
use log::info;
use rocket::serde::{json::Json, Deserialize, Serialize};
use rocket_db_pools::Connection;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::{
    auth::AuthenticatedUser,
    comment::Comment,
    db::{decode_timestamp, Db},
    exercise::Exercise,
    ids::{UserId, WorkoutId},
    reaction::{Like, Star},
    user::User,
    ApiError, Result,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Workout {
    #[serde(rename = "_id")]
    pub id: WorkoutId,
    pub creator_id: UserId,
    pub creator_name: String,
    pub timestamp: DateTime<Utc>,
    pub posted: bool,
    pub likes: i64,
    pub current: bool,
}

impl<'r> FromRow<'r, SqliteRow> for Workout {
    fn from_row(r: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: WorkoutId::from(r.try_get::<String, _>("id")?),
            creator_id: UserId::from(r.try_get::<String, _>("creator_id")?),
            creator_name: r.try_get("creator_name")?,
            timestamp: decode_timestamp(r, "timestamp")?,
            posted: r.try_get("posted")?,
            likes: r.try_get("likes")?,
            current: r.try_get("is_current")?,
        })
    }
}

/// Optional filters for listing workouts; `None` means "any".
#[derive(Debug, Default, Clone, Copy)]
pub struct Filter<'a> {
    pub creator: Option<&'a UserId>,
    pub current: Option<bool>,
    pub posted: Option<bool>,
}

impl Workout {
    pub fn new(creator: &AuthenticatedUser, current: bool) -> Self {
        Self {
            id: WorkoutId::generate(),
            creator_id: creator.id().clone(),
            creator_name: creator.name.clone(),
            timestamp: Utc::now(),
            posted: false,
            likes: 0,
            current,
        }
    }

    pub async fn find(conn: &mut SqliteConnection, id: &WorkoutId) -> Result<Option<Self>> {
        let workout = sqlx::query_as::<_, Workout>("SELECT * FROM workouts WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(workout)
    }

    pub async fn exists(conn: &mut SqliteConnection, id: &WorkoutId) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM workouts WHERE id = ?")
            .bind(id.as_str())
            .fetch_one(&mut *conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn list(conn: &mut SqliteConnection, filter: Filter<'_>) -> Result<Vec<Self>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM workouts WHERE 1 = 1");
        if let Some(creator) = filter.creator {
            query
                .push(" AND creator_id = ")
                .push_bind(creator.as_str().to_string());
        }
        if let Some(current) = filter.current {
            query.push(" AND is_current = ").push_bind(current);
        }
        if let Some(posted) = filter.posted {
            query.push(" AND posted = ").push_bind(posted);
        }
        query.push(" ORDER BY rowid");
        let workouts = query
            .build_query_as::<Workout>()
            .fetch_all(&mut *conn)
            .await?;
        Ok(workouts)
    }

    /// Posted workouts created by any of `creators`.
    pub async fn posted_by(conn: &mut SqliteConnection, creators: &[UserId]) -> Result<Vec<Self>> {
        if creators.is_empty() {
            return Ok(vec![]);
        }
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT * FROM workouts WHERE posted = 1 AND creator_id IN (");
        let mut ids = query.separated(", ");
        for id in creators {
            ids.push_bind(id.as_str().to_string());
        }
        ids.push_unseparated(") ORDER BY rowid");
        let workouts = query
            .build_query_as::<Workout>()
            .fetch_all(&mut *conn)
            .await?;
        Ok(workouts)
    }

    pub async fn insert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            "INSERT INTO workouts (id, creator_id, creator_name, timestamp, posted, likes, is_current) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(self.creator_id.as_str())
        .bind(&self.creator_name)
        .bind(self.timestamp.timestamp_millis())
        .bind(self.posted)
        .bind(self.likes)
        .bind(self.current)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn save(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("UPDATE workouts SET posted = ?, likes = ?, is_current = ? WHERE id = ?")
            .bind(self.posted)
            .bind(self.likes)
            .bind(self.current)
            .bind(self.id.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Removes a workout together with its exercises, comments, likes and
    /// stars. Children go first, the workout last, all in one transaction:
    /// a failure anywhere leaves the store untouched.
    pub async fn delete_cascade(conn: &mut SqliteConnection, id: &WorkoutId) -> Result<u64> {
        let mut tx = sqlx::Connection::begin(conn).await?;

        let exercises = Exercise::delete_for_workout(&mut tx, id).await?;
        let comments = Comment::delete_for_workout(&mut tx, id).await?;
        let likes = Like::delete_for_workout(&mut tx, id).await?;
        let stars = Star::delete_for_workout(&mut tx, id).await?;
        let deleted = sqlx::query("DELETE FROM workouts WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        info!(
            "Deleted workout {} ({} exercises, {} comments, {} likes, {} stars)",
            id, exercises, comments, likes, stars
        );
        Ok(deleted)
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct Deleted {
    pub deleted_count: u64,
}

#[derive(FromForm)]
pub struct CurrentQuery {
    #[field(name = "userId")]
    user_id: UserId,
}

#[get("/workout/current?<query..>")]
pub async fn current(mut db: Connection<Db>, query: CurrentQuery) -> Result<Json<Vec<Workout>>> {
    let filter = Filter {
        creator: Some(&query.user_id),
        current: Some(true),
        ..Filter::default()
    };
    Ok(Json(Workout::list(&mut db, filter).await?))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct NewWorkout {
    #[serde(default)]
    current: bool,
}

#[post("/workout/create", data = "<body>")]
pub async fn create(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    body: Json<NewWorkout>,
) -> Result<Json<Workout>> {
    let workout = Workout::new(&caller, body.current);
    workout.insert(&mut db).await?;
    Ok(Json(workout))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct WorkoutRef {
    id: WorkoutId,
}

/// Moves a workout out of the draft state and marks its exercises posted.
/// The workout's own state is persisted even when it turns out to have no
/// exercises.
async fn publish(conn: &mut SqliteConnection, id: &WorkoutId, posted: bool) -> Result<Workout> {
    let mut workout = Workout::find(conn, id)
        .await?
        .ok_or(ApiError::NotFound("Workout not found"))?;

    workout.posted = posted;
    workout.current = false;
    workout.save(conn).await?;

    if Exercise::mark_posted(conn, &workout.id).await? == 0 {
        return Err(ApiError::NotFound("Exercises not found"));
    }
    Ok(workout)
}

#[post("/workout/save", data = "<body>")]
pub async fn save_workout(mut db: Connection<Db>, body: Json<WorkoutRef>) -> Result<Json<Workout>> {
    Ok(Json(publish(&mut db, &body.id, false).await?))
}

#[post("/workout/post", data = "<body>")]
pub async fn post_workout(mut db: Connection<Db>, body: Json<WorkoutRef>) -> Result<Json<Workout>> {
    Ok(Json(publish(&mut db, &body.id, true).await?))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct DeleteWorkout {
    workout_id: WorkoutId,
}

#[post("/workout/delete", data = "<body>")]
pub async fn delete_workout(mut db: Connection<Db>, body: Json<DeleteWorkout>) -> Result<Json<Deleted>> {
    let deleted_count = Workout::delete_cascade(&mut db, &body.workout_id).await?;
    Ok(Json(Deleted { deleted_count }))
}

#[post("/workout/change-visibility", data = "<body>")]
pub async fn change_visibility(
    mut db: Connection<Db>,
    body: Json<WorkoutRef>,
) -> Result<Json<Workout>> {
    let mut workout = Workout::find(&mut db, &body.id)
        .await?
        .ok_or(ApiError::NotFound("Workout not found"))?;
    workout.posted = !workout.posted;
    workout.save(&mut db).await?;
    Ok(Json(workout))
}

#[get("/workouts/feed")]
pub async fn feed(mut db: Connection<Db>) -> Result<Json<Vec<Workout>>> {
    let filter = Filter {
        posted: Some(true),
        ..Filter::default()
    };
    Ok(Json(Workout::list(&mut db, filter).await?))
}

#[get("/workouts/feed/friends")]
pub async fn friends_feed(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
) -> Result<Json<Vec<Workout>>> {
    let user = User::find(&mut db, caller.id())
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(Workout::posted_by(&mut db, &user.friends).await?))
}

async fn profile_list(
    mut db: Connection<Db>,
    user_id: &UserId,
    posted: Option<bool>,
) -> Result<Json<Vec<Workout>>> {
    let filter = Filter {
        creator: Some(user_id),
        current: Some(false),
        posted,
    };
    Ok(Json(Workout::list(&mut db, filter).await?))
}

#[get("/workouts/profile/<user_id>")]
pub async fn profile(db: Connection<Db>, user_id: UserId) -> Result<Json<Vec<Workout>>> {
    profile_list(db, &user_id, None).await
}

#[get("/workouts/profile/public/<user_id>")]
pub async fn public_profile(db: Connection<Db>, user_id: UserId) -> Result<Json<Vec<Workout>>> {
    profile_list(db, &user_id, Some(true)).await
}

#[get("/workouts/profile/drafts/<user_id>")]
pub async fn drafts(db: Connection<Db>, user_id: UserId) -> Result<Json<Vec<Workout>>> {
    profile_list(db, &user_id, Some(false)).await
}

/// Starred workouts in the order they were starred. Stars pointing at a
/// workout that no longer exists come back as `null`.
#[get("/workouts/profile/starred/<user_id>")]
pub async fn starred(
    mut db: Connection<Db>,
    user_id: UserId,
) -> Result<Json<Vec<Option<Workout>>>> {
    let stars = Star::by_user(&mut db, &user_id).await?;
    let mut workouts = Vec::with_capacity(stars.len());
    for star in stars {
        workouts.push(Workout::find(&mut db, &star.workout_id).await?);
    }
    Ok(Json(workouts))
}
