//! Likes and stars: join rows between a user and a workout.
//!
//! There is no uniqueness constraint, so liking twice stores two rows and
//! un-liking removes one of them.

use rocket::{
    http::Status,
    serde::{json::Json, Deserialize, Serialize},
};
use rocket_db_pools::Connection;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    auth::AuthenticatedUser,
    db::Db,
    ids::{LikeId, StarId, UserId, WorkoutId},
    workout::Workout,
    ApiError, Result,
};

macro_rules! reaction {
    ($name:ident, $id:ident, $table:literal) => {
        #[derive(Debug, Clone, Deserialize, Serialize)]
        #[serde(crate = "rocket::serde")]
        pub struct $name {
            #[serde(rename = "_id")]
            pub id: $id,
            #[serde(rename = "userId")]
            pub user_id: UserId,
            #[serde(rename = "workoutId")]
            pub workout_id: WorkoutId,
        }

        impl<'r> FromRow<'r, SqliteRow> for $name {
            fn from_row(r: &'r SqliteRow) -> sqlx::Result<Self> {
                Ok(Self {
                    id: $id::from(r.try_get::<String, _>("id")?),
                    user_id: UserId::from(r.try_get::<String, _>("user_id")?),
                    workout_id: WorkoutId::from(r.try_get::<String, _>("workout_id")?),
                })
            }
        }

        impl $name {
            pub async fn insert(
                conn: &mut SqliteConnection,
                user: &UserId,
                workout: &WorkoutId,
            ) -> Result<Self> {
                let row = Self {
                    id: $id::generate(),
                    user_id: user.clone(),
                    workout_id: workout.clone(),
                };
                sqlx::query(concat!(
                    "INSERT INTO ",
                    $table,
                    " (id, user_id, workout_id) VALUES (?, ?, ?)"
                ))
                .bind(row.id.as_str())
                .bind(row.user_id.as_str())
                .bind(row.workout_id.as_str())
                .execute(&mut *conn)
                .await?;
                Ok(row)
            }

            /// Deletes at most one matching row.
            pub async fn remove_one(
                conn: &mut SqliteConnection,
                user: &UserId,
                workout: &WorkoutId,
            ) -> Result<u64> {
                let deleted = sqlx::query(concat!(
                    "DELETE FROM ",
                    $table,
                    " WHERE rowid = (SELECT rowid FROM ",
                    $table,
                    " WHERE user_id = ? AND workout_id = ? ORDER BY rowid LIMIT 1)"
                ))
                .bind(user.as_str())
                .bind(workout.as_str())
                .execute(&mut *conn)
                .await?
                .rows_affected();
                Ok(deleted)
            }

            pub async fn find(
                conn: &mut SqliteConnection,
                user: &UserId,
                workout: &WorkoutId,
            ) -> Result<Vec<Self>> {
                let rows = sqlx::query_as::<_, $name>(concat!(
                    "SELECT * FROM ",
                    $table,
                    " WHERE user_id = ? AND workout_id = ? ORDER BY rowid"
                ))
                .bind(user.as_str())
                .bind(workout.as_str())
                .fetch_all(&mut *conn)
                .await?;
                Ok(rows)
            }

            pub async fn by_user(conn: &mut SqliteConnection, user: &UserId) -> Result<Vec<Self>> {
                let rows = sqlx::query_as::<_, $name>(concat!(
                    "SELECT * FROM ",
                    $table,
                    " WHERE user_id = ? ORDER BY rowid"
                ))
                .bind(user.as_str())
                .fetch_all(&mut *conn)
                .await?;
                Ok(rows)
            }

            pub async fn delete_for_workout(
                conn: &mut SqliteConnection,
                workout: &WorkoutId,
            ) -> Result<u64> {
                let deleted = sqlx::query(concat!("DELETE FROM ", $table, " WHERE workout_id = ?"))
                    .bind(workout.as_str())
                    .execute(&mut *conn)
                    .await?
                    .rows_affected();
                Ok(deleted)
            }

            /// Inserts a row when `on` is set, otherwise removes one.
            async fn toggle(
                conn: &mut SqliteConnection,
                user: &UserId,
                workout: &WorkoutId,
                on: bool,
            ) -> Result<()> {
                if on {
                    if !Workout::exists(conn, workout).await? {
                        return Err(ApiError::NotFound("Workout not found"));
                    }
                    Self::insert(conn, user, workout).await?;
                } else {
                    Self::remove_one(conn, user, workout).await?;
                }
                Ok(())
            }
        }
    };
}

reaction!(Like, LikeId, "likes");
reaction!(Star, StarId, "stars");

#[derive(FromForm)]
pub struct ReactionQuery {
    #[field(name = "userId")]
    user_id: UserId,
    #[field(name = "workoutId")]
    workout_id: WorkoutId,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct LikeToggle {
    workout_id: WorkoutId,
    #[serde(default)]
    is_liked: bool,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct StarToggle {
    workout_id: WorkoutId,
    #[serde(default)]
    is_starred: bool,
}

#[post("/like", data = "<body>")]
pub async fn like(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    body: Json<LikeToggle>,
) -> Result<Status> {
    Like::toggle(&mut db, caller.id(), &body.workout_id, body.is_liked).await?;
    Ok(Status::NoContent)
}

#[get("/like?<query..>")]
pub async fn likes(mut db: Connection<Db>, query: ReactionQuery) -> Result<Json<Vec<Like>>> {
    Ok(Json(Like::find(&mut db, &query.user_id, &query.workout_id).await?))
}

#[post("/star", data = "<body>")]
pub async fn star(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    body: Json<StarToggle>,
) -> Result<Status> {
    Star::toggle(&mut db, caller.id(), &body.workout_id, body.is_starred).await?;
    Ok(Status::NoContent)
}

#[get("/star?<query..>")]
pub async fn stars(mut db: Connection<Db>, query: ReactionQuery) -> Result<Json<Vec<Star>>> {
    Ok(Json(Star::find(&mut db, &query.user_id, &query.workout_id).await?))
}
