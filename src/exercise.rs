use chrono::{DateTime, Duration, Utc};
use rocket::serde::{
    json::{serde_json, Json},
    Deserialize, Serialize,
};
use rocket_db_pools::Connection;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    auth::AuthenticatedUser,
    db::{decode_json, decode_timestamp, Db},
    ids::{ExerciseId, UserId, WorkoutId},
    workout::{Deleted, Workout},
    ApiError, Result,
};

/// One set of an exercise. All numbers are optional while the set is being
/// filled in.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ExerciseSet {
    pub reps: Option<f64>,
    pub weight: Option<f64>,
    pub rpe: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Exercise {
    #[serde(rename = "_id")]
    pub id: ExerciseId,
    pub creator_id: UserId,
    pub name: String,
    pub parent: WorkoutId,
    pub timestamp: DateTime<Utc>,
    pub sets: Vec<ExerciseSet>,
    pub posted: bool,
    pub pr: bool,
}

impl<'r> FromRow<'r, SqliteRow> for Exercise {
    fn from_row(r: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: ExerciseId::from(r.try_get::<String, _>("id")?),
            creator_id: UserId::from(r.try_get::<String, _>("creator_id")?),
            name: r.try_get("name")?,
            parent: WorkoutId::from(r.try_get::<String, _>("parent")?),
            timestamp: decode_timestamp(r, "timestamp")?,
            sets: decode_json(r, "sets")?,
            posted: r.try_get("posted")?,
            pr: r.try_get("pr")?,
        })
    }
}

impl Exercise {
    pub fn new(creator_id: UserId, parent: WorkoutId) -> Self {
        Self {
            id: ExerciseId::generate(),
            creator_id,
            name: String::new(),
            parent,
            timestamp: Utc::now(),
            sets: vec![],
            posted: false,
            pr: false,
        }
    }

    pub async fn find(conn: &mut SqliteConnection, id: &ExerciseId) -> Result<Option<Self>> {
        let exercise = sqlx::query_as::<_, Exercise>("SELECT * FROM exercises WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(exercise)
    }

    pub async fn for_workout(conn: &mut SqliteConnection, parent: &WorkoutId) -> Result<Vec<Self>> {
        let exercises =
            sqlx::query_as::<_, Exercise>("SELECT * FROM exercises WHERE parent = ? ORDER BY rowid")
                .bind(parent.as_str())
                .fetch_all(&mut *conn)
                .await?;
        Ok(exercises)
    }

    pub async fn by_creator(conn: &mut SqliteConnection, creator: &UserId) -> Result<Vec<Self>> {
        let exercises = sqlx::query_as::<_, Exercise>(
            "SELECT * FROM exercises WHERE creator_id = ? ORDER BY rowid",
        )
        .bind(creator.as_str())
        .fetch_all(&mut *conn)
        .await?;
        Ok(exercises)
    }

    pub async fn by_creator_since(
        conn: &mut SqliteConnection,
        creator: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Self>> {
        let exercises = sqlx::query_as::<_, Exercise>(
            "SELECT * FROM exercises WHERE creator_id = ? AND timestamp >= ? ORDER BY rowid",
        )
        .bind(creator.as_str())
        .bind(since.timestamp_millis())
        .fetch_all(&mut *conn)
        .await?;
        Ok(exercises)
    }

    /// The creator's posted exercises called `name`, the history a PR is
    /// judged against.
    pub async fn posted_named(
        conn: &mut SqliteConnection,
        creator: &UserId,
        name: &str,
    ) -> Result<Vec<Self>> {
        let exercises = sqlx::query_as::<_, Exercise>(
            "SELECT * FROM exercises WHERE creator_id = ? AND posted = 1 AND name = ? ORDER BY rowid",
        )
        .bind(creator.as_str())
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;
        Ok(exercises)
    }

    pub async fn insert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            "INSERT INTO exercises (id, creator_id, name, parent, timestamp, sets, posted, pr) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(self.creator_id.as_str())
        .bind(&self.name)
        .bind(self.parent.as_str())
        .bind(self.timestamp.timestamp_millis())
        .bind(serde_json::to_string(&self.sets)?)
        .bind(self.posted)
        .bind(self.pr)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn save(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("UPDATE exercises SET name = ?, sets = ?, posted = ?, pr = ? WHERE id = ?")
            .bind(&self.name)
            .bind(serde_json::to_string(&self.sets)?)
            .bind(self.posted)
            .bind(self.pr)
            .bind(self.id.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Sets `posted` on every exercise of a workout, returning how many there
    /// were.
    pub async fn mark_posted(conn: &mut SqliteConnection, parent: &WorkoutId) -> Result<u64> {
        let updated = sqlx::query("UPDATE exercises SET posted = 1 WHERE parent = ?")
            .bind(parent.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(updated)
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &ExerciseId) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM exercises WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    pub async fn delete_for_workout(conn: &mut SqliteConnection, parent: &WorkoutId) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM exercises WHERE parent = ?")
            .bind(parent.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[get("/exercises/year?<creator_id>")]
pub async fn year(mut db: Connection<Db>, creator_id: UserId) -> Result<Json<Vec<Exercise>>> {
    let since = Utc::now() - Duration::days(365);
    Ok(Json(Exercise::by_creator_since(&mut db, &creator_id, since).await?))
}

#[get("/exercises?<parent>")]
pub async fn by_parent(mut db: Connection<Db>, parent: WorkoutId) -> Result<Json<Vec<Exercise>>> {
    Ok(Json(Exercise::for_workout(&mut db, &parent).await?))
}

#[get("/exercise?<id>")]
pub async fn read(mut db: Connection<Db>, id: ExerciseId) -> Result<Json<Option<Exercise>>> {
    Ok(Json(Exercise::find(&mut db, &id).await?))
}

#[get("/exercise/name?<id>")]
pub async fn read_name(mut db: Connection<Db>, id: ExerciseId) -> Result<Json<Option<Exercise>>> {
    Ok(Json(Exercise::find(&mut db, &id).await?))
}

#[get("/exercises/user")]
pub async fn mine(mut db: Connection<Db>, caller: AuthenticatedUser) -> Result<Json<Vec<Exercise>>> {
    Ok(Json(Exercise::by_creator(&mut db, caller.id()).await?))
}

#[get("/exercises/user/any?<id>")]
pub async fn by_user(mut db: Connection<Db>, id: UserId) -> Result<Json<Vec<Exercise>>> {
    Ok(Json(Exercise::by_creator(&mut db, &id).await?))
}

#[get("/exercises/user/pr?<name>")]
pub async fn prs(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    name: &str,
) -> Result<Json<Vec<Exercise>>> {
    Ok(Json(Exercise::posted_named(&mut db, caller.id(), name).await?))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct PrUpdate {
    id: ExerciseId,
    pr: bool,
}

#[post("/exercises/user/pr/update", data = "<body>")]
pub async fn update_pr(mut db: Connection<Db>, body: Json<PrUpdate>) -> Result<Json<Exercise>> {
    let mut exercise = Exercise::find(&mut db, &body.id)
        .await?
        .ok_or(ApiError::NotFound("Exercise not found"))?;
    exercise.pr = body.pr;
    exercise.save(&mut db).await?;
    Ok(Json(exercise))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct NewExercise {
    workout_id: WorkoutId,
}

#[post("/exercise/create", data = "<body>")]
pub async fn create(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    body: Json<NewExercise>,
) -> Result<Json<Exercise>> {
    let body = body.into_inner();
    if !Workout::exists(&mut db, &body.workout_id).await? {
        return Err(ApiError::NotFound("Workout not found"));
    }
    let exercise = Exercise::new(caller.id().clone(), body.workout_id);
    exercise.insert(&mut db).await?;
    Ok(Json(exercise))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct DeleteExercise {
    exercise_id: ExerciseId,
}

#[post("/exercise/delete", data = "<body>")]
pub async fn delete_exercise(
    mut db: Connection<Db>,
    body: Json<DeleteExercise>,
) -> Result<Json<Deleted>> {
    let deleted_count = Exercise::delete(&mut db, &body.exercise_id).await?;
    Ok(Json(Deleted { deleted_count }))
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ExerciseUpdate {
    id: ExerciseId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    sets: Vec<ExerciseSet>,
    #[serde(default)]
    pr: bool,
}

#[post("/exercise/update", data = "<body>")]
pub async fn update(mut db: Connection<Db>, body: Json<ExerciseUpdate>) -> Result<Json<Exercise>> {
    let update = body.into_inner();
    let mut exercise = Exercise::find(&mut db, &update.id)
        .await?
        .ok_or(ApiError::NotFound("Exercise not found"))?;
    exercise.name = update.name;
    exercise.sets = update.sets;
    exercise.pr = update.pr;
    exercise.save(&mut db).await?;
    Ok(Json(exercise))
}
