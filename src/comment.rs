use rocket::serde::{json::Json, Deserialize, Serialize};
use rocket_db_pools::Connection;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    auth::AuthenticatedUser,
    db::Db,
    ids::{CommentId, UserId, WorkoutId},
    workout::Workout,
    ApiError, Result,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: CommentId,
    pub creator_id: UserId,
    pub creator_name: String,
    /// The workout commented on.
    pub parent: WorkoutId,
    pub content: String,
}

impl<'r> FromRow<'r, SqliteRow> for Comment {
    fn from_row(r: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: CommentId::from(r.try_get::<String, _>("id")?),
            creator_id: UserId::from(r.try_get::<String, _>("creator_id")?),
            creator_name: r.try_get("creator_name")?,
            parent: WorkoutId::from(r.try_get::<String, _>("parent")?),
            content: r.try_get("content")?,
        })
    }
}

impl Comment {
    pub async fn for_workout(conn: &mut SqliteConnection, parent: &WorkoutId) -> Result<Vec<Self>> {
        let comments =
            sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE parent = ? ORDER BY rowid")
                .bind(parent.as_str())
                .fetch_all(&mut *conn)
                .await?;
        Ok(comments)
    }

    pub async fn insert(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            "INSERT INTO comments (id, creator_id, creator_name, parent, content) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(self.id.as_str())
        .bind(self.creator_id.as_str())
        .bind(&self.creator_name)
        .bind(self.parent.as_str())
        .bind(&self.content)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete_for_workout(conn: &mut SqliteConnection, parent: &WorkoutId) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM comments WHERE parent = ?")
            .bind(parent.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct NewComment {
    parent: WorkoutId,
    content: String,
}

#[post("/comment", data = "<body>")]
pub async fn create(
    mut db: Connection<Db>,
    caller: AuthenticatedUser,
    body: Json<NewComment>,
) -> Result<Json<Comment>> {
    let body = body.into_inner();
    if !Workout::exists(&mut db, &body.parent).await? {
        return Err(ApiError::NotFound("Workout not found"));
    }
    let comment = Comment {
        id: CommentId::generate(),
        creator_id: caller.id().clone(),
        creator_name: caller.name.clone(),
        parent: body.parent,
        content: body.content,
    };
    comment.insert(&mut db).await?;
    Ok(Json(comment))
}

#[get("/comments?<parent>")]
pub async fn by_parent(mut db: Connection<Db>, parent: WorkoutId) -> Result<Json<Vec<Comment>>> {
    Ok(Json(Comment::for_workout(&mut db, &parent).await?))
}
