use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Course;
use crate::db::types::CourseRole;

const COLUMNS: &str = "id, slug, title, is_active, created_by, created_at, updated_at";

pub(crate) struct CreateCourse<'a> {
    pub(crate) id: &'a str,
    pub(crate) slug: &'a str,
    pub(crate) title: &'a str,
    pub(crate) is_active: bool,
    pub(crate) created_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateCourse<'_>) -> Result<Course, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!(
        "INSERT INTO courses (id, slug, title, is_active, created_by, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.slug)
    .bind(params.title)
    .bind(params.is_active)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn add_member(
    pool: &PgPool,
    course_id: &str,
    user_id: &str,
    role: CourseRole,
    joined_at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO course_members (course_id, user_id, role, joined_at)
         VALUES ($1,$2,$3,$4)
         ON CONFLICT (course_id, user_id) DO UPDATE SET role = EXCLUDED.role",
    )
    .bind(course_id)
    .bind(user_id)
    .bind(role)
    .bind(joined_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn member_role(
    pool: &PgPool,
    course_id: &str,
    user_id: &str,
) -> Result<Option<CourseRole>, sqlx::Error> {
    sqlx::query_scalar::<_, CourseRole>(
        "SELECT role FROM course_members WHERE course_id = $1 AND user_id = $2",
    )
    .bind(course_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
