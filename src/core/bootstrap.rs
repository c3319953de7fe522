use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;

pub(crate) async fn ensure_superuser(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_superuser_password.is_empty() {
        tracing::warn!("FIRST_SUPERUSER_PASSWORD not configured; skipping superuser creation");
        return Ok(());
    }

    let username = &admin.first_superuser_username;
    let user = repositories::users::find_by_username(state.db(), username).await?;
    let now = primitive_now_utc();

    if let Some(user) = user {
        let verified =
            security::verify_password(&admin.first_superuser_password, &user.hashed_password)
                .unwrap_or(false);
        let needs_update = !verified || !user.is_platform_admin || !user.is_active;

        if needs_update {
            let hashed_password = if verified {
                user.hashed_password.clone()
            } else {
                security::hash_password(&admin.first_superuser_password)?
            };

            sqlx::query(
                "UPDATE users
                 SET hashed_password = $1,
                     is_platform_admin = TRUE,
                     is_active = TRUE,
                     updated_at = $2
                 WHERE id = $3",
            )
            .bind(hashed_password)
            .bind(now)
            .bind(&user.id)
            .execute(state.db())
            .await?;

            tracing::info!("Updated default superuser {username}");
        } else {
            tracing::info!("Default superuser already up to date");
        }

        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_superuser_password)?;

    sqlx::query(
        "INSERT INTO users (
            id, username, hashed_password, full_name, is_platform_admin, is_active,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,TRUE,TRUE,$5,$6)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(username)
    .bind(hashed_password)
    .bind("Super Admin")
    .bind(now)
    .bind(now)
    .execute(state.db())
    .await?;

    tracing::info!("Created default superuser {username}");
    Ok(())
}
