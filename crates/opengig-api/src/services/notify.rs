use sqlx::{Pool, Postgres};
use tracing::warn;
use uuid::Uuid;

/// Best-effort notification insert. Losing one is acceptable; failing the
/// triggering request over it is not.
pub async fn push(pool: &Pool<Postgres>, user_id: Uuid, kind: &str, body: &str, reference_id: Option<Uuid>) {
    let res = sqlx::query(
        "INSERT INTO notifications (user_id, kind, body, reference_id) VALUES ($1,$2,$3,$4)",
    )
    .bind(user_id)
    .bind(kind)
    .bind(body)
    .bind(reference_id)
    .execute(pool)
    .await;
    if let Err(e) = res {
        warn!(?e, %kind, "notification insert failed");
    }
}
