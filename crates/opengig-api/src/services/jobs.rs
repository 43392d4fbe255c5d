use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{Job, Milestone};

const JOB_COLS: &str = "id, client_id, freelancer_id, title, description, category, budget, status, escrow_status, contract_job_id, deadline, created_at, updated_at";

pub async fn fetch(pool: &Pool<Postgres>, id: Uuid) -> Result<Job, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLS} FROM jobs WHERE id=$1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn milestones(pool: &Pool<Postgres>, job_id: Uuid) -> Result<Vec<Milestone>, sqlx::Error> {
    sqlx::query_as::<_, Milestone>(
        "SELECT id, job_id, position, title, amount, completed, paid, payment_tx_hash, created_at FROM milestones WHERE job_id=$1 ORDER BY position",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
}

pub async fn set_status(pool: &Pool<Postgres>, id: Uuid, status: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status=$2, updated_at=now() WHERE id=$1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_escrow_status(pool: &Pool<Postgres>, id: Uuid, escrow_status: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET escrow_status=$2, updated_at=now() WHERE id=$1")
        .bind(id)
        .bind(escrow_status)
        .execute(pool)
        .await?;
    Ok(())
}

/// Caller is the client or the assigned freelancer.
pub fn is_party(job: &Job, user_id: Uuid) -> bool {
    job.client_id == user_id || job.freelancer_id == Some(user_id)
}

/// The opposite party in a two-sided job exchange, if one exists yet.
pub fn counterparty(job: &Job, user_id: Uuid) -> Option<Uuid> {
    if job.client_id == user_id {
        job.freelancer_id
    } else {
        Some(job.client_id)
    }
}
