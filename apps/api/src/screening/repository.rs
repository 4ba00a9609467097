use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::processed::ProcessedCandidate;

/// Stores finished batches. Swappable so handlers can be tested without Postgres.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    async fn save_batch(&self, batch_id: Uuid, candidates: &[ProcessedCandidate]) -> Result<()>;
}

pub struct PgCandidateRepository {
    pool: PgPool,
}

impl PgCandidateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandidateRepository for PgCandidateRepository {
    async fn save_batch(&self, batch_id: Uuid, candidates: &[ProcessedCandidate]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (position, candidate) in candidates.iter().enumerate() {
            let payload = serde_json::to_value(candidate)
                .with_context(|| format!("failed to serialize candidate {}", candidate.source_id()))?;

            sqlx::query(
                r#"
                INSERT INTO processed_candidates
                    (batch_id, position, source_id, status, score, payload)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(batch_id)
            .bind(position as i32)
            .bind(candidate.source_id())
            .bind(candidate.status().as_str())
            .bind(candidate.score().map(i16::from))
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Persisted batch {batch_id} with {} candidates", candidates.len());
        Ok(())
    }
}

/// Keeps batches in memory for handler tests.
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryCandidateRepository {
    batches: std::sync::Mutex<Vec<(Uuid, Vec<ProcessedCandidate>)>>,
}

#[cfg(test)]
impl InMemoryCandidateRepository {
    pub fn batch(&self, batch_id: Uuid) -> Option<Vec<ProcessedCandidate>> {
        self.batches
            .lock()
            .ok()?
            .iter()
            .find(|(id, _)| *id == batch_id)
            .map(|(_, candidates)| candidates.clone())
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
#[async_trait]
impl CandidateRepository for InMemoryCandidateRepository {
    async fn save_batch(&self, batch_id: Uuid, candidates: &[ProcessedCandidate]) -> Result<()> {
        self.batches
            .lock()
            .map_err(|_| anyhow::anyhow!("candidate store lock poisoned"))?
            .push((batch_id, candidates.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_repository_keeps_batches_apart() {
        let repo = InMemoryCandidateRepository::default();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        repo.save_batch(first, &[ProcessedCandidate::pending("a")])
            .await
            .unwrap();
        repo.save_batch(second, &[]).await.unwrap();

        assert_eq!(repo.batch_count(), 2);
        assert_eq!(repo.batch(first).unwrap()[0].source_id(), "a");
        assert!(repo.batch(second).unwrap().is_empty());
        assert!(repo.batch(Uuid::new_v4()).is_none());
    }
}
