//! ScyllaDB schema creation for the persisted state layout in spec §6:
//! `pipeline_configs`, `conversation_sessions`, `conversation_messages`,
//! `podcast_jobs`, `voices`, `token_usage` (append-only).

use scylla::Session;

use crate::error::PersistenceError;

pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );
    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create keyspace: {e}")))?;
    Ok(())
}

pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let pipeline_configs = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.pipeline_configs (
            user_id UUID,
            provider TEXT,
            model_id TEXT,
            max_tokens INT,
            temperature FLOAT,
            top_p FLOAT,
            top_k_retrieval INT,
            top_k_final INT,
            rerank_enabled BOOLEAN,
            rerank_model TEXT,
            cot_enabled BOOLEAN,
            cot_max_depth INT,
            cot_quality_threshold FLOAT,
            cot_max_retries INT,
            PRIMARY KEY (user_id)
        )
    "#
    );
    exec(session, &pipeline_configs, "pipeline_configs").await?;

    let conversation_sessions = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.conversation_sessions (
            id UUID,
            user_id UUID,
            collection_id UUID,
            name TEXT,
            status TEXT,
            context_window_size INT,
            max_messages INT,
            message_count INT,
            created_at BIGINT,
            updated_at BIGINT,
            PRIMARY KEY (id)
        )
    "#
    );
    exec(session, &conversation_sessions, "conversation_sessions").await?;

    // Indexed on (session_id, created_at) per spec §6.
    let conversation_messages = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.conversation_messages (
            session_id UUID,
            created_at BIGINT,
            id UUID,
            role TEXT,
            type TEXT,
            content TEXT,
            metadata_json TEXT,
            PRIMARY KEY ((session_id), created_at, id)
        ) WITH CLUSTERING ORDER BY (created_at ASC, id ASC)
    "#
    );
    exec(session, &conversation_messages, "conversation_messages").await?;

    let podcast_jobs = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.podcast_jobs (
            id UUID,
            user_id UUID,
            collection_id UUID,
            title TEXT,
            duration_bucket TEXT,
            host_voice TEXT,
            expert_voice TEXT,
            format TEXT,
            status TEXT,
            progress_pct INT,
            current_step TEXT,
            audio_url TEXT,
            audio_size BIGINT,
            transcript TEXT,
            error TEXT,
            created_at BIGINT,
            updated_at BIGINT,
            completed_at BIGINT,
            PRIMARY KEY (id)
        )
    "#
    );
    exec(session, &podcast_jobs, "podcast_jobs").await?;

    // Secondary view keyed by owner, used to enforce the per-user
    // concurrency cap (spec §4.11) without a full-table scan.
    let podcast_jobs_by_user = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.podcast_jobs_by_user (
            user_id UUID,
            created_at BIGINT,
            id UUID,
            status TEXT,
            PRIMARY KEY ((user_id), created_at, id)
        ) WITH CLUSTERING ORDER BY (created_at DESC, id DESC)
    "#
    );
    exec(session, &podcast_jobs_by_user, "podcast_jobs_by_user").await?;

    // Ownership is per-user (spec §3).
    let voices = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.voices (
            user_id UUID,
            id UUID,
            name TEXT,
            status TEXT,
            provider_name TEXT,
            provider_voice_id TEXT,
            sample_ref TEXT,
            times_used INT,
            quality_score FLOAT,
            PRIMARY KEY ((user_id), id)
        )
    "#
    );
    exec(session, &voices, "voices").await?;

    // Append-only, indexed on (user_id, at) per spec §6.
    let token_usage = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.token_usage (
            user_id UUID,
            at BIGINT,
            id UUID,
            prompt_tokens INT,
            completion_tokens INT,
            total_tokens INT,
            model_id TEXT,
            service TEXT,
            session_id UUID,
            PRIMARY KEY ((user_id), at, id)
        ) WITH CLUSTERING ORDER BY (at DESC, id DESC)
    "#
    );
    exec(session, &token_usage, "token_usage").await?;

    tracing::info!("all tables created successfully");
    Ok(())
}

async fn exec(session: &Session, query: &str, table: &str) -> Result<(), PersistenceError> {
    session
        .query_unpaged(query.to_string(), &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create {table} table: {e}")))?;
    Ok(())
}
