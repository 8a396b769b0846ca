use crate::db::models::{
    ActivityCreate, ConnectionCreate, ContactCreate, DbActivity, DbContact, DbEmailConnection,
    DbLead, LeadCreate, ProviderKind,
};
use crate::db::patch::ConnectionPatch;
use crate::db::schema::SQLITE_INIT;
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::info;

type Reply<T> = RpcReplyPort<Result<T, SyncError>>;

const CONNECTION_COLUMNS: &str = "id, user_id, provider, email_address, access_token, \
     refresh_token, token_expiry, scope, webhook_subscription_id, webhook_expiry, is_active, \
     last_sync_at, created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, type, subject, notes, activity_date, duration_minutes, \
     contact_id, lead_id, account_id, user_id, email_message_id, email_thread_id, email_provider, \
     email_from, email_to, email_body, email_html_body, is_inbound, external_event_id, location, \
     created_at";

#[derive(Debug)]
pub enum DbActorMessage {
    /// Create or re-activate a connection for (user, provider, mailbox).
    UpsertConnection(ConnectionCreate, Reply<DbEmailConnection>),

    GetConnection(i64, Reply<Option<DbEmailConnection>>),

    /// Active connections owned by one user.
    ListUserConnections(String, Reply<Vec<DbEmailConnection>>),

    /// Active connections, optionally restricted to one provider.
    ListActiveConnections(Option<ProviderKind>, Reply<Vec<DbEmailConnection>>),

    /// Every active connection to a mailbox; several CRM users may share one.
    ListActiveConnectionsByMailbox(ProviderKind, String, Reply<Vec<DbEmailConnection>>),

    FindActiveConnectionBySubscription(String, Reply<Option<DbEmailConnection>>),

    PatchConnection(i64, ConnectionPatch, Reply<()>),

    /// Hard delete; replies whether a row was removed.
    DeleteConnection(i64, Reply<bool>),

    /// Soft-disable every connection of a user; replies with the affected count.
    DeactivateUserConnections(String, Reply<u64>),

    FindContactByEmail(String, Reply<Option<DbContact>>),
    FindLeadByEmail(String, Reply<Option<DbLead>>),
    CreateContact(ContactCreate, Reply<i64>),
    CreateLead(LeadCreate, Reply<i64>),

    FindEmailActivity(ProviderKind, String, Reply<Option<i64>>),
    FindEventActivity(ProviderKind, String, Reply<Option<i64>>),

    /// Insert an activity; replies `None` when a uniqueness constraint already holds a row.
    InsertActivity(Box<ActivityCreate>, Reply<Option<i64>>),

    ListUserActivities(String, Reply<Vec<DbActivity>>),

    ProcessedEventExists(String, String, Reply<bool>),

    /// Record an event; replies `false` when (type, key) was already present.
    InsertProcessedEvent(String, String, Option<Value>, Reply<bool>),

    /// Delete ledger rows processed before the cutoff; replies with the purged count.
    PurgeProcessedEvents(DateTime<Utc>, Reply<u64>),
}

#[derive(Clone)]
pub struct DbActorHandle {
    actor: ActorRef<DbActorMessage>,
}

macro_rules! rpc_err {
    ($name:literal) => {
        |e| SyncError::RactorError(format!(concat!("DbActor ", $name, " RPC failed: {}"), e))
    };
}

impl DbActorHandle {
    /// Stops the actor and closes the pool. Later calls fail with `DATABASE_ERROR`.
    pub async fn stop(&self) -> Result<(), SyncError> {
        self.actor
            .stop_and_wait(Some("shutdown".to_string()), None)
            .await
            .map_err(|e| SyncError::RactorError(format!("DbActor stop failed: {e}")))
    }

    pub async fn upsert_connection(
        &self,
        create: ConnectionCreate,
    ) -> Result<DbEmailConnection, SyncError> {
        ractor::call!(self.actor, DbActorMessage::UpsertConnection, create)
            .map_err(rpc_err!("UpsertConnection"))?
    }

    pub async fn get_connection(&self, id: i64) -> Result<Option<DbEmailConnection>, SyncError> {
        ractor::call!(self.actor, DbActorMessage::GetConnection, id)
            .map_err(rpc_err!("GetConnection"))?
    }

    pub async fn list_user_connections(
        &self,
        user_id: &str,
    ) -> Result<Vec<DbEmailConnection>, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ListUserConnections,
            user_id.to_string()
        )
        .map_err(rpc_err!("ListUserConnections"))?
    }

    pub async fn list_active_connections(
        &self,
        provider: Option<ProviderKind>,
    ) -> Result<Vec<DbEmailConnection>, SyncError> {
        ractor::call!(self.actor, DbActorMessage::ListActiveConnections, provider)
            .map_err(rpc_err!("ListActiveConnections"))?
    }

    pub async fn list_active_connections_by_mailbox(
        &self,
        provider: ProviderKind,
        email_address: &str,
    ) -> Result<Vec<DbEmailConnection>, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ListActiveConnectionsByMailbox,
            provider,
            email_address.to_string()
        )
        .map_err(rpc_err!("ListActiveConnectionsByMailbox"))?
    }

    pub async fn find_active_connection_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<DbEmailConnection>, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::FindActiveConnectionBySubscription,
            subscription_id.to_string()
        )
        .map_err(rpc_err!("FindActiveConnectionBySubscription"))?
    }

    pub async fn patch_connection(&self, id: i64, patch: ConnectionPatch) -> Result<(), SyncError> {
        ractor::call!(self.actor, DbActorMessage::PatchConnection, id, patch)
            .map_err(rpc_err!("PatchConnection"))?
    }

    pub async fn delete_connection(&self, id: i64) -> Result<bool, SyncError> {
        ractor::call!(self.actor, DbActorMessage::DeleteConnection, id)
            .map_err(rpc_err!("DeleteConnection"))?
    }

    pub async fn deactivate_user_connections(&self, user_id: &str) -> Result<u64, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::DeactivateUserConnections,
            user_id.to_string()
        )
        .map_err(rpc_err!("DeactivateUserConnections"))?
    }

    pub async fn find_contact_by_email(&self, email: &str) -> Result<Option<DbContact>, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::FindContactByEmail,
            email.to_string()
        )
        .map_err(rpc_err!("FindContactByEmail"))?
    }

    pub async fn find_lead_by_email(&self, email: &str) -> Result<Option<DbLead>, SyncError> {
        ractor::call!(self.actor, DbActorMessage::FindLeadByEmail, email.to_string())
            .map_err(rpc_err!("FindLeadByEmail"))?
    }

    pub async fn create_contact(&self, create: ContactCreate) -> Result<i64, SyncError> {
        ractor::call!(self.actor, DbActorMessage::CreateContact, create)
            .map_err(rpc_err!("CreateContact"))?
    }

    pub async fn create_lead(&self, create: LeadCreate) -> Result<i64, SyncError> {
        ractor::call!(self.actor, DbActorMessage::CreateLead, create)
            .map_err(rpc_err!("CreateLead"))?
    }

    pub async fn find_email_activity(
        &self,
        provider: ProviderKind,
        message_id: &str,
    ) -> Result<Option<i64>, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::FindEmailActivity,
            provider,
            message_id.to_string()
        )
        .map_err(rpc_err!("FindEmailActivity"))?
    }

    pub async fn find_event_activity(
        &self,
        provider: ProviderKind,
        event_id: &str,
    ) -> Result<Option<i64>, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::FindEventActivity,
            provider,
            event_id.to_string()
        )
        .map_err(rpc_err!("FindEventActivity"))?
    }

    pub async fn insert_activity(&self, create: ActivityCreate) -> Result<Option<i64>, SyncError> {
        ractor::call!(self.actor, DbActorMessage::InsertActivity, Box::new(create))
            .map_err(rpc_err!("InsertActivity"))?
    }

    pub async fn list_user_activities(&self, user_id: &str) -> Result<Vec<DbActivity>, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ListUserActivities,
            user_id.to_string()
        )
        .map_err(rpc_err!("ListUserActivities"))?
    }

    pub async fn processed_event_exists(
        &self,
        event_type: &str,
        event_key: &str,
    ) -> Result<bool, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ProcessedEventExists,
            event_type.to_string(),
            event_key.to_string()
        )
        .map_err(rpc_err!("ProcessedEventExists"))?
    }

    pub async fn insert_processed_event(
        &self,
        event_type: &str,
        event_key: &str,
        metadata: Option<Value>,
    ) -> Result<bool, SyncError> {
        ractor::call!(
            self.actor,
            DbActorMessage::InsertProcessedEvent,
            event_type.to_string(),
            event_key.to_string(),
            metadata
        )
        .map_err(rpc_err!("InsertProcessedEvent"))?
    }

    pub async fn purge_processed_events(&self, before: DateTime<Utc>) -> Result<u64, SyncError> {
        ractor::call!(self.actor, DbActorMessage::PurgeProcessedEvents, before)
            .map_err(rpc_err!("PurgeProcessedEvents"))?
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.pool.close().await;
        info!("DbActor stopped");
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let pool = &state.pool;
        match message {
            DbActorMessage::UpsertConnection(create, reply) => {
                let _ = reply.send(upsert_connection(pool, create).await);
            }
            DbActorMessage::GetConnection(id, reply) => {
                let _ = reply.send(get_connection(pool, id).await);
            }
            DbActorMessage::ListUserConnections(user_id, reply) => {
                let _ = reply.send(list_user_connections(pool, &user_id).await);
            }
            DbActorMessage::ListActiveConnections(provider, reply) => {
                let _ = reply.send(list_active_connections(pool, provider).await);
            }
            DbActorMessage::ListActiveConnectionsByMailbox(provider, email, reply) => {
                let _ = reply.send(list_connections_by_mailbox(pool, provider, &email).await);
            }
            DbActorMessage::FindActiveConnectionBySubscription(subscription_id, reply) => {
                let _ = reply.send(find_connection_by_subscription(pool, &subscription_id).await);
            }
            DbActorMessage::PatchConnection(id, patch, reply) => {
                let _ = reply.send(patch.apply(pool, id).await);
            }
            DbActorMessage::DeleteConnection(id, reply) => {
                let _ = reply.send(delete_connection(pool, id).await);
            }
            DbActorMessage::DeactivateUserConnections(user_id, reply) => {
                let _ = reply.send(deactivate_user_connections(pool, &user_id).await);
            }
            DbActorMessage::FindContactByEmail(email, reply) => {
                let _ = reply.send(find_contact_by_email(pool, &email).await);
            }
            DbActorMessage::FindLeadByEmail(email, reply) => {
                let _ = reply.send(find_lead_by_email(pool, &email).await);
            }
            DbActorMessage::CreateContact(create, reply) => {
                let _ = reply.send(create_contact(pool, create).await);
            }
            DbActorMessage::CreateLead(create, reply) => {
                let _ = reply.send(create_lead(pool, create).await);
            }
            DbActorMessage::FindEmailActivity(provider, message_id, reply) => {
                let _ = reply.send(find_email_activity(pool, provider, &message_id).await);
            }
            DbActorMessage::FindEventActivity(provider, event_id, reply) => {
                let _ = reply.send(find_event_activity(pool, provider, &event_id).await);
            }
            DbActorMessage::InsertActivity(create, reply) => {
                let _ = reply.send(insert_activity(pool, *create).await);
            }
            DbActorMessage::ListUserActivities(user_id, reply) => {
                let _ = reply.send(list_user_activities(pool, &user_id).await);
            }
            DbActorMessage::ProcessedEventExists(event_type, event_key, reply) => {
                let _ = reply.send(processed_event_exists(pool, &event_type, &event_key).await);
            }
            DbActorMessage::InsertProcessedEvent(event_type, event_key, metadata, reply) => {
                let res = insert_processed_event(pool, &event_type, &event_key, metadata).await;
                let _ = reply.send(res);
            }
            DbActorMessage::PurgeProcessedEvents(before, reply) => {
                let _ = reply.send(purge_processed_events(pool, before).await);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// email_connections
// ---------------------------------------------------------------------------

async fn upsert_connection(
    pool: &SqlitePool,
    c: ConnectionCreate,
) -> Result<DbEmailConnection, SyncError> {
    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO email_connections (
            user_id, provider, email_address, access_token, refresh_token, token_expiry, scope,
            is_active, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        ON CONFLICT(user_id, provider, email_address) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = COALESCE(excluded.refresh_token, refresh_token),
            token_expiry = excluded.token_expiry,
            scope = COALESCE(excluded.scope, scope),
            is_active = 1,
            updated_at = excluded.updated_at
        RETURNING {CONNECTION_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, DbEmailConnection>(&sql)
        .bind(c.user_id)
        .bind(c.provider)
        .bind(c.email_address)
        .bind(c.access_token)
        .bind(c.refresh_token)
        .bind(c.token_expiry)
        .bind(c.scope)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

async fn get_connection(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<DbEmailConnection>, SyncError> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM email_connections WHERE id = ?");
    let row = sqlx::query_as::<_, DbEmailConnection>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

async fn list_user_connections(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<DbEmailConnection>, SyncError> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM email_connections \
         WHERE user_id = ? AND is_active = 1 ORDER BY id"
    );
    let rows = sqlx::query_as::<_, DbEmailConnection>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

async fn list_active_connections(
    pool: &SqlitePool,
    provider: Option<ProviderKind>,
) -> Result<Vec<DbEmailConnection>, SyncError> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM email_connections \
         WHERE is_active = 1 AND (? IS NULL OR provider = ?) ORDER BY id"
    );
    let rows = sqlx::query_as::<_, DbEmailConnection>(&sql)
        .bind(provider)
        .bind(provider)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

async fn list_connections_by_mailbox(
    pool: &SqlitePool,
    provider: ProviderKind,
    email_address: &str,
) -> Result<Vec<DbEmailConnection>, SyncError> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM email_connections \
         WHERE provider = ? AND email_address = ? AND is_active = 1 \
         ORDER BY id ASC"
    );
    let rows = sqlx::query_as::<_, DbEmailConnection>(&sql)
        .bind(provider)
        .bind(email_address)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

async fn find_connection_by_subscription(
    pool: &SqlitePool,
    subscription_id: &str,
) -> Result<Option<DbEmailConnection>, SyncError> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM email_connections \
         WHERE webhook_subscription_id = ? AND is_active = 1 LIMIT 1"
    );
    let row = sqlx::query_as::<_, DbEmailConnection>(&sql)
        .bind(subscription_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

async fn delete_connection(pool: &SqlitePool, id: i64) -> Result<bool, SyncError> {
    let res = sqlx::query("DELETE FROM email_connections WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

async fn deactivate_user_connections(pool: &SqlitePool, user_id: &str) -> Result<u64, SyncError> {
    let res = sqlx::query(
        "UPDATE email_connections SET is_active = 0, updated_at = ? \
         WHERE user_id = ? AND is_active = 1",
    )
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// contacts / leads
// ---------------------------------------------------------------------------

async fn find_contact_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<DbContact>, SyncError> {
    // `=` on TEXT uses BINARY collation: exact, case-sensitive.
    let row = sqlx::query_as::<_, DbContact>(
        "SELECT id, first_name, last_name, email, account_id FROM contacts \
         WHERE email = ? ORDER BY id LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn find_lead_by_email(pool: &SqlitePool, email: &str) -> Result<Option<DbLead>, SyncError> {
    let row = sqlx::query_as::<_, DbLead>(
        "SELECT id, first_name, last_name, email, company FROM leads \
         WHERE email = ? ORDER BY id LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

async fn create_contact(pool: &SqlitePool, c: ContactCreate) -> Result<i64, SyncError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO contacts (first_name, last_name, email, account_id) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(c.first_name)
    .bind(c.last_name)
    .bind(c.email)
    .bind(c.account_id)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn create_lead(pool: &SqlitePool, c: LeadCreate) -> Result<i64, SyncError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO leads (first_name, last_name, email, company) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(c.first_name)
    .bind(c.last_name)
    .bind(c.email)
    .bind(c.company)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// activities
// ---------------------------------------------------------------------------

async fn find_email_activity(
    pool: &SqlitePool,
    provider: ProviderKind,
    message_id: &str,
) -> Result<Option<i64>, SyncError> {
    let id = sqlx::query_scalar(
        "SELECT id FROM activities WHERE email_provider = ? AND email_message_id = ? LIMIT 1",
    )
    .bind(provider)
    .bind(message_id)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

async fn find_event_activity(
    pool: &SqlitePool,
    provider: ProviderKind,
    event_id: &str,
) -> Result<Option<i64>, SyncError> {
    let id = sqlx::query_scalar(
        "SELECT id FROM activities WHERE email_provider = ? AND external_event_id = ? LIMIT 1",
    )
    .bind(provider)
    .bind(event_id)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

async fn insert_activity(pool: &SqlitePool, a: ActivityCreate) -> Result<Option<i64>, SyncError> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO activities (
            type, subject, notes, activity_date, duration_minutes, contact_id, lead_id,
            account_id, user_id, email_message_id, email_thread_id, email_provider, email_from,
            email_to, email_body, email_html_body, is_inbound, external_event_id, location,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        RETURNING id
        "#,
    )
    .bind(a.activity_type)
    .bind(a.subject)
    .bind(a.notes)
    .bind(a.activity_date)
    .bind(a.duration_minutes)
    .bind(a.contact_id)
    .bind(a.lead_id)
    .bind(a.account_id)
    .bind(a.user_id)
    .bind(a.email_message_id)
    .bind(a.email_thread_id)
    .bind(a.email_provider)
    .bind(a.email_from)
    .bind(a.email_to)
    .bind(a.email_body)
    .bind(a.email_html_body)
    .bind(a.is_inbound)
    .bind(a.external_event_id)
    .bind(a.location)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

async fn list_user_activities(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<DbActivity>, SyncError> {
    let sql = format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE user_id = ? ORDER BY activity_date DESC, id"
    );
    let rows = sqlx::query_as::<_, DbActivity>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// processed_events
// ---------------------------------------------------------------------------

async fn processed_event_exists(
    pool: &SqlitePool,
    event_type: &str,
    event_key: &str,
) -> Result<bool, SyncError> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM processed_events WHERE event_type = ? AND event_key = ? LIMIT 1",
    )
    .bind(event_type)
    .bind(event_key)
    .fetch_optional(pool)
    .await?;
    Ok(found.is_some())
}

async fn insert_processed_event(
    pool: &SqlitePool,
    event_type: &str,
    event_key: &str,
    metadata: Option<Value>,
) -> Result<bool, SyncError> {
    let metadata = metadata.map(|v| v.to_string());
    let res = sqlx::query(
        r#"
        INSERT INTO processed_events (event_type, event_key, metadata, processed_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(event_type, event_key) DO NOTHING
        "#,
    )
    .bind(event_type)
    .bind(event_key)
    .bind(metadata)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

async fn purge_processed_events(
    pool: &SqlitePool,
    before: DateTime<Utc>,
) -> Result<u64, SyncError> {
    let res = sqlx::query("DELETE FROM processed_events WHERE processed_at < ?")
        .bind(before)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Spawn the database actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> Result<DbActorHandle, SyncError> {
    let (actor, _jh) = ractor::Actor::spawn(None, DbActor, database_url.to_string())
        .await
        .map_err(|e| SyncError::RactorError(format!("failed to spawn DbActor: {e}")))?;

    Ok(DbActorHandle { actor })
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), SyncError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
