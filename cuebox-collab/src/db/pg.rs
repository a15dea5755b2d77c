use std::env;

use async_trait::async_trait;
use cuebox_core::{
    ActiveStream, BoxedTransaction, IdentityError, IdentityProvider, ItemId, ItemState, NewItem,
    QueueItem, RoomAccess, RoomId, RoomSnapshot, RoomTransaction, Store, StoreError, StoreResult,
    UserId, Vote, VoteLedger,
};
use log::info;
use sqlx::{
    postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, PgConnection,
    PgPool, Postgres, Transaction,
};

use crate::{is_retryable, IntoStoreError, ItemRow, NewSession, RoomRow, VoteRow};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// A postgres store for cuebox rooms, which also resolves session tokens.
pub struct PgDatabase {
    pool: PgPool,
}

/// A transaction holding the row lock of a single room.
pub struct PgTransaction {
    room_id: RoomId,
    tx: Transaction<'static, Postgres>,
}

impl PgDatabase {
    pub async fn new(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Connects using `DATABASE_URL` and `CUEBOX_DATABASE_MAX_CONNECTIONS`.
    pub async fn from_env() -> StoreResult<Self> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| StoreError::Internal("DATABASE_URL is not set".into()))?;

        let max_connections = match env::var("CUEBOX_DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value.trim().parse().map_err(|_| {
                StoreError::Internal(
                    format!("CUEBOX_DATABASE_MAX_CONNECTIONS is invalid: {}", value).into(),
                )
            })?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Self::new(&url, max_connections).await
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Internal(Box::new(e)))?;

        info!("Database migrations are up to date");
        Ok(())
    }

    pub async fn create_session(&self, new_session: NewSession) -> StoreResult<()> {
        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id.as_str())
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    pub async fn delete_session_by_token(&self, token: &str) -> StoreResult<()> {
        let result = query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                resource: "session",
                identifier: token.to_string(),
            });
        }

        Ok(())
    }

    pub async fn clear_expired_sessions(&self) -> StoreResult<u64> {
        query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|r| r.rows_affected())
    }
}

#[async_trait]
impl Store for PgDatabase {
    async fn snapshot(&self, room_id: &RoomId) -> StoreResult<RoomSnapshot> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        // Every read below sees the same point in time
        query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        let room = fetch_room(&mut tx, room_id, false).await?;
        let snapshot = load_snapshot(&mut tx, room).await?;

        tx.rollback().await.map_err(|e| e.any())?;
        Ok(snapshot)
    }

    async fn begin(&self, room_id: &RoomId, access: RoomAccess) -> StoreResult<BoxedTransaction> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        if access == RoomAccess::CreateIfMissing {
            query("INSERT INTO rooms (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(room_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        // Holds the room until the transaction ends
        fetch_room(&mut tx, room_id, true).await?;

        Ok(Box::new(PgTransaction {
            room_id: room_id.clone(),
            tx,
        }))
    }

    async fn room_of_item(&self, item_id: ItemId) -> StoreResult<RoomId> {
        query_scalar::<_, String>("SELECT room_id FROM queue_items WHERE id = $1")
            .bind(item_id.value())
            .fetch_one(&self.pool)
            .await
            .map(RoomId::new)
            .map_err(|e| e.not_found_or("item", item_id))
    }
}

#[async_trait]
impl RoomTransaction for PgTransaction {
    fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    async fn snapshot(&mut self) -> StoreResult<RoomSnapshot> {
        let room = fetch_room(&mut self.tx, &self.room_id, false).await?;
        load_snapshot(&mut self.tx, room).await
    }

    async fn insert_item(&mut self, new_item: NewItem) -> StoreResult<QueueItem> {
        if new_item.room_id != self.room_id {
            return Err(StoreError::Rejected(format!(
                "item for room {} inserted into room {}",
                new_item.room_id, self.room_id
            )));
        }

        let id = query_scalar::<_, i64>(
            "INSERT INTO queue_items
                (room_id, external_id, title, artwork_small, artwork_big, submitted_at, state)
            VALUES ($1, $2, $3, $4, $5, $6, 'open')
            RETURNING id",
        )
        .bind(new_item.room_id.as_str())
        .bind(new_item.external_id.as_str())
        .bind(&new_item.title)
        .bind(&new_item.artwork.small)
        .bind(&new_item.artwork.big)
        .bind(new_item.submitted_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| e.any())?;

        Ok(new_item.into_item(ItemId::from_value(id)))
    }

    async fn insert_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        // Only lands if the item is live and in this room
        let result = query(
            "INSERT INTO votes (user_id, item_id)
            SELECT $1, id FROM queue_items
            WHERE id = $2 AND room_id = $3 AND state <> 'played'",
        )
        .bind(vote.user_id.as_str())
        .bind(vote.item_id.value())
        .bind(self.room_id.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(item_not_found(vote.item_id));
        }

        Ok(())
    }

    async fn delete_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        let result = query("DELETE FROM votes WHERE user_id = $1 AND item_id = $2")
            .bind(vote.user_id.as_str())
            .bind(vote.item_id.value())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                resource: "vote",
                identifier: format!("{}:{}", vote.user_id, vote.item_id),
            });
        }

        Ok(())
    }

    async fn set_item_state(&mut self, item_id: ItemId, state: ItemState) -> StoreResult<()> {
        let current = self.item_state(item_id).await?;

        if !current.can_become(state) {
            return Err(StoreError::Rejected(format!(
                "item {} can't go from {} to {}",
                item_id,
                current.as_str(),
                state.as_str()
            )));
        }

        query("UPDATE queue_items SET state = $1 WHERE id = $2")
            .bind(state.as_str())
            .bind(item_id.value())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())?;

        // Played items can't be voted on again
        if state == ItemState::Played {
            query("DELETE FROM votes WHERE item_id = $1")
                .bind(item_id.value())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| e.any())?;
        }

        Ok(())
    }

    async fn delete_item(&mut self, item_id: ItemId) -> StoreResult<()> {
        // Votes go with it
        let result = query(
            "DELETE FROM queue_items WHERE id = $1 AND room_id = $2 AND state <> 'played'",
        )
        .bind(item_id.value())
        .bind(self.room_id.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(item_not_found(item_id));
        }

        Ok(())
    }

    async fn set_active(&mut self, stream: &ActiveStream) -> StoreResult<()> {
        if let Some(item_id) = stream.item_id {
            if self.item_state(item_id).await? != ItemState::Active {
                return Err(StoreError::Rejected(format!(
                    "item {} must be active before it can be streamed",
                    item_id
                )));
            }
        }

        query("UPDATE rooms SET active_item_id = $1, generation = $2 WHERE id = $3")
            .bind(stream.item_id.map(|id| id.value()))
            .bind(stream.generation as i64)
            .bind(self.room_id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(|e| e.any())
    }
}

#[async_trait]
impl IdentityProvider for PgDatabase {
    async fn resolve(&self, credential: &str) -> Result<UserId, IdentityError> {
        query_scalar::<_, String>(
            "SELECT user_id FROM sessions WHERE token = $1 AND expires_at > now()",
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IdentityError::Internal(e.to_string()))?
        .map(UserId::new)
        .ok_or(IdentityError::InvalidCredentials)
    }
}

impl PgTransaction {
    async fn item_state(&mut self, item_id: ItemId) -> StoreResult<ItemState> {
        let state = query_scalar::<_, String>(
            "SELECT state FROM queue_items WHERE id = $1 AND room_id = $2",
        )
        .bind(item_id.value())
        .bind(self.room_id.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| e.not_found_or("item", item_id))?;

        ItemState::parse(&state).ok_or_else(|| {
            StoreError::Internal(format!("item {} has unknown state {}", item_id, state).into())
        })
    }
}

async fn fetch_room(
    conn: &mut PgConnection,
    room_id: &RoomId,
    lock: bool,
) -> StoreResult<RoomRow> {
    let sql = if lock {
        "SELECT id, active_item_id, generation FROM rooms WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, active_item_id, generation FROM rooms WHERE id = $1"
    };

    query_as::<_, RoomRow>(sql)
        .bind(room_id.as_str())
        .fetch_one(conn)
        .await
        .map_err(|e| e.not_found_or("room", room_id))
}

async fn load_snapshot(conn: &mut PgConnection, room: RoomRow) -> StoreResult<RoomSnapshot> {
    let items = query_as::<_, ItemRow>(
        "SELECT id, room_id, external_id, title, artwork_small, artwork_big, submitted_at, state
        FROM queue_items
        WHERE room_id = $1 AND state <> 'played'
        ORDER BY id",
    )
    .bind(&room.id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| e.any())?
    .into_iter()
    .map(QueueItem::try_from)
    .collect::<StoreResult<Vec<_>>>()?;

    let votes = query_as::<_, VoteRow>(
        "SELECT votes.user_id, votes.item_id
        FROM votes
            INNER JOIN queue_items ON votes.item_id = queue_items.id
        WHERE queue_items.room_id = $1 AND queue_items.state <> 'played'",
    )
    .bind(&room.id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| e.any())?;

    Ok(RoomSnapshot {
        room_id: RoomId::new(room.id.clone()),
        items,
        votes: VoteLedger::from_votes(votes.into_iter().map(Vote::from)),
        active: room.into_stream(),
    })
}

fn item_not_found(item_id: ItemId) -> StoreError {
    StoreError::NotFound {
        resource: "item",
        identifier: item_id.to_string(),
    }
}

impl IntoStoreError for SqlxError {
    fn any(self) -> StoreError {
        let retryable = match &self {
            SqlxError::Database(e) => e.code().as_deref().map_or(false, is_retryable),
            _ => false,
        };

        if retryable {
            StoreError::Conflict
        } else {
            StoreError::Internal(Box::new(self))
        }
    }

    fn not_found_or(self, resource: &'static str, identifier: impl ToString) -> StoreError {
        match self {
            SqlxError::RowNotFound => StoreError::NotFound {
                resource,
                identifier: identifier.to_string(),
            },
            e => Self::any(e),
        }
    }
}
